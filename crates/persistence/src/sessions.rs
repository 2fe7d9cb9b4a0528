//! ScyllaDB-backed conversation-history, room, and session-record storage.
//!
//! This crate persists the durable record; the hot-path mutable session
//! state (idle/absolute eviction, token ledger) lives in `ckd-server`'s
//! in-memory `SessionManager` and is flushed here after each completed
//! request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ckd_core::ConversationEntry;

use crate::{PersistenceError, ScyllaClient};

/// One row of a room's conversation, as returned by `rooms/{room_id}/history`.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub entry_id: Uuid,
    pub room_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub entry: ConversationEntry,
}

/// One row of `rooms?user_id=`.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub room_id: String,
    pub last_message: String,
    pub last_activity: DateTime<Utc>,
}

/// Durable session metadata, written once per session and refreshed on
/// activity.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: Option<String>,
    pub room_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active_agent: Option<String>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(
        &self,
        room_id: &str,
        session_id: &str,
        user_id: Option<&str>,
        entry: &ConversationEntry,
    ) -> Result<(), PersistenceError>;

    async fn room_history(&self, room_id: &str, limit: i32) -> Result<Vec<HistoryRecord>, PersistenceError>;

    /// Scoped by agent type within one room's partition. A cross-room scan
    /// by agent type alone would need a secondary index this schema doesn't
    /// carry; callers needing that broader view should query by room first.
    async fn room_history_by_agent(
        &self,
        room_id: &str,
        agent_type: &str,
        limit: i32,
    ) -> Result<Vec<HistoryRecord>, PersistenceError>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn touch(&self, user_id: &str, room_id: &str, last_message: &str) -> Result<(), PersistenceError>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RoomSummary>, PersistenceError>;
}

#[async_trait]
pub trait SessionRecordStore: Send + Sync {
    async fn upsert(&self, record: &SessionRecord) -> Result<(), PersistenceError>;
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaConversationStore {
    client: ScyllaClient,
}

impl ScyllaConversationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_history_record(
        &self,
        room_id: &str,
        row: scylla::frame::response::result::Row,
    ) -> Result<HistoryRecord, PersistenceError> {
        let (entry_id, session_id, user_id, agent_type, user_input, agent_response, created_at): (
            Uuid,
            String,
            Option<String>,
            String,
            String,
            String,
            i64,
        ) = row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(HistoryRecord {
            entry_id,
            room_id: room_id.to_string(),
            session_id,
            user_id,
            entry: ConversationEntry {
                timestamp: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
                agent_type,
                user_input,
                agent_response,
            },
        })
    }
}

#[async_trait]
impl ConversationStore for ScyllaConversationStore {
    async fn append(
        &self,
        room_id: &str,
        session_id: &str,
        user_id: Option<&str>,
        entry: &ConversationEntry,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.conversation_history (
                room_id, entry_id, session_id, user_id, agent_type,
                user_input, agent_response, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    room_id,
                    Uuid::new_v4(),
                    session_id,
                    user_id,
                    &entry.agent_type,
                    &entry.user_input,
                    &entry.agent_response,
                    entry.timestamp.timestamp_millis(),
                ),
            )
            .await?;

        tracing::debug!(room_id, session_id, agent_type = %entry.agent_type, "conversation entry persisted");
        Ok(())
    }

    async fn room_history(&self, room_id: &str, limit: i32) -> Result<Vec<HistoryRecord>, PersistenceError> {
        let query = format!(
            "SELECT entry_id, session_id, user_id, agent_type, user_input, agent_response, created_at
             FROM {}.conversation_history WHERE room_id = ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (room_id, limit)).await?;

        let mut records = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                records.push(self.row_to_history_record(room_id, row)?);
            }
        }
        Ok(records)
    }

    async fn room_history_by_agent(
        &self,
        room_id: &str,
        agent_type: &str,
        limit: i32,
    ) -> Result<Vec<HistoryRecord>, PersistenceError> {
        // No per-agent clustering key; fetch the partition and filter in
        // application code rather than adding ALLOW FILTERING.
        let all = self.room_history(room_id, limit.saturating_mul(4).max(limit)).await?;
        Ok(all
            .into_iter()
            .filter(|r| r.entry.agent_type == agent_type)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[derive(Clone)]
pub struct ScyllaRoomStore {
    client: ScyllaClient,
}

impl ScyllaRoomStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoomStore for ScyllaRoomStore {
    async fn touch(&self, user_id: &str, room_id: &str, last_message: &str) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.rooms (user_id, room_id, last_message, last_activity) VALUES (?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(query, (user_id, room_id, last_message, Utc::now().timestamp_millis()))
            .await?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<RoomSummary>, PersistenceError> {
        let query = format!(
            "SELECT room_id, last_message, last_activity FROM {}.rooms WHERE user_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (user_id,)).await?;

        let mut rooms = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (room_id, last_message, last_activity): (String, String, i64) =
                    row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                rooms.push(RoomSummary {
                    room_id,
                    last_message,
                    last_activity: DateTime::from_timestamp_millis(last_activity).unwrap_or_else(Utc::now),
                });
            }
        }
        Ok(rooms)
    }
}

#[derive(Clone)]
pub struct ScyllaSessionRecordStore {
    client: ScyllaClient,
}

impl ScyllaSessionRecordStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionRecordStore for ScyllaSessionRecordStore {
    async fn upsert(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.sessions (
                session_id, user_id, room_id, created_at, last_activity, active_agent
            ) VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &record.session_id,
                    &record.user_id,
                    &record.room_id,
                    record.created_at.timestamp_millis(),
                    record.last_activity.timestamp_millis(),
                    &record.active_agent,
                ),
            )
            .await?;

        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, PersistenceError> {
        let query = format!(
            "SELECT session_id, user_id, room_id, created_at, last_activity, active_agent
             FROM {}.sessions WHERE session_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (session_id,)).await?;

        let Some(rows) = result.rows else { return Ok(None) };
        let Some(row) = rows.into_iter().next() else { return Ok(None) };

        let (session_id, user_id, room_id, created_at, last_activity, active_agent): (
            String,
            Option<String>,
            Option<String>,
            i64,
            i64,
            Option<String>,
        ) = row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(Some(SessionRecord {
            session_id,
            user_id,
            room_id,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            last_activity: DateTime::from_timestamp_millis(last_activity).unwrap_or_else(Utc::now),
            active_agent,
        }))
    }
}
