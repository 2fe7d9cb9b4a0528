//! ScyllaDB persistence layer for the CKD agent core.
//!
//! Provides durable storage for:
//! - Session records (the mirror of `ckd-server`'s in-memory hot path)
//! - Conversation history, partitioned by room
//! - The per-user room index

pub mod client;
pub mod error;
pub mod schema;
pub mod sessions;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use sessions::{
    ConversationStore, HistoryRecord, RoomStore, RoomSummary, ScyllaConversationStore,
    ScyllaRoomStore, ScyllaSessionRecordStore, SessionRecord, SessionRecordStore,
};

/// Connect to ScyllaDB, ensure the schema exists, and wire up the stores.
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        conversation: ScyllaConversationStore::new(client.clone()),
        rooms: ScyllaRoomStore::new(client.clone()),
        sessions: ScyllaSessionRecordStore::new(client),
    })
}

/// Combined persistence layer with all stores.
pub struct PersistenceLayer {
    pub conversation: ScyllaConversationStore,
    pub rooms: ScyllaRoomStore,
    pub sessions: ScyllaSessionRecordStore,
}
