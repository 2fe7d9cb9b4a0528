//! ScyllaDB schema creation

use scylla::Session;

use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create keyspace: {e}")))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Session records: durable copy of session metadata (the hot path lives
    // in ckd-server's in-memory SessionManager; this is for history queries
    // and recovery across process restarts).
    let sessions_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.sessions (
            session_id TEXT,
            user_id TEXT,
            room_id TEXT,
            created_at TIMESTAMP,
            last_activity TIMESTAMP,
            active_agent TEXT,
            PRIMARY KEY (session_id)
        ) WITH default_time_to_live = 86400
    "#,
        keyspace
    );

    session
        .query_unpaged(sessions_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create sessions table: {e}")))?;

    // Conversation history, partitioned by room so `rooms/{room_id}/history`
    // is a single-partition range scan.
    let conversation_history_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.conversation_history (
            room_id TEXT,
            entry_id TIMEUUID,
            session_id TEXT,
            user_id TEXT,
            agent_type TEXT,
            user_input TEXT,
            agent_response TEXT,
            created_at TIMESTAMP,
            PRIMARY KEY ((room_id), entry_id)
        ) WITH CLUSTERING ORDER BY (entry_id DESC)
    "#,
        keyspace
    );

    session
        .query_unpaged(conversation_history_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create conversation_history table: {e}")))?;

    // Per-user room index, so `rooms?user_id=` is a single-partition scan
    // without needing a secondary index on conversation_history.
    let rooms_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.rooms (
            user_id TEXT,
            room_id TEXT,
            last_message TEXT,
            last_activity TIMESTAMP,
            PRIMARY KEY ((user_id), room_id)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(rooms_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create rooms table: {e}")))?;

    tracing::info!("all tables created successfully");
    Ok(())
}
