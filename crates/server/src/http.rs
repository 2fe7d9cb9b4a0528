//! HTTP API: session control, chat (sync and SSE streaming), room/history
//! lookups, and health/readiness checks.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ckd_agent::Agent;
use ckd_core::{AgentChunk, AgentRequest, ChunkStatus};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let (cors_origins, cors_enabled) = {
        let config = state.get_config();
        (config.server.cors_origins.clone(), config.server.cors_enabled)
    };
    let cors_layer = build_cors_layer(&cors_origins, cors_enabled);

    Router::new()
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/reset", post(reset_session))
        .route("/api/sessions/:id/cancel", post(cancel_stream))
        .route("/api/chat/:session_id", post(chat))
        .route("/api/chat/:session_id/stream", post(chat_stream))
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/:room_id/history", get(room_history))
        .route("/api/history/:agent_type", get(history_by_agent))
        .route("/api/agents", get(list_agents))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS disabled, allowing all origins");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .allow_credentials(true)
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    user_id: Option<String>,
    room_id: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Json<serde_json::Value> {
    let session_id = state.sessions.create_session(req.user_id, req.room_id);
    Json(serde_json::json!({ "session_id": session_id }))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> ServerResult<Json<serde_json::Value>> {
    let handle = state.sessions.get_session(&id, true)?;
    let session = handle.snapshot();
    Ok(Json(serde_json::json!({
        "session_id": session.session_id,
        "user_id": session.user_id,
        "room_id": session.room_id,
        "active_agent": session.active_agent,
        "turn_count": session.conversation_history.len(),
        "total_tokens": state.policy.total_usage(&id),
    })))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.sessions.remove(&id);
    state.policy.reset(&id);
    StatusCode::NO_CONTENT
}

async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({ "sessions": sessions, "count": state.sessions.count() }))
}

async fn reset_session(State(state): State<AppState>, Path(id): Path<String>) -> ServerResult<StatusCode> {
    state.sessions.clear_history(&id)?;
    state.policy.reset(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_stream(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.streams.request_cancel(&id) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    query: String,
    target_agent: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    status: String,
    answer: String,
    agent_type: String,
    sources: Vec<ckd_core::SourceRef>,
    tokens_used: u64,
}

fn build_agent_request(session_id: &str, req: &ChatRequest) -> AgentRequest {
    let mut request = AgentRequest::new(req.query.clone(), session_id.to_string());
    request.user_id = req.user_id.clone();
    if let Some(target) = &req.target_agent {
        request = request.with_context(ckd_core::context_keys::TARGET_AGENT, serde_json::Value::String(target.clone()));
    }
    request
}

async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ServerResult<Json<ChatResponse>> {
    let handle = state.sessions.get_session(&session_id, true)?;
    let created_at = handle.snapshot().created_at;

    let estimate = state.router.estimate_context_usage(&req.query) as u64;
    state.policy.check_admission(&session_id, created_at, estimate)?;

    let request = build_agent_request(&session_id, &req);
    let started = std::time::Instant::now();
    let response = state.router.process(&request).await?;
    crate::metrics::record_latency(&response.agent_type, started.elapsed());
    crate::metrics::record_request(&response.agent_type, &format!("{:?}", response.status).to_lowercase());
    crate::metrics::record_tokens(&response.agent_type, response.tokens_used as u64);

    state.policy.track_usage(&session_id, &response.agent_type, response.tokens_used as u64);
    state.sessions.add_to_history(&session_id, &response.agent_type, &req.query, &response.answer)?;
    state.sessions.update_session_activity(&session_id, Some(&response.agent_type))?;

    Ok(Json(ChatResponse {
        status: format!("{:?}", response.status).to_lowercase(),
        answer: response.answer,
        agent_type: response.agent_type,
        sources: response.sources,
        tokens_used: response.tokens_used as u64,
    }))
}

/// Streams `AgentChunk`s as server-sent events. Cancellation is cooperative:
/// a client (or the `/cancel` control endpoint) flips the registry flag and
/// the loop below observes it between chunks rather than aborting the task.
async fn chat_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ServerResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let handle = state.sessions.get_session(&session_id, true)?;
    let created_at = handle.snapshot().created_at;

    let estimate = state.router.estimate_context_usage(&req.query) as u64;
    state.policy.check_admission(&session_id, created_at, estimate)?;

    let request = build_agent_request(&session_id, &req);
    let mut receiver = state.router.process_stream(&request).await?;

    let stream_handle = state.streams.start(&session_id);
    let streams = state.streams.clone();
    let sessions = state.sessions.clone();
    let policy = state.policy.clone();
    let user_input = req.query.clone();
    let sid = session_id.clone();

    let event_stream = async_stream::stream! {
        let mut full_answer = String::new();
        let mut last_agent_type = String::new();

        while let Some(chunk) = receiver.recv().await {
            if stream_handle.is_cancelled() {
                let cancelled = AgentChunk::new(String::new(), ChunkStatus::Cancelled, last_agent_type.clone());
                yield Ok(Event::default().json_data(&cancelled).unwrap_or_else(|_| Event::default()));
                break;
            }

            full_answer.push_str(&chunk.content);
            stream_handle.append(&chunk.content);
            last_agent_type = chunk.agent_type.clone();

            let terminal = matches!(chunk.status, ChunkStatus::Complete | ChunkStatus::Error);
            yield Ok(Event::default().json_data(&chunk).unwrap_or_else(|_| Event::default()));

            if terminal {
                let _ = sessions.add_to_history(&sid, &chunk.agent_type, &user_input, &full_answer);
                let _ = sessions.update_session_activity(&sid, Some(&chunk.agent_type));
                let estimated_usage = full_answer.len() as u64 / 4;
                policy.track_usage(&sid, &chunk.agent_type, estimated_usage);
                break;
            }
        }
        streams.finish(&sid);
    };

    Ok(Sse::new(event_stream).keep_alive(axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Deserialize)]
struct UserIdQuery {
    user_id: String,
}

async fn list_rooms(
    State(state): State<AppState>,
    Query(q): Query<UserIdQuery>,
) -> ServerResult<Json<serde_json::Value>> {
    let Some(persistence) = &state.persistence else {
        return Ok(Json(serde_json::json!({ "rooms": [] })));
    };
    let rooms = persistence.rooms.list_for_user(&q.user_id).await?;
    Ok(Json(serde_json::json!({
        "rooms": rooms.into_iter().map(|r| serde_json::json!({
            "room_id": r.room_id,
            "last_message": r.last_message,
            "last_activity": r.last_activity,
        })).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i32>,
}

async fn room_history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> ServerResult<Json<serde_json::Value>> {
    let Some(persistence) = &state.persistence else {
        return Ok(Json(serde_json::json!({ "history": [] })));
    };
    let limit = q.limit.unwrap_or(50);
    let records = persistence.conversation.room_history(&room_id, limit).await?;
    Ok(Json(serde_json::json!({
        "history": records.into_iter().map(|r| serde_json::json!({
            "session_id": r.session_id,
            "user_id": r.user_id,
            "agent_type": r.entry.agent_type,
            "user_input": r.entry.user_input,
            "agent_response": r.entry.agent_response,
            "timestamp": r.entry.timestamp,
        })).collect::<Vec<_>>(),
    })))
}

#[derive(Debug, Deserialize)]
struct HistoryByAgentQuery {
    session_id: Option<String>,
    limit: Option<usize>,
}

async fn history_by_agent(
    State(state): State<AppState>,
    Path(agent_type): Path<String>,
    Query(q): Query<HistoryByAgentQuery>,
) -> ServerResult<Json<serde_json::Value>> {
    let Some(session_id) = q.session_id else {
        return Err(ServerError::InvalidRequest("session_id query parameter is required".to_string()));
    };
    let entries = state.sessions.get_conversation_history_by_agent(&session_id, &agent_type, q.limit)?;
    Ok(Json(serde_json::json!({ "history": entries })))
}

async fn list_agents(State(state): State<AppState>) -> Json<serde_json::Value> {
    let agents: Vec<serde_json::Value> = state
        .registry
        .get_agents_info()
        .into_iter()
        .map(|(agent_type, metadata)| {
            serde_json::json!({
                "agent_type": agent_type,
                "name": metadata.name,
                "description": metadata.description,
                "version": metadata.version,
                "capabilities": metadata.capabilities,
                "execution_type": metadata.execution_type.to_string(),
            })
        })
        .collect();
    Json(serde_json::json!({ "agents": agents }))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mut checks = serde_json::Map::new();
    checks.insert(
        "agents".to_string(),
        serde_json::json!({ "status": "ok", "count": state.registry.list_agents().len() }),
    );
    checks.insert("sessions".to_string(), serde_json::json!({ "status": "ok", "active": state.sessions.count() }));

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": checks,
        })),
    )
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mut ready = true;
    let mut checks = serde_json::Map::new();

    let llm_ok = state.llm.is_available().await;
    checks.insert("llm".to_string(), serde_json::json!({ "status": if llm_ok { "ok" } else { "unreachable" } }));
    ready &= llm_ok;

    if let Some(rag) = &state.rag {
        let _ = rag;
        checks.insert("rag".to_string(), serde_json::json!({ "status": "ok" }));
    } else {
        checks.insert("rag".to_string(), serde_json::json!({ "status": "disabled" }));
    }

    if state.persistence.is_some() {
        checks.insert("persistence".to_string(), serde_json::json!({ "status": "ok" }));
    } else {
        checks.insert("persistence".to_string(), serde_json::json!({ "status": "disabled" }));
    }

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(serde_json::json!({ "status": if ready { "ready" } else { "not_ready" }, "checks": checks })))
}
