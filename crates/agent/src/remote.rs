//! Adapter wrapping a remote event-polling agent server behind the local
//! `Agent` trait, with a circuit breaker and a jittered exponential-backoff
//! retry envelope around the whole call.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use ckd_core::{AgentRequest, AgentResponse, AgentStatus, CircuitState, RemoteEvent, SourceRef};

use crate::error::AgentError;
use crate::traits::{Agent, AgentMetadata};

/// Everything that changes together on a state transition, guarded by one
/// lock. Checking "N consecutive failures" and flipping `state`, or
/// claiming the single half-open probe slot, must happen in one critical
/// section — splitting them across independent atomics lets two racing
/// callers both observe `HalfOpen` and both send a probe.
struct CircuitBreakerState {
    count: u32,
    state: CircuitState,
    last_failure: Option<Instant>,
    half_open_probe_in_flight: bool,
}

struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<CircuitBreakerState>,
}

impl CircuitBreaker {
    fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(CircuitBreakerState {
                count: 0,
                state: CircuitState::Closed,
                last_failure: None,
                half_open_probe_in_flight: false,
            }),
        }
    }

    /// Decides admission and, for the half-open case, claims the single
    /// allowed in-flight probe atomically with that decision.
    fn should_allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    false
                } else {
                    inner.half_open_probe_in_flight = true;
                    true
                }
            }
            CircuitState::Open => {
                let elapsed = inner.last_failure.map(|t| t.elapsed());
                if elapsed.map_or(false, |e| e > self.recovery_timeout) {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.count = 0;
        inner.state = CircuitState::Closed;
        inner.half_open_probe_in_flight = false;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.count += 1;
        inner.last_failure = Some(Instant::now());
        inner.half_open_probe_in_flight = false;
        if inner.count >= self.failure_threshold {
            inner.state = CircuitState::Open;
        }
    }

    fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

/// Per-agent-type remote configuration, mirroring the original's
/// `RemoteAgent.__init__` parameter set.
#[derive(Debug, Clone)]
pub struct RemoteAgentConfig {
    pub agent_type: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_polling_duration: Duration,
    pub polling_interval: Duration,
    pub polling_interval_cap: Duration,
    pub jitter_ratio: f64,
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl From<(&str, &ckd_config::RemoteAgentConfig, &ckd_config::PolicyConfig)> for RemoteAgentConfig {
    fn from(
        (agent_type, remote, policy): (&str, &ckd_config::RemoteAgentConfig, &ckd_config::PolicyConfig),
    ) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            base_url: remote.base_url(),
            timeout: Duration::from_secs_f64(remote.timeout_secs),
            max_retries: remote.max_retries,
            backoff_factor: remote.backoff_factor,
            max_polling_duration: Duration::from_secs_f64(remote.max_polling_duration_secs),
            polling_interval: Duration::from_secs_f64(remote.polling_interval_secs),
            polling_interval_cap: Duration::from_secs_f64(remote.polling_interval_cap_secs),
            jitter_ratio: remote.jitter_ratio,
            failure_threshold: policy.circuit_failure_threshold,
            recovery_timeout: Duration::from_secs(policy.circuit_recovery_timeout_secs),
        }
    }
}

pub struct RemoteAgentAdapter {
    config: RemoteAgentConfig,
    client: Client,
    circuit: CircuitBreaker,
}

impl RemoteAgentAdapter {
    pub fn new(config: RemoteAgentConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;
        let circuit = CircuitBreaker::new(config.failure_threshold, config.recovery_timeout);
        Ok(Self { config, client, circuit })
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }

    async fn get_or_create_session(&self, session_id: &str) -> Result<String, AgentError> {
        let url = format!("{}/sessions/{session_id}", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::Http(format!("session create failed: {}", response.status())));
        }

        #[derive(Deserialize)]
        struct SessionResponse {
            session_id: String,
        }
        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::ResponseParse(e.to_string()))?;
        Ok(body.session_id)
    }

    async fn send_message(&self, session: &str, text: &str) -> Result<(), AgentError> {
        let url = format!("{}/sessions/{session}/messages", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "message": text }))
            .send()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::Http(format!("send message failed: {}", response.status())));
        }
        Ok(())
    }

    async fn fetch_events(
        &self,
        session: &str,
        min_offset: u64,
        wait_for_data: Duration,
    ) -> Result<Vec<RemoteEvent>, AgentError> {
        let url = format!("{}/sessions/{session}/events", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("min_offset", min_offset.to_string()),
                ("wait_for_data", wait_for_data.as_secs().to_string()),
            ])
            .send()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::ResponseParse(format!("session {session} not found")));
        }
        if !response.status().is_success() {
            return Err(AgentError::Http(format!("fetch events failed: {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::ResponseParse(e.to_string()))
    }

    /// Runs the full response-assembly algorithm: poll until a `ready`
    /// status event arrives with no traces still in flight, or the
    /// per-call polling budget is exhausted.
    async fn poll_events_until_ready(&self, session: &str) -> Result<Vec<RemoteEvent>, AgentError> {
        let mut active_traces: HashSet<String> = HashSet::new();
        let mut offset = 0u64;
        let mut all_events = Vec::new();
        let mut interval = self.config.polling_interval;
        let start = Instant::now();

        loop {
            if start.elapsed() > self.config.max_polling_duration {
                return Err(AgentError::Timeout {
                    agent_type: self.config.agent_type.clone(),
                    timeout_secs: self.config.max_polling_duration.as_secs_f64(),
                });
            }

            if start.elapsed() > Duration::from_secs(10) {
                interval = (interval.mul_f64(1.2)).min(self.config.polling_interval_cap);
            }

            let events = self.fetch_events(session, offset, interval).await?;

            if events.is_empty() {
                tokio::time::sleep(interval).await;
                continue;
            }

            let mut saw_ready = false;
            for event in &events {
                if event.status() == Some("error") {
                    let message = event
                        .data
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    return Err(AgentError::Execution(message.to_string()));
                }

                if event.is_agent_message() {
                    active_traces.insert(event.base_correlation_id().to_string());
                }

                if event.status() == Some("ready") {
                    active_traces.remove(event.base_correlation_id());
                    saw_ready = true;
                }
            }

            if let Some(max_offset) = events.iter().map(|e| e.offset).max() {
                offset = max_offset + 1;
            }
            all_events.extend(events);

            if saw_ready && active_traces.is_empty() {
                return Ok(all_events);
            }

            tokio::time::sleep(interval).await;
        }
    }

    fn convert_events_to_response(&self, events: &[RemoteEvent]) -> AgentResponse {
        let messages: Vec<&str> = events
            .iter()
            .filter(|e| e.is_agent_message())
            .filter_map(|e| e.data.get("message").and_then(|v| v.as_str()))
            .collect();

        let tools: Vec<SourceRef> = events
            .iter()
            .filter(|e| e.kind == "tool")
            .map(|e| SourceRef {
                title: e
                    .data
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("tool")
                    .to_string(),
                url: None,
                extra: e
                    .data
                    .as_object()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
            })
            .collect();

        let message_count = messages.len();
        let tool_count = tools.len();

        AgentResponse {
            answer: messages.join("\n"),
            sources: Vec::new(),
            papers: tools,
            tokens_used: 0,
            status: AgentStatus::Success,
            agent_type: self.config.agent_type.clone(),
            metadata: [
                ("event_count".to_string(), json!(events.len())),
                ("message_count".to_string(), json!(message_count)),
                ("tool_count".to_string(), json!(tool_count)),
            ]
            .into_iter()
            .collect(),
            timestamp: chrono::Utc::now(),
        }
    }

    async fn execute_once(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let session = tokio::time::timeout(
            self.config.max_polling_duration,
            self.get_or_create_session(&request.session_id),
        )
        .await
        .map_err(|_| AgentError::Timeout {
            agent_type: self.config.agent_type.clone(),
            timeout_secs: self.config.max_polling_duration.as_secs_f64(),
        })??;

        self.send_message(&session, &request.query).await?;
        let events = self.poll_events_until_ready(&session).await?;
        Ok(self.convert_events_to_response(&events))
    }

    fn is_retryable(error: &AgentError) -> bool {
        matches!(error, AgentError::Http(_) | AgentError::Timeout { .. })
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_factor.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.0..self.config.jitter_ratio);
        Duration::from_secs_f64(base * (1.0 + jitter))
    }
}

#[async_trait]
impl Agent for RemoteAgentAdapter {
    fn agent_type(&self) -> &str {
        &self.config.agent_type
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata::new(
            format!("{} (remote)", self.config.agent_type),
            "Remote agent reached over the event-polling protocol",
        )
        .with_execution_type(crate::traits::ExecutionType::Remote)
    }

    async fn process(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        if !self.circuit.should_allow_request() {
            return Err(AgentError::CircuitOpen(self.config.agent_type.clone()));
        }

        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_with_jitter(attempt)).await;
            }

            match self.execute_once(request).await {
                Ok(response) => {
                    self.circuit.record_success();
                    return Ok(response);
                }
                Err(e) if Self::is_retryable(&e) => {
                    tracing::warn!(agent_type = %self.config.agent_type, attempt, error = %e, "remote agent attempt failed");
                    last_error = Some(e);
                }
                Err(e) => {
                    self.circuit.record_failure();
                    return Err(e);
                }
            }
        }

        self.circuit.record_failure();
        Err(last_error.unwrap_or_else(|| AgentError::ServerUnavailable(self.config.agent_type.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.should_allow_request());
    }

    #[test]
    fn circuit_recovers_to_half_open_after_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.should_allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn circuit_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.inner.lock().count, 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_allows_only_one_in_flight_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));

        assert!(breaker.should_allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.should_allow_request());
    }
}
