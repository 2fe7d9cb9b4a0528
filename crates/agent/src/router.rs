//! The router agent: intent classification, concurrent multi-agent
//! dispatch, and answer synthesis.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ckd_core::{AgentChunk, AgentRequest, AgentResponse, ChunkStatus, LanguageModel};
use ckd_llm::{classifier_request, concatenate_fallback, parse_classifier_output, synthesis_request};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::registry::AgentRegistry;
use crate::traits::{Agent, AgentMetadata};

/// Emergency phrases that short-circuit classification straight to the
/// medical-information agent, regardless of what the classifier would say.
const EMERGENCY_KEYWORDS: &[&str] = &[
    "chest pain",
    "can't breathe",
    "cannot breathe",
    "severe bleeding",
    "unconscious",
    "suicide",
    "seizure",
    "anuria",
    "no urine output",
];

fn is_emergency_query(query: &str) -> bool {
    let lowered = query.to_lowercase();
    EMERGENCY_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

const EMERGENCY_ROUTE: &str = "research_paper";
const DEFAULT_ROUTE: &str = "research_paper";

/// Maps the classifier's fixed intent vocabulary onto implementation agent
/// tags. Several intents deliberately collapse onto the same agent.
fn map_intent_to_agent(intent: &str) -> Option<&'static str> {
    match intent {
        "medical_info" => Some("research_paper"),
        "diet_info" => Some("nutrition"),
        "health_record" => Some("research_paper"),
        "welfare_info" => Some("medical_welfare"),
        "research" => Some("research_paper"),
        "learning" => Some("quiz"),
        "policy" => Some("research_paper"),
        "chit_chat" => Some("research_paper"),
        "non_medical" => Some("research_paper"),
        "illegal_request" => Some("research_paper"),
        _ => None,
    }
}

/// Deterministic keyword fallback, used when the classifier call fails or
/// returns something unusable.
fn rule_based_intent(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let table: &[(&str, &[&str])] = &[
        ("medical_welfare", &["welfare", "subsidy", "insurance", "hospital", "dialysis center", "application"]),
        ("research_paper", &["symptom", "research", "paper", "stage", "ckd", "treatment", "medication", "test"]),
        ("nutrition", &["food", "diet", "nutrition", "meal", "potassium", "sodium", "recipe"]),
        ("quiz", &["quiz", "test", "score", "learn", "practice"]),
        ("trend_visualization", &["trend", "graph", "statistics", "chart", "compare"]),
    ];

    let mut selected: Vec<String> = Vec::new();
    for (agent, keywords) in table {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            selected.push(agent.to_string());
        }
    }

    if selected.is_empty() {
        selected.push(DEFAULT_ROUTE.to_string());
    }
    selected
}

pub struct RouterAgent {
    registry: Arc<AgentRegistry>,
    llm: Arc<dyn LanguageModel>,
    classifier_max_tokens: u32,
    synthesis_max_tokens: u32,
    synthesis_overhead_tokens: u32,
}

impl RouterAgent {
    pub fn new(
        registry: Arc<AgentRegistry>,
        llm: Arc<dyn LanguageModel>,
        classifier_max_tokens: u32,
        synthesis_overhead_tokens: u32,
    ) -> Self {
        Self {
            registry,
            llm,
            classifier_max_tokens,
            synthesis_max_tokens: 800,
            synthesis_overhead_tokens,
        }
    }

    async fn classify_intent(&self, query: &str) -> Vec<String> {
        if is_emergency_query(query) {
            tracing::warn!(query, "emergency phrase detected, forcing emergency route");
            return vec![EMERGENCY_ROUTE.to_string()];
        }

        let request = classifier_request(query, self.classifier_max_tokens);
        let reply = match self.llm.generate(request).await {
            Ok(response) => response.text,
            Err(err) => {
                tracing::warn!(error = %err, "classifier LLM call failed, using keyword fallback");
                return rule_based_intent(query);
            }
        };

        let Some(parsed) = parse_classifier_output(&reply) else {
            tracing::warn!("classifier response was not usable JSON, using keyword fallback");
            return rule_based_intent(query);
        };

        if parsed.is_emergency {
            tracing::warn!(query, "classifier set is_emergency flag");
            return vec![EMERGENCY_ROUTE.to_string()];
        }

        let mut agents = Vec::new();
        for intent in &parsed.intents {
            if let Some(agent) = map_intent_to_agent(intent) {
                if !agents.contains(&agent.to_string()) {
                    agents.push(agent.to_string());
                }
            }
        }

        if agents.is_empty() {
            tracing::warn!("no intents mapped to a known agent, using keyword fallback");
            return rule_based_intent(query);
        }

        agents
    }

    async fn synthesize(&self, query: &str, answers: &[(String, String)]) -> String {
        let request = synthesis_request(query, answers, self.synthesis_max_tokens);
        match self.llm.generate(request).await {
            Ok(response) => response.text,
            Err(err) => {
                tracing::warn!(error = %err, "synthesis LLM call failed, concatenating answers");
                concatenate_fallback(answers)
            }
        }
    }

    async fn dispatch_single(&self, agent_type: &str, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let agent = self.registry.get(agent_type)?;
        let mut response = agent.process(request).await?;
        response.metadata.insert(
            "routed_to".to_string(),
            json!([agent_type]),
        );
        response.metadata.insert("synthesis".to_string(), json!(false));
        response.metadata.insert(
            "individual_responses".to_string(),
            json!({ agent_type: response.answer.clone() }),
        );
        Ok(response)
    }

    async fn dispatch_many(
        &self,
        targets: &[String],
        request: &AgentRequest,
    ) -> Result<AgentResponse, AgentError> {
        let calls = targets.iter().map(|agent_type| {
            let registry = self.registry.clone();
            let agent_type = agent_type.clone();
            let request = request.clone();
            async move {
                let agent = registry.get(&agent_type)?;
                agent.process(&request).await.map(|resp| (agent_type, resp))
            }
        });

        let results: Vec<Result<(String, AgentResponse), AgentError>> =
            futures::future::join_all(calls).await;

        let mut succeeded: HashMap<String, AgentResponse> = HashMap::new();
        for result in results {
            match result {
                Ok((agent_type, response)) => {
                    succeeded.insert(agent_type, response);
                }
                Err(err) => tracing::error!(error = %err, "agent dispatch failed"),
            }
        }

        if succeeded.is_empty() {
            return Ok(AgentResponse::error(
                "router",
                "None of the requested specialists could answer this question.",
                "all_agents_failed",
            ));
        }

        let mut total_tokens = 0u32;
        let mut all_sources = Vec::new();
        let mut all_papers = Vec::new();
        let mut answers: Vec<(String, String)> = Vec::new();
        let mut individual_responses = serde_json::Map::new();

        for agent_type in targets {
            if let Some(response) = succeeded.get(agent_type) {
                total_tokens += response.tokens_used;
                all_sources.extend(response.sources.clone());
                all_papers.extend(response.papers.clone());
                answers.push((agent_type.clone(), response.answer.clone()));
                individual_responses.insert(agent_type.clone(), json!(response.answer));
            }
        }

        let final_answer = self.synthesize(&request.query, &answers).await;

        let mut response = AgentResponse::success("router", final_answer);
        response.sources = all_sources;
        response.papers = all_papers;
        response.tokens_used = total_tokens + self.synthesis_overhead_tokens;
        response.metadata.insert("routed_to".to_string(), json!(targets));
        response.metadata.insert("synthesis".to_string(), json!(true));
        response
            .metadata
            .insert("individual_responses".to_string(), serde_json::Value::Object(individual_responses));
        Ok(response)
    }
}

#[async_trait]
impl Agent for RouterAgent {
    fn agent_type(&self) -> &str {
        "router"
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata::new(
            "Router Agent",
            "Classifies intent, dispatches to specialized agents, and synthesizes the final answer",
        )
        .with_capabilities(vec![
            "intent_classification".to_string(),
            "multi_agent_orchestration".to_string(),
            "answer_synthesis".to_string(),
        ])
    }

    fn estimate_context_usage(&self, text: &str) -> u32 {
        self.llm.estimate_tokens(text) as u32
    }

    async fn process(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let targets = match request.target_agent() {
            Some(tag) => {
                tracing::info!(target_agent = tag, "forced routing via target_agent override");
                vec![tag.to_string()]
            }
            None => self.classify_intent(&request.query).await,
        };

        tracing::info!(?targets, "router dispatching");

        if targets.len() == 1 {
            self.dispatch_single(&targets[0], request).await
        } else {
            self.dispatch_many(&targets, request).await
        }
    }

    async fn process_stream(&self, request: &AgentRequest) -> Result<mpsc::Receiver<AgentChunk>, AgentError> {
        let targets = match request.target_agent() {
            Some(tag) => vec![tag.to_string()],
            None => self.classify_intent(&request.query).await,
        };

        if targets.len() == 1 {
            let agent = self.registry.get(&targets[0])?;
            return agent.process_stream(request).await;
        }

        let (tx, rx) = mpsc::channel(16);
        let registry = self.registry.clone();
        let request = request.clone();
        let synthesis_overhead_tokens = self.synthesis_overhead_tokens;
        let llm = self.llm.clone();

        tokio::spawn(async move {
            let _ = tx
                .send(AgentChunk::new(
                    format!("Consulting {} specialists...", targets.len()),
                    ChunkStatus::Processing,
                    "router",
                ))
                .await;

            // FuturesUnordered so a `Partial` chunk goes out as soon as any one
            // agent finishes, instead of waiting on the slowest of the batch.
            let mut calls = FuturesUnordered::new();
            for agent_type in &targets {
                let registry = registry.clone();
                let agent_type = agent_type.clone();
                let request = request.clone();
                calls.push(async move {
                    let agent = registry.get(&agent_type)?;
                    agent.process(&request).await.map(|resp| (agent_type, resp))
                });
            }

            let mut answers = Vec::new();
            let mut total_tokens = 0u32;
            while let Some(result) = calls.next().await {
                match result {
                    Ok((agent_type, response)) => {
                        let _ = tx
                            .send(AgentChunk::new(response.answer.clone(), ChunkStatus::Partial, agent_type.as_str()))
                            .await;
                        total_tokens += response.tokens_used;
                        answers.push((agent_type, response.answer));
                    }
                    Err(err) => tracing::error!(error = %err, "streamed agent dispatch failed"),
                }
            }

            if answers.is_empty() {
                let _ = tx
                    .send(AgentChunk::new(
                        "None of the requested specialists could answer this question.",
                        ChunkStatus::Error,
                        "router",
                    ))
                    .await;
                return;
            }

            let _ = tx
                .send(AgentChunk::new("Combining answers...", ChunkStatus::Synthesizing, "router"))
                .await;

            let synthesis_request_body = synthesis_request(&request.query, &answers, 800);
            let final_answer = match llm.generate(synthesis_request_body).await {
                Ok(response) => response.text,
                Err(_) => concatenate_fallback(&answers),
            };
            let _ = total_tokens; // charged to the non-streaming AgentResponse path only

            let _ = tx.send(AgentChunk::new(final_answer, ChunkStatus::Complete, "router")).await;
            let _ = synthesis_overhead_tokens;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_keywords_are_detected() {
        assert!(is_emergency_query("I have severe bleeding and chest pain"));
        assert!(!is_emergency_query("what should I eat for dinner"));
    }

    #[test]
    fn rule_based_intent_falls_back_to_default() {
        assert_eq!(rule_based_intent("asdkjasdkj"), vec![DEFAULT_ROUTE.to_string()]);
    }

    #[test]
    fn rule_based_intent_matches_nutrition_keywords() {
        let agents = rule_based_intent("what diet is good for potassium control");
        assert!(agents.contains(&"nutrition".to_string()));
    }

    #[test]
    fn intent_mapping_collapses_onto_known_tags() {
        assert_eq!(map_intent_to_agent("diet_info"), Some("nutrition"));
        assert_eq!(map_intent_to_agent("welfare_info"), Some("medical_welfare"));
        assert_eq!(map_intent_to_agent("unknown_tag"), None);
    }
}
