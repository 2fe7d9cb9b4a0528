//! Thin domain-agent adapters: each registers a collection and a system
//! prompt, then delegates retrieval to the hybrid engine and generation to
//! the language model. The actual knowledge-retrieval prompt engineering
//! for each domain is an external concern; this module only wires the
//! uniform contract onto those two collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use ckd_core::{AgentRequest, AgentResponse, MetadataFilter, SourceRef};
use ckd_rag::{to_core_document, AsyncOllamaEmbedder, HybridEngine};

use crate::error::AgentError;
use crate::traits::{Agent, AgentMetadata};

/// One of the five concrete knowledge-backed agents
/// (`nutrition`, `research_paper`, `medical_welfare`, `quiz`,
/// `trend_visualization`), each scoped to its own collection.
pub struct DomainAgent {
    agent_type: String,
    description: String,
    collection: String,
    system_prompt: String,
    result_limit: usize,
    engine: Arc<HybridEngine>,
    embedder: Arc<AsyncOllamaEmbedder>,
    llm: Arc<dyn ckd_core::LanguageModel>,
}

impl DomainAgent {
    pub fn new(
        agent_type: impl Into<String>,
        description: impl Into<String>,
        collection: impl Into<String>,
        system_prompt: impl Into<String>,
        engine: Arc<HybridEngine>,
        embedder: Arc<AsyncOllamaEmbedder>,
        llm: Arc<dyn ckd_core::LanguageModel>,
    ) -> Self {
        Self {
            agent_type: agent_type.into(),
            description: description.into(),
            collection: collection.into(),
            system_prompt: system_prompt.into(),
            result_limit: 5,
            engine,
            embedder,
            llm,
        }
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit;
        self
    }

    fn build_context(&self, results: &[ckd_core::SearchResult]) -> String {
        results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let snippet = r
                    .payload
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                format!("[{}] {}", i + 1, snippet)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn build_sources(&self, results: &[ckd_core::SearchResult]) -> Vec<SourceRef> {
        results
            .iter()
            .map(|r| {
                let document = to_core_document(&self.collection, r);
                SourceRef {
                    title: document
                        .fields
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&document.id)
                        .to_string(),
                    url: document.fields.get("url").and_then(|v| v.as_str()).map(str::to_string),
                    extra: Default::default(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl Agent for DomainAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata::new(&self.agent_type, &self.description)
    }

    fn estimate_context_usage(&self, text: &str) -> u32 {
        self.llm.estimate_tokens(text) as u32
    }

    async fn process(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let embedding = self
            .embedder
            .embed_query(&request.query)
            .await
            .map_err(|e| AgentError::Execution(e.to_string()))?;

        let (results, keyword_status, semantic_status) = self
            .engine
            .search(
                &self.collection,
                &request.query,
                &embedding,
                &MetadataFilter::default(),
                self.result_limit,
            )
            .await
            .map_err(|e| AgentError::Execution(e.to_string()))?;

        tracing::debug!(
            agent_type = %self.agent_type,
            ?keyword_status,
            ?semantic_status,
            result_count = results.len(),
            "domain agent retrieval complete"
        );

        let context = self.build_context(&results);
        let sources = self.build_sources(&results);

        let generate_request = ckd_core::GenerateRequest::new(&self.system_prompt)
            .with_user_message(format!(
                "Context:\n{context}\n\nQuestion: {}",
                request.query
            ))
            .with_temperature(0.3)
            .with_max_tokens(800);

        let generated = self.llm.generate(generate_request).await?;

        let mut response = AgentResponse::success(&self.agent_type, generated.text);
        response.sources = sources.clone();
        response.papers = sources;
        response.tokens_used = generated.usage.map(|u| u.total()).unwrap_or(0);
        Ok(response)
    }
}

/// Builds the five concrete domain agents against one shared hybrid engine,
/// embedder, and language model, each with a distinct collection name and
/// system prompt register.
pub fn build_domain_agents(
    engine: Arc<HybridEngine>,
    embedder: Arc<AsyncOllamaEmbedder>,
    llm: Arc<dyn ckd_core::LanguageModel>,
) -> Vec<Arc<dyn Agent>> {
    let specs: &[(&str, &str, &str, &str)] = &[
        (
            "nutrition",
            "Answers diet and nutrition questions for CKD patients",
            "nutrition",
            "You are a renal dietitian. Answer using only the given context, favoring concrete \
             recommendations about sodium, potassium, phosphorus, and protein intake.",
        ),
        (
            "research_paper",
            "Answers general medical and research questions about CKD",
            "research_paper",
            "You are a nephrology research assistant. Answer using only the given context, citing \
             the relevant stage or study where applicable.",
        ),
        (
            "medical_welfare",
            "Answers questions about welfare programs, subsidies, and hospital services",
            "medical_welfare",
            "You help CKD patients navigate welfare programs, subsidies, and hospital services. \
             Answer using only the given context.",
        ),
        (
            "quiz",
            "Generates and grades CKD knowledge quizzes",
            "quiz",
            "You write short knowledge checks about CKD self-management from the given context \
             and grade the user's answers when given one.",
        ),
        (
            "trend_visualization",
            "Summarizes trends in a patient's CKD-related metrics",
            "trend_visualization",
            "You describe trends in CKD-related lab metrics and statistics from the given context \
             in plain language.",
        ),
    ];

    specs
        .iter()
        .map(|(tag, description, collection, prompt)| {
            Arc::new(DomainAgent::new(
                *tag,
                *description,
                *collection,
                *prompt,
                engine.clone(),
                embedder.clone(),
                llm.clone(),
            )) as Arc<dyn Agent>
        })
        .collect()
}
