//! Prompt construction for the router's two LLM calls: intent
//! classification and multi-agent answer synthesis.

use std::fmt;

use serde::{Deserialize, Serialize};

use ckd_core::{GenerateRequest, Message as CoreMessage, Role as CoreRole};

/// Message role, mirrored from `ckd_core` for the backend's own wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Fixed classification vocabulary the classifier prompt asks the model to
/// choose from. Mapping onto implementation agent tags is the router's job
/// (`ckd-agent`); this module only builds the prompt and parses the reply.
pub const INTENT_TAGS: &[&str] = &[
    "medical_info",
    "diet_info",
    "health_record",
    "welfare_info",
    "research",
    "learning",
    "policy",
    "chit_chat",
    "non_medical",
    "illegal_request",
];

const CLASSIFIER_SYSTEM_PROMPT: &str = "You classify a user's question into one or more of a fixed set of intents. \
Respond with a single JSON object of the form \
{\"intents\": [tag, ...], \"confidence\": 0..1, \"is_emergency\": bool, \"reasoning\": \"...\"} \
and nothing else. Valid tags are: medical_info, diet_info, health_record, welfare_info, \
research, learning, policy, chit_chat, non_medical, illegal_request.";

/// Builds the classifier call's [`GenerateRequest`].
pub fn classifier_request(query: &str, max_tokens: u32) -> GenerateRequest {
    GenerateRequest::new(CLASSIFIER_SYSTEM_PROMPT)
        .with_user_message(query)
        .with_temperature(0.0)
        .with_max_tokens(max_tokens)
}

/// Parsed classifier output, before alias-mapping onto agent tags.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierOutput {
    pub intents: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub is_emergency: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Parses the classifier's JSON reply. Tolerates a model that wraps the
/// object in a code fence or surrounding prose by scanning for the first
/// `{...}` span.
pub fn parse_classifier_output(text: &str) -> Option<ClassifierOutput> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &text[start..=end];
    let parsed: ClassifierOutput = serde_json::from_str(candidate).ok()?;
    if parsed.intents.is_empty() {
        return None;
    }
    Some(parsed)
}

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are combining answers from several specialized assistants into one \
coherent reply to the user's original question. Produce a single consolidated answer. \
Do not mention the assistants, agents, or sources by name, and do not describe the process \
of combining them.";

/// Builds the synthesis call's [`GenerateRequest`] from the original query
/// and each successful agent's answer.
pub fn synthesis_request(query: &str, agent_answers: &[(String, String)], max_tokens: u32) -> GenerateRequest {
    let mut body = format!("Original question: {query}\n\nAnswers to combine:\n");
    for (agent, answer) in agent_answers {
        body.push_str(&format!("\n[{agent}]\n{answer}\n"));
    }

    GenerateRequest::new(SYNTHESIS_SYSTEM_PROMPT)
        .with_user_message(body)
        .with_temperature(0.3)
        .with_max_tokens(max_tokens)
}

/// Concatenation fallback used when the synthesis LLM call itself fails.
pub fn concatenate_fallback(agent_answers: &[(String, String)]) -> String {
    agent_answers
        .iter()
        .map(|(_, answer)| answer.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl From<&Message> for CoreMessage {
    fn from(msg: &Message) -> Self {
        CoreMessage {
            role: match msg.role {
                Role::System => CoreRole::System,
                Role::User => CoreRole::User,
                Role::Assistant => CoreRole::Assistant,
                Role::Tool => CoreRole::Tool,
            },
            content: msg.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classifier_json_with_surrounding_prose() {
        let text = "Sure, here you go:\n{\"intents\": [\"diet_info\"], \"confidence\": 0.9, \"is_emergency\": false, \"reasoning\": \"about food\"}\nlet me know if that helps";
        let parsed = parse_classifier_output(text).unwrap();
        assert_eq!(parsed.intents, vec!["diet_info"]);
        assert!((parsed.confidence - 0.9).abs() < 1e-6);
        assert!(!parsed.is_emergency);
    }

    #[test]
    fn rejects_empty_intent_list() {
        let text = "{\"intents\": [], \"confidence\": 0.5, \"is_emergency\": false, \"reasoning\": \"\"}";
        assert!(parse_classifier_output(text).is_none());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(parse_classifier_output("not json at all").is_none());
    }

    #[test]
    fn concatenation_fallback_joins_answers() {
        let answers = vec![
            ("nutrition".to_string(), "Eat less salt.".to_string()),
            ("research_paper".to_string(), "Stage 3 CKD requires monitoring.".to_string()),
        ];
        let joined = concatenate_fallback(&answers);
        assert!(joined.contains("Eat less salt."));
        assert!(joined.contains("Stage 3 CKD"));
    }
}
