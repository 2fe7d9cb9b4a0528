//! Shared types and traits for the CKD agent core.
//!
//! This crate carries no behavior of its own — it is the seam every other
//! crate in the workspace agrees on: the uniform agent request/response
//! contract, session/token-ledger data shapes, the retrieval-layer store
//! traits, and the language-model trait.

pub mod contract;
pub mod error;
pub mod llm;
pub mod remote;
pub mod retrieval;
pub mod session;

pub use contract::{
    context_keys, AgentChunk, AgentRequest, AgentResponse, AgentStatus, ChunkStatus, Profile,
    SourceRef,
};
pub use error::{CoreError, Result};
pub use llm::{
    FinishReason, GenerateRequest, GenerateResponse, LanguageModel, Message, Role, StreamChunk,
    TokenUsage, ToolCall, ToolDefinition,
};
pub use remote::{CircuitState, RemoteAgentState, RemoteEvent};
pub use retrieval::{
    Document, DocumentStore, FilterOp, LiteratureApi, MetadataFilter, SearchResult, SearchStatus,
    VectorMatch, VectorPoint, VectorStore,
};
pub use session::{ConversationEntry, LimitCheck, Session, TokenLedger};
