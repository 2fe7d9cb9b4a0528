//! HTTP API server for the CKD question-answering agent.

pub mod error;
pub mod http;
pub mod metrics;
pub mod policy;
pub mod session;
pub mod state;
pub mod streams;

pub use error::{ServerError, ServerResult};
pub use http::create_router;
pub use metrics::init_metrics;
pub use policy::SessionPolicy;
pub use session::SessionManager;
pub use state::AppState;
pub use streams::StreamRegistry;
