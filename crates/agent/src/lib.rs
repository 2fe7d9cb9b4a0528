//! Agent registry, router, remote-agent adapter, and domain agents for the
//! CKD orchestration core.

pub mod domain;
pub mod error;
pub mod registry;
pub mod remote;
pub mod router;
pub mod traits;

pub use domain::{build_domain_agents, DomainAgent};
pub use error::AgentError;
pub use registry::AgentRegistry;
pub use remote::{RemoteAgentAdapter, RemoteAgentConfig};
pub use router::RouterAgent;
pub use traits::{Agent, AgentMetadata};
