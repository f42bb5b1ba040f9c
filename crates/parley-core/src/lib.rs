//! Agent session and tool orchestration for a conversational gateway.
//!
//! Inbound messages are routed to an LLM-driven agent that can call tools
//! advertised by an MCP tool provider running as a child process. Each
//! conversation keeps its own history, and every run ends in a single reply
//! string.
//!
//! - **Tool provider channel** (`tools::rmcp_client`): spawn, handshake,
//!   discovery and invocation over stdio
//! - **Tool registry** (`tools`): one handle per advertised tool with local
//!   argument validation
//! - **Conversation memory** (`memory`): append-only histories per
//!   `ConversationId`
//! - **Reasoning loop** (`agent`): bounded model/tool iterations
//! - **Result extraction** (`outcome`): terminal outcome to reply text
//! - **Lifecycle** (`session`): initialize, process, shutdown

pub mod agent;
pub mod config;
pub mod conversation;
pub mod core_types;
pub mod errors;
pub mod llm;
pub mod memory;
pub mod outcome;
pub mod session;
pub mod tools;

pub use agent::{Agent, AgentConfig};
pub use config::*;
pub use conversation::{BucketPolicy, ConversationId};
pub use errors::AgentError;
pub use llm::LLM;
pub use outcome::{FailureKind, Outcome, ResultExtractor};
pub use session::{AgentSession, LifecycleManager};

#[cfg(test)]
pub mod test_utils;
