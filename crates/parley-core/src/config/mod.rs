//! Configuration module
//!
//! YAML configuration for the agent session: model, tool provider command,
//! loop bounds, memory retention and conversation bucketing.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

use crate::errors::AgentError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<ParleyConfig, AgentError> {
    ConfigLoader::from_file(path).await
}
