//! Configuration loader for YAML files and environment resolution
//!
//! This module handles loading configuration from YAML files and resolving
//! environment variables, credentials and tool provider environment references.

use crate::config::types::*;
use crate::errors::AgentError;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use tokio::fs;

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<ParleyConfig, AgentError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content, path.parent()).await
    }

    /// Load configuration from a YAML string. Relative env file paths are
    /// resolved against `base_dir` when one is given.
    pub async fn from_str(
        content: &str,
        base_dir: Option<&Path>,
    ) -> Result<ParleyConfig, AgentError> {
        let mut config: ParleyConfig = serde_yaml::from_str(content)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        Self::resolve_environment(&mut config, base_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Resolve environment variables in the configuration
    fn resolve_environment(
        config: &mut ParleyConfig,
        base_dir: Option<&Path>,
    ) -> Result<(), AgentError> {
        for env_file in &config.environment.env_files {
            let path = match base_dir {
                Some(dir) if env_file.is_relative() => dir.join(env_file),
                _ => env_file.clone(),
            };
            if path.exists() {
                log::info!("Loading environment file: {}", path.display());
                Self::load_env_file(&path)?;
            } else {
                log::debug!("Environment file {} not found, skipping", path.display());
            }
        }

        for (key, value) in &config.environment.variables {
            env::set_var(key, value);
        }

        Self::resolve_llm_auth(&mut config.llm.auth);
        Self::resolve_mcp_env(&mut config.tool_provider.command.env);

        Ok(())
    }

    /// Load environment variables from a .env file
    fn load_env_file<P: AsRef<Path>>(path: P) -> Result<(), AgentError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read env file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                env::set_var(key, value);
            }
        }

        Ok(())
    }

    /// Resolve LLM authentication from environment
    fn resolve_llm_auth(auth: &mut LlmAuth) {
        if auth.api_key.is_some() {
            return;
        }
        if let Some(env_var) = &auth.api_key_env {
            if let Ok(api_key) = env::var(env_var) {
                auth.api_key = Some(api_key);
            }
        }
    }

    /// Values of the form `$NAME` are replaced by the process environment.
    fn resolve_mcp_env(env_vars: &mut HashMap<String, String>) {
        for value in env_vars.values_mut() {
            if let Some(name) = value.strip_prefix('$') {
                if let Ok(resolved) = env::var(name) {
                    *value = resolved;
                }
            }
        }
    }
}
