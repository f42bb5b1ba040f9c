//! LLM provider implementations
//!
//! OpenAI and OpenAI-compatible endpoints share one client; custom providers
//! only change the base URL.

use std::sync::Arc;

use crate::config::{LlmConfig, LlmProvider};
use crate::errors::AgentError;
use crate::llm::LLM;

pub mod openai;

/// Create an LLM client based on the provider configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    match &config.provider {
        LlmProvider::OpenAI => openai::create_client(config),
        LlmProvider::Custom { base_url } => openai::create_custom_client(config, base_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmAuth, ModelParameters};

    fn llm_config(provider: LlmProvider, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            model: "gpt-4o".to_string(),
            parameters: ModelParameters::default(),
            auth: LlmAuth {
                api_key: api_key.map(str::to_string),
                api_key_env: Some("PARLEY_PROVIDER_TEST_UNSET_KEY".to_string()),
            },
        }
    }

    #[test]
    fn test_create_client_requires_api_key() {
        let result = create_llm_client(&llm_config(LlmProvider::OpenAI, None));
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_create_clients_with_key() {
        assert!(create_llm_client(&llm_config(LlmProvider::OpenAI, Some("sk-test"))).is_ok());
        let custom = LlmProvider::Custom {
            base_url: "http://localhost:9000/v1".to_string(),
        };
        assert!(create_llm_client(&llm_config(custom, Some("sk-test"))).is_ok());
    }
}
