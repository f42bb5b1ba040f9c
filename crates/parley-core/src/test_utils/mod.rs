pub mod mock_llm_server;
pub mod mocks;
