//! Error types for the webhook server and outbound delivery.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The messaging provider rejected a message.
    #[error("Delivery to {recipient} failed: {message}")]
    Delivery { recipient: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    pub fn delivery(recipient: &str, message: impl Into<String>) -> Self {
        Self::Delivery {
            recipient: recipient.to_string(),
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
