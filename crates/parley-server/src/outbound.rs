//! Outbound message delivery.

use async_trait::async_trait;

use crate::error::{Result, ServerError};

/// Largest body the WhatsApp channel accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 1600;

pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

const WHATSAPP_PREFIX: &str = "whatsapp:";

#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Deliver `text` to `recipient`, splitting it if the channel needs to.
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Sends replies through the Twilio Messages API.
pub struct TwilioTransport {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

impl TwilioTransport {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            api_base: DEFAULT_TWILIO_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN` and
    /// `TWILIO_WHATSAPP_NUMBER`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ServerError::config_error(format!("{} is not set", name)))
        };
        Ok(Self::new(
            var("TWILIO_ACCOUNT_SID")?,
            var("TWILIO_AUTH_TOKEN")?,
            var("TWILIO_WHATSAPP_NUMBER")?,
        ))
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }

    /// The sender address must use the same channel prefix as the recipient.
    fn from_address(&self, recipient: &str) -> String {
        if recipient.starts_with(WHATSAPP_PREFIX) && !self.from_number.starts_with(WHATSAPP_PREFIX) {
            format!("{}{}", WHATSAPP_PREFIX, self.from_number)
        } else {
            self.from_number.clone()
        }
    }
}

#[async_trait]
impl OutboundTransport for TwilioTransport {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        let from = self.from_address(recipient);
        let url = self.messages_url();

        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let response = self
                .client
                .post(&url)
                .basic_auth(&self.account_sid, Some(&self.auth_token))
                .form(&[("From", from.as_str()), ("To", recipient), ("Body", chunk.as_str())])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ServerError::delivery(
                    recipient,
                    format!("status {}: {}", status, body),
                ));
            }
            log::debug!("Delivered {} chars to {}", chunk.chars().count(), recipient);
        }
        Ok(())
    }
}

/// Writes replies to the log instead of sending them.
#[derive(Default)]
pub struct LogTransport;

#[async_trait]
impl OutboundTransport for LogTransport {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        log::info!("Reply to {}: {}", recipient, text);
        Ok(())
    }
}

/// Split `text` into chunks of at most `limit` characters, preferring to break
/// after a newline or space.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..hard_end];
        let end = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .filter(|&i| i > 0 && i < hard_end)
            .unwrap_or(hard_end);

        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Form, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(split_message("hello", 1600), vec!["hello".to_string()]);
        assert_eq!(split_message("", 1600), vec![String::new()]);
    }

    #[test]
    fn test_long_message_splits_within_limit() {
        let text = "word ".repeat(700);
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks.concat(), text);
        // breaks land after a space
        assert!(chunks[0].ends_with(' '));
    }

    #[test]
    fn test_prefers_newline_breaks() {
        let text = "aaaa bbbb\ncccc dddd";
        let chunks = split_message(text, 12);
        assert_eq!(chunks, vec!["aaaa bbbb\n".to_string(), "cccc dddd".to_string()]);
    }

    #[test]
    fn test_unbroken_text_splits_on_char_boundaries() {
        let text = "é".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks[2].chars().count(), 5);
    }

    #[test]
    fn test_from_address_matches_recipient_channel() {
        let transport = TwilioTransport::new("AC123", "secret", "+14155238886");
        assert_eq!(transport.from_address("whatsapp:+15551234567"), "whatsapp:+14155238886");
        assert_eq!(transport.from_address("+15551234567"), "+14155238886");

        let prefixed = TwilioTransport::new("AC123", "secret", "whatsapp:+14155238886");
        assert_eq!(prefixed.from_address("whatsapp:+15551234567"), "whatsapp:+14155238886");
    }

    type Captured = Arc<Mutex<Vec<(String, Option<String>, HashMap<String, String>)>>>;

    async fn start_mock_twilio(status: u16) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/2010-04-01/Accounts/{sid}/Messages.json",
                post(
                    move |State(captured): State<Captured>,
                          Path(sid): Path<String>,
                          headers: HeaderMap,
                          Form(form): Form<HashMap<String, String>>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        captured.lock().unwrap().push((sid, auth, form));
                        axum::http::StatusCode::from_u16(status).unwrap()
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    #[tokio::test]
    async fn test_twilio_transport_posts_each_chunk() {
        let (base, captured) = start_mock_twilio(201).await;
        let transport =
            TwilioTransport::new("AC123", "secret", "+14155238886").with_api_base(format!("{}/", base));

        let text = "line\n".repeat(400);
        transport.send("whatsapp:+15551234567", &text).await.unwrap();

        let requests = captured.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        let (sid, auth, form) = &requests[0];
        assert_eq!(sid, "AC123");
        assert!(auth.as_deref().unwrap().starts_with("Basic "));
        assert_eq!(form["To"], "whatsapp:+15551234567");
        assert_eq!(form["From"], "whatsapp:+14155238886");
        let rebuilt: String = requests.iter().map(|(_, _, f)| f["Body"].clone()).collect();
        assert_eq!(rebuilt, text);
    }

    #[tokio::test]
    async fn test_twilio_rejection_is_delivery_error() {
        let (base, _captured) = start_mock_twilio(401).await;
        let transport = TwilioTransport::new("AC123", "wrong", "+14155238886").with_api_base(base);

        let err = transport.send("whatsapp:+15551234567", "hi").await.unwrap_err();
        assert!(matches!(err, ServerError::Delivery { .. }));
    }

    #[test]
    fn test_from_env_requires_credentials() {
        std::env::remove_var("TWILIO_ACCOUNT_SID");
        let err = TwilioTransport::from_env().err().unwrap();
        assert!(matches!(err, ServerError::Config(ref msg) if msg.contains("TWILIO_ACCOUNT_SID")));
    }

    #[tokio::test]
    async fn test_log_transport_accepts_everything() {
        assert!(LogTransport.send("+15551234567", "hello").await.is_ok());
    }
}
