//! Messenger trait and the built-in backends.
//!
//! The messaging plane proper (Telegram, Slack, ...) lives outside this
//! system; it plugs in through [`Messenger`]. Two reference backends ship
//! here: [`LogMessenger`], which writes prompts to the log and never
//! receives, and [`WebhookMessenger`], which POSTs prompts to an HTTP
//! endpoint.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use conductor_types::AuthTarget;

/// Errors from messenger operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Api(String),

    #[error("{0}")]
    Other(String),
}

/// A message received from the operator through a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Backend name the message arrived on.
    pub channel: String,
    /// Sender identity within that backend.
    pub from: String,
    pub text: String,
}

/// Trait for a bidirectional operator messaging backend.
///
/// Outbound prompts are sent via [`send`]; inbound operator replies are
/// collected via [`poll_inbound`]. Backends without an inbound path keep the
/// default implementation, which never returns messages.
///
/// [`send`]: Messenger::send
/// [`poll_inbound`]: Messenger::poll_inbound
#[async_trait]
pub trait Messenger: Send {
    /// Backend name; targets are routed by matching their `channel` field
    /// against this.
    fn name(&self) -> &str;

    /// Deliver a formatted message to one target.
    async fn send(&self, target: &AuthTarget, text: &str) -> Result<(), ChannelError>;

    /// Collect any operator replies that arrived since the last poll.
    async fn poll_inbound(&mut self) -> Result<Vec<InboundMessage>, ChannelError> {
        Ok(Vec::new())
    }
}

/// Log-only messenger: prompts go to the tracing log, replies never come.
///
/// Used when no real messaging adapter is configured, so the rest of the
/// loop (timers included) behaves identically with or without one.
#[derive(Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, target: &AuthTarget, text: &str) -> Result<(), ChannelError> {
        info!(to = %target.to, "operator message:\n{text}");
        Ok(())
    }
}

/// Webhook messenger: POSTs each message as JSON to the target address.
///
/// The target's `to` field is the endpoint URL. There is no inbound path;
/// deployments that want webhook replies pair this with the gateway RPC
/// facade instead.
pub struct WebhookMessenger {
    client: reqwest::Client,
    auth_header: Option<String>,
}

impl WebhookMessenger {
    pub fn new(auth_header: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_header,
        }
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, target: &AuthTarget, text: &str) -> Result<(), ChannelError> {
        let payload = serde_json::json!({
            "to": target.to,
            "account_id": target.account_id,
            "thread_id": target.thread_id,
            "text": text,
        });

        let mut req = self.client.post(&target.to).json(&payload);
        if let Some(auth) = &self.auth_header {
            req = req.header("Authorization", auth);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(ChannelError::Api(format!(
                "webhook {} returned {}",
                target.to,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> AuthTarget {
        AuthTarget {
            channel: "log".into(),
            to: "operator".into(),
            account_id: None,
            thread_id: None,
        }
    }

    #[tokio::test]
    async fn log_messenger_always_delivers() {
        let messenger = LogMessenger;
        assert_eq!(messenger.name(), "log");
        messenger.send(&target(), "hello operator").await.unwrap();
    }

    #[tokio::test]
    async fn default_inbound_is_empty() {
        let mut messenger = LogMessenger;
        assert!(messenger.poll_inbound().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn webhook_send_to_unreachable_endpoint_errors() {
        let messenger = WebhookMessenger::new(None);
        let target = AuthTarget {
            channel: "webhook".into(),
            to: "http://127.0.0.1:1/conductor".into(),
            account_id: None,
            thread_id: None,
        };
        assert!(messenger.send(&target, "ping").await.is_err());
    }
}
