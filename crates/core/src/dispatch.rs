mod queue;

pub use queue::{CommandQueue, JournalEntry, STALE_AFTER, load_journal};

use crate::Command;
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

/// Key under which the booth expects the command token.
pub const KEY_FOR_COMMAND: &str = "cmd";
pub const DEFAULT_TOPIC: &str = "io-photobooth";
pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Delivers a command token to the booth.
///
/// Delivery is best effort. Callers log a failure and move on; a lost command
/// is recovered by the operator at the booth.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, command: Command) -> Result<()>;
}

/// Publishes to a push-messaging topic the booth subscribes to.
pub struct FcmPublisher {
    client: Client,
    endpoint: String,
    server_key: SecretString,
    topic: String,
}

impl FcmPublisher {
    pub fn new(endpoint: String, server_key: SecretString, topic: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            server_key,
            topic,
        }
    }

    fn payload(&self, command: Command) -> serde_json::Value {
        json!({
            "to": format!("/topics/{}", self.topic),
            "data": { KEY_FOR_COMMAND: command.token() }
        })
    }
}

#[async_trait]
impl CommandPublisher for FcmPublisher {
    async fn publish(&self, command: Command) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.server_key.expose_secret()),
            )
            .json(&self.payload(command))
            .send()
            .await
            .with_context(|| format!("Failed to reach push endpoint for '{command}'"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Push endpoint rejected '{command}' with {status}: {body}"
            ));
        }
        Ok(())
    }
}

/// Publishes once and logs the outcome. Never retries, never fails.
pub async fn send_command(publisher: &dyn CommandPublisher, command: Command, topic: &str) {
    match publisher.publish(command).await {
        Ok(()) => tracing::info!(
            "Successfully sent \"{KEY_FOR_COMMAND}: {command}\" to topic {topic}"
        ),
        Err(e) => tracing::error!(
            "Error sending \"{KEY_FOR_COMMAND}: {command}\" to topic {topic}: {e:?}"
        ),
    }
}
