use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::NotifierSettings;
use crate::{Error, Result};

/// Human-readable trade notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(&self, subject: &str, body: &str) -> Result<()>;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, subject: &str, body: &str) -> Result<()> {
        tracing::info!("📣 {}: {}", subject, body);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

/// Posts notifications as JSON `{subject, body}` to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::Config("webhook notifier requires a url".to_string()));
        }

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_notification(&self, subject: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { subject, body })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "webhook returned {}: {}",
                status, text
            )));
        }

        tracing::debug!(subject = %subject, "Webhook notification delivered");
        Ok(())
    }
}

/// Send and log the outcome; delivery problems never interrupt trading
pub async fn deliver(notifier: &dyn Notifier, subject: &str, body: &str) {
    if let Err(e) = notifier.send_notification(subject, body).await {
        tracing::warn!("✗ Notification '{}' not delivered: {}", subject, e);
    }
}

pub fn build(settings: &NotifierSettings) -> Result<Arc<dyn Notifier>> {
    match settings {
        NotifierSettings::Log => Ok(Arc::new(LogNotifier)),
        NotifierSettings::Webhook { url } => Ok(Arc::new(WebhookNotifier::new(url.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::Json(serde_json::json!({
                "subject": "BTCUSDT BUY",
                "body": "Bought at 100"
            })))
            .with_status(204)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        notifier
            .send_notification("BTCUSDT BUY", "Bought at 100")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        let err = notifier.send_notification("s", "b").await.unwrap_err();
        assert!(matches!(err, Error::Notification(_)));
    }

    #[test]
    fn test_webhook_requires_url() {
        assert!(WebhookNotifier::new("").is_err());
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        tokio_test::assert_ok!(LogNotifier.send_notification("subject", "body").await);
    }
}
