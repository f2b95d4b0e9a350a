//! JSON webhook delivery.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde_json::json;
use tracing::debug;

use vigil_core::config::WebhookConfig;

use crate::error::NotifyError;
use crate::notifier::{BoxFuture, Notifier};

/// POSTs `{"title": .., "body": ..}` to `http://{address}{path}`.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    address: String,
    path: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            address: config.address.clone(),
            path: config.path.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}{}", self.address, self.path)
    }

    async fn post(&self, payload: Vec<u8>) -> Result<(), NotifyError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("POST")
            .uri(self.url())
            .header("host", &self.address)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;
        let status = resp.status();
        // Drain so the connection closes cleanly.
        let _ = resp.into_body().collect().await;

        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify<'a>(
        &'a self,
        title: &'a str,
        html_body: &'a str,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let payload = serde_json::to_vec(&json!({ "title": title, "body": html_body }))
                .map_err(|e| NotifyError::Message(e.to_string()))?;

            match tokio::time::timeout(self.timeout, self.post(payload)).await {
                Ok(result) => {
                    if result.is_ok() {
                        debug!(url = %self.url(), %title, "webhook delivered");
                    }
                    result
                }
                Err(_) => Err(NotifyError::Webhook(format!(
                    "timed out after {:?}",
                    self.timeout
                ))),
            }
        })
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
