//! The notifier seam.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use vigil_core::config::{NotifyBackend, NotifyConfig};

use crate::error::NotifyError;
use crate::smtp::SmtpNotifier;
use crate::webhook::WebhookNotifier;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Delivers a rendered notification. Whether a delivery is retried or
/// deduplicated is the implementation's business.
pub trait Notifier: Send + Sync {
    fn notify<'a>(
        &'a self,
        title: &'a str,
        html_body: &'a str,
    ) -> BoxFuture<'a, Result<(), NotifyError>>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(
        &'a self,
        title: &'a str,
        html_body: &'a str,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            info!(%title, body = %html_body, "notification");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Build the notifier selected by `[notify]`.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    let notifier: Arc<dyn Notifier> = match config.backend {
        NotifyBackend::Log => Arc::new(LogNotifier),
        NotifyBackend::Smtp => {
            let smtp = config
                .smtp
                .as_ref()
                .ok_or_else(|| NotifyError::Message("missing [notify.smtp]".into()))?;
            Arc::new(SmtpNotifier::new(smtp)?)
        }
        NotifyBackend::Webhook => {
            let webhook = config
                .webhook
                .as_ref()
                .ok_or_else(|| NotifyError::Message("missing [notify.webhook]".into()))?;
            Arc::new(WebhookNotifier::new(webhook))
        }
    };
    Ok(notifier)
}

#[cfg(test)]
mod tests {
    use vigil_core::config::{SmtpConfig, WebhookConfig};

    use super::*;

    #[test]
    fn default_backend_is_log() {
        let notifier = from_config(&NotifyConfig::default()).unwrap();
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn builds_configured_backends() {
        let smtp = NotifyConfig {
            backend: NotifyBackend::Smtp,
            smtp: Some(SmtpConfig {
                host: "postfix".to_string(),
                port: 25,
                from: "watchdog@example.org".to_string(),
                to: vec!["ops@example.org".to_string()],
            }),
            webhook: None,
        };
        assert_eq!(from_config(&smtp).unwrap().name(), "smtp");

        let webhook = NotifyConfig {
            backend: NotifyBackend::Webhook,
            smtp: None,
            webhook: Some(WebhookConfig {
                address: "127.0.0.1:8080".to_string(),
                path: "/push".to_string(),
                timeout: "10s".to_string(),
            }),
        };
        assert_eq!(from_config(&webhook).unwrap().name(), "webhook");
    }

    #[test]
    fn missing_section_is_an_error() {
        let config = NotifyConfig {
            backend: NotifyBackend::Smtp,
            ..NotifyConfig::default()
        };
        assert!(from_config(&config).is_err());
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        LogNotifier.notify("title", "<p>body</p>").await.unwrap();
    }
}
