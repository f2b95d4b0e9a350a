//! Alert dispatcher: the task between the engine and the notifier.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use vigil_core::Alert;

use crate::error::NotifyError;
use crate::notifier::Notifier;
use crate::render::Renderer;

/// Renders alerts and delivers them one at a time.
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    renderer: Renderer,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, renderer: Renderer) -> Self {
        Self { notifier, renderer }
    }

    /// Render and deliver a single alert.
    pub async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        let (title, body) = self.renderer.render(alert);
        info!(
            entity = %alert.entity,
            kind = ?alert.kind,
            backend = self.notifier.name(),
            %title,
            "sending notification"
        );
        self.notifier.notify(&title, &body).await
    }

    /// Deliver until the sending side closes. Failures are logged and the
    /// alert is dropped.
    pub async fn run(self, mut alerts: mpsc::UnboundedReceiver<Alert>) -> usize {
        let mut delivered = 0;
        while let Some(alert) = alerts.recv().await {
            match self.deliver(&alert).await {
                Ok(()) => delivered += 1,
                Err(e) => error!(entity = %alert.entity, error = %e, "notification failed"),
            }
        }
        debug!(delivered, "alert dispatcher drained");
        delivered
    }
}
