//! Mail delivery through a local SMTP relay.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use vigil_core::config::SmtpConfig;

use crate::error::NotifyError;
use crate::notifier::{BoxFuture, Notifier};

/// Sends each notification as an HTML mail. The relay is trusted and
/// reached without TLS, like a postfix container next to the watchdog.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        if config.to.is_empty() {
            return Err(NotifyError::Message("no recipients configured".into()));
        }
        let to = config
            .to
            .iter()
            .map(|a| mailbox(a))
            .collect::<Result<Vec<_>, _>>()?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .build();

        Ok(Self {
            transport,
            from: mailbox(&config.from)?,
            to,
        })
    }

    /// Build the mail for a notification.
    pub fn message(&self, title: &str, html_body: &str) -> Result<Message, NotifyError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(title);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

impl Notifier for SmtpNotifier {
    fn notify<'a>(
        &'a self,
        title: &'a str,
        html_body: &'a str,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let message = self.message(title, html_body)?;
            let response = self
                .transport
                .send(message)
                .await
                .map_err(|e| NotifyError::Smtp(e.to_string()))?;
            debug!(code = %response.code(), %title, "mail accepted by relay");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
