//! vigil-notify: delivering alerts to humans.
//!
//! The debounce engine only produces [`Alert`](vigil_core::Alert)s. The
//! [`AlertDispatcher`] task renders each one into a `(title, html_body)`
//! pair and hands it to the configured [`Notifier`]. Delivery failures are
//! logged and dropped; the engine's state already reflects the detection.

pub mod dispatcher;
pub mod error;
pub mod notifier;
pub mod render;
pub mod smtp;
pub mod webhook;

pub use dispatcher::AlertDispatcher;
pub use error::NotifyError;
pub use notifier::{BoxFuture, LogNotifier, Notifier, from_config};
pub use render::Renderer;
pub use smtp::SmtpNotifier;
pub use webhook::WebhookNotifier;
