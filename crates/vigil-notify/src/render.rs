//! Alert → `(title, html_body)`.

use vigil_core::{Alert, AlertKind, Origin, Policy};

/// Renders alerts with the local hostname so a reader knows which
/// watchdog is speaking.
#[derive(Debug, Clone)]
pub struct Renderer {
    hostname: String,
}

impl Renderer {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn render(&self, alert: &Alert) -> (String, String) {
        let (headline, lead) = match (alert.kind, alert.origin) {
            (AlertKind::Down, Origin::Server) => ("server warning", "a server problem"),
            (AlertKind::Recovered, Origin::Server) => ("server back up", "a server recovery"),
            (AlertKind::Down, Origin::Device) if alert.policy == Some(Policy::SlidingHeartbeat) => {
                ("device inactive", "an inactive device")
            }
            (AlertKind::Down, Origin::Device) => ("device down", "a device problem"),
            (AlertKind::Recovered, Origin::Device) => ("device back up", "a device recovery"),
            (AlertKind::Info, _) => ("device event", "a device event"),
        };

        let title = format!("Watchdog {headline} {} ({})", alert.entity, self.hostname);
        let body = format!(
            "<p>Watchdog on {} detected {lead}:</p><p><pre>{}</pre></p>",
            escape(&self.hostname),
            escape(&alert.detail)
        );
        (title, body)
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
