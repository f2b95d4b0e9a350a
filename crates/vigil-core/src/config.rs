//! vigil.toml configuration parser.
//!
//! Every section has defaults, so an empty file yields a watchdog that
//! serves `/health`, polls nobody, and logs alerts instead of mailing them.
//! Durations are kept as strings in the file model and parsed on access;
//! [`VigilConfig::validate`] checks them all once at startup.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// This machine's name; falls back to /etc/hostname, then `$HOSTNAME`.
    pub hostname: Option<String>,
    pub server: ServerConfig,
    pub poller: PollerConfig,
    pub timeouts: TimeoutsConfig,
    pub notify: NotifyConfig,
    /// Message bus monitoring; disabled when absent.
    pub bus: Option<BusConfig>,
}

// ── Health endpoint ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 31038 }
    }
}

// ── Peer poller ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub hosts: Vec<String>,
    /// `host:port` to probe; `{host}` is replaced by the host name.
    pub address_template: String,
    pub path: String,
    /// Name a peer's watchdog runs under; a host whose self-name equals our
    /// hostname is skipped.
    pub self_template: String,
    pub interval: String,
    pub attempt_timeout: String,
    pub attempts: u32,
    pub retry_delay: String,
    pub down_after: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            address_template: "{host}:31038".to_string(),
            path: "/health".to_string(),
            self_template: "{host}-watchdog".to_string(),
            interval: "60s".to_string(),
            attempt_timeout: "5s".to_string(),
            attempts: 3,
            retry_delay: "5s".to_string(),
            down_after: "20m".to_string(),
        }
    }
}

impl PollerConfig {
    pub fn address_for(&self, host: &str) -> String {
        self.address_template.replace("{host}", host)
    }

    pub fn self_name_for(&self, host: &str) -> String {
        self.self_template.replace("{host}", host)
    }

    /// Never zero: an unparsable or zero value yields the default.
    pub fn interval(&self) -> Duration {
        nonzero_or(&self.interval, Duration::from_secs(60))
    }

    pub fn attempt_timeout(&self) -> Duration {
        nonzero_or(&self.attempt_timeout, Duration::from_secs(5))
    }

    pub fn retry_delay(&self) -> Duration {
        duration_or(&self.retry_delay, Duration::from_secs(5))
    }

    pub fn down_after(&self) -> Duration {
        duration_or(&self.down_after, Duration::from_secs(20 * 60))
    }
}

// ── Entity-class timeouts ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Presence beacons without an explicit timeout.
    pub default: String,
    /// Battery-backed or slow-changing devices.
    pub long: String,
    pub long_entities: Vec<String>,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            default: "20m".to_string(),
            long: "6h".to_string(),
            long_entities: Vec::new(),
        }
    }
}

impl TimeoutsConfig {
    /// Arm-timer length for an entity without a rule-level override.
    pub fn for_entity(&self, key: &str) -> Duration {
        if self.long_entities.iter().any(|e| e == key) {
            duration_or(&self.long, Duration::from_secs(6 * 3600))
        } else {
            duration_or(&self.default, Duration::from_secs(20 * 60))
        }
    }
}

// ── Notification delivery ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyBackend {
    #[default]
    Log,
    Smtp,
    Webhook,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub backend: NotifyBackend,
    pub smtp: Option<SmtpConfig>,
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// `host:port` of the push gateway (plain HTTP).
    pub address: String,
    pub path: String,
    #[serde(default = "default_webhook_timeout")]
    pub timeout: String,
}

fn default_webhook_timeout() -> String {
    "10s".to_string()
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        duration_or(&self.timeout, Duration::from_secs(10))
    }
}

// ── Message bus ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: String,
    pub reconnect_delay: String,
    /// Cosmetic delay before a distress is logged at info level.
    pub log_delay: String,
    /// Entity keys that are never tracked.
    pub ignore: Vec<String>,
    pub lifecycle: Vec<LifecycleRule>,
    pub stale: Vec<StaleRule>,
    pub heartbeat: Vec<HeartbeatRule>,
    pub presence: Vec<PresenceRule>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "vigil".to_string(),
            keep_alive: "30s".to_string(),
            reconnect_delay: "5s".to_string(),
            log_delay: "2s".to_string(),
            ignore: Vec::new(),
            lifecycle: Vec::new(),
            stale: Vec::new(),
            heartbeat: Vec::new(),
            presence: Vec::new(),
        }
    }
}

impl BusConfig {
    pub fn keep_alive(&self) -> Duration {
        duration_or(&self.keep_alive, Duration::from_secs(30))
    }

    pub fn reconnect_delay(&self) -> Duration {
        duration_or(&self.reconnect_delay, Duration::from_secs(5))
    }

    pub fn log_delay(&self) -> Duration {
        duration_or(&self.log_delay, Duration::from_secs(2))
    }

    /// Every topic filter the bus client must subscribe to, deduplicated,
    /// in config order.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.lifecycle
            .iter()
            .map(|r| &r.topic)
            .chain(self.stale.iter().map(|r| &r.topic))
            .chain(self.heartbeat.iter().map(|r| &r.topic))
            .chain(self.presence.iter().map(|r| &r.topic))
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

/// Administrative topics forwarded as one-shot notices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub topic: String,
    /// Values of the payload's `type` field that produce a notice; other
    /// messages on the topic are dropped.
    #[serde(default)]
    pub events: Vec<String>,
}

/// Readings that must keep changing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleRule {
    pub topic: String,
    pub entity: Option<String>,
    /// Dotted paths into the JSON payload making up the compared value.
    pub fields: Vec<String>,
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: u32,
    #[serde(default = "default_stale_timeout")]
    pub timeout: String,
    /// Topic receiving a `1`/`0` blink on every changed reading.
    pub ack_topic: Option<String>,
}

fn default_repeat_threshold() -> u32 {
    12
}

fn default_stale_timeout() -> String {
    "5m".to_string()
}

impl StaleRule {
    pub fn timeout(&self) -> Duration {
        duration_or(&self.timeout, Duration::from_secs(300))
    }
}

/// Topics expected to carry a message at least every `window`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRule {
    pub topic: String,
    pub entity: Option<String>,
    #[serde(default = "default_window")]
    pub window: String,
    pub battery_warn_below: Option<f64>,
}

fn default_window() -> String {
    "1h".to_string()
}

impl HeartbeatRule {
    pub fn window(&self) -> Duration {
        duration_or(&self.window, Duration::from_secs(3600))
    }
}

/// Binary `Online`/`Offline` beacons (MQTT last-will topics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRule {
    pub topic: String,
    pub entity: Option<String>,
    /// Overrides the entity-class timeout.
    pub timeout: Option<String>,
}

impl PresenceRule {
    pub fn timeout(&self, timeouts: &TimeoutsConfig, key: &str) -> Duration {
        self.timeout
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or_else(|| timeouts.for_entity(key))
    }
}

// ── Loading ────────────────────────────────────────────────────────

impl VigilConfig {
    /// Read, parse, and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: VigilConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every duration string and the few structural requirements.
    pub fn validate(&self) -> ConfigResult<()> {
        let p = &self.poller;
        check_nonzero_duration("poller.interval", &p.interval)?;
        check_nonzero_duration("poller.attempt_timeout", &p.attempt_timeout)?;
        check_duration("poller.retry_delay", &p.retry_delay)?;
        check_duration("poller.down_after", &p.down_after)?;
        if p.attempts == 0 {
            return Err(ConfigError::Invalid("poller.attempts must be at least 1".into()));
        }
        check_duration("timeouts.default", &self.timeouts.default)?;
        check_duration("timeouts.long", &self.timeouts.long)?;

        match self.notify.backend {
            NotifyBackend::Smtp if self.notify.smtp.is_none() => {
                return Err(ConfigError::Invalid(
                    "notify.backend = \"smtp\" requires [notify.smtp]".into(),
                ));
            }
            NotifyBackend::Webhook if self.notify.webhook.is_none() => {
                return Err(ConfigError::Invalid(
                    "notify.backend = \"webhook\" requires [notify.webhook]".into(),
                ));
            }
            _ => {}
        }
        if let Some(webhook) = &self.notify.webhook {
            check_duration("notify.webhook.timeout", &webhook.timeout)?;
        }

        if let Some(bus) = &self.bus {
            check_duration("bus.keep_alive", &bus.keep_alive)?;
            check_duration("bus.reconnect_delay", &bus.reconnect_delay)?;
            check_duration("bus.log_delay", &bus.log_delay)?;
            for rule in &bus.lifecycle {
                check_topic_filter(&rule.topic)?;
            }
            for rule in &bus.stale {
                check_topic_filter(&rule.topic)?;
                check_duration("bus.stale.timeout", &rule.timeout)?;
                if rule.fields.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "stale rule for {} lists no fields",
                        rule.topic
                    )));
                }
            }
            for rule in &bus.heartbeat {
                check_topic_filter(&rule.topic)?;
                check_duration("bus.heartbeat.window", &rule.window)?;
            }
            for rule in &bus.presence {
                check_topic_filter(&rule.topic)?;
                if let Some(t) = &rule.timeout {
                    check_duration("bus.presence.timeout", t)?;
                }
            }
        }
        Ok(())
    }

    /// Configured hostname, else the system's.
    pub fn resolve_hostname(&self) -> String {
        if let Some(name) = &self.hostname {
            return name.clone();
        }
        let from_file = std::fs::read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let name = from_file
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());
        debug!(hostname = %name, "resolved hostname");
        name
    }
}

fn check_duration(field: &str, value: &str) -> ConfigResult<()> {
    match parse_duration(value) {
        Some(_) => Ok(()),
        None => Err(ConfigError::Duration {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

fn check_nonzero_duration(field: &str, value: &str) -> ConfigResult<()> {
    check_duration(field, value)?;
    if parse_duration(value).is_some_and(|d| d.is_zero()) {
        return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
    }
    Ok(())
}

/// Check MQTT filter syntax: `+` must fill a whole level and `#` must be
/// the whole last level.
pub fn check_topic_filter(filter: &str) -> ConfigResult<()> {
    if filter.is_empty() {
        return Err(ConfigError::Topic(filter.to_string()));
    }
    let last = filter.split('/').count() - 1;
    for (i, level) in filter.split('/').enumerate() {
        let ok = match level {
            "+" => true,
            "#" => i == last,
            l => !l.contains(['+', '#']),
        };
        if !ok {
            return Err(ConfigError::Topic(filter.to_string()));
        }
    }
    Ok(())
}

fn duration_or(value: &str, fallback: Duration) -> Duration {
    parse_duration(value).unwrap_or(fallback)
}

fn nonzero_or(value: &str, fallback: Duration) -> Duration {
    parse_duration(value)
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}
