//! Domain types shared by the poller, the router, and the debounce engine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable identifier of a monitored host or device.
pub type EntityKey = String;

// ── Entity ─────────────────────────────────────────────────────────

/// Debounce policy an entity is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Distress arms a one-shot countdown; clear disarms or recovers.
    EdgeTriggered,
    /// Every message restarts a dead-man window.
    SlidingHeartbeat,
    /// Identical consecutive readings past a threshold count as distress.
    StaleCounter,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdgeTriggered => write!(f, "edge-triggered"),
            Self::SlidingHeartbeat => write!(f, "sliding-heartbeat"),
            Self::StaleCounter => write!(f, "stale-counter"),
        }
    }
}

/// Where an entity's signals come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A peer watchdog polled over HTTP.
    Server,
    /// A device reporting over the message bus.
    Device,
}

/// A monitored subject together with its resolved debounce parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: EntityKey,
    pub origin: Origin,
    pub policy: Policy,
    /// Arm-timer length (edge-triggered, stale) or window (heartbeat).
    pub down_after: Duration,
    /// Identical readings tolerated before a stale reading counts as distress.
    pub repeat_threshold: Option<u32>,
    pub ignored: bool,
}

impl Entity {
    /// An edge-triggered entity (peer hosts, presence beacons).
    pub fn edge(key: impl Into<EntityKey>, origin: Origin, down_after: Duration) -> Self {
        Self {
            key: key.into(),
            origin,
            policy: Policy::EdgeTriggered,
            down_after,
            repeat_threshold: None,
            ignored: false,
        }
    }

    /// A dead-man heartbeat entity with the given window.
    pub fn heartbeat(key: impl Into<EntityKey>, window: Duration) -> Self {
        Self {
            key: key.into(),
            origin: Origin::Device,
            policy: Policy::SlidingHeartbeat,
            down_after: window,
            repeat_threshold: None,
            ignored: false,
        }
    }

    /// A stale-value entity: `repeat_threshold` identical readings are
    /// tolerated, the next one arms a `down_after` countdown.
    pub fn stale(key: impl Into<EntityKey>, repeat_threshold: u32, down_after: Duration) -> Self {
        Self {
            key: key.into(),
            origin: Origin::Device,
            policy: Policy::StaleCounter,
            down_after,
            repeat_threshold: Some(repeat_threshold),
            ignored: false,
        }
    }
}

// ── Signals ────────────────────────────────────────────────────────

/// Edge-triggered input: something looks wrong, or it looks fine again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Distress with a human-readable detail (error text, raw payload).
    Distress(String),
    Clear,
}

// ── Alerts ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Down,
    Recovered,
    /// One-shot informational notice (device joined, interview finished).
    Info,
}

/// A notification the watchdog wants delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub entity: EntityKey,
    pub origin: Origin,
    /// Debounce policy behind the alert; `None` for informational notices.
    pub policy: Option<Policy>,
    pub detail: String,
}

impl Alert {
    pub fn down(entity: &str, origin: Origin, policy: Policy, detail: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Down,
            entity: entity.to_string(),
            origin,
            policy: Some(policy),
            detail: detail.into(),
        }
    }

    pub fn recovered(
        entity: &str,
        origin: Origin,
        policy: Policy,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: AlertKind::Recovered,
            entity: entity.to_string(),
            origin,
            policy: Some(policy),
            detail: detail.into(),
        }
    }

    pub fn info(entity: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Info,
            entity: entity.to_string(),
            origin: Origin::Device,
            policy: None,
            detail: detail.into(),
        }
    }
}

/// A message the watchdog wants published back onto the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Publish `1` then `0` shortly after, acknowledging a fresh reading.
    Blink { topic: String },
}
