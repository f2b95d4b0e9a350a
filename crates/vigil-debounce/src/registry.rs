//! In-memory liveness registry: entity key → debounce state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use vigil_core::{Entity, EntityKey, Origin, Policy};

use crate::timer::{Expiry, TimerSlot, Timers};

/// Default cosmetic delay before a distress is logged at info level.
pub const DEFAULT_LOG_DELAY: Duration = Duration::from_secs(2);

/// Debounce state for a single entity.
///
/// `armed` and `notified` are never both set: the arm timer is consumed
/// when it fires.
#[derive(Debug)]
pub struct DebounceState {
    /// Where the entity was first seen; picks the alert wording.
    pub(crate) origin: Origin,
    /// Fixed by the first message for this key.
    pub(crate) policy: Policy,
    /// Pending countdown or heartbeat window.
    pub(crate) arm: Option<TimerSlot>,
    /// A "down" alert went out and no recovery followed yet.
    pub(crate) notified: bool,
    /// Consecutive stale readings equal to `last_value`.
    pub(crate) repeat_count: u32,
    /// Last stale reading seen.
    pub(crate) last_value: Option<String>,
    /// Delayed info-level log of the current distress.
    pub(crate) pending_log: Option<TimerSlot>,
    /// Last-seen distress detail, carried into the "down" alert.
    pub(crate) detail: String,
}

impl DebounceState {
    pub(crate) fn new(entity: &Entity) -> Self {
        Self {
            origin: entity.origin,
            policy: entity.policy,
            arm: None,
            notified: false,
            repeat_count: 0,
            last_value: None,
            pending_log: None,
            detail: String::new(),
        }
    }

    /// A countdown (or heartbeat window) is pending.
    pub fn is_armed(&self) -> bool {
        self.arm.is_some()
    }

    /// A "down" alert went out and no recovery has been seen yet.
    pub fn is_notified(&self) -> bool {
        self.notified
    }

    /// Neither armed nor notified.
    pub fn is_clear(&self) -> bool {
        !self.is_armed() && !self.notified
    }

    /// How many stale readings in a row repeated the last value.
    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Last stale reading, if this is a stale-counter entity.
    pub fn last_value(&self) -> Option<&str> {
        self.last_value.as_deref()
    }

    pub fn has_pending_log(&self) -> bool {
        self.pending_log.is_some()
    }

    /// Policy chosen when the key was first seen.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Owns every entity's debounce state and the timers attached to it.
#[derive(Debug)]
pub struct Registry {
    pub(crate) states: HashMap<EntityKey, DebounceState>,
    pub(crate) timers: Timers,
    pub(crate) log_delay: Duration,
}

impl Registry {
    /// Create a registry whose timers report into `expiries`.
    pub fn new(expiries: mpsc::UnboundedSender<Expiry>) -> Self {
        Self {
            states: HashMap::new(),
            timers: Timers::new(expiries),
            log_delay: DEFAULT_LOG_DELAY,
        }
    }

    /// Create a registry together with the receiving end of its expiry queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Expiry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn with_log_delay(mut self, log_delay: Duration) -> Self {
        self.log_delay = log_delay;
        self
    }

    pub fn get(&self, key: &str) -> Option<&DebounceState> {
        self.states.get(key)
    }

    /// Number of entities seen so far.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Keys of entities with a "down" alert outstanding.
    pub fn notified_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .states
            .iter()
            .filter(|(_, s)| s.notified)
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Cancel every outstanding timer (for graceful shutdown).
    ///
    /// Notified flags are left as they are; only pending countdowns go.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for (key, state) in self.states.iter_mut() {
            if state.arm.take().is_some() {
                cancelled += 1;
                debug!(%key, "arm timer cancelled");
            }
            if state.pending_log.take().is_some() {
                cancelled += 1;
            }
        }
        info!(cancelled, "all entity timers cancelled");
        cancelled
    }
}
