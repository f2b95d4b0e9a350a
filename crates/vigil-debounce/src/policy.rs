//! Debounce policies: edge-triggered arm/clear, sliding heartbeat, and the
//! stale-value counter built on top of edge-triggered.
//!
//! Every policy operates on the [`Registry`] alone and hands back the alert
//! to deliver. An incident produces at most one "down" alert and, only if
//! that went out, exactly one "recovered" alert.

use tracing::{debug, info, warn};

use vigil_core::{Alert, Entity, Policy, Signal};

use crate::registry::{DebounceState, Registry};
use crate::timer::{Expiry, TimerKind};

/// Identical readings tolerated when an entity does not set its own limit.
pub const DEFAULT_REPEAT_THRESHOLD: u32 = 12;

/// Outcome of feeding a stale-counter reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// The value differed from the previous one.
    pub changed: bool,
    pub alert: Option<Alert>,
}

impl Registry {
    fn state_for(&mut self, entity: &Entity) -> &mut DebounceState {
        self.states
            .entry(entity.key.clone())
            .or_insert_with(|| DebounceState::new(entity))
    }

    /// Feed an edge-triggered signal.
    pub fn apply(&mut self, entity: &Entity, signal: Signal) -> Option<Alert> {
        match signal {
            Signal::Distress(detail) => {
                self.distress(entity, &detail);
                None
            }
            Signal::Clear => self.clear(entity),
        }
    }

    /// Distress observed: arm the countdown unless an incident is already
    /// open. Never alerts by itself; the alert comes from [`Registry::expire`].
    pub fn distress(&mut self, entity: &Entity, detail: &str) {
        let log_delay = self.log_delay;
        let state = self
            .states
            .entry(entity.key.clone())
            .or_insert_with(|| DebounceState::new(entity));
        state.detail = detail.to_string();

        if state.arm.is_some() || state.notified {
            return;
        }

        debug!(
            key = %entity.key,
            down_after = ?entity.down_after,
            %detail,
            "distress, timer start"
        );
        state.arm = Some(
            self.timers
                .start(&entity.key, TimerKind::Arm, entity.down_after),
        );
        state.pending_log = Some(self.timers.start(&entity.key, TimerKind::LogDelay, log_delay));
    }

    /// Clear observed: abort a pending countdown, or recover a notified entity.
    /// Repeated clears are no-ops.
    pub fn clear(&mut self, entity: &Entity) -> Option<Alert> {
        let state = self.state_for(entity);
        let blip = state.pending_log.take().is_some();

        if state.arm.take().is_some() {
            if blip {
                debug!(key = %entity.key, "distress cleared within log delay");
            } else {
                info!(key = %entity.key, "clear timer");
            }
        }

        if state.notified {
            state.notified = false;
            info!(key = %entity.key, "entity back up");
            return Some(Alert::recovered(
                &entity.key,
                state.origin,
                state.policy,
                entity.key.clone(),
            ));
        }
        None
    }

    /// A message arrived on a dead-man topic: restart the window and recover
    /// the entity if it had been reported down.
    pub fn heartbeat(&mut self, entity: &Entity) -> Option<Alert> {
        let window = entity.down_after;
        let slot = self.timers.start(&entity.key, TimerKind::Arm, window);
        let state = self.state_for(entity);
        // Replacing the slot cancels the previous window.
        state.arm = Some(slot);
        state.detail = format!("no message received within {window:?}");

        if state.notified {
            state.notified = false;
            info!(key = %entity.key, "entity active again");
            return Some(Alert::recovered(
                &entity.key,
                state.origin,
                state.policy,
                entity.key.clone(),
            ));
        }
        None
    }

    /// Feed a reading that is supposed to keep changing.
    ///
    /// A value equal to the previous one bumps the repeat count; once the
    /// count exceeds the entity's threshold the reading counts as distress.
    /// A different value resets the count and counts as a clear.
    pub fn reading(&mut self, entity: &Entity, value: &str) -> Reading {
        let threshold = entity.repeat_threshold.unwrap_or(DEFAULT_REPEAT_THRESHOLD);
        let state = self.state_for(entity);

        if state.last_value.as_deref() == Some(value) {
            state.repeat_count += 1;
            let repeats = state.repeat_count;
            if repeats > threshold {
                if state.is_armed() || state.notified {
                    debug!(key = %entity.key, repeats, "reading still unchanged");
                }
                let detail = format!("reading {value} unchanged for {repeats} reports");
                self.distress(entity, &detail);
            }
            return Reading {
                changed: false,
                alert: None,
            };
        }

        state.repeat_count = 0;
        state.last_value = Some(value.to_string());
        Reading {
            changed: true,
            alert: self.clear(entity),
        }
    }

    /// Handle a fired timer. Expiries of cancelled or replaced timers are
    /// ignored.
    pub fn expire(&mut self, expiry: Expiry) -> Option<Alert> {
        let Some(state) = self.states.get_mut(&expiry.key) else {
            debug!(key = %expiry.key, "expiry for unknown entity");
            return None;
        };

        match expiry.kind {
            TimerKind::LogDelay => {
                if state.pending_log.as_ref().map(|s| s.token) == Some(expiry.token) {
                    state.pending_log = None;
                    info!(key = %expiry.key, detail = %state.detail, "timer start");
                }
                None
            }
            TimerKind::Arm => {
                if state.arm.as_ref().map(|s| s.token) != Some(expiry.token) {
                    debug!(key = %expiry.key, "stale arm expiry ignored");
                    return None;
                }
                state.arm = None;
                if state.notified {
                    return None;
                }
                state.notified = true;

                match state.policy {
                    Policy::SlidingHeartbeat => {
                        warn!(key = %expiry.key, "timer trigger notification, entity inactive")
                    }
                    _ => warn!(
                        key = %expiry.key,
                        detail = %state.detail,
                        "timer trigger notification, entity down"
                    ),
                }
                Some(Alert::down(
                    &expiry.key,
                    state.origin,
                    state.policy,
                    state.detail.clone(),
                ))
            }
        }
    }
}
