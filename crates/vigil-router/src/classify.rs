//! Message classification.

use std::collections::HashSet;

use vigil_core::config::{
    BusConfig, HeartbeatRule, LifecycleRule, PresenceRule, StaleRule, TimeoutsConfig,
};
use vigil_core::{Alert, ConfigResult, Entity, Origin, Signal};

use crate::payload::Payload;
use crate::topic::TopicPattern;

/// Payload of a presence beacon reporting the device gone.
pub const OFFLINE: &str = "Offline";
/// Payload of a presence beacon reporting the device present.
pub const ONLINE: &str = "Online";

/// What a message means for the watchdog.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Administrative event; `None` when its type is not one we report.
    Lifecycle(Option<Alert>),
    /// Entity is on the ignore list.
    Ignored(Entity),
    /// Reading of a meter that must keep changing.
    Stale {
        entity: Entity,
        /// The watched fields, joined in rule order.
        value: String,
        /// Where to blink when the value changed.
        ack_topic: Option<String>,
    },
    /// Any message from the entity resets its window.
    Heartbeat {
        entity: Entity,
        /// Battery level, set only when below the rule's warning level.
        low_battery: Option<f64>,
    },
    /// `Online`/`Offline` beacon.
    Presence {
        entity: Entity,
        signal: Signal,
    },
    /// No rule matched, or the payload was unusable.
    Unhandled {
        reason: String,
    },
}

/// Classifies `(topic, payload)` pairs against the configured rules.
#[derive(Debug, Clone)]
pub struct Router {
    ignore: HashSet<String>,
    lifecycle: Vec<(TopicPattern, LifecycleRule)>,
    stale: Vec<(TopicPattern, StaleRule)>,
    heartbeat: Vec<(TopicPattern, HeartbeatRule)>,
    presence: Vec<(TopicPattern, PresenceRule)>,
    timeouts: TimeoutsConfig,
}

fn compile<R: Clone>(
    rules: &[R],
    topic: impl Fn(&R) -> &str,
) -> ConfigResult<Vec<(TopicPattern, R)>> {
    rules
        .iter()
        .map(|r| Ok((TopicPattern::parse(topic(r))?, r.clone())))
        .collect()
}

impl Router {
    pub fn from_config(bus: &BusConfig, timeouts: &TimeoutsConfig) -> ConfigResult<Self> {
        Ok(Self {
            ignore: bus.ignore.iter().cloned().collect(),
            lifecycle: compile(&bus.lifecycle, |r| r.topic.as_str())?,
            stale: compile(&bus.stale, |r| r.topic.as_str())?,
            heartbeat: compile(&bus.heartbeat, |r| r.topic.as_str())?,
            presence: compile(&bus.presence, |r| r.topic.as_str())?,
            timeouts: timeouts.clone(),
        })
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignore.contains(key)
    }

    /// Classify a message. Never fails: anything unexpected becomes
    /// [`Route::Unhandled`].
    pub fn classify(&self, topic: &str, payload: &Payload) -> Route {
        if let Some((_, rule)) = self.lifecycle.iter().find(|(p, _)| p.matches(topic)) {
            return Route::Lifecycle(lifecycle_alert(rule, topic, payload));
        }

        if let Some((pattern, rule)) = self.stale.iter().find(|(p, _)| p.matches(topic)) {
            let Some(key) = pattern.entity_key(topic, rule.entity.as_deref()) else {
                return unkeyed(topic);
            };
            let entity = Entity::stale(key, rule.repeat_threshold, rule.timeout());
            if let Some(ignored) = self.ignored(entity.clone()) {
                return ignored;
            }
            return match payload.composite(&rule.fields) {
                Some(value) => Route::Stale {
                    entity,
                    value,
                    ack_topic: rule.ack_topic.clone(),
                },
                None => Route::Unhandled {
                    reason: format!("reading without any of {:?}", rule.fields),
                },
            };
        }

        if let Some((pattern, rule)) = self.heartbeat.iter().find(|(p, _)| p.matches(topic)) {
            let Some(key) = pattern.entity_key(topic, rule.entity.as_deref()) else {
                return unkeyed(topic);
            };
            let entity = Entity::heartbeat(key, rule.window());
            if let Some(ignored) = self.ignored(entity.clone()) {
                return ignored;
            }
            let low_battery = match (rule.battery_warn_below, payload.number("battery")) {
                (Some(limit), Some(level)) if level < limit => Some(level),
                _ => None,
            };
            return Route::Heartbeat { entity, low_battery };
        }

        if let Some((pattern, rule)) = self.presence.iter().find(|(p, _)| p.matches(topic)) {
            let Some(key) = pattern.entity_key(topic, rule.entity.as_deref()) else {
                return unkeyed(topic);
            };
            let down_after = rule.timeout(&self.timeouts, &key);
            let entity = Entity::edge(key, Origin::Device, down_after);
            if let Some(ignored) = self.ignored(entity.clone()) {
                return ignored;
            }
            return match payload.text() {
                OFFLINE => Route::Presence {
                    entity,
                    signal: Signal::Distress(payload.text().to_string()),
                },
                ONLINE => Route::Presence {
                    entity,
                    signal: Signal::Clear,
                },
                other => Route::Unhandled {
                    reason: format!("unexpected presence payload {other:?}"),
                },
            };
        }

        Route::Unhandled {
            reason: "no rule matches topic".to_string(),
        }
    }

    fn ignored(&self, mut entity: Entity) -> Option<Route> {
        if self.is_ignored(&entity.key) {
            entity.ignored = true;
            return Some(Route::Ignored(entity));
        }
        None
    }
}

fn unkeyed(topic: &str) -> Route {
    Route::Unhandled {
        reason: format!("no entity key in topic {topic:?}"),
    }
}

fn lifecycle_alert(rule: &LifecycleRule, topic: &str, payload: &Payload) -> Option<Alert> {
    let event = payload.string("type")?;
    if !rule.events.iter().any(|e| e == event) {
        return None;
    }
    let device = payload
        .string("data.friendly_name")
        .or_else(|| payload.string("data.ieee_address"))
        .unwrap_or(topic);
    Some(Alert::info(device, format!("{event} {}", payload.raw())))
}
