//! Route → debounce policy.

use tracing::{debug, warn};

use vigil_core::{Alert, Outbound};
use vigil_debounce::Registry;

use crate::classify::{Route, Router};
use crate::payload::Payload;

/// Everything a handled message asks of the outside world.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Dispatch {
    pub alerts: Vec<Alert>,
    pub outbound: Vec<Outbound>,
}

impl Dispatch {
    fn alert(alert: Option<Alert>) -> Self {
        Self {
            alerts: alert.into_iter().collect(),
            outbound: Vec::new(),
        }
    }
}

/// Apply a classified message to the registry.
pub fn dispatch(route: Route, registry: &mut Registry, topic: &str) -> Dispatch {
    match route {
        Route::Lifecycle(Some(alert)) => {
            debug!(%topic, entity = %alert.entity, "lifecycle event forwarded");
            Dispatch::alert(Some(alert))
        }
        Route::Lifecycle(None) => Dispatch::default(),
        Route::Ignored(entity) => {
            debug!(key = %entity.key, %topic, "ignored entity");
            Dispatch::default()
        }
        Route::Stale {
            entity,
            value,
            ack_topic,
        } => {
            let reading = registry.reading(&entity, &value);
            let mut out = Dispatch::alert(reading.alert);
            if reading.changed {
                if let Some(topic) = ack_topic {
                    out.outbound.push(Outbound::Blink { topic });
                }
            }
            out
        }
        Route::Heartbeat {
            entity,
            low_battery,
        } => {
            if let Some(battery) = low_battery {
                warn!(key = %entity.key, battery, "battery low");
            }
            Dispatch::alert(registry.heartbeat(&entity))
        }
        Route::Presence { entity, signal } => Dispatch::alert(registry.apply(&entity, signal)),
        Route::Unhandled { reason } => {
            warn!(%topic, %reason, "unhandled message");
            Dispatch::default()
        }
    }
}

impl Router {
    /// Decode, classify, and dispatch one bus message.
    pub fn handle(&self, registry: &mut Registry, topic: &str, payload: &[u8]) -> Dispatch {
        let payload = Payload::decode(payload);
        let route = self.classify(topic, &payload);
        dispatch(route, registry, topic)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vigil_core::config::{BusConfig, PresenceRule, StaleRule, TimeoutsConfig};
    use vigil_core::AlertKind;

    use super::*;

    fn router() -> Router {
        let bus = BusConfig {
            stale: vec![StaleRule {
                topic: "meter/SENSOR".to_string(),
                entity: Some("meter".to_string()),
                fields: vec!["power".to_string()],
                repeat_threshold: 1,
                timeout: "5m".to_string(),
                ack_topic: Some("meter/cmnd/Led".to_string()),
            }],
            presence: vec![PresenceRule {
                topic: "tasmota/+/tele/LWT".to_string(),
                entity: None,
                timeout: Some("1m".to_string()),
            }],
            ..BusConfig::default()
        };
        Router::from_config(&bus, &TimeoutsConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn changed_reading_requests_blink() {
        let (mut registry, _rx) = Registry::channel();
        let router = router();

        let out = router.handle(&mut registry, "meter/SENSOR", br#"{"power":12}"#);
        assert_eq!(
            out.outbound,
            vec![Outbound::Blink {
                topic: "meter/cmnd/Led".to_string()
            }]
        );

        let out = router.handle(&mut registry, "meter/SENSOR", br#"{"power":12}"#);
        assert!(out.outbound.is_empty());
        assert!(out.alerts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn presence_round_trip_through_registry() {
        let (mut registry, mut rx) = Registry::channel();
        let router = router();

        let out = router.handle(&mut registry, "tasmota/boiler/tele/LWT", b"Offline");
        assert!(out.alerts.is_empty());
        assert!(registry.get("boiler").unwrap().is_armed());

        tokio::time::advance(Duration::from_secs(60)).await;
        let mut alerts = Vec::new();
        while alerts.is_empty() {
            let expiry = rx.recv().await.unwrap();
            alerts.extend(registry.expire(expiry));
        }
        assert_eq!(alerts[0].kind, AlertKind::Down);

        let out = router.handle(&mut registry, "tasmota/boiler/tele/LWT", b"Online");
        assert_eq!(out.alerts.len(), 1);
        assert_eq!(out.alerts[0].kind, AlertKind::Recovered);
    }

    #[tokio::test]
    async fn unhandled_and_malformed_messages_leave_registry_untouched() {
        let (mut registry, _rx) = Registry::channel();
        let router = router();

        assert_eq!(router.handle(&mut registry, "unknown/topic", b"x"), Dispatch::default());
        assert_eq!(
            router.handle(&mut registry, "meter/SENSOR", b"\xff\xfe garbage"),
            Dispatch::default()
        );
        assert!(registry.is_empty());
    }
}
