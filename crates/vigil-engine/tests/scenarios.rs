//! End-to-end scenarios: inputs in, alerts out, virtual time in between.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use vigil_core::{Alert, AlertKind, Origin, Outbound, Policy, VigilConfig};
use vigil_engine::{BusMessage, Engine, EngineStats};
use vigil_health::probe::BoxFuture;
use vigil_health::{HealthPoller, HealthProbe, ProbeError, ProbeResponse};
use vigil_router::Router;

const MINUTE: Duration = Duration::from_secs(60);

const CONFIG: &str = r#"
hostname = "qnap-watchdog"

[poller]
hosts = ["pi-jalousie", "qnap"]

[bus]
ignore = ["sonoff-test"]

[[bus.lifecycle]]
topic = "Zigbee/bridge/event"
events = ["device_joined"]

[[bus.stale]]
topic = "tasmota/espstrom/tele/SENSOR"
entity = "espstrom"
fields = ["SML.Verbrauch"]
ack_topic = "tasmota/espstrom/cmnd/LedPower1"

[[bus.heartbeat]]
topic = "Zigbee/+"
window = "1h"

[[bus.presence]]
topic = "tasmota/+/tele/LWT"
"#;

struct Harness {
    bus: mpsc::Sender<BusMessage>,
    outcomes: Option<mpsc::Sender<vigil_health::HostOutcome>>,
    alerts: mpsc::UnboundedReceiver<Alert>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    shutdown: watch::Sender<bool>,
    engine: JoinHandle<EngineStats>,
}

impl Harness {
    fn start(config: &VigilConfig) -> Self {
        let router = config
            .bus
            .as_ref()
            .map(|bus| Router::from_config(bus, &config.timeouts).unwrap());
        let (alert_tx, alerts) = mpsc::unbounded_channel();
        let (out_tx, outbound) = mpsc::unbounded_channel();
        let (bus, bus_rx) = mpsc::channel(64);
        let (outcomes, poll_rx) = mpsc::channel(64);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let engine = Engine::new(router, alert_tx, out_tx);
        let engine = tokio::spawn(engine.run(bus_rx, poll_rx, shutdown_rx));

        Self {
            bus,
            outcomes: Some(outcomes),
            alerts,
            outbound,
            shutdown,
            engine,
        }
    }

    async fn publish(&self, topic: &str, payload: &str) {
        self.bus.send(BusMessage::new(topic, payload)).await.unwrap();
        // The paused clock only moves once the engine is idle again.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn drain_alerts(&mut self) -> Vec<Alert> {
        let mut out = Vec::new();
        while let Ok(alert) = self.alerts.try_recv() {
            out.push(alert);
        }
        out
    }

    async fn stop(self) -> EngineStats {
        self.shutdown.send(true).unwrap();
        self.engine.await.unwrap()
    }
}

fn config() -> VigilConfig {
    VigilConfig::from_toml_str(CONFIG).unwrap()
}

#[tokio::test(start_paused = true)]
async fn boiler_blip_sends_nothing() {
    let mut h = Harness::start(&config());

    h.publish("tasmota/boiler/tele/LWT", "Offline").await;
    tokio::time::sleep(19 * MINUTE).await;
    assert!(h.drain_alerts().is_empty());

    tokio::time::sleep(MINUTE / 2).await;
    h.publish("tasmota/boiler/tele/LWT", "Online").await;

    // Well past when the alert would have fired.
    tokio::time::sleep(30 * MINUTE).await;
    assert!(h.drain_alerts().is_empty());

    let stats = h.stop().await;
    assert_eq!(stats.alerts, 0);
    assert_eq!(stats.cancelled_timers, 0);
}

#[tokio::test(start_paused = true)]
async fn boiler_outage_sends_one_down_and_one_recovery() {
    let mut h = Harness::start(&config());

    h.publish("tasmota/boiler/tele/LWT", "Offline").await;
    tokio::time::sleep(20 * MINUTE + Duration::from_millis(1)).await;

    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Down);
    assert_eq!(alerts[0].entity, "boiler");
    assert_eq!(alerts[0].origin, Origin::Device);
    assert_eq!(alerts[0].policy, Some(Policy::EdgeTriggered));

    // Repeated distress while down changes nothing.
    h.publish("tasmota/boiler/tele/LWT", "Offline").await;
    tokio::time::sleep(5 * MINUTE).await;
    assert!(h.drain_alerts().is_empty());

    h.publish("tasmota/boiler/tele/LWT", "Online").await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Recovered);

    h.publish("tasmota/boiler/tele/LWT", "Online").await;
    assert!(h.drain_alerts().is_empty());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stale_meter_blinks_on_change_and_goes_down_when_stuck() {
    let mut h = Harness::start(&config());
    let reading = r#"{"SML":{"Verbrauch":1234.5,"Leistung":300}}"#;

    h.publish("tasmota/espstrom/tele/SENSOR", reading).await;
    assert_eq!(
        h.outbound.try_recv().unwrap(),
        Outbound::Blink {
            topic: "tasmota/espstrom/cmnd/LedPower1".to_string()
        }
    );

    for _ in 0..13 {
        h.publish("tasmota/espstrom/tele/SENSOR", reading).await;
    }
    assert!(h.outbound.try_recv().is_err());

    // Stale rules default to a five minute countdown.
    tokio::time::sleep(5 * MINUTE + Duration::from_millis(1)).await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].entity, "espstrom");
    assert_eq!(alerts[0].policy, Some(Policy::StaleCounter));

    h.publish(
        "tasmota/espstrom/tele/SENSOR",
        r#"{"SML":{"Verbrauch":1235.0}}"#,
    )
    .await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Recovered);
    assert!(h.outbound.try_recv().is_ok());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_window_and_lifecycle_events() {
    let mut h = Harness::start(&config());

    h.publish(
        "Zigbee/bridge/event",
        r#"{"type":"device_joined","data":{"friendly_name":"lamp"}}"#,
    )
    .await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Info);
    assert_eq!(alerts[0].entity, "lamp");

    h.publish("Zigbee/kitchen", r#"{"battery":90}"#).await;
    tokio::time::sleep(59 * MINUTE).await;
    h.publish("Zigbee/kitchen", r#"{"battery":90}"#).await;
    tokio::time::sleep(59 * MINUTE).await;
    assert!(h.drain_alerts().is_empty());

    tokio::time::sleep(2 * MINUTE).await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].entity, "kitchen");
    assert_eq!(alerts[0].policy, Some(Policy::SlidingHeartbeat));

    // Silence after the alert produces no second one.
    tokio::time::sleep(5 * 60 * MINUTE).await;
    assert!(h.drain_alerts().is_empty());

    h.publish("Zigbee/kitchen", "{}").await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Recovered);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn ignored_and_unmatched_topics_touch_nothing() {
    let mut h = Harness::start(&config());

    h.publish("tasmota/sonoff-test/tele/LWT", "Offline").await;
    h.publish("some/other/topic", "garbage").await;
    tokio::time::sleep(60 * MINUTE).await;

    assert!(h.drain_alerts().is_empty());
    let stats = h.stop().await;
    assert_eq!(stats.bus_messages, 2);
}

/// Refuses connections until switched healthy.
#[derive(Default)]
struct SwitchProbe {
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl HealthProbe for SwitchProbe {
    fn get<'a>(
        &'a self,
        _address: &'a str,
        _path: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<ProbeResponse, ProbeError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy.load(Ordering::SeqCst);
        Box::pin(async move {
            if healthy {
                Ok(ProbeResponse {
                    status: 200,
                    body: "ok".to_string(),
                })
            } else {
                Err(ProbeError::Connect("connection refused".to_string()))
            }
        })
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_peer_alerts_once_then_recovers() {
    let config = config();
    let mut h = Harness::start(&config);
    let probe = Arc::new(SwitchProbe::default());
    let hostname = config.resolve_hostname();
    let poller = HealthPoller::from_config(&config.poller, &hostname, probe.clone());
    assert_eq!(poller.hosts(), vec!["pi-jalousie"]);

    let outcomes = h.outcomes.take().unwrap();
    let poller = tokio::spawn(poller.run(outcomes, h.shutdown.subscribe()));

    // The first failed cycle arms at 10s; twenty minutes later the alert
    // goes out.
    tokio::time::sleep(19 * MINUTE + MINUTE / 2).await;
    assert!(h.drain_alerts().is_empty());
    // Three attempts per failed cycle, never more.
    assert_eq!(probe.calls.load(Ordering::SeqCst) % 3, 0);

    tokio::time::sleep(MINUTE).await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].entity, "pi-jalousie");
    assert_eq!(alerts[0].origin, Origin::Server);
    assert!(alerts[0].detail.contains("Server unresponsive pi-jalousie"));

    tokio::time::sleep(10 * MINUTE).await;
    assert!(h.drain_alerts().is_empty());

    probe.healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
    let alerts = h.drain_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Recovered);

    h.stop().await;
    poller.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn outbound_closes_only_after_timers_are_cancelled() {
    let mut h = Harness::start(&config());

    h.publish("tasmota/boiler/tele/LWT", "Offline").await;
    // Past the log delay, so only the countdown is left.
    tokio::time::sleep(Duration::from_secs(3)).await;
    h.shutdown.send(true).unwrap();

    // The bus adapter stops on this close, so it must trail cancel_all.
    assert!(h.outbound.recv().await.is_none());
    let stats = h.engine.await.unwrap();
    assert_eq!(stats.cancelled_timers, 1);
}
