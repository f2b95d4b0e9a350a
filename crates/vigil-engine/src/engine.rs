//! The event loop.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use vigil_core::{Alert, Outbound};
use vigil_debounce::{Expiry, Registry};
use vigil_health::HostOutcome;
use vigil_router::Router;

/// One message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub bus_messages: u64,
    pub poll_outcomes: u64,
    pub expiries: u64,
    pub alerts: u64,
    pub cancelled_timers: usize,
}

enum Input {
    Bus(BusMessage),
    Poll(HostOutcome),
    Expiry(Expiry),
}

/// Owns the registry and applies every input to it.
pub struct Engine {
    registry: Registry,
    expiries: mpsc::UnboundedReceiver<Expiry>,
    router: Option<Router>,
    alerts: mpsc::UnboundedSender<Alert>,
    outbound: mpsc::UnboundedSender<Outbound>,
    stats: EngineStats,
}

impl Engine {
    /// `router` is `None` when no bus is configured; bus messages are then
    /// logged and dropped.
    pub fn new(
        router: Option<Router>,
        alerts: mpsc::UnboundedSender<Alert>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let (registry, expiries) = Registry::channel();
        Self {
            registry,
            expiries,
            router,
            alerts,
            outbound,
            stats: EngineStats::default(),
        }
    }

    /// Override the cosmetic log-delay timer length.
    pub fn with_log_delay(mut self, log_delay: Duration) -> Self {
        self.registry = self.registry.with_log_delay(log_delay);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Route one bus message through the classifier and its policy.
    pub fn handle_bus(&mut self, message: &BusMessage) {
        self.stats.bus_messages += 1;
        let Some(router) = &self.router else {
            warn!(topic = %message.topic, "bus message without a router");
            return;
        };

        let dispatch = router.handle(&mut self.registry, &message.topic, &message.payload);
        for alert in dispatch.alerts {
            self.emit(alert);
        }
        for outbound in dispatch.outbound {
            if self.outbound.send(outbound).is_err() {
                debug!("outbound receiver closed");
            }
        }
    }

    /// Feed one poll outcome into the edge-triggered policy.
    pub fn handle_outcome(&mut self, outcome: HostOutcome) {
        self.stats.poll_outcomes += 1;
        let signal = outcome.signal();
        if let Some(alert) = self.registry.apply(&outcome.entity, signal) {
            self.emit(alert);
        }
    }

    pub fn handle_expiry(&mut self, expiry: Expiry) {
        self.stats.expiries += 1;
        if let Some(alert) = self.registry.expire(expiry) {
            self.emit(alert);
        }
    }

    fn emit(&mut self, alert: Alert) {
        self.stats.alerts += 1;
        if self.alerts.send(alert).is_err() {
            warn!("alert dispatcher gone, dropping alert");
        }
    }

    /// Run until shutdown. Pending timers are cancelled before returning.
    pub async fn run(
        mut self,
        mut bus: mpsc::Receiver<BusMessage>,
        mut outcomes: mpsc::Receiver<HostOutcome>,
        mut shutdown: watch::Receiver<bool>,
    ) -> EngineStats {
        info!(router = self.router.is_some(), "engine started");

        loop {
            let input = tokio::select! {
                Some(message) = bus.recv() => Input::Bus(message),
                Some(outcome) = outcomes.recv() => Input::Poll(outcome),
                Some(expiry) = self.expiries.recv() => Input::Expiry(expiry),
                _ = shutdown.changed() => break,
                else => break,
            };

            match input {
                Input::Bus(message) => self.handle_bus(&message),
                Input::Poll(outcome) => self.handle_outcome(outcome),
                Input::Expiry(expiry) => self.handle_expiry(expiry),
            }
        }

        self.stats.cancelled_timers = self.registry.cancel_all();
        let notified = self.registry.notified_keys();
        if !notified.is_empty() {
            info!(?notified, "entities still down at shutdown");
        }
        info!(stats = ?self.stats, "engine stopped");
        self.stats
    }
}
