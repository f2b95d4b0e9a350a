//! Health poller: background task checking every peer host on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use vigil_core::config::PollerConfig;
use vigil_core::{Entity, Origin, Signal};

use crate::checker::{CheckError, RetryPolicy, check_host};
use crate::probe::HealthProbe;

/// Result of one host's check in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct HostOutcome {
    /// The host as an edge-triggered entity.
    pub entity: Entity,
    pub result: Result<(), CheckError>,
}

impl HostOutcome {
    pub fn host(&self) -> &str {
        &self.entity.key
    }

    /// The outcome as an edge-triggered signal.
    pub fn signal(&self) -> Signal {
        match &self.result {
            Ok(()) => Signal::Clear,
            Err(e) => Signal::Distress(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct Target {
    host: String,
    address: String,
}

/// Polls the configured peers. Cycles never overlap: a cycle that outlasts
/// the interval makes the poller skip the missed ticks.
pub struct HealthPoller {
    targets: Vec<Target>,
    retry: RetryPolicy,
    interval: Duration,
    down_after: Duration,
    probe: Arc<dyn HealthProbe>,
}

impl HealthPoller {
    /// Build a poller for every configured host except ourselves.
    pub fn from_config(config: &PollerConfig, hostname: &str, probe: Arc<dyn HealthProbe>) -> Self {
        let targets = config
            .hosts
            .iter()
            .filter(|host| {
                let is_self = config.self_name_for(host) == hostname;
                if is_self {
                    debug!(%host, "skipping self");
                }
                !is_self
            })
            .map(|host| Target {
                host: host.clone(),
                address: config.address_for(host),
            })
            .collect();

        Self {
            targets,
            retry: RetryPolicy::from_config(config),
            interval: config.interval(),
            down_after: config.down_after(),
            probe,
        }
    }

    /// Hosts this poller checks.
    pub fn hosts(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.host.as_str()).collect()
    }

    pub fn entity_for(&self, host: &str) -> Entity {
        Entity::edge(host, Origin::Server, self.down_after)
    }

    /// Run one check per host, concurrently, and collect the outcomes in
    /// host order.
    pub async fn poll_cycle(&self) -> Vec<HostOutcome> {
        let mut set = JoinSet::new();
        for target in &self.targets {
            let probe = self.probe.clone();
            let retry = self.retry.clone();
            let target = target.clone();
            set.spawn(async move {
                let result = check_host(probe.as_ref(), &target.host, &target.address, &retry).await;
                (target.host, result)
            });
        }

        let mut outcomes = Vec::with_capacity(self.targets.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((host, result)) => outcomes.push(HostOutcome {
                    entity: self.entity_for(&host),
                    result,
                }),
                Err(e) => error!(error = %e, "health check task failed"),
            }
        }
        outcomes.sort_by(|a, b| a.entity.key.cmp(&b.entity.key));
        outcomes
    }

    /// The polling loop. The first cycle starts immediately.
    pub async fn run(self, outcomes: mpsc::Sender<HostOutcome>, mut shutdown: watch::Receiver<bool>) {
        if self.targets.is_empty() {
            info!("no peer hosts to poll");
            return;
        }
        info!(hosts = ?self.hosts(), interval = ?self.interval, "health poller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let cycle = tokio::select! {
                        cycle = self.poll_cycle() => cycle,
                        _ = shutdown.changed() => break,
                    };
                    for outcome in cycle {
                        if outcomes.send(outcome).await.is_err() {
                            debug!("outcome receiver closed");
                            return;
                        }
                    }
                    let elapsed = started.elapsed();
                    if elapsed > self.interval {
                        warn!(?elapsed, interval = ?self.interval, "poll cycle overran interval, skipping missed ticks");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("health poller shutting down");
    }
}

#[cfg(test)]
mod tests {
    use crate::checker::tests::{ScriptedProbe, ok, refused};

    use super::*;

    fn config(hosts: &[&str]) -> PollerConfig {
        PollerConfig {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            ..PollerConfig::default()
        }
    }

    #[test]
    fn skips_own_watchdog() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let poller = HealthPoller::from_config(
            &config(&["pi-jalousie", "pi-wecker", "qnap"]),
            "qnap-watchdog",
            probe,
        );
        assert_eq!(poller.hosts(), vec!["pi-jalousie", "pi-wecker"]);
    }

    #[test]
    fn outcome_maps_to_signal() {
        let up = HostOutcome {
            entity: Entity::edge("qnap", Origin::Server, Duration::from_secs(1200)),
            result: Ok(()),
        };
        assert_eq!(up.signal(), Signal::Clear);

        let down = HostOutcome {
            result: Err(CheckError::Unhealthy {
                host: "qnap".to_string(),
                body: "degraded".to_string(),
            }),
            ..up
        };
        assert_eq!(
            down.signal(),
            Signal::Distress("Server unhealthy qnap: degraded".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_host_yields_one_outcome_per_cycle() {
        let probe = Arc::new(ScriptedProbe::new(vec![refused()]));
        let poller = HealthPoller::from_config(&config(&["qnap"]), "other", probe.clone());

        let outcomes = poller.poll_cycle().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].host(), "qnap");
        assert!(matches!(outcomes[0].signal(), Signal::Distress(_)));
        assert_eq!(probe.calls(), 3);
        assert_eq!(outcomes[0].entity.down_after, Duration::from_secs(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn run_sends_outcomes_and_stops_on_shutdown() {
        let probe = Arc::new(ScriptedProbe::new(vec![ok()]));
        let poller = HealthPoller::from_config(&config(&["a", "b"]), "me", probe);
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(poller.run(tx, shutdown_rx));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.host(), "a");
        assert_eq!(second.host(), "b");
        assert_eq!(first.result, Ok(()));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycles_do_not_overlap() {
        // Every check burns three attempts plus two 5s delays; with a 1s
        // interval the next cycle must wait for the current one.
        let probe = Arc::new(ScriptedProbe::new(vec![refused()]));
        let cfg = PollerConfig {
            interval: "1s".to_string(),
            ..config(&["qnap"])
        };
        let poller = HealthPoller::from_config(&cfg, "me", probe.clone());
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(tx, shutdown_rx));

        rx.recv().await.unwrap();
        assert_eq!(probe.calls(), 3);
        rx.recv().await.unwrap();
        assert_eq!(probe.calls(), 6);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
