//! Cancelable per-entity timers.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use vigil_core::EntityKey;

/// Which timer of an entity fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Countdown to "down" (edge-triggered, stale) or the heartbeat window.
    Arm,
    /// Cosmetic delay before a distress is worth an info log line.
    LogDelay,
}

/// Delivered to the registry owner when a timer runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub key: EntityKey,
    pub kind: TimerKind,
    pub token: u64,
}

/// A live timer. Dropping the slot cancels it.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    pub(crate) token: u64,
    handle: JoinHandle<()>,
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns timers that report into the expiry channel.
#[derive(Debug)]
pub(crate) struct Timers {
    tx: mpsc::UnboundedSender<Expiry>,
    next_token: u64,
}

impl Timers {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Expiry>) -> Self {
        Self { tx, next_token: 0 }
    }

    pub(crate) fn start(&mut self, key: &str, kind: TimerKind, after: Duration) -> TimerSlot {
        self.next_token += 1;
        let token = self.next_token;
        let tx = self.tx.clone();
        let expiry = Expiry {
            key: key.to_string(),
            kind,
            token,
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The receiver is gone only during shutdown.
            let _ = tx.send(expiry);
        });

        TimerSlot { token, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_reports_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        let slot = timers.start("boiler", TimerKind::Arm, Duration::from_secs(60));
        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry.key, "boiler");
        assert_eq!(expiry.kind, TimerKind::Arm);
        assert_eq!(expiry.token, slot.token);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        let slot = timers.start("boiler", TimerKind::Arm, Duration::from_secs(60));
        drop(slot);

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        let a = timers.start("a", TimerKind::Arm, Duration::from_secs(1));
        let b = timers.start("a", TimerKind::LogDelay, Duration::from_secs(1));
        assert_ne!(a.token, b.token);
    }
}
