//! vigil-health: peer health polling and the local liveness endpoint.
//!
//! # Architecture
//!
//! ```text
//! HealthPoller (one task, cycles never overlap)
//!   ├── every interval: one check per peer host (concurrently)
//!   │   └── check_host() → up to N attempts via HealthProbe
//!   └── HostOutcome → channel → debounce engine (edge-triggered)
//!
//! health_router()  GET /health → "ok"
//! ```
//!
//! A response body other than `ok` means the peer is up but unhealthy;
//! that is final for the cycle and does not consume further attempts.
//! Transport errors and timeouts are retried after a fixed delay.

pub mod checker;
pub mod poller;
pub mod probe;
pub mod server;

pub use checker::{CheckError, RetryPolicy, check_host};
pub use poller::{HealthPoller, HostOutcome};
pub use probe::{HealthProbe, HttpProbe, ProbeError, ProbeResponse};
pub use server::health_router;
