//! vigil-engine: the single task that owns the liveness registry.
//!
//! # Architecture
//!
//! ```text
//!  bus adapter ──BusMessage──┐
//!                            ├──► Engine ──Alert────► dispatcher
//!  health poller ─HostOutcome┘     │  ▲   ──Outbound─► bus adapter
//!                                  ▼  │
//!                               Registry timers (Expiry)
//! ```
//!
//! Every input is applied in arrival order by one task, so a key's
//! transitions never race. On shutdown the engine cancels every pending
//! timer before returning.

pub mod engine;

pub use engine::{BusMessage, Engine, EngineStats};
