//! vigil-debounce: the liveness registry and its debounce policies.
//!
//! # Architecture
//!
//! ```text
//! Registry
//!   ├── DebounceState per entity key (created on first event)
//!   │   ├── arm timer      (countdown to "down", or heartbeat window)
//!   │   ├── notified flag  ("down" sent, awaiting recovery)
//!   │   └── log-delay timer (cosmetic, suppresses blip logging)
//!   └── Timers → Expiry queue, drained by the owner of the registry
//! ```
//!
//! The registry is owned by a single task. Timers are spawned sleep tasks
//! that report back through an unbounded channel; the owner feeds each
//! [`Expiry`] into [`Registry::expire`]. A timer that was cancelled or
//! replaced carries a stale token and is ignored, so a late expiry can
//! never act on a newer incident.
//!
//! Policies return the [`Alert`](vigil_core::Alert) to deliver, if any;
//! delivery itself is somebody else's concern.

pub mod policy;
pub mod registry;
pub mod timer;

pub use policy::Reading;
pub use registry::{DebounceState, Registry};
pub use timer::{Expiry, TimerKind};
