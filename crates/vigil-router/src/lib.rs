//! vigil-router: turns bus messages into debounce policy calls.
//!
//! A message is classified by topic and payload into exactly one
//! [`Route`], first match wins:
//!
//! | Priority | Case | Effect |
//! |---|---|---|
//! | 1 | lifecycle topic | one-shot info alert, registry untouched |
//! | 2 | ignored entity | dropped |
//! | 3 | stale-value reading | stale counter policy |
//! | 4 | dead-man topic | sliding heartbeat policy |
//! | 5 | presence beacon | edge-triggered policy |
//! | 6 | anything else | logged as unhandled |
//!
//! Payloads are decoded leniently: anything that is not JSON becomes an
//! empty record, so a malformed message can never abort handling.

pub mod classify;
pub mod dispatch;
pub mod payload;
pub mod topic;

pub use classify::{Route, Router};
pub use dispatch::{Dispatch, dispatch};
pub use payload::Payload;
pub use topic::TopicPattern;
