//! Pure domain types and logic for the notification delivery engine.
//!
//! This crate has no I/O: every function here is deterministic given its
//! inputs (the backoff jitter takes an injected RNG). Database access lives
//! in `portaria-db`, side effects in `portaria-engine`.

pub mod audience;
pub mod backoff;
pub mod cascade;
pub mod channel;
pub mod error;
pub mod gates;
pub mod quiet_hours;
pub mod quota;
pub mod status;
pub mod types;
