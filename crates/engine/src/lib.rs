//! Delivery engine: dispatch loop, cascade escalation, quota ledger, and
//! the notification service facade used by the HTTP API.

pub mod bus;
pub mod dispatcher;
pub mod error;
pub mod escalation;
pub mod quota;
pub mod resolver;
pub mod scheduler;
pub mod sender;
pub mod senders;
pub mod service;

pub use error::EngineError;
