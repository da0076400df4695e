//! Concrete channel sender implementations.

pub mod email;
pub mod gateway;
pub mod internal;
