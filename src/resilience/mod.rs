//! Resilience primitives.
//!
//! - [`retry`]: bounded retry with capped exponential backoff, per-attempt
//!   timeout and cancellation

pub mod retry;
