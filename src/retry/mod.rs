// src/retry/mod.rs
mod context;
mod failover;
mod strategy;

pub use context::RequestContext;
pub use failover::{FailoverController, FailoverOutcome, FailoverStep};
pub use strategy::{RetryDecision, RetryStrategy};
