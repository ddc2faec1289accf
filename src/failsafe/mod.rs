//! Failsafe mechanisms for the generative backend: bounded retry and
//! health tracking

mod health;
mod retry;

pub use health::{BackendHealth, HealthTracker};
pub use retry::{RetryPolicy, with_retry};
