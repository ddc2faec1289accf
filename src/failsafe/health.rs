//! Generative backend health tracking
//!
//! Counts outcomes of dispatches (after retries) and flags the backend
//! unhealthy after consecutive failures. Reported by the health endpoint.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

/// Consecutive failures before the backend is reported unhealthy
const UNHEALTHY_THRESHOLD: u64 = 3;

/// Backend health tracker
#[derive(Debug)]
pub struct HealthTracker {
    /// Backend name
    name: String,
    /// Whether backend is currently healthy
    healthy: AtomicBool,
    /// Total successful dispatches
    success_count: AtomicU64,
    /// Total failed dispatches
    failure_count: AtomicU64,
    /// Consecutive failures
    consecutive_failures: AtomicU64,
    /// Latency of the last success in milliseconds
    last_latency_ms: AtomicU64,
    /// Failures by error kind
    failures_by_kind: DashMap<&'static str, u64>,
    /// Last success timestamp (millis since epoch, 0 when never)
    last_success: AtomicI64,
    /// Last failure timestamp (millis since epoch, 0 when never)
    last_failure: AtomicI64,
}

impl HealthTracker {
    /// Create a new health tracker
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            healthy: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(0),
            failures_by_kind: DashMap::new(),
            last_success: AtomicI64::new(0),
            last_failure: AtomicI64::new(0),
        }
    }

    /// Record a successful dispatch
    pub fn record_success(&self, latency: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_latency_ms.store(
            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        self.last_success
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);

        // Mark as healthy after success
        if !self.healthy.swap(true, Ordering::Relaxed) {
            info!(backend = %self.name, "Backend recovered");
        }
    }

    /// Record a failed dispatch of the given kind
    pub fn record_failure(&self, kind: &'static str) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
        self.last_failure
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        let consecutive = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if consecutive >= UNHEALTHY_THRESHOLD && self.healthy.swap(false, Ordering::Relaxed) {
            warn!(
                backend = %self.name,
                consecutive_failures = consecutive,
                "Backend marked unhealthy"
            );
        }
    }

    /// Check if backend is currently healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the current health
    #[must_use]
    pub fn snapshot(&self) -> BackendHealth {
        let mut failures_by_kind: Vec<(String, u64)> = self
            .failures_by_kind
            .iter()
            .map(|e| ((*e.key()).to_string(), *e.value()))
            .collect();
        failures_by_kind.sort();

        BackendHealth {
            backend: self.name.clone(),
            healthy: self.is_healthy(),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
            failures_by_kind,
            last_success: from_millis(&self.last_success),
            last_failure: from_millis(&self.last_failure),
        }
    }
}

fn from_millis(stamp: &AtomicI64) -> Option<DateTime<Utc>> {
    match stamp.load(Ordering::Relaxed) {
        0 => None,
        millis => DateTime::from_timestamp_millis(millis),
    }
}

/// Health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    /// Backend name
    pub backend: String,
    /// Current health status
    pub healthy: bool,
    /// Total successful dispatches
    pub success_count: u64,
    /// Total failed dispatches
    pub failure_count: u64,
    /// Consecutive failures
    pub consecutive_failures: u64,
    /// Latency of the last success
    pub last_latency_ms: u64,
    /// Failures grouped by error kind
    pub failures_by_kind: Vec<(String, u64)>,
    /// Last success
    pub last_success: Option<DateTime<Utc>>,
    /// Last failure
    pub last_failure: Option<DateTime<Utc>>,
}
