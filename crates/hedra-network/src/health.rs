use std::cmp::Ordering;
use std::time::Duration;
use tokio::time::Instant;

// Used when the configured backoff does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Per-node backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeBackoffConfig {
    /// Backoff a fresh or recovered node starts from.
    pub min_backoff: Duration,
    /// Cap for the doubled backoff; `Duration::MAX` means no cap.
    pub max_backoff: Duration,
    /// Factor applied to the backoff on every failure.
    pub multiplier: u32,
}

impl Default for NodeBackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30 * 60),
            multiplier: 2,
        }
    }
}

/// Mutable health of one node.
///
/// Only ever mutated through [`record_failure`](Self::record_failure) and
/// [`record_success`](Self::record_success).
#[derive(Debug, Clone)]
pub struct HealthRecord {
    config: NodeBackoffConfig,
    backoff_until: Option<Instant>,
    current_backoff: Duration,
    failed_attempts: u64,
    use_count: u64,
    last_used: Option<Instant>,
}

/// Point-in-time view of a [`HealthRecord`] used for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub remaining_backoff: Duration,
    pub failed_attempts: u64,
    pub use_count: u64,
    pub last_used: Option<Instant>,
}

impl HealthRecord {
    pub fn new(config: NodeBackoffConfig) -> Self {
        Self {
            config,
            backoff_until: None,
            current_backoff: config.min_backoff,
            failed_attempts: 0,
            use_count: 0,
            last_used: None,
        }
    }

    /// Grows the backoff by the multiplier (up to the cap) and puts the node out of rotation
    /// until it has elapsed.
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        self.current_backoff = self
            .current_backoff
            .saturating_mul(self.config.multiplier)
            .min(self.config.max_backoff);
        self.backoff_until = now
            .checked_add(self.current_backoff)
            .or_else(|| now.checked_add(FAR_FUTURE));
        self.failed_attempts += 1;
    }

    /// Resets the backoff and makes the node eligible immediately.
    pub fn record_success(&mut self) {
        self.record_success_at(Instant::now());
    }

    pub fn record_success_at(&mut self, now: Instant) {
        self.current_backoff = self.config.min_backoff;
        self.backoff_until = None;
        self.failed_attempts = 0;
        self.use_count += 1;
        self.last_used = Some(now);
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Instant::now())
    }

    pub fn is_healthy_at(&self, now: Instant) -> bool {
        self.backoff_until.map_or(true, |until| now >= until)
    }

    /// Time left until the node becomes healthy; zero when it already is.
    pub fn remaining_backoff(&self) -> Duration {
        self.remaining_backoff_at(Instant::now())
    }

    pub fn remaining_backoff_at(&self, now: Instant) -> Duration {
        self.backoff_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }

    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// `None` while the node has not failed since its last success.
    pub fn backoff_until(&self) -> Option<Instant> {
        self.backoff_until
    }

    /// Consecutive failures since the last success.
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn last_used(&self) -> Option<Instant> {
        self.last_used
    }

    pub fn snapshot_at(&self, now: Instant) -> HealthSnapshot {
        HealthSnapshot {
            healthy: self.is_healthy_at(now),
            remaining_backoff: self.remaining_backoff_at(now),
            failed_attempts: self.failed_attempts,
            use_count: self.use_count,
            last_used: self.last_used,
        }
    }
}

impl HealthSnapshot {
    /// Selection order: healthy first, then least used, then least recently
    /// used (never used sorts first).
    pub fn selection_order(&self, other: &Self) -> Ordering {
        other
            .healthy
            .cmp(&self.healthy)
            .then_with(|| self.use_count.cmp(&other.use_count))
            .then_with(|| self.last_used.cmp(&other.last_used))
    }
}
