//! Network Resilience (§4.8): rate limiting, retry/backoff and
//! connectivity tracking for the remote embedding and VLM providers.
//!
//! Local providers (CLIP/Gemma via ONNX) never touch this module. Gemini
//! embeddings and the VLM gateway call go through a [`RateLimiter`] and,
//! on a transient failure, [`RetryPolicy::backoff_for`] before the
//! indexer gives up on a clip for this run (§4.1 failure semantics:
//! transient errors are retried, fatal ones are not).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use rand::Rng;
use tokio::sync::Notify;

/// Token-bucket limiter guarding calls to a remote provider. One instance
/// is shared (via `Arc`) across every task calling the same provider so
/// the bucket is actually shared, not per-caller.
pub struct RateLimiter {
    inner: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimiter {
    /// `requests_per_second` of zero is clamped to 1 — a limiter that
    /// allows zero requests per second can never make progress.
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            inner: GovernorLimiter::direct(quota),
        }
    }

    /// Block until a permit is available.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    /// Non-blocking check, used by callers that want to skip work rather
    /// than wait (e.g. a dry-run estimate).
    pub fn check(&self) -> bool {
        self.inner.check().is_ok()
    }
}

/// Exponential backoff with jitter for retrying a transient failure.
/// `attempt` is 0-based (the first retry after the initial attempt).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    /// §4.1 layer-3 transient-failure policy: initial 1s, doubling, capped
    /// at 60s, up to 6 attempts before the clip is recorded `failed`.
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_attempts: 6,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the given attempt, doubled per attempt and capped at
    /// `max`, with up to 25% jitter so a fleet of clips retrying the same
    /// failure don't all wake up on the same tick.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(self.max);
        let jitter_frac = rand::rng().random_range(0.0..0.25);
        capped.mul_f64(1.0 + jitter_frac)
    }
}

/// Connectivity state (§4.8). `Unknown` is the startup state and is
/// treated as connected for gating decisions — fail open rather than
/// blocking every cloud call before the first probe has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unknown,
    Connected,
    Disconnected,
}

fn gates_open(state: ConnState) -> bool {
    !matches!(state, ConnState::Disconnected)
}

/// Error a waiter in [`ConnectivityObserver::wait_for_connection`] sees
/// when it doesn't resolve by observing a `Connected` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("connectivity wait cancelled")]
    Cancelled,
    #[error("timed out waiting for connectivity")]
    TimedOut,
}

/// Tracks whether the network is believed reachable and lets waiters
/// block until connectivity is restored. The indexer's worker pool calls
/// [`wait_for_connection`] rather than busy-polling after a transient
/// network failure on a remote-provider call.
pub struct ConnectivityObserver {
    state: std::sync::Mutex<ConnState>,
    transitioned: Notify,
    cancelled: Notify,
    stopped: std::sync::atomic::AtomicBool,
}

impl Default for ConnectivityObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityObserver {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(ConnState::Unknown),
            transitioned: Notify::new(),
            cancelled: Notify::new(),
            stopped: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock().unwrap()
    }

    pub fn is_online(&self) -> bool {
        gates_open(self.state())
    }

    /// (Re)activate the observer after a [`stop`](Self::stop). Idempotent:
    /// calling `start` while already active, or repeatedly, has no effect
    /// beyond clearing the stopped flag.
    pub fn start(&self) {
        self.stopped.store(false, std::sync::atomic::Ordering::Release);
    }

    /// Cancel every waiter currently blocked in [`wait_for_connection`]
    /// with [`ConnectivityError::Cancelled`], and make every future call
    /// fail the same way until [`start`](Self::start) is called again.
    pub fn stop(&self) {
        self.stopped.store(true, std::sync::atomic::Ordering::Release);
        self.cancelled.notify_waiters();
    }

    /// Record an observed network failure. Does not itself wake waiters —
    /// only a transition to [`ConnState::Connected`] does, since going
    /// offline isn't something anyone is blocked waiting for.
    pub fn mark_offline(&self) {
        *self.state.lock().unwrap() = ConnState::Disconnected;
    }

    /// Record that the network is reachable again and release every
    /// waiter blocked in [`wait_for_connection`].
    pub fn mark_online(&self) {
        *self.state.lock().unwrap() = ConnState::Connected;
        self.transitioned.notify_waiters();
    }

    /// Resolve immediately if `state` is `Connected` or `Unknown` (fail
    /// open), otherwise block until a `Connected` transition, `stop()`, or
    /// `timeout` — whichever comes first.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<(), ConnectivityError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.stopped.load(std::sync::atomic::Ordering::Acquire) {
                return Err(ConnectivityError::Cancelled);
            }
            if gates_open(self.state()) {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ConnectivityError::TimedOut);
            }
            tokio::select! {
                _ = self.transitioned.notified() => {}
                _ = self.cancelled.notified() => return Err(ConnectivityError::Cancelled),
                _ = tokio::time::sleep(remaining) => return Err(ConnectivityError::TimedOut),
            }
        }
    }
}
