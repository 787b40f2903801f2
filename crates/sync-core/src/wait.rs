//! # State Poller
//!
//! Blocks the calling task until an asynchronously provisioned remote object
//! reaches a target lifecycle state.
//!
//! One call is one polling session described by a [`WaitSpec`]. On each tick
//! the caller's refresh function is invoked and its observation classified:
//!
//! - state in `target`: success (after `continuous_target_occurrence`
//!   consecutive hits)
//! - state in `pending`: keep polling
//! - any other state: fail fast with [`WaitError::UnexpectedState`]
//! - not found: success if `target` is empty (waiting for deletion), otherwise
//!   governed by the session's [`NotFoundPolicy`]
//! - refresh error: returned immediately; retrying transient I/O is the
//!   refresh function's job, never the poller's
//!
//! The poller sleeps `initial_delay` before the first refresh and at least
//! `min_interval` between refreshes. The whole session, including an in-flight
//! refresh, is bounded by `timeout` and can be aborted through a
//! [`CancellationToken`].

use crate::backoff::{DEFAULT_MAX_INTERVAL, FibonacciBackoff};
use crate::error::{BoxError, WaitError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default floor between two refreshes.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Narrow view of a remote object needed by the poller.
pub trait Status {
    /// Current lifecycle state label (e.g. "creating", "active").
    fn current_state(&self) -> &str;

    /// Whether the object exists. Implement for kinds whose API returns a
    /// tombstone instead of a not-found error.
    fn exists(&self) -> bool {
        true
    }
}

/// An observed remote object: opaque payload plus its state label.
///
/// Produced fresh by every refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedObject<T> {
    /// Whatever the refresh function fetched
    pub payload: T,
    /// Lifecycle state label of the payload
    pub state: String,
}

impl<T> SyncedObject<T> {
    /// Pair a payload with its state label.
    pub fn new(payload: T, state: impl Into<String>) -> Self {
        Self {
            payload,
            state: state.into(),
        }
    }

    /// Drop the state label and keep the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T> Status for SyncedObject<T> {
    fn current_state(&self) -> &str {
        &self.state
    }
}

/// How a not-found observation is treated while waiting for a non-empty target.
///
/// There is no default: whether an object may be briefly invisible after
/// creation depends on the remote API, so every call site must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// The object vanished before reaching the target: fail immediately
    Fail,
    /// Tolerate up to `max_checks` consecutive not-found observations
    Pending { max_checks: u32 },
}

/// Configuration of one polling session.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pending: Vec<String>,
    target: Vec<String>,
    not_found: NotFoundPolicy,
    timeout: Duration,
    min_interval: Duration,
    max_interval: Duration,
    initial_delay: Duration,
    poll_interval: Option<Duration>,
    continuous_target_occurrence: u32,
}

impl WaitSpec {
    /// Wait for one of `target` while tolerating `pending`.
    pub fn new<P, T, S>(pending: P, target: T, not_found: NotFoundPolicy, timeout: Duration) -> Self
    where
        P: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            not_found,
            timeout,
            min_interval: DEFAULT_MIN_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            initial_delay: Duration::ZERO,
            poll_interval: None,
            continuous_target_occurrence: 1,
        }
    }

    /// Wait for the object to disappear while it reports one of `pending`.
    pub fn for_deletion<P, S>(pending: P, timeout: Duration) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(pending, std::iter::empty::<S>(), NotFoundPolicy::Fail, timeout)
    }

    /// Floor on the time between two refreshes.
    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Ceiling for the growing interval (ignored with a fixed poll interval).
    #[must_use]
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Grace period before the first refresh.
    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Poll at a fixed interval (still never below `min_interval`).
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    /// Require `count` consecutive target observations before succeeding.
    #[must_use]
    pub fn with_continuous_target_occurrence(mut self, count: u32) -> Self {
        self.continuous_target_occurrence = count;
        self
    }

    /// States to keep polling through.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// States that end the wait successfully; empty when waiting for deletion.
    pub fn target(&self) -> &[String] {
        &self.target
    }

    /// Treatment of not-found observations.
    pub fn not_found(&self) -> NotFoundPolicy {
        self.not_found
    }

    /// Upper bound for the whole session.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Floor between two refreshes.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Grace period before the first refresh.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// True when disappearance of the object is the success condition.
    pub fn waits_for_absence(&self) -> bool {
        self.target.is_empty()
    }

    /// Check that the state sets are disjoint and the occurrence count is positive.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(state) = self.pending.iter().find(|s| self.target.contains(s)) {
            return Err(format!("state '{}' is both pending and target", state));
        }
        if self.continuous_target_occurrence == 0 {
            return Err("continuous target occurrence must be at least 1".to_string());
        }
        Ok(())
    }

    fn backoff(&self) -> FibonacciBackoff {
        match self.poll_interval {
            Some(interval) => FibonacciBackoff::fixed(interval.max(self.min_interval)),
            None => FibonacciBackoff::new(self.min_interval, self.max_interval),
        }
    }
}

/// Poll `refresh` until the object described by `spec` reaches a terminal outcome.
///
/// `refresh` returns `Ok(None)` (or an object whose [`Status::exists`] is
/// false) when the remote object does not exist. On success the last observed
/// object is returned, or `None` when disappearance was the target.
///
/// # Errors
///
/// See [`WaitError`]; every variant carries the last observed state.
pub async fn wait_until<O, E, F, Fut>(
    spec: &WaitSpec,
    cancel: &CancellationToken,
    mut refresh: F,
) -> Result<Option<O>, WaitError<O>>
where
    O: Status,
    E: Into<BoxError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<O>, E>>,
{
    spec.validate().map_err(WaitError::InvalidSpec)?;

    let deadline = Instant::now() + spec.timeout;
    let mut backoff = spec.backoff();
    let mut delay = spec.initial_delay;

    let mut last: Option<O> = None;
    let mut last_state: Option<String> = None;
    let mut not_found_checks: u32 = 0;
    let mut target_hits: u32 = 0;

    loop {
        let sleep_until = (Instant::now() + delay).min(deadline);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WaitError::Canceled { last_state }),
            () = tokio::time::sleep_until(sleep_until) => {}
        }

        if Instant::now() >= deadline {
            warn!(
                "Timed out after {:?} waiting for state {:?} (last state: {:?})",
                spec.timeout, spec.target, last_state
            );
            return Err(WaitError::TimedOut {
                timeout: spec.timeout,
                expected: spec.target.clone(),
                last_state,
                last,
            });
        }

        let observed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WaitError::Canceled { last_state }),
            result = tokio::time::timeout_at(deadline, refresh()) => match result {
                Ok(observed) => observed,
                Err(_elapsed) => {
                    warn!("Refresh still in flight when the {:?} timeout elapsed", spec.timeout);
                    return Err(WaitError::TimedOut {
                        timeout: spec.timeout,
                        expected: spec.target.clone(),
                        last_state,
                        last,
                    });
                }
            },
        };

        let object = match observed {
            Err(source) => {
                return Err(WaitError::Refresh {
                    last_state,
                    source: source.into(),
                });
            }
            Ok(object) => object.filter(|o| o.exists()),
        };

        match object {
            None => {
                target_hits = 0;
                if spec.waits_for_absence() {
                    debug!("Resource no longer exists, wait complete");
                    return Ok(None);
                }
                not_found_checks += 1;
                match spec.not_found {
                    NotFoundPolicy::Pending { max_checks } if not_found_checks <= max_checks => {
                        debug!(
                            "Resource not found yet ({}/{} checks), still waiting",
                            not_found_checks, max_checks
                        );
                    }
                    _ => {
                        return Err(WaitError::NotFound {
                            checks: not_found_checks,
                            expected: spec.target.clone(),
                            last_state,
                        });
                    }
                }
            }
            Some(object) => {
                not_found_checks = 0;
                let state = object.current_state().to_string();

                if spec.target.contains(&state) {
                    target_hits += 1;
                    if target_hits >= spec.continuous_target_occurrence {
                        debug!("Reached target state '{}'", state);
                        return Ok(Some(object));
                    }
                    debug!(
                        "Target state '{}' observed {}/{} times",
                        state, target_hits, spec.continuous_target_occurrence
                    );
                } else if spec.pending.contains(&state) {
                    target_hits = 0;
                    debug!("Waiting for state {:?}, current state '{}'", spec.target, state);
                } else {
                    return Err(WaitError::UnexpectedState {
                        state,
                        expected: spec.target.clone(),
                        last: Some(object),
                    });
                }

                last_state = Some(state);
                last = Some(object);
            }
        }

        delay = backoff.next_interval();
    }
}

/// Wait for a non-empty target and return the object observed in it.
///
/// # Errors
///
/// [`WaitError::InvalidSpec`] if no target is set, otherwise as
/// [`wait_until`].
pub async fn wait_for_state<O, E, F, Fut>(
    spec: &WaitSpec,
    cancel: &CancellationToken,
    refresh: F,
) -> Result<O, WaitError<O>>
where
    O: Status,
    E: Into<BoxError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<O>, E>>,
{
    if spec.waits_for_absence() {
        return Err(WaitError::InvalidSpec(
            "waiting for a state requires a non-empty target".to_string(),
        ));
    }

    match wait_until(spec, cancel, refresh).await? {
        Some(object) => Ok(object),
        // Unreachable with a non-empty target
        None => Err(WaitError::NotFound {
            checks: 0,
            expected: spec.target.clone(),
            last_state: None,
        }),
    }
}

/// Wait for the object to disappear.
///
/// # Errors
///
/// [`WaitError::InvalidSpec`] if a target is set, otherwise as
/// [`wait_until`].
pub async fn wait_for_absence<O, E, F, Fut>(
    spec: &WaitSpec,
    cancel: &CancellationToken,
    refresh: F,
) -> Result<(), WaitError<O>>
where
    O: Status,
    E: Into<BoxError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<O>, E>>,
{
    if !spec.waits_for_absence() {
        return Err(WaitError::InvalidSpec(
            "waiting for absence requires an empty target".to_string(),
        ));
    }

    wait_until(spec, cancel, refresh).await.map(|_| ())
}
