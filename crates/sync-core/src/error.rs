//! Error types shared by the synchronization core.
//!
//! Every failure carries enough structure (observed state, last snapshot,
//! stale token) for the caller to decide between retrying, reporting, or
//! giving up. Nothing in this crate retries on its own.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used where the concrete fetch error type is erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while encoding or decoding composite identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Part count does not match the expected arity
    #[error("unexpected format for ID ({id}), expected {expected} parts, got {actual}")]
    Arity {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// A part is empty or contains a reserved character
    #[error("invalid part {index} of ID ({id}): {reason}")]
    InvalidPart {
        id: String,
        index: usize,
        reason: String,
    },

    /// Dangling or unknown escape sequence
    #[error("invalid escape sequence at byte {position} of ID ({id})")]
    InvalidEscape { id: String, position: usize },
}

/// Errors produced by a named-lock registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Cancellation fired while waiting for the lock
    #[error("canceled while waiting for lock on {identity}")]
    Canceled { identity: String },
}

/// Terminal failure of a state wait.
///
/// `O` is the payload type observed by the poller; variants that happen after
/// at least one observation carry the last snapshot so callers can report it.
#[derive(Debug, Error)]
pub enum WaitError<O> {
    /// The wait configuration violates an invariant (e.g. overlapping state sets)
    #[error("invalid wait configuration: {0}")]
    InvalidSpec(String),

    /// A state outside both the pending and target sets was observed
    #[error("unexpected state '{state}', wanted target '{}'", .expected.join(", "))]
    UnexpectedState {
        state: String,
        expected: Vec<String>,
        last: Option<O>,
    },

    /// The object disappeared (or never appeared) while a target state was expected
    #[error("couldn't find resource ({checks} consecutive checks), wanted target '{}'", .expected.join(", "))]
    NotFound {
        checks: u32,
        expected: Vec<String>,
        last_state: Option<String>,
    },

    /// The timeout elapsed while the object was still pending
    #[error("timeout while waiting for state to become '{}' (last state: '{}', timeout: {})", .expected.join(", "), fmt_state(.last_state.as_deref()), fmt_duration(.timeout))]
    TimedOut {
        timeout: Duration,
        expected: Vec<String>,
        last_state: Option<String>,
        last: Option<O>,
    },

    /// The caller's cancellation signal fired
    #[error("wait canceled (last state: '{}')", fmt_state(.last_state.as_deref()))]
    Canceled { last_state: Option<String> },

    /// The refresh function itself failed
    #[error("refreshing resource state: {source}")]
    Refresh {
        last_state: Option<String>,
        #[source]
        source: BoxError,
    },
}

impl<O> WaitError<O> {
    /// Returns true if the wait ran out of time while still pending.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Returns true if the caller canceled the wait.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    /// Last state label observed before the wait ended, if any.
    pub fn last_state(&self) -> Option<&str> {
        match self {
            Self::InvalidSpec(_) => None,
            Self::UnexpectedState { state, .. } => Some(state),
            Self::NotFound { last_state, .. }
            | Self::TimedOut { last_state, .. }
            | Self::Canceled { last_state }
            | Self::Refresh { last_state, .. } => last_state.as_deref(),
        }
    }

    /// Takes the last observed object out of the error, if one was recorded.
    pub fn into_last(self) -> Option<O> {
        match self {
            Self::UnexpectedState { last, .. } | Self::TimedOut { last, .. } => last,
            _ => None,
        }
    }
}

/// Failure reported by a remote compare-and-swap write.
#[derive(Debug, Error)]
pub enum WriteError<E> {
    /// The presented version token is no longer current
    #[error("precondition failed: version token is no longer current")]
    PreconditionFailed,

    /// Any other remote failure
    #[error(transparent)]
    Remote(E),
}

/// Failure of a version-guarded mutation.
#[derive(Debug, Error)]
pub enum ConcurrencyError<E> {
    /// The named lock could not be acquired
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Reading the current value and token failed
    #[error("reading {identity}: {source}")]
    Read {
        identity: String,
        #[source]
        source: E,
    },

    /// The caller's build step rejected the current value
    #[error("preparing write for {identity}: {source}")]
    Build {
        identity: String,
        #[source]
        source: BoxError,
    },

    /// The remote rejected the presented version token
    #[error("{identity} was modified concurrently (version {token} is stale), re-read and retry")]
    ConcurrentModification { identity: String, token: String },

    /// The write failed for a reason other than a precondition mismatch
    #[error("writing {identity}: {source}")]
    Write {
        identity: String,
        #[source]
        source: E,
    },
}

impl<E> ConcurrencyError<E> {
    /// Returns true if another writer won the compare-and-swap.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

fn fmt_state(state: Option<&str>) -> &str {
    state.unwrap_or("")
}

fn fmt_duration(d: &Duration) -> impl fmt::Display {
    struct Human(Duration);
    impl fmt::Display for Human {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let secs = self.0.as_secs();
            if secs >= 60 {
                write!(f, "{}m{}s", secs / 60, secs % 60)
            } else if secs > 0 {
                write!(f, "{}s", secs)
            } else {
                write!(f, "{}ms", self.0.as_millis())
            }
        }
    }
    Human(*d)
}
