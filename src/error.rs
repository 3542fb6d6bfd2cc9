//! Error model for the signalling core.
//!
//! Two classes cross the wire as `on_error` signals: protocol violations
//! raised by the core itself and failures returned by user callbacks.
//! Unrecoverable conditions (panics) are never caught; they unwind past
//! the subscription frame and abandon it.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Boxed user-supplied failure cause.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Terminal error delivered through `Subscriber::on_error`.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum FlowError {
  /// `request(n)` with a non-positive amount.
  #[error("request amount must be strictly positive but was {requested}")]
  BadRequest { requested: u64 },

  /// A time-anchored source had a value ready but no outstanding demand.
  #[error("could not emit tick {tick} due to lack of downstream requests")]
  MissingBackpressure { tick: u64 },

  /// A combiner produced no value where one was required.
  #[error("the combiner returned a null value")]
  NullCombinerResult,

  /// A user callback (combiner, subscriber hook) failed.
  #[error("user callback failed: {0}")]
  User(#[source] BoxError),
}

impl FlowError {
  pub fn user(cause: impl Into<BoxError>) -> Self {
    FlowError::User(cause.into())
  }

  /// True for violations of the signalling protocol itself, as opposed
  /// to failures originating in user code.
  pub fn is_protocol(&self) -> bool {
    matches!(
      self,
      FlowError::BadRequest { .. }
        | FlowError::MissingBackpressure { .. }
        | FlowError::NullCombinerResult
    )
  }

  /// Short stable label for logs.
  pub fn as_label(&self) -> &'static str {
    match self {
      FlowError::BadRequest { .. } => "bad_request",
      FlowError::MissingBackpressure { .. } => "missing_backpressure",
      FlowError::NullCombinerResult => "null_combiner_result",
      FlowError::User(_) => "user",
    }
  }
}

/// One-shot parking slot for an error that must be delivered under the
/// emission lease rather than on the thread that discovered it.
///
/// `set` is first-write-wins; `take` hands the fault to the lease holder
/// exactly once. The flag makes the hot-path check a single atomic load.
#[derive(Debug, Default)]
pub(crate) struct FaultSlot {
  raised: AtomicBool,
  slot: Mutex<Option<FlowError>>,
}

impl FaultSlot {
  pub fn new() -> Self { Self::default() }

  #[inline]
  pub fn is_raised(&self) -> bool { self.raised.load(Ordering::Acquire) }

  /// Parks `err`. Returns the error back when a fault was already parked
  /// (the caller decides whether to drop it).
  pub fn set(&self, err: FlowError) -> Option<FlowError> {
    let mut slot = self.slot.lock().unwrap();
    if slot.is_some() {
      return Some(err);
    }
    *slot = Some(err);
    self.raised.store(true, Ordering::Release);
    None
  }

  pub fn take(&self) -> Option<FlowError> {
    if !self.is_raised() {
      return None;
    }
    self.slot.lock().unwrap().take()
  }
}
