use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FlowError;

/// Demand value treated as "effectively unbounded".
///
/// Once a demand counter reaches this sentinel it stays there: further
/// additions keep it saturated and [`Demand::produced`] no longer
/// decrements.
pub const UNBOUNDED: u64 = u64::MAX;

/// Atomic demand accountant shared between a producer's emission loop and
/// the subscriber's `request` calls.
///
/// `add` returning the previous value is what makes the emission lease
/// work without locks: the caller that observes the zero-to-positive
/// transition becomes the emitter, every concurrent requester only bumps
/// the counter and returns.
#[derive(Debug, Default)]
pub struct Demand(AtomicU64);

impl Demand {
  pub fn new() -> Self { Demand(AtomicU64::new(0)) }

  /// A request for zero items is a protocol violation. It is reported to
  /// the subscriber as an error, never panicked.
  pub fn validate(n: u64) -> Result<(), FlowError> {
    if n == 0 {
      Err(FlowError::BadRequest { requested: n })
    } else {
      Ok(())
    }
  }

  /// Saturating addition, returns the value held *before* the addition.
  /// Sticky at [`UNBOUNDED`].
  pub fn add(&self, n: u64) -> u64 {
    let mut current = self.0.load(Ordering::Acquire);
    loop {
      if current == UNBOUNDED {
        return UNBOUNDED;
      }
      let next = current.saturating_add(n);
      match self.0.compare_exchange_weak(
        current,
        next,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => return current,
        Err(observed) => current = observed,
      }
    }
  }

  /// Records `e` emissions, returns the value held *after* the
  /// subtraction. No-op at [`UNBOUNDED`].
  pub fn produced(&self, e: u64) -> u64 {
    let mut current = self.0.load(Ordering::Acquire);
    loop {
      if current == UNBOUNDED {
        return UNBOUNDED;
      }
      debug_assert!(e <= current, "produced more than was requested");
      let next = current.saturating_sub(e);
      match self.0.compare_exchange_weak(
        current,
        next,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => return next,
        Err(observed) => current = observed,
      }
    }
  }

  pub fn get(&self) -> u64 { self.0.load(Ordering::Acquire) }

  /// Drains the counter to zero, returning what was held. Used by the
  /// pre-subscription demand stash.
  pub fn take(&self) -> u64 { self.0.swap(0, Ordering::AcqRel) }

  pub fn is_unbounded(&self) -> bool { self.get() == UNBOUNDED }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_returns_previous() {
    let d = Demand::new();
    assert_eq!(d.add(5), 0);
    assert_eq!(d.add(3), 5);
    assert_eq!(d.get(), 8);
  }

  #[test]
  fn saturates_and_sticks() {
    let d = Demand::new();
    d.add(2);
    assert_eq!(d.add(UNBOUNDED), 2);
    assert!(d.is_unbounded());
    // sticky: neither addition nor production moves it
    assert_eq!(d.add(1), UNBOUNDED);
    assert_eq!(d.produced(10), UNBOUNDED);
    assert_eq!(d.get(), UNBOUNDED);
  }

  #[test]
  fn produced_returns_remaining() {
    let d = Demand::new();
    d.add(10);
    assert_eq!(d.produced(4), 6);
    assert_eq!(d.produced(6), 0);
  }

  #[test]
  fn validate_rejects_zero() {
    assert!(Demand::validate(0).is_err());
    assert!(Demand::validate(1).is_ok());
  }

  #[test]
  fn take_drains() {
    let d = Demand::new();
    d.add(7);
    assert_eq!(d.take(), 7);
    assert_eq!(d.get(), 0);
  }
}
