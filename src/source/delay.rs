use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::demand::Demand;
use crate::error::FlowError;
use crate::graph::{
  Cancellable, Completable, GraphNode, Introspectable, Timeable,
};
use crate::subscriber::Subscriber;
use crate::subscription::{Control, Subscription};
use crate::timer::Timer;
use crate::Publisher;

/// Emits `0` once, `delay` after subscription, then completes.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rxflow::prelude::*;
///
/// let clock = ManualTimer::new();
/// let probe = TestSubscriber::new();
/// delay_for(clock.clone(), Duration::from_millis(50))
///   .subscribe(probe.clone());
/// clock.advance(Duration::from_millis(60));
/// probe.assert_values(&[0]).assert_complete();
/// ```
pub fn delay_for<T: Timer>(timer: T, delay: Duration) -> DelayFlow<T> {
  DelayFlow { timer, delay }
}

pub struct DelayFlow<T> {
  timer: T,
  delay: Duration,
}

impl<T: Timer> Publisher for DelayFlow<T> {
  type Item = u64;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = u64> + Send + 'static,
  {
    self.timer.single(subscriber, self.delay);
  }
}

type Dereg = Box<dyn FnOnce() + Send>;

/// One-shot timed subscription driver.
///
/// Delivery policy: the value is time-anchored and delivered on fire
/// regardless of accumulated demand; when no demand exists at fire time
/// a `MissingBackpressure` protocol error is surfaced instead. The
/// one-shot claim doubles as the emission lease, so a fire racing a
/// cancel (or a bad-request fault) resolves to exactly one of delivery,
/// suppression or error.
pub struct TimedSingle<S> {
  ctl: Control,
  fired: AtomicBool,
  delay: Duration,
  cell: UnsafeCell<Option<S>>,
  task: Mutex<Option<Dereg>>,
}

// The subscriber cell is entered only by the winner of the one-shot
// claim (or the subscribing thread before arming).
unsafe impl<S: Send> Send for TimedSingle<S> {}
unsafe impl<S: Send> Sync for TimedSingle<S> {}

impl<S> TimedSingle<S>
where
  S: Subscriber<Item = u64> + Send + 'static,
{
  /// Builds the driver and delivers `on_subscribe`. The timer provider
  /// then [`attach`](Self::attach)es its deregistration hook and calls
  /// [`fire`](Self::fire) at expiry.
  pub fn subscribe(subscriber: S, delay: Duration) -> Arc<Self> {
    let sub = Arc::new(TimedSingle {
      ctl: Control::new(),
      fired: AtomicBool::new(false),
      delay,
      cell: UnsafeCell::new(Some(subscriber)),
      task: Mutex::new(None),
    });
    {
      let cell = unsafe { &mut *sub.cell.get() };
      if let Some(s) = cell.as_mut() {
        s.on_subscribe(sub.clone());
      }
    }
    sub.ctl.arm();
    // a protocol violation during on_subscribe is delivered right away
    if sub.ctl.has_fault() {
      sub.deliver_claimed();
    }
    sub
  }

  /// Registers the hook that removes the scheduled task. Runs it
  /// immediately when the subscription is already over.
  pub fn attach(&self, dereg: impl FnOnce() + Send + 'static) {
    if self.ctl.is_cancelled() || self.fired.load(Ordering::Acquire) {
      dereg();
      return;
    }
    *self.task.lock().unwrap() = Some(Box::new(dereg));
  }

  /// True once the value was delivered, the flow terminated or the
  /// subscriber cancelled.
  pub fn is_closed(&self) -> bool {
    self.ctl.is_done()
      || self.ctl.is_cancelled()
      || self.fired.load(Ordering::Acquire)
  }

  fn claim(&self) -> bool {
    self
      .fired
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  fn deregister(&self) {
    if let Some(dereg) = self.task.lock().unwrap().take() {
      dereg();
    }
  }

  /// Called by the timer at expiry. A cancel observed before the claim
  /// suppresses delivery entirely.
  pub fn fire(&self) {
    if !self.claim() {
      return;
    }
    // safety: the claim grants exclusive access to the cell
    let cell = unsafe { &mut *self.cell.get() };
    if self.ctl.is_cancelled() {
      *cell = None;
    } else if let Some(fault) = self.ctl.take_fault() {
      self.terminate_err(cell, fault);
    } else if self.ctl.demand.get() == 0 {
      self.terminate_err(cell, FlowError::MissingBackpressure { tick: 0 });
    } else {
      self.ctl.demand.produced(1);
      if let Some(s) = cell.as_mut() {
        s.on_next(0);
      }
      if self.ctl.is_cancelled() {
        *cell = None;
      } else {
        self.ctl.mark_done();
        if let Some(mut s) = cell.take() {
          s.on_complete();
        }
      }
    }
    self.deregister();
  }

  fn terminate_err(&self, cell: &mut Option<S>, err: FlowError) {
    self.ctl.record_failure(&err);
    self.ctl.mark_done();
    if let Some(mut s) = cell.take() {
      s.on_error(err);
    }
  }

  fn deliver_claimed(&self) {
    if !self.claim() {
      return;
    }
    let cell = unsafe { &mut *self.cell.get() };
    if self.ctl.is_cancelled() {
      *cell = None;
    } else if let Some(fault) = self.ctl.take_fault() {
      self.terminate_err(cell, fault);
    }
    self.deregister();
  }
}

impl<S> Subscription for TimedSingle<S>
where
  S: Subscriber<Item = u64> + Send + 'static,
{
  fn request(&self, n: u64) {
    if self.is_closed() {
      return;
    }
    match Demand::validate(n) {
      Ok(()) => {
        self.ctl.demand.add(n);
      }
      Err(violation) => {
        self.ctl.raise(violation);
        if self.ctl.is_armed() {
          self.deliver_claimed();
        }
      }
    }
  }

  fn cancel(&self) {
    self.ctl.cancel();
    self.deregister();
  }
}

impl<S> Timeable for TimedSingle<S> {
  fn period(&self) -> Option<Duration> { Some(self.delay) }
}

impl<S> Cancellable for TimedSingle<S> {
  fn is_cancelled(&self) -> bool { self.ctl.is_cancelled() }
}

impl<S> Completable for TimedSingle<S> {
  fn is_started(&self) -> bool {
    self.ctl.is_armed() && !self.ctl.is_done()
  }
  fn is_terminated(&self) -> bool { self.ctl.is_done() }
}

impl<S> Introspectable for TimedSingle<S> {
  fn name(&self) -> Option<&str> { Some("delay") }
  fn failed(&self) -> Option<String> { self.ctl.failure() }
}

impl<S> GraphNode for TimedSingle<S>
where
  S: Subscriber<Item = u64> + Send + 'static,
{
  fn as_timeable(&self) -> Option<&dyn Timeable> { Some(self) }
  fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
  fn as_completable(&self) -> Option<&dyn Completable> { Some(self) }
  fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_subscriber::TestSubscriber;
  use crate::timer::ManualTimer;

  #[test]
  fn fires_once_and_completes() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    delay_for(clock.clone(), Duration::from_millis(100))
      .subscribe(probe.clone());

    clock.advance(Duration::from_millis(99));
    probe.assert_no_values().assert_not_complete();

    clock.advance(Duration::from_millis(2));
    probe.assert_values(&[0]).assert_complete().assert_no_error();
  }

  #[test]
  fn fires_without_demand_surfaces_protocol_error() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::with_request(0);
    delay_for(clock.clone(), Duration::from_millis(10))
      .subscribe(probe.clone());

    clock.advance(Duration::from_millis(20));
    probe
      .assert_no_values()
      .assert_not_complete()
      .assert_error(|e| matches!(e, FlowError::MissingBackpressure { .. }));
  }

  #[test]
  fn cancel_before_fire_suppresses_delivery() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    delay_for(clock.clone(), Duration::from_millis(10))
      .subscribe(probe.clone());

    probe.cancel();
    clock.advance(Duration::from_millis(20));
    probe.assert_no_values().assert_not_complete().assert_no_error();
  }

  #[test]
  fn bad_request_terminates_before_fire() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    delay_for(clock.clone(), Duration::from_millis(10))
      .subscribe(probe.clone());

    probe.request(0);
    probe.assert_error(|e| matches!(e, FlowError::BadRequest { .. }));
    // the claim is spent: the later fire is suppressed
    clock.advance(Duration::from_millis(20));
    probe.assert_no_values().assert_not_complete();
  }
}
