use std::cell::UnsafeCell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::demand::{Demand, UNBOUNDED};
use crate::error::FlowError;
use crate::graph::{
  Backpressurable, Cancellable, Completable, GraphNode, Introspectable,
  Timeable,
};
use crate::subscriber::Subscriber;
use crate::subscription::{Control, Subscription};
use crate::timer::Timer;
use crate::Publisher;

/// Emits an increasing counter starting at `0`, every `period`, first
/// tick one `period` after subscription.
pub fn interval<T: Timer>(timer: T, period: Duration) -> IntervalFlow<T> {
  IntervalFlow { timer, period, delay: None }
}

/// Like [`interval`] with an explicit initial delay.
pub fn interval_at<T: Timer>(
  timer: T,
  delay: Duration,
  period: Duration,
) -> IntervalFlow<T> {
  IntervalFlow { timer, period, delay: Some(delay) }
}

pub struct IntervalFlow<T> {
  timer: T,
  period: Duration,
  delay: Option<Duration>,
}

impl<T: Timer> Publisher for IntervalFlow<T> {
  type Item = u64;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = u64> + Send + 'static,
  {
    self.timer.interval(subscriber, self.period, self.delay);
  }
}

type Dereg = Box<dyn FnOnce() + Send>;

struct PeriodicDriver<S> {
  subscriber: Option<S>,
  counter: u64,
}

/// Periodic timed subscription driver.
///
/// The interval source cannot buffer ticks: a tick arriving with no
/// outstanding demand terminates the flow with a `MissingBackpressure`
/// protocol error. There is no completion; the flow ends by error or
/// cancellation. The tick callback is the emission lease — the timer
/// contract guarantees ticks of one schedule never overlap.
pub struct TimedPeriodic<S> {
  ctl: Control,
  period: Duration,
  cell: UnsafeCell<PeriodicDriver<S>>,
  task: Mutex<Option<Dereg>>,
}

// The driver cell is entered only from tick callbacks, which the timer
// serializes, or from the subscribing thread before arming.
unsafe impl<S: Send> Send for TimedPeriodic<S> {}
unsafe impl<S: Send> Sync for TimedPeriodic<S> {}

impl<S> TimedPeriodic<S>
where
  S: Subscriber<Item = u64> + Send + 'static,
{
  /// Builds the driver and delivers `on_subscribe`. The timer provider
  /// then [`attach`](Self::attach)es its deregistration hook and calls
  /// [`fire`](Self::fire) on every tick.
  pub fn subscribe(subscriber: S, period: Duration) -> Arc<Self> {
    let sub = Arc::new(TimedPeriodic {
      ctl: Control::new(),
      period,
      cell: UnsafeCell::new(PeriodicDriver {
        subscriber: Some(subscriber),
        counter: 0,
      }),
      task: Mutex::new(None),
    });
    {
      let driver = unsafe { &mut *sub.cell.get() };
      if let Some(s) = driver.subscriber.as_mut() {
        s.on_subscribe(sub.clone());
      }
    }
    sub.ctl.arm();
    sub
  }

  /// Registers the hook that removes the scheduled task. Runs it
  /// immediately when the subscription is already over.
  pub fn attach(&self, dereg: impl FnOnce() + Send + 'static) {
    if self.is_closed() {
      dereg();
      return;
    }
    *self.task.lock().unwrap() = Some(Box::new(dereg));
  }

  pub fn is_closed(&self) -> bool {
    self.ctl.is_done() || self.ctl.is_cancelled()
  }

  fn deregister(&self) {
    if let Some(dereg) = self.task.lock().unwrap().take() {
      dereg();
    }
  }

  /// Called by the timer on every tick.
  pub fn fire(&self) {
    if self.ctl.is_done() {
      self.deregister();
      return;
    }
    // safety: tick callbacks are serialized by the timer
    let driver = unsafe { &mut *self.cell.get() };
    if self.ctl.is_cancelled() {
      driver.subscriber = None;
      self.deregister();
      return;
    }
    if let Some(fault) = self.ctl.take_fault() {
      self.terminate_err(driver, fault);
      return;
    }
    let tick = driver.counter;
    if self.ctl.demand.get() == 0 {
      self.terminate_err(driver, FlowError::MissingBackpressure { tick });
      return;
    }
    self.ctl.demand.produced(1);
    driver.counter += 1;
    if let Some(s) = driver.subscriber.as_mut() {
      s.on_next(tick);
    }
  }

  fn terminate_err(&self, driver: &mut PeriodicDriver<S>, err: FlowError) {
    self.ctl.record_failure(&err);
    self.ctl.mark_done();
    if let Some(mut s) = driver.subscriber.take() {
      s.on_error(err);
    }
    self.deregister();
  }
}

impl<S> Subscription for TimedPeriodic<S>
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
      // delivered at the next tick, which is the lease
      Err(violation) => self.ctl.raise(violation),
    }
  }

  fn cancel(&self) {
    self.ctl.cancel();
    self.deregister();
  }
}

impl<S> Timeable for TimedPeriodic<S> {
  fn period(&self) -> Option<Duration> { Some(self.period) }
}

impl<S> Backpressurable for TimedPeriodic<S> {
  fn capacity(&self) -> Option<u64> { Some(UNBOUNDED) }
}

impl<S> Cancellable for TimedPeriodic<S> {
  fn is_cancelled(&self) -> bool { self.ctl.is_cancelled() }
}

impl<S> Completable for TimedPeriodic<S> {
  fn is_started(&self) -> bool {
    self.ctl.is_armed() && !self.ctl.is_done()
  }
  fn is_terminated(&self) -> bool { self.ctl.is_done() }
}

impl<S> Introspectable for TimedPeriodic<S> {
  fn name(&self) -> Option<&str> { Some("interval") }
  fn failed(&self) -> Option<String> { self.ctl.failure() }
}

impl<S> GraphNode for TimedPeriodic<S>
where
  S: Subscriber<Item = u64> + Send + 'static,
{
  fn as_timeable(&self) -> Option<&dyn Timeable> { Some(self) }
  fn as_backpressurable(&self) -> Option<&dyn Backpressurable> { Some(self) }
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
  fn ticks_count_up_from_zero() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    interval(clock.clone(), Duration::from_millis(10))
      .subscribe(probe.clone());

    clock.advance(Duration::from_millis(35));
    probe.assert_values(&[0, 1, 2]).assert_not_complete();

    clock.advance(Duration::from_millis(10));
    probe.assert_values(&[0, 1, 2, 3]);
  }

  #[test]
  fn initial_delay_defaults_to_period() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    interval(clock.clone(), Duration::from_millis(20))
      .subscribe(probe.clone());

    clock.advance(Duration::from_millis(19));
    probe.assert_no_values();
    clock.advance(Duration::from_millis(2));
    probe.assert_values(&[0]);
  }

  #[test]
  fn explicit_delay_offsets_the_first_tick() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    interval_at(
      clock.clone(),
      Duration::from_millis(5),
      Duration::from_millis(20),
    )
    .subscribe(probe.clone());

    clock.advance(Duration::from_millis(6));
    probe.assert_values(&[0]);
    clock.advance(Duration::from_millis(20));
    probe.assert_values(&[0, 1]);
  }

  #[test]
  fn tick_without_demand_errors() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::with_request(2);
    interval(clock.clone(), Duration::from_millis(10))
      .subscribe(probe.clone());

    clock.advance(Duration::from_millis(25));
    probe.assert_values(&[0, 1]).assert_not_complete();

    // demand exhausted: the third tick cannot buffer
    clock.advance(Duration::from_millis(10));
    probe
      .assert_values(&[0, 1])
      .assert_error(|e| {
        matches!(e, FlowError::MissingBackpressure { tick: 2 })
      })
      .assert_not_complete();

    // schedule stopped: no further signals
    clock.advance(Duration::from_millis(50));
    probe.assert_values(&[0, 1]);
  }

  #[test]
  fn bad_request_is_delivered_at_the_next_tick() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    interval(clock.clone(), Duration::from_millis(10))
      .subscribe(probe.clone());

    probe.request(0);
    // parked until the tick, which is the lease
    probe.assert_no_error();
    clock.advance(Duration::from_millis(15));
    probe
      .assert_no_values()
      .assert_error(|e| matches!(e, FlowError::BadRequest { .. }));
  }

  #[test]
  fn walker_reads_period_and_capacity() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::with_request(1);
    interval(clock, Duration::from_millis(10)).subscribe(probe.clone());

    let handle = probe.handle().expect("subscribed");
    let graph = crate::graph::scan(handle.as_graph_node());
    let node = graph.nodes().next().expect("one node");
    assert_eq!(node.name(), "interval");
    assert_eq!(node.period(), Some(10));
    assert_eq!(node.capacity(), Some(UNBOUNDED));
    assert!(graph.to_json().contains("\"capacity\":\"unbounded\""));
  }

  #[test]
  fn cancel_stops_the_schedule() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    interval(clock.clone(), Duration::from_millis(10))
      .subscribe(probe.clone());

    clock.advance(Duration::from_millis(15));
    probe.assert_values(&[0]);
    probe.cancel();
    clock.advance(Duration::from_millis(50));
    probe.assert_values(&[0]).assert_not_complete().assert_no_error();
  }
}
