//! Deterministic virtual clock for driving timed sources in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::source::{TimedPeriodic, TimedSingle};
use crate::subscriber::Subscriber;
use crate::subscription::SubscriptionRef;
use crate::timer::Timer;

/// Erased driver handle the clock can tick.
trait Fire: Send + Sync {
  fn fire(&self);
  fn is_closed(&self) -> bool;
}

impl<S> Fire for TimedSingle<S>
where
  S: Subscriber<Item = u64> + Send + 'static,
{
  fn fire(&self) { TimedSingle::fire(self) }
  fn is_closed(&self) -> bool { TimedSingle::is_closed(self) }
}

impl<S> Fire for TimedPeriodic<S>
where
  S: Subscriber<Item = u64> + Send + 'static,
{
  fn fire(&self) { TimedPeriodic::fire(self) }
  fn is_closed(&self) -> bool { TimedPeriodic::is_closed(self) }
}

enum Scheduled {
  Once(Arc<dyn Fire>),
  Periodic { period: Duration, task: Arc<dyn Fire> },
}

struct Entry {
  at: Duration,
  kind: Scheduled,
}

struct InnerClock {
  now: Duration,
  queue: VecDeque<Entry>,
}

/// Virtual-time [`Timer`]: nothing fires until [`advance`] is called,
/// and everything due fires inline on the advancing thread, in schedule
/// order. Clones share one clock.
///
/// [`advance`]: ManualTimer::advance
#[derive(Clone)]
pub struct ManualTimer(Arc<Mutex<InnerClock>>);

impl Default for ManualTimer {
  fn default() -> Self { Self::new() }
}

impl ManualTimer {
  pub fn new() -> Self {
    ManualTimer(Arc::new(Mutex::new(InnerClock {
      now: Duration::ZERO,
      queue: VecDeque::new(),
    })))
  }

  /// Virtual time elapsed since the clock was created.
  pub fn now(&self) -> Duration { self.0.lock().unwrap().now }

  /// Moves virtual time forward, firing every task that falls due.
  pub fn advance(&self, d: Duration) {
    let to = self.now() + d;
    // fire outside the lock: callbacks may schedule or cancel
    while let Some(entry) = self.pop_expired(to) {
      match entry.kind {
        Scheduled::Once(task) => {
          if !task.is_closed() {
            task.fire();
          }
        }
        Scheduled::Periodic { period, task } => {
          if !task.is_closed() {
            task.fire();
            if !task.is_closed() {
              self.insert(Entry {
                at: entry.at + period,
                kind: Scheduled::Periodic { period, task },
              });
            }
          }
        }
      }
    }
    self.0.lock().unwrap().now = to;
  }

  fn pop_expired(&self, to: Duration) -> Option<Entry> {
    let mut inner = self.0.lock().unwrap();
    let due = inner.queue.front().is_some_and(|e| e.at <= to);
    due.then(|| {
      let entry = inner.queue.pop_front().expect("checked above");
      inner.now = entry.at;
      entry
    })
  }

  fn insert(&self, entry: Entry) {
    let mut inner = self.0.lock().unwrap();
    let at = entry.at;
    let position = inner
      .queue
      .make_contiguous()
      .binary_search_by(|e| e.at.cmp(&at));
    let position = match position {
      Ok(p) => p,
      Err(p) => p,
    };
    inner.queue.insert(position, entry);
  }
}

impl Timer for ManualTimer {
  fn single<S>(&self, subscriber: S, delay: Duration) -> SubscriptionRef
  where
    S: Subscriber<Item = u64> + Send + 'static,
  {
    let driver = TimedSingle::subscribe(subscriber, delay);
    self.insert(Entry {
      at: self.now() + delay,
      kind: Scheduled::Once(driver.clone()),
    });
    driver
  }

  fn interval<S>(
    &self,
    subscriber: S,
    period: Duration,
    delay: Option<Duration>,
  ) -> SubscriptionRef
  where
    S: Subscriber<Item = u64> + Send + 'static,
  {
    let driver = TimedPeriodic::subscribe(subscriber, period);
    self.insert(Entry {
      at: self.now() + delay.unwrap_or(period),
      kind: Scheduled::Periodic { period, task: driver.clone() },
    });
    driver
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::{delay_for, interval_at};
  use crate::test_subscriber::TestSubscriber;
  use crate::Publisher;

  #[test]
  fn tasks_fire_in_schedule_order() {
    let clock = ManualTimer::new();
    let late = TestSubscriber::new();
    let early = TestSubscriber::new();
    delay_for(clock.clone(), Duration::from_millis(30))
      .subscribe(late.clone());
    delay_for(clock.clone(), Duration::from_millis(10))
      .subscribe(early.clone());

    clock.advance(Duration::from_millis(20));
    early.assert_complete();
    late.assert_not_complete();

    clock.advance(Duration::from_millis(20));
    late.assert_complete();
  }

  #[test]
  fn one_advance_covers_many_periods() {
    let clock = ManualTimer::new();
    let probe = TestSubscriber::new();
    interval_at(
      clock.clone(),
      Duration::from_millis(0),
      Duration::from_millis(10),
    )
    .subscribe(probe.clone());

    clock.advance(Duration::from_millis(45));
    probe.assert_values(&[0, 1, 2, 3, 4]);
    assert_eq!(clock.now(), Duration::from_millis(45));
  }
}
