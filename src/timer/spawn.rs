use std::time::Duration;

use futures::task::{Spawn, SpawnExt};
use futures::FutureExt;
use futures_timer::Delay;

use crate::source::{TimedPeriodic, TimedSingle};
use crate::subscriber::Subscriber;
use crate::subscription::SubscriptionRef;
use crate::timer::Timer;

/// [`Timer`] scheduling on any `futures` executor.
///
/// Cancellation drops the spawned task's remote handle, which tears the
/// scheduled future down; ticks are serialized because each schedule is
/// a single task.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use futures::executor::ThreadPool;
/// use rxflow::prelude::*;
///
/// let pool = ThreadPool::new().unwrap();
/// let timer = SpawnTimer::new(pool);
/// delay_for(timer, Duration::from_secs(1))
///   .subscribe(subscriber_fn(|v| println!("{v}")));
/// ```
#[derive(Clone)]
pub struct SpawnTimer<P>(P);

impl<P: Spawn> SpawnTimer<P> {
  pub fn new(pool: P) -> Self { SpawnTimer(pool) }
}

impl<P: Spawn> Timer for SpawnTimer<P> {
  fn single<S>(&self, subscriber: S, delay: Duration) -> SubscriptionRef
  where
    S: Subscriber<Item = u64> + Send + 'static,
  {
    let driver = TimedSingle::subscribe(subscriber, delay);
    let tick = driver.clone();
    let handle = self
      .0
      .spawn_with_handle(Delay::new(delay).map(move |_| tick.fire()))
      .expect("spawn timer task");
    driver.attach(move || drop(handle));
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
    let tick = driver.clone();
    let first = delay.unwrap_or(period);
    let handle = self
      .0
      .spawn_with_handle(async move {
        Delay::new(first).await;
        loop {
          tick.fire();
          if tick.is_closed() {
            break;
          }
          Delay::new(period).await;
        }
      })
      .expect("spawn timer task");
    driver.attach(move || drop(handle));
    driver
  }
}
