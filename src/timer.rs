//! External timer collaborator contract.
//!
//! The core never spawns threads; time-anchored sources delegate
//! scheduling to a [`Timer`], which drives the corresponding subscription
//! ([`TimedSingle`](crate::source::TimedSingle) /
//! [`TimedPeriodic`](crate::source::TimedPeriodic)) by calling `fire` at
//! the scheduled moments. Ticks of one schedule must not overlap; both
//! shipped providers serialize them.

use std::time::Duration;

use crate::subscriber::Subscriber;
use crate::subscription::SubscriptionRef;

pub trait Timer {
  /// Schedules one-shot delivery against `subscriber` after `delay`,
  /// returning the live subscription.
  fn single<S>(&self, subscriber: S, delay: Duration) -> SubscriptionRef
  where
    S: Subscriber<Item = u64> + Send + 'static;

  /// Schedules periodic delivery every `period`, first tick after
  /// `delay` (`None` means "delay equals period").
  fn interval<S>(
    &self,
    subscriber: S,
    period: Duration,
    delay: Option<Duration>,
  ) -> SubscriptionRef
  where
    S: Subscriber<Item = u64> + Send + 'static;
}

pub(crate) mod manual;
pub use manual::ManualTimer;

pub(crate) mod spawn;
pub use spawn::SpawnTimer;
