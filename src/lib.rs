//! Reactive Streams signalling core.
//!
//! The push/pull fabric between an asynchronous producer and an
//! asynchronous consumer under bounded demand: the
//! [`Publisher`]/[`Subscriber`](subscriber::Subscriber)/
//! [`Subscription`](subscription::Subscription) contract, a set of
//! source drivers built on lock-free demand accounting
//! ([`source`]), an optional synchronous fusion contract ([`fusion`])
//! and a capability-probing introspection walker over live pipelines
//! ([`graph`]).

pub mod demand;
pub mod error;
pub mod fusion;
pub mod graph;
pub mod source;
pub mod subscriber;
pub mod subscription;
pub mod test_subscriber;
pub mod timer;

use subscriber::Subscriber;

/// A Publisher is the source of a signal flow. Subscribing consumes the
/// publisher and wires the subscriber to a fresh
/// [`Subscription`](subscription::Subscription), delivered through
/// `on_subscribe` before any other signal.
pub trait Publisher {
  type Item;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = Self::Item> + Send + 'static;
}

pub mod prelude {
  pub use crate::demand::{Demand, UNBOUNDED};
  pub use crate::error::{BoxError, FlowError};
  pub use crate::fusion::{IterQueue, SyncQueue};
  pub use crate::graph;
  pub use crate::graph::{scan, subscan, Graph, GraphNode};
  pub use crate::source::*;
  pub use crate::subscriber::{subscriber_fn, FnSubscriber, Subscriber};
  pub use crate::subscription::{
    EmptySubscription, FlowSubscription, Subscription, SubscriptionRef,
  };
  pub use crate::test_subscriber::TestSubscriber;
  pub use crate::timer::{ManualTimer, SpawnTimer, Timer};
  pub use crate::Publisher;
}
