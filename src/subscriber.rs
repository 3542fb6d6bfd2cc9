use std::marker::PhantomData;

use tracing::warn;

use crate::demand::UNBOUNDED;
use crate::error::FlowError;
use crate::subscription::SubscriptionRef;

/// A Subscriber is the sink of a signal flow. One callback for each kind
/// of signal: `on_next`, `on_error` and `on_complete`, preceded by exactly
/// one `on_subscribe` carrying the control handle.
///
/// `Item` is the type of the elements being emitted.
///
/// Implementations may call `request`/`cancel` on the received
/// subscription from inside any callback; the drivers in this crate
/// tolerate that reentrancy.
pub trait Subscriber {
  type Item;
  fn on_subscribe(&mut self, subscription: SubscriptionRef);
  fn on_next(&mut self, value: Self::Item);
  fn on_error(&mut self, err: FlowError);
  fn on_complete(&mut self);
}

/// Creates a subscriber from a closure, requesting unbounded demand at
/// subscribe time.
///
/// # Examples
///
/// ```
/// use rxflow::prelude::*;
///
/// from_iter(1..4).subscribe(subscriber_fn(|v| println!("{v}")));
/// ```
pub fn subscriber_fn<Item, N>(next: N) -> FnSubscriber<N, fn(FlowError), fn(), Item>
where
  N: FnMut(Item),
{
  FnSubscriber { next, error: None, complete: None, _item: PhantomData }
}

/// Closure-backed [`Subscriber`]. Built by [`subscriber_fn`]; error and
/// completion hooks are optional.
pub struct FnSubscriber<N, E, C, Item = ()> {
  next: N,
  error: Option<E>,
  complete: Option<C>,
  _item: PhantomData<fn(Item)>,
}

impl<N, E, C, Item> FnSubscriber<N, E, C, Item> {
  pub fn with_error<E2>(self, error: E2) -> FnSubscriber<N, E2, C, Item>
  where
    E2: FnMut(FlowError),
  {
    FnSubscriber {
      next: self.next,
      error: Some(error),
      complete: self.complete,
      _item: PhantomData,
    }
  }

  pub fn with_complete<C2>(self, complete: C2) -> FnSubscriber<N, E, C2, Item>
  where
    C2: FnMut(),
  {
    FnSubscriber {
      next: self.next,
      error: self.error,
      complete: Some(complete),
      _item: PhantomData,
    }
  }
}

impl<Item, N, E, C> Subscriber for FnSubscriber<N, E, C, Item>
where
  N: FnMut(Item),
  E: FnMut(FlowError),
  C: FnMut(),
{
  type Item = Item;

  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    subscription.request(UNBOUNDED);
  }

  fn on_next(&mut self, value: Item) { (self.next)(value) }

  fn on_error(&mut self, err: FlowError) {
    match self.error.as_mut() {
      Some(error) => error(err),
      None => warn!(label = err.as_label(), "unhandled terminal error: {err}"),
    }
  }

  fn on_complete(&mut self) {
    if let Some(complete) = self.complete.as_mut() {
      complete()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::from_iter;
  use crate::Publisher;

  #[test]
  fn closure_subscriber_auto_requests() {
    use std::sync::{Arc, Mutex};

    let seen = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(Mutex::new(false));
    let seen_c = seen.clone();
    let completed_c = completed.clone();

    let s = subscriber_fn(move |v| seen_c.lock().unwrap().push(v))
      .with_complete(move || *completed_c.lock().unwrap() = true);
    from_iter(0..5).subscribe(s);

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert!(*completed.lock().unwrap());
  }
}
