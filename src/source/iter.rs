use std::cell::UnsafeCell;
use std::iter::Peekable;
use std::sync::Arc;

use crate::demand::{Demand, UNBOUNDED};
use crate::fusion::IterQueue;
use crate::graph::{
  Cancellable, Completable, GraphNode, Introspectable, Requestable,
};
use crate::subscriber::Subscriber;
use crate::subscription::{
  Control, EmptySubscription, Subscription, Takeover,
};
use crate::Publisher;

/// Creates a publisher emitting the contents of an in-memory sequence
/// with synchronous pull semantics.
///
/// # Examples
///
/// ```
/// use rxflow::prelude::*;
///
/// let probe = TestSubscriber::new();
/// from_iter(1..=3).subscribe(probe.clone());
/// probe.assert_values(&[1, 2, 3]).assert_complete();
/// ```
pub fn from_iter<I: IntoIterator>(iter: I) -> IterFlow<I> {
  IterFlow { iter }
}

pub struct IterFlow<I> {
  iter: I,
}

impl<I: IntoIterator> IterFlow<I> {
  /// Elects the synchronous fusion path: the caller pulls through the
  /// queue face and no `on_next` signalling takes place.
  pub fn into_queue(self) -> IterQueue<I::IntoIter> {
    IterQueue::new(self.iter.into_iter())
  }
}

impl<I> Publisher for IterFlow<I>
where
  I: IntoIterator,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  type Item = I::Item;

  fn subscribe<S>(self, mut subscriber: S)
  where
    S: Subscriber<Item = Self::Item> + Send + 'static,
  {
    let mut iter = self.iter.into_iter().peekable();
    if iter.peek().is_none() {
      EmptySubscription::complete(&mut subscriber);
      return;
    }
    IterSub::subscribe(iter, subscriber);
  }
}

struct Driver<I: Iterator, S> {
  iter: Peekable<I>,
  // taken at the terminal boundary, which also breaks the reference
  // cycle with a subscriber that stored its own handle
  subscriber: Option<S>,
}

/// Subscription driving an iterator source: fast path for unbounded
/// demand, budgeted slow path otherwise.
///
/// The driver cell holds the iterator and the subscriber; it is touched
/// only by the thread holding the emission lease (or, before arming, by
/// the subscribing thread, which holds the cell exclusively until
/// `on_subscribe` returns). The subscriber is dropped when a terminal
/// signal is delivered or cancellation is observed; a subscriber that
/// cancels while no lease is active keeps the pair alive until the
/// driver next observes the flag.
pub struct IterSub<I: Iterator, S> {
  ctl: Control,
  cell: UnsafeCell<Driver<I, S>>,
}

// The cell's contents move between threads only via the emission lease;
// at most one thread dereferences it at any instant.
unsafe impl<I, S> Send for IterSub<I, S>
where
  I: Iterator + Send,
  I::Item: Send,
  S: Send,
{
}
unsafe impl<I, S> Sync for IterSub<I, S>
where
  I: Iterator + Send,
  I::Item: Send,
  S: Send,
{
}

impl<I, S> IterSub<I, S>
where
  I: Iterator + Send + 'static,
  I::Item: Send + 'static,
  S: Subscriber<Item = I::Item> + Send + 'static,
{
  pub(crate) fn subscribe(iter: Peekable<I>, subscriber: S) {
    let sub = Arc::new(IterSub {
      ctl: Control::new(),
      cell: UnsafeCell::new(Driver { iter, subscriber: Some(subscriber) }),
    });
    {
      // exclusive before arming: requests made during on_subscribe only
      // stash demand and cannot re-enter the cell
      let driver = unsafe { &mut *sub.cell.get() };
      if let Some(s) = driver.subscriber.as_mut() {
        s.on_subscribe(sub.clone());
      }
    }
    if let Takeover::Lease(n) = sub.ctl.arm() {
      sub.drain(n);
    }
  }

  fn drain(&self, n: u64) {
    if n == UNBOUNDED {
      self.fast_path();
    } else {
      self.slow_path(n);
    }
  }

  /// Signal boundary: stops on cancellation, delivers a parked fault
  /// terminally.
  fn boundary(&self, driver: &mut Driver<I, S>) -> bool {
    if self.ctl.is_cancelled() {
      driver.subscriber = None;
      return true;
    }
    if let Some(fault) = self.ctl.take_fault() {
      self.ctl.record_failure(&fault);
      self.ctl.mark_done();
      if let Some(mut s) = driver.subscriber.take() {
        s.on_error(fault);
      }
      return true;
    }
    false
  }

  fn complete(&self, driver: &mut Driver<I, S>) {
    self.ctl.mark_done();
    if let Some(mut s) = driver.subscriber.take() {
      s.on_complete();
    }
  }

  fn fast_path(&self) {
    // safety: this thread holds the emission lease
    let driver = unsafe { &mut *self.cell.get() };
    loop {
      if self.boundary(driver) {
        return;
      }
      let Some(v) = driver.iter.next() else {
        self.complete(driver);
        return;
      };
      if self.boundary(driver) {
        return;
      }
      if let Some(s) = driver.subscriber.as_mut() {
        s.on_next(v);
      }
      if self.boundary(driver) {
        return;
      }
      if driver.iter.peek().is_none() {
        if self.boundary(driver) {
          return;
        }
        self.complete(driver);
        return;
      }
    }
  }

  fn slow_path(&self, mut n: u64) {
    // safety: this thread holds the emission lease
    let driver = unsafe { &mut *self.cell.get() };
    let mut e = 0u64;
    loop {
      while e != n {
        if self.boundary(driver) {
          return;
        }
        let Some(v) = driver.iter.next() else {
          self.complete(driver);
          return;
        };
        if self.boundary(driver) {
          return;
        }
        if let Some(s) = driver.subscriber.as_mut() {
          s.on_next(v);
        }
        if self.boundary(driver) {
          return;
        }
        let more = driver.iter.peek().is_some();
        if self.boundary(driver) {
          return;
        }
        if !more {
          self.complete(driver);
          return;
        }
        e += 1;
      }
      // re-read to pick up demand added while draining; release the
      // lease only when the counter drains to zero
      n = self.ctl.demand.get();
      if n == e {
        n = self.ctl.demand.produced(e);
        if n == 0 {
          return;
        }
        e = 0;
      }
    }
  }
}

impl<I, S> Subscription for IterSub<I, S>
where
  I: Iterator + Send + 'static,
  I::Item: Send + 'static,
  S: Subscriber<Item = I::Item> + Send + 'static,
{
  fn request(&self, n: u64) {
    if self.ctl.is_done() || self.ctl.is_cancelled() {
      return;
    }
    if let Err(violation) = Demand::validate(n) {
      self.ctl.raise(violation);
      // acquire the lease (or poke the holder) so the fault reaches the
      // subscriber at the next boundary
      if let Takeover::Lease(granted) = self.ctl.grant(1) {
        self.drain(granted);
      }
      return;
    }
    if let Takeover::Lease(granted) = self.ctl.grant(n) {
      self.drain(granted);
    }
  }

  fn cancel(&self) { self.ctl.cancel() }
}

impl<I: Iterator, S> Requestable for IterSub<I, S> {
  fn requested_from_downstream(&self) -> Option<u64> {
    Some(self.ctl.demand.get())
  }
}

impl<I: Iterator, S> Cancellable for IterSub<I, S> {
  fn is_cancelled(&self) -> bool { self.ctl.is_cancelled() }
}

impl<I: Iterator, S> Completable for IterSub<I, S> {
  fn is_started(&self) -> bool {
    self.ctl.is_armed() && !self.ctl.is_done()
  }
  fn is_terminated(&self) -> bool { self.ctl.is_done() }
}

impl<I: Iterator, S> Introspectable for IterSub<I, S> {
  fn name(&self) -> Option<&str> { Some("iterable") }
  fn failed(&self) -> Option<String> { self.ctl.failure() }
}

impl<I, S> GraphNode for IterSub<I, S>
where
  I: Iterator + Send + 'static,
  I::Item: Send + 'static,
  S: Subscriber<Item = I::Item> + Send + 'static,
{
  fn as_requestable(&self) -> Option<&dyn Requestable> { Some(self) }
  fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
  fn as_completable(&self) -> Option<&dyn Completable> { Some(self) }
  fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
}
