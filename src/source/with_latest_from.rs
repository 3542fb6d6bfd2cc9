use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::warn;

use crate::demand::{Demand, UNBOUNDED};
use crate::error::{BoxError, FlowError};
use crate::graph::{
  Cancellable, Completable, GraphNode, Introspectable, MultiUpstream,
  NodeRef,
};
use crate::subscriber::Subscriber;
use crate::subscription::{
  DeferredRequest, EmptySubscription, Subscription, SubscriptionRef,
};
use crate::Publisher;

/// Combines each value of `source` with the latest value seen from
/// `other`.
///
/// `other` is requested unbounded and only its most recent value is
/// retained; `source` drives emissions and receives the downstream
/// demand. Values of `source` arriving before `other` has produced
/// anything are dropped, with one value re-requested to keep the flow
/// live. A combiner returning `Ok(None)` is a protocol violation
/// terminating with `FlowError::NullCombinerResult`; its error arm
/// becomes a terminal `FlowError::User`.
///
/// # Examples
///
/// ```
/// use rxflow::prelude::*;
///
/// let probe = TestSubscriber::new();
/// with_latest_from(from_iter(1..=3u64), from_iter([10u64]), |a, b| {
///   Ok(Some(a + b))
/// })
/// .subscribe(probe.clone());
/// probe.assert_values(&[11, 12, 13]).assert_complete();
/// ```
pub fn with_latest_from<P, O, F, R>(
  source: P,
  other: O,
  combiner: F,
) -> WithLatestFrom<P, O, F>
where
  P: Publisher,
  O: Publisher,
  F: FnMut(P::Item, O::Item) -> Result<Option<R>, BoxError>,
{
  WithLatestFrom { source, other, combiner }
}

pub struct WithLatestFrom<P, O, F> {
  source: P,
  other: O,
  combiner: F,
}

impl<P, O, F, R> Publisher for WithLatestFrom<P, O, F>
where
  P: Publisher,
  P::Item: Send + 'static,
  O: Publisher,
  O::Item: Clone + Send + 'static,
  F: FnMut(P::Item, O::Item) -> Result<Option<R>, BoxError> + Send + 'static,
  R: Send + 'static,
{
  type Item = R;

  fn subscribe<S>(self, subscriber: S)
  where
    S: Subscriber<Item = R> + Send + 'static,
  {
    let shared = Arc::new(CombineShared::new(subscriber));
    let out = Arc::new(CombineSub { shared: shared.clone() });
    // the latest-holding side first, then the driving side
    self.other.subscribe(OtherSubscriber { shared: shared.clone() });
    self.source.subscribe(MainSubscriber {
      shared,
      out,
      combiner: self.combiner,
      marker: PhantomData,
    });
  }
}

enum Terminal {
  Complete,
  Error(FlowError),
}

struct GateInner<S> {
  subscriber: Option<S>,
  subscribed: bool,
}

/// Serializing gate in front of the downstream subscriber.
///
/// Emissions arrive on the driving side's emission lease; terminals may
/// arrive concurrently from the other side. The gate delivers everything
/// under one lock, parking a terminal that races an in-flight emission
/// for delivery at that emission's boundary.
struct SerialGate<S> {
  inner: Mutex<GateInner<S>>,
  terminated: AtomicBool,
  discard_pending: AtomicBool,
  parked: Mutex<Option<Terminal>>,
}

impl<S: Subscriber> SerialGate<S> {
  fn new(subscriber: S) -> Self {
    SerialGate {
      inner: Mutex::new(GateInner {
        subscriber: Some(subscriber),
        subscribed: false,
      }),
      terminated: AtomicBool::new(false),
      discard_pending: AtomicBool::new(false),
      parked: Mutex::new(None),
    }
  }

  fn is_terminated(&self) -> bool {
    self.terminated.load(Ordering::Acquire)
  }

  fn deliver_on_subscribe(&self, handle: SubscriptionRef) {
    let mut inner = self.inner.lock().unwrap();
    if inner.subscribed || self.is_terminated() {
      return;
    }
    inner.subscribed = true;
    if let Some(s) = inner.subscriber.as_mut() {
      s.on_subscribe(handle);
    }
    Self::settle(&self.parked, &self.discard_pending, &mut inner);
  }

  /// Delivers one emission. Returns `false` once the flow is over and
  /// the driving side should stop.
  fn next(&self, value: S::Item) -> bool {
    if self.is_terminated() {
      return false;
    }
    let mut inner = self.inner.lock().unwrap();
    if self.is_terminated() {
      // a terminal slipped in before the lock; it delivered itself
      return false;
    }
    if let Some(s) = inner.subscriber.as_mut() {
      s.on_next(value);
    }
    !Self::settle(&self.parked, &self.discard_pending, &mut inner)
  }

  /// Terminal from either side; the first one wins.
  fn terminal(&self, terminal: Terminal) {
    if self.terminated.swap(true, Ordering::AcqRel) {
      if let Terminal::Error(err) = terminal {
        warn!(
          label = err.as_label(),
          "terminal error after termination dropped: {err}"
        );
      }
      return;
    }
    match self.inner.try_lock() {
      Ok(mut inner) => {
        if !inner.subscribed {
          inner.subscribed = true;
          if let Some(s) = inner.subscriber.as_mut() {
            s.on_subscribe(EmptySubscription::shared());
          }
        }
        Self::deliver_terminal(&mut inner, terminal);
      }
      // the driving side is mid-emission; it flushes at its boundary
      Err(_) => *self.parked.lock().unwrap() = Some(terminal),
    }
  }

  /// Drops the downstream subscriber. Deferred to the current holder
  /// when the gate is busy, e.g. a cancel issued from inside `on_next`.
  fn discard(&self) {
    self.discard_pending.store(true, Ordering::Release);
    if let Ok(mut inner) = self.inner.try_lock() {
      if self.discard_pending.swap(false, Ordering::AcqRel) {
        inner.subscriber = None;
      }
    }
  }

  /// Applies parked work under the held lock. Returns true when the
  /// flow is over.
  fn settle(
    parked: &Mutex<Option<Terminal>>,
    discard_pending: &AtomicBool,
    inner: &mut GateInner<S>,
  ) -> bool {
    if let Some(terminal) = parked.lock().unwrap().take() {
      Self::deliver_terminal(inner, terminal);
      return true;
    }
    if discard_pending.swap(false, Ordering::AcqRel) {
      inner.subscriber = None;
      return true;
    }
    false
  }

  fn deliver_terminal(inner: &mut GateInner<S>, terminal: Terminal) {
    match terminal {
      Terminal::Complete => {
        if let Some(mut s) = inner.subscriber.take() {
          s.on_complete();
        }
      }
      Terminal::Error(err) => {
        if let Some(mut s) = inner.subscriber.take() {
          s.on_error(err);
        }
      }
    }
  }
}

struct CombineShared<B, S> {
  latest: Mutex<Option<B>>,
  gate: SerialGate<S>,
  main: DeferredRequest,
  other: DeferredRequest,
  main_ref: OnceLock<SubscriptionRef>,
  other_ref: OnceLock<SubscriptionRef>,
  failed: Mutex<Option<String>>,
}

impl<B, S: Subscriber> CombineShared<B, S> {
  fn new(subscriber: S) -> Self {
    CombineShared {
      latest: Mutex::new(None),
      gate: SerialGate::new(subscriber),
      main: DeferredRequest::new(),
      other: DeferredRequest::new(),
      main_ref: OnceLock::new(),
      other_ref: OnceLock::new(),
      failed: Mutex::new(None),
    }
  }

  fn terminate_complete(&self) { self.gate.terminal(Terminal::Complete) }

  fn terminate_err(&self, err: FlowError) {
    *self.failed.lock().unwrap() = Some(err.to_string());
    self.gate.terminal(Terminal::Error(err));
  }

  fn cancel_both(&self) {
    self.main.cancel();
    self.other.cancel();
  }
}

struct MainSubscriber<A, B, S, F> {
  shared: Arc<CombineShared<B, S>>,
  out: Arc<CombineSub<B, S>>,
  combiner: F,
  // pins the driving side's item type, which otherwise only occurs in
  // the combiner's bounds
  marker: PhantomData<fn(A)>,
}

impl<A, B, S, F> Subscriber for MainSubscriber<A, B, S, F>
where
  A: Send + 'static,
  B: Clone + Send + 'static,
  S: Subscriber + Send + 'static,
  F: FnMut(A, B) -> Result<Option<S::Item>, BoxError> + Send + 'static,
{
  type Item = A;

  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let _ = self.shared.main_ref.set(subscription.clone());
    self.shared.main.set(subscription);
    self.shared.gate.deliver_on_subscribe(self.out.clone());
  }

  fn on_next(&mut self, value: A) {
    if self.shared.gate.is_terminated() {
      self.shared.main.cancel();
      return;
    }
    let latest = self.shared.latest.lock().unwrap().clone();
    match latest {
      // nothing to combine with: drop and top the demand back up
      None => self.shared.main.request(1),
      Some(b) => match (self.combiner)(value, b) {
        Ok(Some(r)) => {
          if !self.shared.gate.next(r) {
            self.shared.main.cancel();
          }
        }
        Ok(None) => {
          self.shared.cancel_both();
          self.shared.terminate_err(FlowError::NullCombinerResult);
        }
        Err(cause) => {
          self.shared.cancel_both();
          self.shared.terminate_err(FlowError::user(cause));
        }
      },
    }
  }

  fn on_error(&mut self, err: FlowError) {
    self.shared.other.cancel();
    self.shared.terminate_err(err);
  }

  fn on_complete(&mut self) {
    self.shared.other.cancel();
    self.shared.terminate_complete();
  }
}

struct OtherSubscriber<B, S> {
  shared: Arc<CombineShared<B, S>>,
}

impl<B, S> Subscriber for OtherSubscriber<B, S>
where
  B: Clone + Send + 'static,
  S: Subscriber + Send + 'static,
{
  type Item = B;

  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let _ = self.shared.other_ref.set(subscription.clone());
    self.shared.other.set(subscription.clone());
    subscription.request(UNBOUNDED);
  }

  fn on_next(&mut self, value: B) {
    *self.shared.latest.lock().unwrap() = Some(value);
  }

  fn on_error(&mut self, err: FlowError) {
    self.shared.main.cancel();
    self.shared.terminate_err(err);
  }

  fn on_complete(&mut self) {
    // completing without ever producing a value means nothing can ever
    // be combined: the flow completes; afterwards it is ignored
    let empty = self.shared.latest.lock().unwrap().is_none();
    if empty {
      self.shared.main.cancel();
      self.shared.terminate_complete();
    }
  }
}

/// Downstream control handle of the combiner: demand flows to the
/// driving side only, cancellation reaches both inputs.
pub struct CombineSub<B, S> {
  shared: Arc<CombineShared<B, S>>,
}

impl<B, S> Subscription for CombineSub<B, S>
where
  B: Send + 'static,
  S: Subscriber + Send + 'static,
{
  fn request(&self, n: u64) {
    if self.shared.gate.is_terminated() {
      return;
    }
    match Demand::validate(n) {
      Ok(()) => self.shared.main.request(n),
      Err(violation) => {
        self.shared.cancel_both();
        self.shared.terminate_err(violation);
      }
    }
  }

  fn cancel(&self) {
    self.shared.cancel_both();
    self.shared.gate.discard();
  }
}

impl<B, S> MultiUpstream for CombineSub<B, S> {
  fn upstreams(&self) -> Vec<NodeRef<'_>> {
    [self.shared.main_ref.get(), self.shared.other_ref.get()]
      .into_iter()
      .flatten()
      .map(|r| NodeRef::Actual(r.as_graph_node()))
      .collect()
  }
}

impl<B, S> Cancellable for CombineSub<B, S> {
  fn is_cancelled(&self) -> bool { self.shared.main.is_cancelled() }
}

impl<B, S: Subscriber> Completable for CombineSub<B, S> {
  fn is_started(&self) -> bool {
    self.shared.main_ref.get().is_some() && !self.shared.gate.is_terminated()
  }
  fn is_terminated(&self) -> bool { self.shared.gate.is_terminated() }
}

impl<B, S> Introspectable for CombineSub<B, S> {
  fn name(&self) -> Option<&str> { Some("withLatestFrom") }
  fn failed(&self) -> Option<String> {
    self.shared.failed.lock().unwrap().clone()
  }
}

impl<B, S> GraphNode for CombineSub<B, S>
where
  B: Send + 'static,
  S: Subscriber + Send + 'static,
{
  fn as_multi_upstream(&self) -> Option<&dyn MultiUpstream> { Some(self) }
  fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
  fn as_completable(&self) -> Option<&dyn Completable> { Some(self) }
  fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
}
