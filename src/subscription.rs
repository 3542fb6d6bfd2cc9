use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use tracing::warn;

use crate::demand::Demand;
use crate::error::{FaultSlot, FlowError};
use crate::graph::{Cancellable, Completable, GraphNode};
use crate::subscriber::Subscriber;

/// Control handle from subscriber to publisher.
///
/// Handles are shared; both operations take `&self` and are safe to call
/// from any thread, including reentrantly from inside subscriber
/// callbacks. After a terminal signal or `cancel` both become no-ops.
pub trait Subscription: Send + Sync {
  /// Adds `n` to the demand counter. `n == 0` is a protocol violation
  /// reported to the subscriber as `on_error`, never panicked.
  fn request(&self, n: u64);

  /// Requests the flow to stop. Idempotent. Observed by the emission
  /// loop at every signal boundary.
  fn cancel(&self);
}

/// A [`Subscription`] that can also be walked by the graph introspection
/// module. Blanket-implemented; the explicit accessor exists so an erased
/// handle can be handed to the walker without trait upcasting.
pub trait FlowSubscription: Subscription + GraphNode {
  fn as_graph_node(&self) -> &dyn GraphNode;
}

impl<T: Subscription + GraphNode> FlowSubscription for T {
  fn as_graph_node(&self) -> &dyn GraphNode { self }
}

/// Shared, erased subscription handle delivered through `on_subscribe`.
pub type SubscriptionRef = Arc<dyn FlowSubscription>;

/// Outcome of routing a `request` through the demand counter.
pub(crate) enum Takeover {
  /// Demand recorded; another thread holds (or will take) the lease.
  Idle,
  /// The caller observed the zero-to-positive transition and now owns
  /// the emission lease for `n` freshly granted items.
  Lease(u64),
}

/// Shared state every driver embeds: the demand counter, the
/// cancellation flag, the fault slot and the pre-arm demand stash.
///
/// The stash exists because Rust cannot drain inside `on_subscribe` the
/// way the original runtime does: the driver cell is mutably borrowed
/// for the callback, so a reentrant `request` must not re-enter the
/// driver. Until `arm` is called such requests accumulate in `stash` and
/// are replayed through the normal lease path afterwards. Acquisition is
/// still only ever the demand counter's zero-to-positive transition.
pub(crate) struct Control {
  pub(crate) demand: Demand,
  stash: Demand,
  armed: AtomicBool,
  cancelled: AtomicBool,
  done: AtomicBool,
  fault: FaultSlot,
  failed: Mutex<Option<String>>,
}

impl Control {
  pub fn new() -> Self {
    Control {
      demand: Demand::new(),
      stash: Demand::new(),
      armed: AtomicBool::new(false),
      cancelled: AtomicBool::new(false),
      done: AtomicBool::new(false),
      fault: FaultSlot::new(),
      failed: Mutex::new(None),
    }
  }

  /// Routes `n` through the stash (before arming) or the demand counter.
  ///
  /// The double-check after the stash write pairs with the release store
  /// in [`arm`](Self::arm): whichever side swaps the stash non-empty
  /// replays it, so no request is lost and the lease is still granted by
  /// a single atomic transition.
  pub fn grant(&self, n: u64) -> Takeover {
    if !self.armed.load(Ordering::Acquire) {
      self.stash.add(n);
      if !self.armed.load(Ordering::Acquire) {
        return Takeover::Idle;
      }
      let missed = self.stash.take();
      if missed == 0 {
        return Takeover::Idle;
      }
      return self.push_demand(missed);
    }
    self.push_demand(n)
  }

  /// Marks the driver ready to emit and replays stashed demand. Called
  /// once, after `on_subscribe` has returned.
  pub fn arm(&self) -> Takeover {
    self.armed.store(true, Ordering::Release);
    let missed = self.stash.take();
    if missed == 0 {
      return Takeover::Idle;
    }
    self.push_demand(missed)
  }

  fn push_demand(&self, n: u64) -> Takeover {
    if self.demand.add(n) == 0 {
      Takeover::Lease(n)
    } else {
      Takeover::Idle
    }
  }

  pub fn is_armed(&self) -> bool { self.armed.load(Ordering::Acquire) }

  pub fn cancel(&self) { self.cancelled.store(true, Ordering::Release) }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }

  pub fn mark_done(&self) { self.done.store(true, Ordering::Release) }

  pub fn is_done(&self) -> bool { self.done.load(Ordering::Acquire) }

  /// Parks a fault for delivery under the emission lease. Faults raised
  /// after termination are discarded.
  pub fn raise(&self, err: FlowError) {
    if self.is_done() || self.is_cancelled() {
      warn!(label = err.as_label(), "error after termination dropped: {err}");
      return;
    }
    if let Some(dropped) = self.fault.set(err) {
      warn!(
        label = dropped.as_label(),
        "fault already pending, error dropped: {dropped}"
      );
    }
  }

  pub fn has_fault(&self) -> bool { self.fault.is_raised() }

  pub fn take_fault(&self) -> Option<FlowError> { self.fault.take() }

  /// Records the terminal error message for the introspection probes.
  pub fn record_failure(&self, err: &FlowError) {
    *self.failed.lock().unwrap() = Some(err.to_string());
  }

  pub fn failure(&self) -> Option<String> {
    self.failed.lock().unwrap().clone()
  }
}

/// Demand (and cancellation) accumulated before an upstream subscription
/// arrives, replayed on `set`. Used where a driver subscribes to an
/// upstream whose subscription shows up later than downstream requests,
/// e.g. the combiner's main side.
pub(crate) struct DeferredRequest {
  pending: Demand,
  cancelled: AtomicBool,
  upstream: Mutex<Option<SubscriptionRef>>,
}

impl DeferredRequest {
  pub fn new() -> Self {
    DeferredRequest {
      pending: Demand::new(),
      cancelled: AtomicBool::new(false),
      upstream: Mutex::new(None),
    }
  }

  fn current(&self) -> Option<SubscriptionRef> {
    self.upstream.lock().unwrap().clone()
  }

  pub fn request(&self, n: u64) {
    if let Some(up) = self.current() {
      up.request(n);
      return;
    }
    self.pending.add(n);
    // the subscription may have arrived while we were stashing
    if let Some(up) = self.current() {
      let missed = self.pending.take();
      if missed > 0 {
        up.request(missed);
      }
    }
  }

  pub fn set(&self, up: SubscriptionRef) {
    if self.cancelled.load(Ordering::Acquire) {
      up.cancel();
      return;
    }
    *self.upstream.lock().unwrap() = Some(up.clone());
    let missed = self.pending.take();
    if missed > 0 {
      up.request(missed);
    }
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::Release);
    if let Some(up) = self.upstream.lock().unwrap().take() {
      up.cancel();
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }
}

/// Terminated no-op subscription.
///
/// Satisfies the "`on_subscribe` before any signal" rule for sources that
/// terminate at subscribe time, such as an empty iterator.
pub struct EmptySubscription;

lazy_static! {
  static ref EMPTY: SubscriptionRef = Arc::new(EmptySubscription);
}

impl EmptySubscription {
  /// The shared terminated handle.
  pub fn shared() -> SubscriptionRef { EMPTY.clone() }

  /// Delivers an immediate completion: `on_subscribe` with the shared
  /// empty handle, then `on_complete`.
  pub fn complete<S: Subscriber>(subscriber: &mut S) {
    subscriber.on_subscribe(EMPTY.clone());
    subscriber.on_complete();
  }

  /// Delivers an immediate terminal error.
  pub fn error<S: Subscriber>(subscriber: &mut S, err: FlowError) {
    subscriber.on_subscribe(EMPTY.clone());
    subscriber.on_error(err);
  }
}

impl Subscription for EmptySubscription {
  fn request(&self, _n: u64) {}
  fn cancel(&self) {}
}

impl Completable for EmptySubscription {
  fn is_started(&self) -> bool { false }
  fn is_terminated(&self) -> bool { true }
}

impl Cancellable for EmptySubscription {
  fn is_cancelled(&self) -> bool { true }
}

impl GraphNode for EmptySubscription {
  fn as_completable(&self) -> Option<&dyn Completable> { Some(self) }
  fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stash_replays_on_arm() {
    let ctl = Control::new();
    assert!(matches!(ctl.grant(3), Takeover::Idle));
    assert!(matches!(ctl.grant(2), Takeover::Idle));
    assert_eq!(ctl.demand.get(), 0);
    // arming replays the stashed 5 and takes the lease
    match ctl.arm() {
      Takeover::Lease(n) => assert_eq!(n, 5),
      Takeover::Idle => panic!("expected lease on arm"),
    }
    assert_eq!(ctl.demand.get(), 5);
  }

  #[test]
  fn lease_granted_once() {
    let ctl = Control::new();
    assert!(matches!(ctl.arm(), Takeover::Idle));
    assert!(matches!(ctl.grant(1), Takeover::Lease(1)));
    // demand not yet drained: later grants only bump
    assert!(matches!(ctl.grant(4), Takeover::Idle));
    assert_eq!(ctl.demand.get(), 5);
  }

  #[test]
  fn fault_after_done_is_dropped() {
    let ctl = Control::new();
    ctl.mark_done();
    ctl.raise(FlowError::BadRequest { requested: 0 });
    assert!(ctl.take_fault().is_none());
  }

  #[test]
  fn deferred_replays_pending() {
    use std::sync::atomic::AtomicU64;

    struct Probe(AtomicU64, AtomicBool);
    impl Subscription for Probe {
      fn request(&self, n: u64) {
        self.0.fetch_add(n, Ordering::SeqCst);
      }
      fn cancel(&self) {
        self.1.store(true, Ordering::SeqCst);
      }
    }
    impl GraphNode for Probe {}

    let deferred = DeferredRequest::new();
    deferred.request(7);
    let probe = Arc::new(Probe(AtomicU64::new(0), AtomicBool::new(false)));
    deferred.set(probe.clone());
    assert_eq!(probe.0.load(Ordering::SeqCst), 7);
    deferred.request(3);
    assert_eq!(probe.0.load(Ordering::SeqCst), 10);
    deferred.cancel();
    assert!(probe.1.load(Ordering::SeqCst));
  }

  #[test]
  fn empty_subscription_delivers_terminals_in_contract_order() {
    use crate::test_subscriber::TestSubscriber;

    let mut done = TestSubscriber::<u64>::with_request(0);
    EmptySubscription::complete(&mut done);
    done.assert_no_values().assert_complete();
    assert!(done.handle().is_some());

    let mut failed = TestSubscriber::<u64>::with_request(0);
    EmptySubscription::error(
      &mut failed,
      FlowError::BadRequest { requested: 0 },
    );
    failed
      .assert_no_values()
      .assert_error(|e| matches!(e, FlowError::BadRequest { .. }));
  }

  #[test]
  fn cancelled_deferred_cancels_late_upstream() {
    struct Probe(AtomicBool);
    impl Subscription for Probe {
      fn request(&self, _n: u64) {}
      fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
      }
    }
    impl GraphNode for Probe {}

    let deferred = DeferredRequest::new();
    deferred.cancel();
    let probe = Arc::new(Probe(AtomicBool::new(false)));
    deferred.set(probe.clone());
    assert!(probe.0.load(Ordering::SeqCst));
  }
}
