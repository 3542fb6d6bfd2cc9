//! Recording subscriber for driver tests.
//!
//! Shipped with the crate so downstream users can exercise their own
//! publishers the same way the core tests do. Clones share one recording:
//! hand a clone to `subscribe` and keep the original for assertions.

use std::sync::{Arc, Mutex};

use crate::demand::UNBOUNDED;
use crate::error::FlowError;
use crate::subscriber::Subscriber;
use crate::subscription::SubscriptionRef;

struct State<T> {
  values: Vec<T>,
  errors: Vec<FlowError>,
  completions: usize,
  subscription: Option<SubscriptionRef>,
}

pub struct TestSubscriber<T> {
  state: Arc<Mutex<State<T>>>,
  initial_request: u64,
}

impl<T> Clone for TestSubscriber<T> {
  fn clone(&self) -> Self {
    TestSubscriber {
      state: self.state.clone(),
      initial_request: self.initial_request,
    }
  }
}

impl<T> Default for TestSubscriber<T> {
  fn default() -> Self { Self::new() }
}

impl<T> TestSubscriber<T> {
  /// Requests unbounded demand at subscribe time.
  pub fn new() -> Self { Self::with_request(UNBOUNDED) }

  /// Requests `n` at subscribe time; `0` arms nothing and leaves demand
  /// to later [`request`](Self::request) calls.
  pub fn with_request(n: u64) -> Self {
    TestSubscriber {
      state: Arc::new(Mutex::new(State {
        values: Vec::new(),
        errors: Vec::new(),
        completions: 0,
        subscription: None,
      })),
      initial_request: n,
    }
  }

  fn subscription(&self) -> Option<SubscriptionRef> {
    self.state.lock().unwrap().subscription.clone()
  }

  pub fn request(&self, n: u64) {
    let sub = self.subscription().expect("subscribed");
    sub.request(n);
  }

  pub fn cancel(&self) {
    if let Some(sub) = self.subscription() {
      sub.cancel();
    }
  }

  /// The erased handle, for walking the live pipeline.
  pub fn handle(&self) -> Option<SubscriptionRef> { self.subscription() }

  pub fn value_count(&self) -> usize {
    self.state.lock().unwrap().values.len()
  }

  pub fn error_count(&self) -> usize {
    self.state.lock().unwrap().errors.len()
  }

  pub fn is_complete(&self) -> bool {
    self.state.lock().unwrap().completions > 0
  }

  pub fn values(&self) -> Vec<T>
  where
    T: Clone,
  {
    self.state.lock().unwrap().values.clone()
  }

  pub fn assert_values(&self, expected: &[T]) -> &Self
  where
    T: PartialEq + std::fmt::Debug,
  {
    let state = self.state.lock().unwrap();
    assert_eq!(state.values, expected, "recorded values differ");
    self
  }

  pub fn assert_no_values(&self) -> &Self
  where
    T: std::fmt::Debug,
  {
    let state = self.state.lock().unwrap();
    assert!(
      state.values.is_empty(),
      "expected no values, got {:?}",
      state.values
    );
    self
  }

  pub fn assert_complete(&self) -> &Self {
    let state = self.state.lock().unwrap();
    assert_eq!(state.completions, 1, "expected exactly one completion");
    self
  }

  pub fn assert_not_complete(&self) -> &Self {
    assert_eq!(
      self.state.lock().unwrap().completions,
      0,
      "expected no completion"
    );
    self
  }

  pub fn assert_no_error(&self) -> &Self {
    let state = self.state.lock().unwrap();
    assert!(state.errors.is_empty(), "unexpected {:?}", state.errors);
    self
  }

  /// Asserts exactly one terminal error satisfying `check`.
  pub fn assert_error(&self, check: impl FnOnce(&FlowError) -> bool) -> &Self {
    let state = self.state.lock().unwrap();
    assert_eq!(state.errors.len(), 1, "expected exactly one error");
    assert!(check(&state.errors[0]), "error mismatch: {:?}", state.errors[0]);
    self
  }
}

impl<T: Send> Subscriber for TestSubscriber<T> {
  type Item = T;

  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    // store first, request outside the lock: the request may drain
    // synchronously back into on_next
    self.state.lock().unwrap().subscription = Some(subscription.clone());
    if self.initial_request > 0 {
      subscription.request(self.initial_request);
    }
  }

  fn on_next(&mut self, value: T) {
    self.state.lock().unwrap().values.push(value);
  }

  fn on_error(&mut self, err: FlowError) {
    self.state.lock().unwrap().errors.push(err);
  }

  fn on_complete(&mut self) {
    self.state.lock().unwrap().completions += 1;
  }
}
