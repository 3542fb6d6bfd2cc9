//! Optional synchronous pull contract.
//!
//! A synchronously iterable source may expose itself as a queue-like
//! object to a downstream stage that recognizes the capability. The
//! downstream then bypasses `on_next` signalling entirely and pulls via
//! [`SyncQueue::poll`]. Election happens at assembly time through
//! [`IterFlow::into_queue`](crate::source::IterFlow::into_queue); there
//! is no mid-stream mode switch.

/// Queue face of a synchronous source.
///
/// Not a general queue: it holds at most one latched lookahead value and
/// [`len`](SyncQueue::len) reports presence, not length.
pub trait SyncQueue {
  type Item;

  /// Latches one step of iteration lookahead and reports whether the
  /// source is exhausted.
  fn is_empty(&mut self) -> bool;

  /// Returns the lookahead value without consuming it, producing it from
  /// the source if still latent.
  fn peek(&mut self) -> Option<&Self::Item>;

  /// Returns and consumes the lookahead value; the next call probes the
  /// source again.
  fn poll(&mut self) -> Option<Self::Item>;

  /// Discards the latched value and resets the lookahead to probing,
  /// whatever was observed before.
  fn drop_next(&mut self);

  /// Resets the lookahead to an exhausted observation.
  fn clear(&mut self);

  /// 1 while a value is latched or probable, 0 once exhausted. Not a
  /// true length.
  fn len(&mut self) -> usize;
}

/// Lookahead state. The original keeps a fourth "has next, no value yet"
/// state because its source splits existence and retrieval probes; a
/// Rust iterator probe always yields the value, so that state collapses
/// into `Latched`.
enum Lookahead<T> {
  /// Nothing observed yet; the next call probes the source.
  Probe,
  /// A value was pulled and is waiting to be consumed.
  Latched(T),
  /// The source reported exhaustion.
  Drained,
}

/// [`SyncQueue`] over any iterator.
pub struct IterQueue<I: Iterator> {
  iter: I,
  state: Lookahead<I::Item>,
}

impl<I: Iterator> IterQueue<I> {
  pub fn new(iter: I) -> Self {
    IterQueue { iter, state: Lookahead::Probe }
  }

  fn latch(&mut self) {
    if matches!(self.state, Lookahead::Probe) {
      self.state = match self.iter.next() {
        Some(v) => Lookahead::Latched(v),
        None => Lookahead::Drained,
      };
    }
  }
}

impl<I: Iterator> SyncQueue for IterQueue<I> {
  type Item = I::Item;

  fn is_empty(&mut self) -> bool {
    self.latch();
    matches!(self.state, Lookahead::Drained)
  }

  fn peek(&mut self) -> Option<&I::Item> {
    self.latch();
    match &self.state {
      Lookahead::Latched(v) => Some(v),
      _ => None,
    }
  }

  fn poll(&mut self) -> Option<I::Item> {
    self.latch();
    match std::mem::replace(&mut self.state, Lookahead::Probe) {
      Lookahead::Latched(v) => Some(v),
      Lookahead::Drained => {
        self.state = Lookahead::Drained;
        None
      }
      Lookahead::Probe => unreachable!("latched above"),
    }
  }

  // unconditional reset: even an exhausted observation goes back to
  // probing, so the next call asks the source again
  fn drop_next(&mut self) { self.state = Lookahead::Probe; }

  fn clear(&mut self) { self.state = Lookahead::Drained; }

  fn len(&mut self) -> usize {
    match self.state {
      Lookahead::Drained => 0,
      _ => 1,
    }
  }
}
