//! Capability traits probed by the graph walker.
//!
//! A live pipeline object advertises what it can report by implementing a
//! subset of these traits and overriding the matching accessor on
//! [`GraphNode`]. The walker dispatches purely on accessor presence;
//! everything a node does not declare is reported as unknown.

use std::time::Duration;

/// A reference handed to the walker by a neighbour probe.
///
/// `Virtual` names an external sink that is not itself walkable; it
/// becomes a stub node joined by a `reference`-typed edge.
pub enum NodeRef<'a> {
  Actual(&'a dyn GraphNode),
  Virtual(&'a str),
}

/// Declares a single predecessor.
pub trait Upstream {
  fn upstream(&self) -> Option<NodeRef<'_>>;
}

/// Declares a single successor.
pub trait Downstream {
  fn downstream(&self) -> Option<NodeRef<'_>>;
}

/// Declares fan-in predecessors.
pub trait MultiUpstream {
  fn upstreams(&self) -> Vec<NodeRef<'_>>;
}

/// Declares fan-out successors.
pub trait MultiDownstream {
  fn downstreams(&self) -> Vec<NodeRef<'_>>;
}

/// Declares a feedback loop: an input and an output node outside the
/// linear chain.
pub trait LoopBack {
  fn loop_input(&self) -> Option<NodeRef<'_>>;
  fn loop_output(&self) -> Option<NodeRef<'_>>;
}

/// Naming, identity and diagnostic markers.
pub trait Introspectable {
  /// Display name. Nodes without one are reported as `anonymous`.
  fn name(&self) -> Option<&str> { None }

  /// Stable identity key. When declared it becomes the node id
  /// (`definedId` in the serialized form); otherwise identity is derived
  /// from the name and the live object address.
  fn key(&self) -> Option<String> { None }

  /// Grouping key for dashboards.
  fn group(&self) -> Option<String> { None }

  /// Diagnostic staging node: invisible to the walker unless trace mode
  /// is on, with its neighbours attached to its walk ancestor.
  fn is_trace_only(&self) -> bool { false }

  /// Inner member of a fan-in/fan-out structure.
  fn is_inner(&self) -> bool { false }

  fn is_factory(&self) -> bool { false }

  fn is_logging(&self) -> bool { false }

  /// Terminal failure message, when the node has failed.
  fn failed(&self) -> Option<String> { None }
}

/// Buffer-capacity reporting.
pub trait Backpressurable {
  /// Total capacity; `u64::MAX` means unbounded.
  fn capacity(&self) -> Option<u64> { None }

  /// Values currently buffered.
  fn pending(&self) -> Option<u64> { None }
}

pub trait Cancellable {
  fn is_cancelled(&self) -> bool;
}

pub trait Completable {
  fn is_started(&self) -> bool;
  fn is_terminated(&self) -> bool;
}

/// Prefetch accounting of an intermediate operator.
pub trait Prefetchable {
  fn limit(&self) -> Option<u64> { None }
  fn expected_from_upstream(&self) -> Option<u64> { None }
}

pub trait Requestable {
  fn requested_from_downstream(&self) -> Option<u64>;
}

pub trait Timeable {
  fn period(&self) -> Option<Duration>;
}

/// Probing hub: every walkable object implements this, overriding the
/// accessors for the capabilities it actually has. All defaults are
/// `None`, so `impl GraphNode for T {}` is a valid opaque node.
pub trait GraphNode {
  fn as_upstream(&self) -> Option<&dyn Upstream> { None }
  fn as_downstream(&self) -> Option<&dyn Downstream> { None }
  fn as_multi_upstream(&self) -> Option<&dyn MultiUpstream> { None }
  fn as_multi_downstream(&self) -> Option<&dyn MultiDownstream> { None }
  fn as_loop_back(&self) -> Option<&dyn LoopBack> { None }
  fn as_introspectable(&self) -> Option<&dyn Introspectable> { None }
  fn as_backpressurable(&self) -> Option<&dyn Backpressurable> { None }
  fn as_cancellable(&self) -> Option<&dyn Cancellable> { None }
  fn as_completable(&self) -> Option<&dyn Completable> { None }
  fn as_prefetchable(&self) -> Option<&dyn Prefetchable> { None }
  fn as_requestable(&self) -> Option<&dyn Requestable> { None }
  fn as_timeable(&self) -> Option<&dyn Timeable> { None }
}
