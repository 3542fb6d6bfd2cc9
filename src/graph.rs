pub(crate) mod caps;
pub use caps::{
  Backpressurable, Cancellable, Completable, Downstream, GraphNode,
  Introspectable, LoopBack, MultiDownstream, MultiUpstream, NodeRef,
  Prefetchable, Requestable, Timeable, Upstream,
};

pub(crate) mod scan;
pub use scan::{
  scan, scan_trace, subscan, subscan_trace, Edge, EdgeType, Graph, Node,
};
