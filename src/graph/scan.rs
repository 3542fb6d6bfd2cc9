//! Best-effort walker over a live pipeline.
//!
//! Given any node, produces a nodes-and-edges view by probing capability
//! accessors. The walk re-probes on every call and never caches live
//! references; attribute reads race ongoing pipeline mutations by design
//! and are a snapshot, not a transaction.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use tracing::debug;

use crate::demand::UNBOUNDED;
use crate::graph::caps::{GraphNode, NodeRef};

/// Full representation (upstream and downstream walk) of `o`.
pub fn scan(o: &dyn GraphNode) -> Graph { scan_trace(o, false) }

/// Like [`scan`], forcing introspection of trace-only nodes.
pub fn scan_trace(o: &dyn GraphNode, trace: bool) -> Graph {
  let mut graph = Graph::new(false, trace);
  let origin = graph.expand(o, None);
  graph.add_upstream(Some((o, origin.clone())), None);
  graph.add_downstream(Some((o, origin)), None);
  graph
}

/// Downstream-only representation of `o`.
pub fn subscan(o: &dyn GraphNode) -> Graph { subscan_trace(o, false) }

/// Like [`subscan`], forcing introspection of trace-only nodes.
pub fn subscan_trace(o: &dyn GraphNode, trace: bool) -> Graph {
  let mut graph = Graph::new(true, trace);
  let root = graph.expand(o, None);
  graph.add_downstream(Some((o, root)), None);
  graph
}

/// Identity of a live node: the data half of its reference. The walker
/// never stores it beyond the id string, so a dangling address between
/// two scans only yields a fresh node, never a bad read.
fn ident(o: &dyn GraphNode) -> usize {
  o as *const dyn GraphNode as *const () as usize
}

fn trace_only(o: &dyn GraphNode) -> bool {
  o.as_introspectable().is_some_and(|i| i.is_trace_only())
}

fn skip_false(b: &bool) -> bool { !*b }

/// Unknown amounts are omitted; the saturation sentinel serializes as
/// the literal string `"unbounded"`.
fn ser_amount<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
  match v {
    Some(n) if *n == UNBOUNDED => s.serialize_str("unbounded"),
    Some(n) => s.serialize_u64(*n),
    None => s.serialize_none(),
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeType {
  FeedbackLoop,
  Inner,
  Reference,
}

/// A relationship between two concrete or virtual node references.
#[derive(Debug, Clone, Serialize)]
pub struct Edge {
  id: String,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  kind: Option<EdgeType>,
  from: String,
  to: String,
}

impl Edge {
  fn new(from: &str, to: &str, kind: Option<EdgeType>) -> Self {
    Edge {
      id: format!("{from}_{to}"),
      kind,
      from: from.to_string(),
      to: to.to_string(),
    }
  }

  pub fn id(&self) -> &str { &self.id }
  pub fn from(&self) -> &str { &self.from }
  pub fn to(&self) -> &str { &self.to }
  pub fn kind(&self) -> Option<EdgeType> { self.kind }
}

/// Snapshot of one introspected node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
  id: String,
  origin: String,
  #[serde(skip_serializing_if = "skip_false")]
  defined_id: bool,
  name: String,
  #[serde(skip_serializing_if = "skip_false")]
  inner: bool,
  #[serde(skip_serializing_if = "skip_false")]
  reference: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  failed: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_amount")]
  period: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_amount")]
  capacity: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  group: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_amount")]
  buffered: Option<u64>,
  #[serde(skip_serializing_if = "skip_false")]
  factory: bool,
  #[serde(skip_serializing_if = "skip_false")]
  logging: bool,
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_amount")]
  upstream_limit: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_amount")]
  expected_upstream: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_amount")]
  requested_downstream: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  active: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  terminated: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  cancelled: Option<bool>,
  #[serde(skip)]
  edge_refs: SmallVec<[String; 2]>,
}

impl Node {
  /// Probes every capability of `o` into a snapshot.
  fn probe(o: &dyn GraphNode, root: Option<&str>) -> Node {
    let intro = o.as_introspectable();
    let name = intro
      .and_then(|i| i.name())
      .unwrap_or("anonymous")
      .to_string();
    let key = intro.and_then(|i| i.key());
    let defined_id = key.is_some();
    let id = key.unwrap_or_else(|| format!("{}:{:x}", name, ident(o)));
    let origin = root.unwrap_or(&id).to_string();

    let cancelled = o.as_cancellable().map(|c| c.is_cancelled());
    let (active, terminated) = match o.as_completable() {
      Some(c) => (Some(c.is_started()), Some(c.is_terminated())),
      None => (None, None),
    };
    let (capacity, buffered) = match o.as_backpressurable() {
      Some(b) => (b.capacity(), b.pending()),
      None => (None, None),
    };
    let (upstream_limit, expected_upstream) = match o.as_prefetchable() {
      Some(p) => (p.limit(), p.expected_from_upstream()),
      None => (None, None),
    };

    Node {
      id,
      origin,
      defined_id,
      name,
      inner: intro.is_some_and(|i| i.is_inner()),
      reference: false,
      failed: intro.and_then(|i| i.failed()),
      period: o
        .as_timeable()
        .and_then(|t| t.period())
        .map(|d| d.as_millis() as u64),
      capacity,
      group: intro.and_then(|i| i.group()),
      buffered,
      factory: intro.is_some_and(|i| i.is_factory()),
      logging: intro.is_some_and(|i| i.is_logging()),
      upstream_limit,
      expected_upstream,
      requested_downstream: o
        .as_requestable()
        .and_then(|r| r.requested_from_downstream()),
      active,
      terminated,
      cancelled,
      edge_refs: SmallVec::new(),
    }
  }

  /// Stub node standing in for a string-identified external sink.
  fn reference(name: &str, origin: &str) -> Node {
    Node {
      id: name.to_string(),
      origin: origin.to_string(),
      defined_id: false,
      name: name.to_string(),
      inner: false,
      reference: true,
      failed: None,
      period: None,
      capacity: None,
      group: None,
      buffered: None,
      factory: false,
      logging: false,
      upstream_limit: None,
      expected_upstream: None,
      requested_downstream: None,
      active: None,
      terminated: None,
      cancelled: None,
      edge_refs: SmallVec::new(),
    }
  }

  pub fn id(&self) -> &str { &self.id }
  pub fn name(&self) -> &str { &self.name }
  pub fn origin(&self) -> &str { &self.origin }
  pub fn is_reference(&self) -> bool { self.reference }
  pub fn is_terminated(&self) -> Option<bool> { self.terminated }
  pub fn is_cancelled(&self) -> Option<bool> { self.cancelled }
  pub fn requested_downstream(&self) -> Option<u64> {
    self.requested_downstream
  }
  pub fn period(&self) -> Option<u64> { self.period }
  pub fn capacity(&self) -> Option<u64> { self.capacity }
  pub fn failed(&self) -> Option<&str> { self.failed.as_deref() }
}

#[derive(Serialize)]
struct GraphView<'a> {
  edges: Vec<&'a Edge>,
  #[serde(skip_serializing_if = "Option::is_none")]
  trace: Option<bool>,
  nodes: Vec<&'a Node>,
  #[serde(skip_serializing_if = "Option::is_none")]
  full: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  timestamp: Option<u64>,
}

/// The product of a walk: an owned arena of node snapshots and directed
/// edges keyed by string ids.
pub struct Graph {
  nodes: BTreeMap<String, Node>,
  edges: BTreeMap<String, Edge>,
  subscan: bool,
  trace: bool,
  cyclic: bool,
}

impl Graph {
  fn new(subscan: bool, trace: bool) -> Self {
    Graph {
      nodes: BTreeMap::new(),
      edges: BTreeMap::new(),
      subscan,
      trace,
      cyclic: false,
    }
  }

  pub fn is_cyclic(&self) -> bool { self.cyclic }

  pub fn nodes(&self) -> impl Iterator<Item = &Node> { self.nodes.values() }

  pub fn edges(&self) -> impl Iterator<Item = &Edge> { self.edges.values() }

  pub fn node(&self, id: &str) -> Option<&Node> { self.nodes.get(id) }

  /// Removes nodes that are terminated and cancelled; reference nodes
  /// are removed when every source endpoint of their inbound edges is.
  /// Returns the removed identifiers.
  pub fn remove_terminated_nodes(&mut self) -> Vec<String> {
    let mut removed = Vec::new();
    let ids: Vec<String> = self.nodes.keys().cloned().collect();
    for id in ids {
      let node = &self.nodes[&id];
      let remove = if node.reference {
        node.edge_refs.iter().all(|eid| {
          let Some(edge) = self.edges.get(eid) else { return true };
          let Some(source) = self.nodes.get(&edge.from) else {
            return true;
          };
          source.terminated == Some(true) && source.cancelled == Some(true)
        })
      } else {
        node.terminated == Some(true) && node.cancelled == Some(true)
      };
      if remove {
        self.nodes.remove(&id);
        removed.push(id);
      }
    }
    debug!(removed = removed.len(), "pruned terminated nodes");
    removed
  }

  /// Serializes as `{edges, nodes, trace?, full?}`.
  pub fn to_json(&self) -> String { self.render(false) }

  /// Like [`to_json`](Self::to_json) with a generated timestamp.
  pub fn to_json_timestamped(&self) -> String { self.render(true) }

  fn render(&self, timestamp: bool) -> String {
    let view = GraphView {
      edges: self.edges.values().collect(),
      trace: self.trace.then_some(true),
      nodes: self.nodes.values().collect(),
      full: self.subscan.then_some(false),
      timestamp: timestamp.then(|| {
        SystemTime::now()
          .duration_since(UNIX_EPOCH)
          .map(|d| d.as_millis() as u64)
          .unwrap_or_default()
      }),
    };
    serde_json::to_string(&view).expect("graph view serializes")
  }

  fn add_edge(&mut self, edge: Edge) {
    if let Some(from) = self.nodes.get_mut(&edge.from) {
      from.edge_refs.push(edge.id.clone());
    }
    self.edges.insert(edge.id.clone(), edge);
  }

  fn virtual_ref(&mut self, name: &str, ancestor: &Node) {
    let edge = Edge::new(&ancestor.id, name, Some(EdgeType::Reference));
    let mut stub = Node::reference(name, &ancestor.origin);
    stub.edge_refs.push(edge.id.clone());
    self.nodes.insert(stub.id.clone(), stub);
    self.add_edge(edge);
  }

  /// Probes `o`, expanding feedback loops into their own sub-walks.
  fn expand(&mut self, o: &dyn GraphNode, root: Option<&str>) -> Node {
    let node = Node::probe(o, root);
    if (self.trace || !trace_only(o)) && o.as_loop_back().is_some() {
      let lb = o.as_loop_back().expect("probed above");
      if let Some(target) = lb.loop_input() {
        match target {
          NodeRef::Actual(input) if ident(input) != ident(o) => {
            let input_node = self.expand(input, Some(node.origin.as_str()));
            self.add_edge(Edge::new(
              &node.id,
              &input_node.id,
              Some(EdgeType::FeedbackLoop),
            ));
            self.add_downstream(Some((input, input_node)), None);
          }
          NodeRef::Actual(_) => {}
          NodeRef::Virtual(name) => self.virtual_ref(name, &node),
        }
      }
      if let Some(target) = lb.loop_output() {
        match target {
          NodeRef::Actual(output) if ident(output) != ident(o) => {
            let output_node = self.expand(output, Some(node.origin.as_str()));
            self.add_edge(Edge::new(
              &output_node.id,
              &node.id,
              Some(EdgeType::FeedbackLoop),
            ));
            self.add_upstream(Some((output, output_node)), None);
          }
          NodeRef::Actual(_) => {}
          NodeRef::Virtual(name) => self.virtual_ref(name, &node),
        }
      }
    }
    node
  }

  fn add_upstream(
    &mut self,
    target: Option<(&dyn GraphNode, Node)>,
    grandchild: Option<Node>,
  ) {
    let Some((obj, node)) = target else { return };
    let child = if self.trace || !trace_only(obj) {
      if self.nodes.contains_key(&node.id) && grandchild.is_some() {
        self.cyclic = true;
        return;
      }
      self.nodes.insert(node.id.clone(), node.clone());
      Some(node.clone())
    } else {
      grandchild
    };
    if let Some(up) = obj.as_upstream() {
      match up.upstream() {
        Some(NodeRef::Virtual(name)) => self.virtual_ref(name, &node),
        Some(NodeRef::Actual(input)) => {
          let upstream_node = self.expand(input, Some(node.origin.as_str()));
          if let Some(child) = &child {
            if self.trace || !trace_only(input) {
              self.add_edge(Edge::new(&upstream_node.id, &child.id, None));
            }
          }
          self.add_upstream(Some((input, upstream_node)), child.clone());
        }
        None => {}
      }
    }
    if let Some(multi) = obj.as_multi_upstream() {
      self.add_upstreams(child.as_ref(), multi.upstreams());
    }
    if let Some(multi) = obj.as_multi_downstream() {
      self.add_downstreams(child.as_ref(), multi.downstreams());
    }
  }

  fn add_upstreams(&mut self, target: Option<&Node>, refs: Vec<NodeRef<'_>>) {
    for r in refs {
      match r {
        NodeRef::Virtual(name) => {
          if let Some(target) = target {
            self.virtual_ref(name, target);
          }
        }
        NodeRef::Actual(input) => {
          let source =
            self.expand(input, target.map(|t| t.origin.as_str()));
          if let Some(target) = target {
            self.add_edge(Edge::new(
              &source.id,
              &target.id,
              Some(EdgeType::Inner),
            ));
          }
          self.add_upstream(Some((input, source)), target.cloned());
        }
      }
    }
  }

  fn add_downstream(
    &mut self,
    origin: Option<(&dyn GraphNode, Node)>,
    ancestor: Option<Node>,
  ) {
    let Some((obj, node)) = origin else { return };
    let root = if self.trace || !trace_only(obj) {
      if self.nodes.contains_key(&node.id) && ancestor.is_some() {
        self.cyclic = true;
        return;
      }
      self.nodes.insert(node.id.clone(), node.clone());
      Some(node.clone())
    } else {
      ancestor
    };
    if let Some(down) = obj.as_downstream() {
      match down.downstream() {
        Some(NodeRef::Virtual(name)) => self.virtual_ref(name, &node),
        Some(NodeRef::Actual(output)) => {
          let downstream_node = self.expand(output, Some(node.origin.as_str()));
          if let Some(root) = &root {
            if self.trace || !trace_only(output) {
              self.add_edge(Edge::new(&root.id, &downstream_node.id, None));
            }
          }
          self.add_downstream(Some((output, downstream_node)), root.clone());
        }
        None => {}
      }
    }
    if let Some(multi) = obj.as_multi_downstream() {
      self.add_downstreams(root.as_ref(), multi.downstreams());
    }
    if let Some(multi) = obj.as_multi_upstream() {
      self.add_upstreams(root.as_ref(), multi.upstreams());
    }
  }

  fn add_downstreams(&mut self, source: Option<&Node>, refs: Vec<NodeRef<'_>>) {
    for r in refs {
      match r {
        NodeRef::Virtual(name) => {
          if let Some(source) = source {
            self.virtual_ref(name, source);
          }
        }
        NodeRef::Actual(output) => {
          let downstream_node =
            self.expand(output, source.map(|s| s.origin.as_str()));
          if let Some(source) = source {
            self.add_edge(Edge::new(
              &source.id,
              &downstream_node.id,
              Some(EdgeType::Inner),
            ));
          }
          self.add_downstream(Some((output, downstream_node)), source.cloned());
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::OnceCell;
  use std::rc::Rc;

  use super::*;
  use crate::graph::caps::*;

  /// Linear stage owning its upstream, the shape of an operator chain.
  struct Stage {
    label: &'static str,
    trace_only: bool,
    up: Option<Box<Stage>>,
    sink: Option<&'static str>,
  }

  impl Stage {
    fn source(label: &'static str) -> Stage {
      Stage { label, trace_only: false, up: None, sink: None }
    }

    fn over(label: &'static str, up: Stage) -> Stage {
      Stage { label, trace_only: false, up: Some(Box::new(up)), sink: None }
    }
  }

  impl Introspectable for Stage {
    fn name(&self) -> Option<&str> { Some(self.label) }
    fn is_trace_only(&self) -> bool { self.trace_only }
  }

  impl Upstream for Stage {
    fn upstream(&self) -> Option<NodeRef<'_>> {
      if let Some(sink) = self.sink {
        return Some(NodeRef::Virtual(sink));
      }
      self
        .up
        .as_deref()
        .map(|s| NodeRef::Actual(s as &dyn GraphNode))
    }
  }

  impl GraphNode for Stage {
    fn as_upstream(&self) -> Option<&dyn Upstream> { Some(self) }
    fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
  }

  #[test]
  fn walks_a_linear_chain() {
    let chain = Stage::over("map", Stage::over("filter", Stage::source("it")));
    let graph = scan(&chain);
    assert!(!graph.is_cyclic());
    let names: Vec<_> = graph.nodes().map(|n| n.name()).collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"map"));
    assert!(names.contains(&"filter"));
    assert!(names.contains(&"it"));
    assert_eq!(graph.edges().count(), 2);
  }

  #[test]
  fn trace_only_nodes_are_skipped_unless_traced() {
    let mut hidden = Stage::over("hidden", Stage::source("it"));
    hidden.trace_only = true;
    let chain = Stage::over("map", hidden);

    let graph = scan(&chain);
    assert_eq!(graph.nodes().count(), 2);
    // the skipped node's neighbour attaches to the walk ancestor
    let edge = graph.edges().next().unwrap();
    assert!(edge.from().starts_with("it:"));
    assert!(edge.to().starts_with("map:"));

    let traced = scan_trace(&chain, true);
    assert_eq!(traced.nodes().count(), 3);
  }

  #[test]
  fn virtual_reference_becomes_stub_node() {
    let mut chain = Stage::source("head");
    chain.sink = Some("remote://sink");
    let graph = scan(&chain);
    let stub = graph.node("remote://sink").expect("stub node");
    assert!(stub.is_reference());
    let edge = graph.edges().next().unwrap();
    assert_eq!(edge.kind(), Some(EdgeType::Reference));
    assert_eq!(edge.to(), "remote://sink");
  }

  /// Cycle fixture: two nodes pointing at each other through `Rc`.
  struct Ring {
    label: &'static str,
    up: OnceCell<Rc<Ring>>,
  }

  impl Introspectable for Ring {
    fn name(&self) -> Option<&str> { Some(self.label) }
  }

  impl Upstream for Ring {
    fn upstream(&self) -> Option<NodeRef<'_>> {
      self
        .up
        .get()
        .map(|rc| NodeRef::Actual(rc.as_ref() as &dyn GraphNode))
    }
  }

  impl GraphNode for Ring {
    fn as_upstream(&self) -> Option<&dyn Upstream> { Some(self) }
    fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
  }

  #[test]
  fn revisiting_a_node_sets_cyclic() {
    let a = Rc::new(Ring { label: "a", up: OnceCell::new() });
    let b = Rc::new(Ring { label: "b", up: OnceCell::new() });
    a.up.set(b.clone()).ok().unwrap();
    b.up.set(a.clone()).ok().unwrap();

    let graph = scan(a.as_ref());
    assert!(graph.is_cyclic());
    assert!(graph.nodes().count() <= 2);
  }

  /// Stage walked by its successors, the shape of a subscriber chain.
  struct Tap {
    label: &'static str,
    down: Option<Box<Tap>>,
  }

  impl Introspectable for Tap {
    fn name(&self) -> Option<&str> { Some(self.label) }
  }

  impl Downstream for Tap {
    fn downstream(&self) -> Option<NodeRef<'_>> {
      self
        .down
        .as_deref()
        .map(|t| NodeRef::Actual(t as &dyn GraphNode))
    }
  }

  impl GraphNode for Tap {
    fn as_downstream(&self) -> Option<&dyn Downstream> { Some(self) }
    fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
  }

  #[test]
  fn subscan_walks_downstream_only() {
    let chain = Tap {
      label: "head",
      down: Some(Box::new(Tap { label: "sink", down: None })),
    };
    let graph = subscan(&chain);
    assert_eq!(graph.nodes().count(), 2);
    let edge = graph.edges().next().unwrap();
    assert!(edge.from().starts_with("head:"));
    assert!(edge.to().starts_with("sink:"));
    assert_eq!(edge.kind(), None);
  }

  /// Node declaring a feedback loop to stages outside the linear chain.
  struct Pump {
    input: Stage,
    output: Stage,
  }

  impl Introspectable for Pump {
    fn name(&self) -> Option<&str> { Some("pump") }
  }

  impl LoopBack for Pump {
    fn loop_input(&self) -> Option<NodeRef<'_>> {
      Some(NodeRef::Actual(&self.input))
    }
    fn loop_output(&self) -> Option<NodeRef<'_>> {
      Some(NodeRef::Actual(&self.output))
    }
  }

  impl GraphNode for Pump {
    fn as_loop_back(&self) -> Option<&dyn LoopBack> { Some(self) }
    fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
  }

  #[test]
  fn feedback_loops_walk_both_connected_ends() {
    let pump = Pump {
      input: Stage::source("loop-in"),
      output: Stage::source("loop-out"),
    };
    let graph = scan(&pump);
    assert_eq!(graph.nodes().count(), 3);
    let loops: Vec<_> = graph
      .edges()
      .filter(|e| e.kind() == Some(EdgeType::FeedbackLoop))
      .collect();
    assert_eq!(loops.len(), 2);
    assert!(loops.iter().any(|e| e.to().starts_with("loop-in:")));
    assert!(loops.iter().any(|e| e.from().starts_with("loop-out:")));
  }

  /// Prunable fixture with explicit lifecycle state.
  struct Finished {
    label: &'static str,
    terminated: bool,
    cancelled: bool,
  }

  impl Introspectable for Finished {
    fn name(&self) -> Option<&str> { Some(self.label) }
  }

  impl Completable for Finished {
    fn is_started(&self) -> bool { !self.terminated }
    fn is_terminated(&self) -> bool { self.terminated }
  }

  impl Cancellable for Finished {
    fn is_cancelled(&self) -> bool { self.cancelled }
  }

  impl GraphNode for Finished {
    fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
    fn as_completable(&self) -> Option<&dyn Completable> { Some(self) }
    fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
  }

  #[test]
  fn pruning_requires_terminated_and_cancelled() {
    let dead = Finished { label: "dead", terminated: true, cancelled: true };
    let half = Finished { label: "half", terminated: true, cancelled: false };

    let mut graph = scan(&dead);
    let removed = graph.remove_terminated_nodes();
    assert_eq!(removed.len(), 1);
    assert_eq!(graph.nodes().count(), 0);

    let mut graph = scan(&half);
    assert!(graph.remove_terminated_nodes().is_empty());
    assert_eq!(graph.nodes().count(), 1);
  }

  /// Amount-reporting fixture.
  struct Metered;

  impl Introspectable for Metered {
    fn name(&self) -> Option<&str> { Some("metered") }
    fn key(&self) -> Option<String> { Some("metered-1".into()) }
  }

  impl Backpressurable for Metered {
    fn capacity(&self) -> Option<u64> { Some(UNBOUNDED) }
    fn pending(&self) -> Option<u64> { Some(3) }
  }

  impl Prefetchable for Metered {
    fn limit(&self) -> Option<u64> { Some(32) }
    fn expected_from_upstream(&self) -> Option<u64> { Some(8) }
  }

  impl GraphNode for Metered {
    fn as_introspectable(&self) -> Option<&dyn Introspectable> { Some(self) }
    fn as_backpressurable(&self) -> Option<&dyn Backpressurable> {
      Some(self)
    }
    fn as_prefetchable(&self) -> Option<&dyn Prefetchable> { Some(self) }
  }

  #[test]
  fn unbounded_serializes_as_string_and_unknowns_are_omitted() {
    let graph = scan(&Metered);
    let json = graph.to_json();
    assert!(json.contains("\"capacity\":\"unbounded\""));
    assert!(json.contains("\"buffered\":3"));
    assert!(json.contains("\"definedId\":true"));
    assert!(json.contains("\"id\":\"metered-1\""));
    assert!(json.contains("\"upstreamLimit\":32"));
    assert!(json.contains("\"expectedUpstream\":8"));
    // unknown numerics are omitted entirely
    assert!(!json.contains("requestedDownstream"));
    assert!(!json.contains("period"));
    // no trace/full markers on a plain full scan
    assert!(!json.contains("\"trace\""));
    assert!(!json.contains("\"full\""));
  }

  #[test]
  fn subscan_marks_partial_view() {
    let graph = subscan(&Metered);
    assert!(graph.to_json().contains("\"full\":false"));
  }
}
