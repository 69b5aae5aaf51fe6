//! The connection graph: nodes (stages) wired together by typed channels
//! (§3, §4.D).
//!
//! [`ProcessingGraph`] only describes the wiring; [`crate::scheduler::Pipeline`]
//! is what actually runs it. Keeping the two separate lets the graph be
//! validated (types match, no cycles, every port connected) before any
//! thread is spawned.

use crate::channel::{required_capacity, Channel};
use crate::element::ElementKind;
use crate::error::{EngineError, EngineResult};
use crate::stage::Stage;

/// Opaque handle to a node added to a [`ProcessingGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

pub(crate) struct NodeEntry {
    pub(crate) stage: Box<dyn Stage>,
    pub(crate) input_channels: Vec<Option<usize>>,
    pub(crate) output_channels: Vec<Option<usize>>,
}

pub(crate) struct Edge {
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
}

/// A directed graph of [`Stage`]s connected by [`Channel`]s.
#[derive(Default)]
pub struct ProcessingGraph {
    pub(crate) nodes: Vec<NodeEntry>,
    pub(crate) channels: Vec<Channel>,
    pub(crate) edges: Vec<Edge>,
}

impl ProcessingGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage to the graph, returning a handle used by [`ProcessingGraph::connect`].
    pub fn add_node(&mut self, stage: Box<dyn Stage>) -> NodeId {
        let input_channels = vec![None; stage.inputs().len()];
        let output_channels = vec![None; stage.outputs().len()];
        self.nodes.push(NodeEntry {
            stage,
            input_channels,
            output_channels,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Connects `from`'s output port `from_port` to `to`'s input port
    /// `to_port`, allocating the channel between them with the capacity
    /// formula from §4.A.
    pub fn connect(
        &mut self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> EngineResult<()> {
        if from == to {
            return Err(EngineError::internal(format!(
                "cannot connect node {} to itself (no self-loops)",
                from.0
            )));
        }

        let from_spec = self
            .nodes
            .get(from.0)
            .and_then(|n| n.stage.outputs().get(from_port))
            .cloned()
            .ok_or_else(|| {
                EngineError::internal(format!(
                    "node {} has no output port {from_port}",
                    from.0
                ))
            })?;
        let to_spec = self
            .nodes
            .get(to.0)
            .and_then(|n| n.stage.inputs().get(to_port))
            .cloned()
            .ok_or_else(|| {
                EngineError::internal(format!("node {} has no input port {to_port}", to.0))
            })?;

        if from_spec.kind != to_spec.kind {
            return Err(EngineError::internal(format!(
                "type mismatch connecting '{}' ({}) to '{}' ({})",
                from_spec.name, from_spec.kind, to_spec.name, to_spec.kind
            )));
        }

        if self.nodes[from.0].output_channels[from_port].is_some() {
            return Err(EngineError::internal(format!(
                "output port '{}' on node {} is already connected",
                from_spec.name, from.0
            )));
        }
        if self.nodes[to.0].input_channels[to_port].is_some() {
            return Err(EngineError::internal(format!(
                "input port '{}' on node {} is already connected",
                to_spec.name, to.0
            )));
        }

        let capacity = required_capacity(from_spec.batch, to_spec.history, to_spec.batch, to_spec.look_ahead);
        let channel = match from_spec.kind {
            ElementKind::Real => Channel::new_real(capacity),
            ElementKind::Complex => Channel::new_complex(capacity),
        };
        let channel_index = self.channels.len();
        self.channels.push(channel);

        self.nodes[from.0].output_channels[from_port] = Some(channel_index);
        self.nodes[to.0].input_channels[to_port] = Some(channel_index);
        self.edges.push(Edge { from, to });

        Ok(())
    }

    /// Validates that every declared port is connected and the graph has no
    /// cycles (§3 invariants (a)-(d)).
    pub fn validate(&self) -> EngineResult<()> {
        for (idx, node) in self.nodes.iter().enumerate() {
            for (port, slot) in node.input_channels.iter().enumerate() {
                if slot.is_none() {
                    return Err(EngineError::internal(format!(
                        "node {idx} input port '{}' is not connected",
                        node.stage.inputs()[port].name
                    )));
                }
            }
            for (port, slot) in node.output_channels.iter().enumerate() {
                if slot.is_none() {
                    return Err(EngineError::internal(format!(
                        "node {idx} output port '{}' is not connected",
                        node.stage.outputs()[port].name
                    )));
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> EngineResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let adjacency: Vec<Vec<usize>> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, _)| {
                self.edges
                    .iter()
                    .filter(|e| e.from.0 == idx)
                    .map(|e| e.to.0)
                    .collect()
            })
            .collect();

        fn visit(
            node: usize,
            marks: &mut [Mark],
            adjacency: &[Vec<usize>],
        ) -> EngineResult<()> {
            match marks[node] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(EngineError::internal(format!(
                        "graph has a cycle through node {node}"
                    )))
                }
                Mark::Unvisited => {}
            }
            marks[node] = Mark::InProgress;
            for &next in &adjacency[node] {
                visit(next, marks, adjacency)?;
            }
            marks[node] = Mark::Done;
            Ok(())
        }

        for idx in 0..self.nodes.len() {
            visit(idx, &mut marks, &adjacency)?;
        }
        Ok(())
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
