// graph.rs — Parallel dataflow graph produced by the lowering pipeline
//
// The lowering target: buffer and symbol declarations, a linear chain of
// states, and per-state parallel-map + kernel-node + movement-edge wiring.
// This module holds the data model and queries; construction lives in
// `assemble.rs`.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::ir::{Axis, Dtype, IterationOrder};
use crate::ranges::VerticalBound;
use crate::subsets::Subset;

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Unique identifier for a state within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateId(pub u32);

/// Unique identifier for a node, unique across all states of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Unique identifier for an edge, unique across all states of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeId(pub u32);

// ── Nodes ───────────────────────────────────────────────────────────────────

/// The kind of a dataflow node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    /// Read accessor of a buffer. At most one per buffer per state.
    BufferRead { buffer: String },
    /// Write accessor of a buffer. At most one per buffer per state.
    BufferWrite { buffer: String },
    /// Entry boundary of a parallel map over the horizontal domain.
    MapEntry {
        name: String,
        i_range: (i64, i64),
        j_range: (i64, i64),
    },
    /// Exit boundary of a parallel map.
    MapExit { name: String },
    /// Opaque scalar kernel with typed input/output ports.
    Kernel {
        name: String,
        code: String,
        order: IterationOrder,
        k_range: (VerticalBound, VerticalBound),
        /// Input port names, one per field input descriptor.
        inputs: Vec<String>,
        /// Output port names, one per output descriptor.
        outputs: Vec<String>,
    },
}

/// A node in a state.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

// ── Edges ───────────────────────────────────────────────────────────────────

/// Payload of a data-movement edge: which slice of which buffer moves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movement {
    pub buffer: String,
    pub subset: Subset,
    /// Best-effort movement: the access is not guaranteed to execute.
    pub dynamic: bool,
}

/// A directed edge between two nodes of the same state. `movement == None`
/// marks a control-only edge keeping an empty map well formed.
#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Kernel output connector this edge leaves from.
    pub src_port: Option<String>,
    /// Kernel input connector this edge arrives at.
    pub dst_port: Option<String>,
    pub movement: Option<Movement>,
}

// ── States ──────────────────────────────────────────────────────────────────

/// One state of the graph: at most one map region wrapping one kernel,
/// connected to buffer accessors via movement edges.
#[derive(Debug, Clone, Serialize)]
pub struct State {
    pub id: StateId,
    pub label: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl State {
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn kernel(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Kernel { .. }))
    }

    pub fn map_entry(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::MapEntry { .. }))
    }

    pub fn map_exit(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::MapExit { .. }))
    }

    pub fn read_accessors(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::BufferRead { .. }))
            .collect()
    }

    pub fn write_accessors(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::BufferWrite { .. }))
            .collect()
    }

    /// Edges into `target`.
    pub fn in_edges(&self, target: NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == target).collect()
    }

    /// Edges out of `source`.
    pub fn out_edges(&self, source: NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == source).collect()
    }
}

// ── Declarations ────────────────────────────────────────────────────────────

/// Symbolic size of one buffer axis: the domain extent plus the halo frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeExpr {
    pub axis: Axis,
    pub frame: i64,
}

impl fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frame == 0 {
            write!(f, "{}", self.axis)
        } else {
            write!(f, "{}{:+}", self.axis, self.frame)
        }
    }
}

/// Ownership of a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BufferKind {
    /// Externally-owned API argument with symbolic per-axis strides.
    External { strides: [String; 3] },
    /// Graph-owned temporary, persistent for the lifetime of the graph.
    Transient,
}

/// Declaration of one field buffer.
#[derive(Debug, Clone, Serialize)]
pub struct BufferDecl {
    pub name: String,
    pub dtype: Dtype,
    pub shape: [SizeExpr; 3],
    pub kind: BufferKind,
}

/// Declaration of one scalar-parameter symbol.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolDecl {
    pub name: String,
    pub dtype: Dtype,
}

// ── Graph ───────────────────────────────────────────────────────────────────

/// The complete lowered graph.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    pub name: String,
    pub buffers: BTreeMap<String, BufferDecl>,
    pub symbols: BTreeMap<String, SymbolDecl>,
    pub states: Vec<State>,
    /// Unconditional control edges forming a single linear chain.
    pub links: Vec<(StateId, StateId)>,
    /// The designated entry state.
    pub entry: StateId,
}

impl Graph {
    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Deterministic JSON rendering for artifact dumps and cache keys.
    /// All maps are ordered, so the output is stable across runs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("graph serialization is infallible")
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Graph '{}' ({} buffers, {} symbols, {} states)",
            self.name,
            self.buffers.len(),
            self.symbols.len(),
            self.states.len()
        )?;
        for buffer in self.buffers.values() {
            let kind = match buffer.kind {
                BufferKind::External { .. } => "external",
                BufferKind::Transient => "transient",
            };
            writeln!(
                f,
                "  buffer '{}': {} [{}, {}, {}] ({})",
                buffer.name, buffer.dtype, buffer.shape[0], buffer.shape[1], buffer.shape[2], kind
            )?;
        }
        for symbol in self.symbols.values() {
            writeln!(f, "  symbol '{}': {}", symbol.name, symbol.dtype)?;
        }
        for state in &self.states {
            writeln!(
                f,
                "  state '{}': {} nodes, {} edges",
                state.label,
                state.nodes.len(),
                state.edges.len()
            )?;
        }
        if !self.links.is_empty() {
            writeln!(f, "  control edges: {}", self.links.len())?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
