// verify.rs — Post-assembly verification of the lowering obligations
//
// Machine-checkable evidence that the assembled graph satisfies the pipeline
// invariants. Each field records whether the corresponding obligation holds;
// a failed obligation is an internal invariant violation, not a user error.
//
// Preconditions: access table and graph fully constructed.
// Postconditions: none (read-only checks).
// Failure modes: none here; the pipeline turns a failed certificate into a
//   fatal error.
// Side effects: none.

use std::collections::BTreeSet;

use crate::access::AccessTable;
use crate::graph::{Graph, NodeKind};
use crate::ir::StencilIr;

/// Evidence for the G1-G4 lowering obligations.
#[derive(Debug, Clone)]
pub struct LoweringCert {
    /// G1: N blocks produce N+1 states on a single control path.
    pub g1_linear_chain: bool,
    /// G2: at most one read and one write accessor per buffer per state.
    pub g2_unique_accessors: bool,
    /// G3: kernel port lists match the connector edges wired to them.
    pub g3_port_consistency: bool,
    /// G4: every block's dynamic accesses are a subset of its accesses.
    pub g4_dynamic_subset: bool,
}

impl LoweringCert {
    pub fn all_pass(&self) -> bool {
        self.g1_linear_chain
            && self.g2_unique_accessors
            && self.g3_port_consistency
            && self.g4_dynamic_subset
    }

    /// Obligation names with their outcomes, for error reporting.
    pub fn obligations(&self) -> [(&'static str, bool); 4] {
        [
            ("g1_linear_chain", self.g1_linear_chain),
            ("g2_unique_accessors", self.g2_unique_accessors),
            ("g3_port_consistency", self.g3_port_consistency),
            ("g4_dynamic_subset", self.g4_dynamic_subset),
        ]
    }
}

/// Verify the G1-G4 obligations against the assembled graph.
pub fn verify_lowering(ir: &StencilIr, accesses: &AccessTable, graph: &Graph) -> LoweringCert {
    LoweringCert {
        g1_linear_chain: verify_linear_chain(ir, graph),
        g2_unique_accessors: verify_unique_accessors(graph),
        g3_port_consistency: verify_port_consistency(graph),
        g4_dynamic_subset: verify_dynamic_subset(ir, accesses),
    }
}

fn verify_linear_chain(ir: &StencilIr, graph: &Graph) -> bool {
    let block_count = ir.blocks().count();
    if graph.states.len() != block_count + 1 {
        return false;
    }
    if graph.links.len() != graph.states.len() - 1 {
        return false;
    }
    let mut tail = graph.entry;
    let mut visited = BTreeSet::new();
    visited.insert(tail);
    for (source, target) in &graph.links {
        if *source != tail || !visited.insert(*target) {
            return false;
        }
        tail = *target;
    }
    true
}

fn verify_unique_accessors(graph: &Graph) -> bool {
    for state in &graph.states {
        let mut reads = BTreeSet::new();
        let mut writes = BTreeSet::new();
        for node in &state.nodes {
            match &node.kind {
                NodeKind::BufferRead { buffer } => {
                    if !reads.insert(buffer.clone()) {
                        return false;
                    }
                }
                NodeKind::BufferWrite { buffer } => {
                    if !writes.insert(buffer.clone()) {
                        return false;
                    }
                }
                _ => {}
            }
        }
    }
    true
}

fn verify_port_consistency(graph: &Graph) -> bool {
    for state in &graph.states {
        let kernel = match state.kernel() {
            Some(k) => k,
            None => continue, // entry state has no kernel
        };
        let (inputs, outputs) = match &kernel.kind {
            NodeKind::Kernel {
                inputs, outputs, ..
            } => (inputs, outputs),
            _ => unreachable!(),
        };

        let wired_in: BTreeSet<&String> = state
            .in_edges(kernel.id)
            .into_iter()
            .filter_map(|e| e.dst_port.as_ref())
            .collect();
        let wired_out: BTreeSet<&String> = state
            .out_edges(kernel.id)
            .into_iter()
            .filter_map(|e| e.src_port.as_ref())
            .collect();

        if wired_in != inputs.iter().collect() || wired_out != outputs.iter().collect() {
            return false;
        }
    }
    true
}

fn verify_dynamic_subset(ir: &StencilIr, accesses: &AccessTable) -> bool {
    ir.blocks().all(|block| {
        accesses
            .info(block.id)
            .map(|info| info.dynamic_accesses.is_subset(&info.accesses))
            .unwrap_or(false)
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
