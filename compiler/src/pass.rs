// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the pipeline's 5 lowering passes, their dependency edges, and the
// artifacts they produce. Used by the pipeline runner to compute minimal pass
// subsets for a given terminal artifact.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each lowering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    PropagateRanges,
    ClassifyAccesses,
    MapSubsets,
    EmitKernels,
    AssembleGraph,
}

/// Machine-readable artifact identifiers. Each maps to a concrete side table
/// in the lowering state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Ranges,   // RangeTable
    Accesses, // AccessTable
    Subsets,  // SubsetTable
    Kernels,  // KernelTable
    Graph,    // Graph
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a lowering pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Describes what invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::PropagateRanges => PassDescriptor {
            name: "propagate_ranges",
            inputs: &[],
            outputs: &[ArtifactId::Ranges],
            invalidation_key: "regions + intervals",
            invariants: "every block has resolved horizontal and vertical ranges",
        },
        PassId::ClassifyAccesses => PassDescriptor {
            name: "classify_accesses",
            inputs: &[],
            outputs: &[ArtifactId::Accesses],
            invalidation_key: "bodies + metadata tables",
            invariants: "dynamic accesses are a subset of accesses, all refs bound",
        },
        PassId::MapSubsets => PassDescriptor {
            name: "map_subsets",
            inputs: &[PassId::PropagateRanges, PassId::ClassifyAccesses],
            outputs: &[ArtifactId::Subsets],
            invalidation_key: "ranges + accesses + halos",
            invariants: "one descriptor per accessed local name, first seen wins",
        },
        PassId::EmitKernels => PassDescriptor {
            name: "emit_kernels",
            inputs: &[PassId::ClassifyAccesses],
            outputs: &[ArtifactId::Kernels],
            invalidation_key: "bodies + accesses",
            invariants: "kernel source references only bound local names",
        },
        PassId::AssembleGraph => PassDescriptor {
            name: "assemble_graph",
            inputs: &[PassId::MapSubsets, PassId::EmitKernels],
            outputs: &[ArtifactId::Graph],
            invalidation_key: "subsets + kernels + metadata tables",
            invariants: "states form a linear chain, one accessor per buffer per state",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All 5 pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 5] = [
    PassId::PropagateRanges,
    PassId::ClassifyAccesses,
    PassId::MapSubsets,
    PassId::EmitKernels,
    PassId::AssembleGraph,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
