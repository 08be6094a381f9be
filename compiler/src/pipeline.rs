// pipeline.rs — Lowering state and pass orchestration
//
// Holds all pass side tables and runs the minimal set of passes for a given
// terminal PassId. Lowering is all-or-nothing: the first fatal error aborts
// the run and no partial graph is returned.
//
// Preconditions: the input tree is set before calling run_lowering.
// Postconditions: artifacts for all required passes are populated, or the
//   run returns the fatal error of the failing pass.
// Failure modes: any pass returning a fatal error; a failed post-assembly
//   verification certificate.
// Side effects: calls on_pass_complete after each pass for progress display.

use std::time::Instant;

use crate::access::AccessTable;
use crate::diag::{codes, LoweringError};
use crate::graph::Graph;
use crate::ir::StencilIr;
use crate::kernel::KernelTable;
use crate::pass::{descriptor, required_passes, PassId};
use crate::ranges::RangeTable;
use crate::subsets::SubsetTable;
use crate::verify::verify_lowering;

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds the input tree and all pass side tables.
pub struct LoweringState {
    pub ir: StencilIr,
    pub ranges: Option<RangeTable>,
    pub accesses: Option<AccessTable>,
    pub subsets: Option<SubsetTable>,
    pub kernels: Option<KernelTable>,
    pub graph: Option<Graph>,
}

impl LoweringState {
    pub fn new(ir: StencilIr) -> Self {
        Self {
            ir,
            ranges: None,
            accesses: None,
            subsets: None,
            kernels: None,
            graph: None,
        }
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Fingerprint record for hermetic builds and cache-key use.
///
/// `ir_fingerprint`: SHA-256 of the canonical input-tree JSON.
/// `graph_fingerprint`: SHA-256 of the produced graph JSON, when assembled.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub ir_fingerprint: [u8; 32],
    pub graph_fingerprint: Option<[u8; 32]>,
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the input fingerprint (64 characters).
    pub fn ir_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.ir_fingerprint)
    }

    /// Hex string of the graph fingerprint, when present.
    pub fn graph_fingerprint_hex(&self) -> Option<String> {
        self.graph_fingerprint.as_ref().map(bytes_to_hex)
    }

    /// Serialize provenance as a JSON string for build-info emission.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"ir_fingerprint\": \"{}\",\n  \"graph_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.ir_fingerprint_hex(),
            self.graph_fingerprint_hex().unwrap_or_default(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance fingerprints from the lowering state.
///
/// Uses SHA-256 over canonical compact JSON (ordered maps, structured keys
/// rendered through their stable encodings), so the fingerprints are stable
/// across runs and independent of display formatting.
pub fn compute_provenance(state: &LoweringState) -> Provenance {
    let ir_json =
        serde_json::to_string(&state.ir).expect("input tree serialization is infallible");
    Provenance {
        ir_fingerprint: sha256(ir_json.as_bytes()),
        graph_fingerprint: state.graph.as_ref().map(|g| sha256(g.to_json().as_bytes())),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute, store the artifact, report completion. After
/// graph assembly the G1-G4 obligations are verified; a failed certificate
/// aborts the run.
pub fn run_lowering(
    state: &mut LoweringState,
    terminal: PassId,
    verbose: bool,
    mut on_pass_complete: impl FnMut(PassId),
) -> Result<(), LoweringError> {
    for &pass_id in &required_passes(terminal) {
        let t = Instant::now();
        match pass_id {
            PassId::PropagateRanges => {
                state.ranges = Some(crate::ranges::propagate_ranges(&state.ir));
            }
            PassId::ClassifyAccesses => {
                state.accesses = Some(crate::access::classify_accesses(&state.ir)?);
            }
            PassId::MapSubsets => {
                state.subsets = Some(crate::subsets::map_subsets(
                    &state.ir,
                    state.ranges.as_ref().unwrap(),
                    state.accesses.as_ref().unwrap(),
                )?);
            }
            PassId::EmitKernels => {
                state.kernels = Some(crate::kernel::emit_kernels(
                    &state.ir,
                    state.accesses.as_ref().unwrap(),
                )?);
            }
            PassId::AssembleGraph => {
                let graph = crate::assemble::assemble_graph(
                    &state.ir,
                    state.ranges.as_ref().unwrap(),
                    state.subsets.as_ref().unwrap(),
                    state.kernels.as_ref().unwrap(),
                )?;
                let cert =
                    verify_lowering(&state.ir, state.accesses.as_ref().unwrap(), &graph);
                if !cert.all_pass() {
                    let failed: Vec<&str> = cert
                        .obligations()
                        .iter()
                        .filter(|(_, ok)| !ok)
                        .map(|(name, _)| *name)
                        .collect();
                    return Err(LoweringError::inconsistent_access(
                        codes::E0301,
                        "lowering verification failed (G1-G4 obligations not met)",
                    )
                    .with_detail(failed.join(", ")));
                }
                state.graph = Some(graph);
            }
        }
        if verbose {
            eprintln!(
                "sgc: {} complete, {:.1}ms",
                descriptor(pass_id).name,
                t.elapsed().as_secs_f64() * 1000.0
            );
        }
        on_pass_complete(pass_id);
    }
    Ok(())
}

/// Lower a stencil tree end to end and return the assembled graph.
pub fn lower(ir: &StencilIr) -> Result<Graph, LoweringError> {
    let mut state = LoweringState::new(ir.clone());
    run_lowering(&mut state, PassId::AssembleGraph, false, |_| {})?;
    Ok(state.graph.take().unwrap())
}

// ── Tests ──────────────────────────────────────────────────────────────────
