// assemble.rs — Dataflow graph assembly (pass 5)
//
// Builds the output graph from the per-block side tables: buffer and symbol
// declarations, one state per computation block linked into a linear chain,
// and per-state map/kernel/accessor wiring. Two descriptors targeting the
// same outer buffer in one state merge into a single accessor edge carrying
// the union of their subsets.
//
// Preconditions: range, subset, and kernel tables populated for every block.
// Postconditions: returns a graph whose states form a single path from the
//   designated entry state; every buffer has at most one read and one write
//   accessor per state.
// Failure modes: kernel source and descriptor maps out of sync (internal
//   invariant violation, fatal).
// Side effects: none. All generated names come from counters scoped to one
//   assembler instance, so repeated invocations never share state.

use std::collections::{BTreeMap, BTreeSet};

use crate::diag::{codes, LoweringError};
use crate::graph::{
    BufferDecl, BufferKind, Edge, EdgeId, Graph, Movement, Node, NodeId, NodeKind, SizeExpr,
    State, StateId, SymbolDecl,
};
use crate::ir::{Axis, ComputationBlock, StencilIr};
use crate::kernel::KernelTable;
use crate::names::{LocalName, LOCAL_OUT_PREFIX, LOCAL_PREFIX};
use crate::ranges::RangeTable;
use crate::subsets::{BlockSubsets, SubsetDescriptor, SubsetTable};

// ── Public entry point ──────────────────────────────────────────────────────

/// Assemble the dataflow graph from the pass side tables.
pub fn assemble_graph(
    ir: &StencilIr,
    ranges: &RangeTable,
    subsets: &SubsetTable,
    kernels: &KernelTable,
) -> Result<Graph, LoweringError> {
    Assembler {
        ir,
        ranges,
        subsets,
        kernels,
        next_node: 0,
        next_edge: 0,
        state_counter: 0,
        map_counter: 0,
        kernel_counter: 0,
    }
    .run()
}

// ── Assembler ───────────────────────────────────────────────────────────────

struct Assembler<'a> {
    ir: &'a StencilIr,
    ranges: &'a RangeTable,
    subsets: &'a SubsetTable,
    kernels: &'a KernelTable,
    next_node: u32,
    next_edge: u32,
    state_counter: u32,
    map_counter: u32,
    kernel_counter: u32,
}

impl<'a> Assembler<'a> {
    fn run(mut self) -> Result<Graph, LoweringError> {
        let buffers = self.declare_buffers();
        let symbols = self.declare_symbols();

        let entry = self.new_state();
        let mut states = vec![entry];
        let mut links = Vec::new();
        let mut tail = states[0].id;

        for region in &self.ir.regions {
            for block in &region.blocks {
                let state = self.build_state(block)?;
                links.push((tail, state.id));
                tail = state.id;
                states.push(state);
            }
        }

        Ok(Graph {
            name: self.ir.name.clone(),
            buffers,
            symbols,
            states,
            links,
            entry: StateId(0),
        })
    }

    // ── Declarations ────────────────────────────────────────────────────

    /// One buffer per field that some descriptor actually references.
    fn declare_buffers(&self) -> BTreeMap<String, BufferDecl> {
        let mut referenced: BTreeSet<&str> = BTreeSet::new();
        for block in self.ir.blocks() {
            if let Some(subs) = self.subsets.get(block.id) {
                for d in subs.inputs.values().chain(subs.outputs.values()) {
                    if self.ir.fields.contains_key(&d.outer_name) {
                        referenced.insert(&d.outer_name);
                    }
                }
            }
        }

        let mut buffers = BTreeMap::new();
        for name in referenced {
            let meta = &self.ir.fields[name];
            let shape = [
                SizeExpr {
                    axis: Axis::I,
                    frame: meta.halo.frame(Axis::I),
                },
                SizeExpr {
                    axis: Axis::J,
                    frame: meta.halo.frame(Axis::J),
                },
                SizeExpr {
                    axis: Axis::K,
                    frame: meta.halo.frame(Axis::K),
                },
            ];
            let kind = if meta.is_api_argument {
                BufferKind::External {
                    strides: [
                        format!("_{}_I_stride", name),
                        format!("_{}_J_stride", name),
                        format!("_{}_K_stride", name),
                    ],
                }
            } else {
                BufferKind::Transient
            };
            buffers.insert(
                name.to_string(),
                BufferDecl {
                    name: name.to_string(),
                    dtype: meta.dtype,
                    shape,
                    kind,
                },
            );
        }
        buffers
    }

    /// One symbol per scalar parameter, under its input-variant local name.
    fn declare_symbols(&self) -> BTreeMap<String, SymbolDecl> {
        let mut symbols = BTreeMap::new();
        for (name, dtype) in &self.ir.parameters {
            let key = LocalName::scalar(name, false).to_string();
            symbols.insert(
                key.clone(),
                SymbolDecl {
                    name: key,
                    dtype: *dtype,
                },
            );
        }
        symbols
    }

    // ── State construction ──────────────────────────────────────────────

    fn new_state(&mut self) -> State {
        let id = StateId(self.state_counter);
        let label = format!("state_{}", self.state_counter);
        self.state_counter += 1;
        State {
            id,
            label,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn add_node(&mut self, state: &mut State, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        state.nodes.push(Node { id, kind });
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn add_edge(
        &mut self,
        state: &mut State,
        source: NodeId,
        target: NodeId,
        src_port: Option<String>,
        dst_port: Option<String>,
        movement: Option<Movement>,
    ) -> EdgeId {
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        state.edges.push(Edge {
            id,
            source,
            target,
            src_port,
            dst_port,
            movement,
        });
        id
    }

    fn build_state(&mut self, block: &ComputationBlock) -> Result<State, LoweringError> {
        let ranges = *self.ranges.get(block.id).ok_or_else(|| {
            LoweringError::inconsistent_access(
                codes::E0300,
                format!("no resolved ranges for block {:?}", block.id),
            )
        })?;
        let subs = self
            .subsets
            .get(block.id)
            .ok_or_else(|| {
                LoweringError::inconsistent_access(
                    codes::E0300,
                    format!("no subset descriptors for block {:?}", block.id),
                )
            })?
            .clone();
        let code = self
            .kernels
            .source(block.id)
            .ok_or_else(|| {
                LoweringError::inconsistent_access(
                    codes::E0300,
                    format!("no kernel source for block {:?}", block.id),
                )
            })?
            .to_string();

        check_consistency(&code, &subs)?;

        let mut state = self.new_state();

        let map_name = format!("map_{}", self.map_counter);
        self.map_counter += 1;
        let kernel_name = format!("kernel_{}", self.kernel_counter);
        self.kernel_counter += 1;

        // Only field descriptors become kernel ports and movement edges;
        // scalar descriptors are serviced by the symbol declarations.
        let field_inputs: Vec<&SubsetDescriptor> = subs
            .inputs
            .values()
            .filter(|d| self.ir.fields.contains_key(&d.outer_name))
            .collect();
        let outputs: Vec<&SubsetDescriptor> = subs.outputs.values().collect();

        let map_entry = self.add_node(
            &mut state,
            NodeKind::MapEntry {
                name: map_name.clone(),
                i_range: ranges.i_range,
                j_range: ranges.j_range,
            },
        );
        let kernel = self.add_node(
            &mut state,
            NodeKind::Kernel {
                name: kernel_name,
                code,
                order: block.order,
                k_range: ranges.k_range,
                inputs: field_inputs.iter().map(|d| d.local_name.to_string()).collect(),
                outputs: outputs.iter().map(|d| d.local_name.to_string()).collect(),
            },
        );
        let map_exit = self.add_node(&mut state, NodeKind::MapExit { name: map_name });

        // Inputs: one read accessor per buffer, union subset on the outer
        // edge, one connector edge per local name inside the map.
        let input_groups = group_by_buffer(&field_inputs);
        for (buffer, descs) in &input_groups {
            let merged = merge_group(descs)?;
            let read = self.add_node(
                &mut state,
                NodeKind::BufferRead {
                    buffer: buffer.clone(),
                },
            );
            self.add_edge(&mut state, read, map_entry, None, None, Some(merged));
            for d in descs {
                self.add_edge(
                    &mut state,
                    map_entry,
                    kernel,
                    None,
                    Some(d.local_name.to_string()),
                    Some(movement_of(d)),
                );
            }
        }
        if field_inputs.is_empty() {
            self.add_edge(&mut state, map_entry, kernel, None, None, None);
        }

        // Outputs, mirrored through the map exit.
        for d in &outputs {
            self.add_edge(
                &mut state,
                kernel,
                map_exit,
                Some(d.local_name.to_string()),
                None,
                Some(movement_of(d)),
            );
        }
        if outputs.is_empty() {
            self.add_edge(&mut state, kernel, map_exit, None, None, None);
        }
        let output_groups = group_by_buffer(&outputs);
        for (buffer, descs) in &output_groups {
            let merged = merge_group(descs)?;
            let write = self.add_node(
                &mut state,
                NodeKind::BufferWrite {
                    buffer: buffer.clone(),
                },
            );
            self.add_edge(&mut state, map_exit, write, None, None, Some(merged));
        }

        Ok(state)
    }
}

// ── Merging ─────────────────────────────────────────────────────────────────

fn group_by_buffer<'d>(
    descs: &[&'d SubsetDescriptor],
) -> BTreeMap<String, Vec<&'d SubsetDescriptor>> {
    let mut groups: BTreeMap<String, Vec<&SubsetDescriptor>> = BTreeMap::new();
    for d in descs {
        groups.entry(d.outer_name.clone()).or_default().push(d);
    }
    groups
}

/// Union all subsets of one buffer group. The merged movement is mandatory
/// unless every constituent access is dynamic.
fn merge_group(descs: &[&SubsetDescriptor]) -> Result<Movement, LoweringError> {
    let first = descs.first().ok_or_else(|| {
        LoweringError::inconsistent_access(codes::E0300, "empty descriptor group")
    })?;
    let mut subset = first.subset.clone();
    let mut dynamic = first.dynamic;
    for d in &descs[1..] {
        subset = subset.union(&d.subset)?;
        dynamic = dynamic && d.dynamic;
    }
    Ok(Movement {
        buffer: first.outer_name.clone(),
        subset,
        dynamic,
    })
}

fn movement_of(d: &SubsetDescriptor) -> Movement {
    Movement {
        buffer: d.outer_name.clone(),
        subset: d.subset.clone(),
        dynamic: d.dynamic,
    }
}

// ── Consistency check ───────────────────────────────────────────────────────

/// Defensive check: every local name in the kernel source has exactly one
/// descriptor, and every descriptor's local name occurs in the source.
/// A mismatch is a pipeline bug, not a user error.
fn check_consistency(code: &str, subs: &BlockSubsets) -> Result<(), LoweringError> {
    let declared: BTreeSet<String> = subs
        .inputs
        .keys()
        .chain(subs.outputs.keys())
        .map(|ln| ln.to_string())
        .collect();

    let mut used: BTreeSet<String> = BTreeSet::new();
    for token in code.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
        if token.starts_with(LOCAL_PREFIX) || token.starts_with(LOCAL_OUT_PREFIX) {
            used.insert(token.to_string());
        }
    }

    if used != declared {
        let missing: Vec<&String> = declared.difference(&used).collect();
        let unbound: Vec<&String> = used.difference(&declared).collect();
        return Err(LoweringError::inconsistent_access(
            codes::E0300,
            "kernel source and descriptor maps disagree",
        )
        .with_detail(format!(
            "missing from source: {:?}; without descriptor: {:?}",
            missing, unbound
        )));
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────
