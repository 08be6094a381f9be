// dot.rs — Graphviz DOT output for lowered dataflow graphs
//
// Transforms a Graph into DOT format suitable for rendering with `dot`,
// `neato`, or other Graphviz layout engines. One cluster per state, movement
// edges labeled with their subset strings, control edges dashed.
//
// Preconditions: `graph` is a fully constructed Graph.
// Postconditions: returns a valid DOT string representing the graph.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::graph::{Graph, NodeKind, State};

/// Emit the lowered graph as a Graphviz DOT string.
pub fn emit_dot(graph: &Graph) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph {} {{", sanitize(&graph.name)).unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    for state in &graph.states {
        writeln!(buf).unwrap();
        writeln!(buf, "    subgraph cluster_{} {{", sanitize(&state.label)).unwrap();
        writeln!(buf, "        label=\"{}\";", state.label).unwrap();
        writeln!(buf, "        style=rounded;").unwrap();
        writeln!(buf, "        color=gray50;").unwrap();
        write_state_contents(&mut buf, state);
        writeln!(buf, "    }}").unwrap();
    }

    if !graph.links.is_empty() {
        writeln!(buf).unwrap();
        for (source, target) in &graph.links {
            let src = graph.state(*source).map(anchor).unwrap_or_default();
            let dst = graph.state(*target).map(anchor).unwrap_or_default();
            writeln!(buf, "    {} -> {} [style=bold, color=gray30];", src, dst).unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

/// Node used as the endpoint of interstate edges: the first node of the
/// state, or its placeholder for empty states.
fn anchor(state: &State) -> String {
    match state.nodes.first() {
        Some(node) => format!("n{}", node.id.0),
        None => format!("{}_anchor", sanitize(&state.label)),
    }
}

fn write_state_contents(buf: &mut String, state: &State) {
    if state.nodes.is_empty() {
        writeln!(
            buf,
            "        {}_anchor [label=\"{}\", shape=circle];",
            sanitize(&state.label),
            state.label
        )
        .unwrap();
        return;
    }

    for node in &state.nodes {
        let (label, shape) = match &node.kind {
            NodeKind::BufferRead { buffer } => (format!("{} (read)", buffer), "ellipse"),
            NodeKind::BufferWrite { buffer } => (format!("{} (write)", buffer), "ellipse"),
            NodeKind::MapEntry {
                name,
                i_range,
                j_range,
            } => (
                format!(
                    "{} [i: {}..{}, j: {}..{}]",
                    name, i_range.0, i_range.1, j_range.0, j_range.1
                ),
                "trapezium",
            ),
            NodeKind::MapExit { name } => (format!("{} (exit)", name), "invtrapezium"),
            NodeKind::Kernel { name, k_range, .. } => (
                format!("{} [k: {}..{}]", name, k_range.0, k_range.1),
                "box",
            ),
        };
        writeln!(
            buf,
            "        n{} [label=\"{}\", shape={}];",
            node.id.0, label, shape
        )
        .unwrap();
    }

    for edge in &state.edges {
        match &edge.movement {
            Some(movement) => {
                let style = if movement.dynamic { ", style=dotted" } else { "" };
                writeln!(
                    buf,
                    "        n{} -> n{} [label=\"{}\"{}];",
                    edge.source.0, edge.target.0, movement.subset, style
                )
                .unwrap();
            }
            None => {
                writeln!(
                    buf,
                    "        n{} -> n{} [style=dashed];",
                    edge.source.0, edge.target.0
                )
                .unwrap();
            }
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{BlockId, RefId};
    use crate::ir::*;
    use crate::pipeline::lower;
    use std::collections::BTreeMap;

    fn sample_graph() -> Graph {
        let mut fields = BTreeMap::new();
        for name in ["in", "out"] {
            fields.insert(
                name.to_string(),
                FieldMetadata {
                    name: name.to_string(),
                    dtype: Dtype::Float64,
                    halo: Halo::symmetric(1, 1, 0),
                    is_api_argument: true,
                },
            );
        }
        let ir = StencilIr {
            name: "dot sample".to_string(),
            fields,
            parameters: BTreeMap::new(),
            regions: vec![ComputeRegion {
                i_extent: (0, 5),
                j_extent: (0, 5),
                blocks: vec![ComputationBlock {
                    id: BlockId(0),
                    order: IterationOrder::Parallel,
                    interval: VerticalInterval::full(),
                    body: vec![Stmt::Assign(Assign {
                        target: FieldAccess {
                            id: RefId(0),
                            name: "out".to_string(),
                            offset: Offset::zero(),
                        },
                        value: Expr::Field(FieldAccess {
                            id: RefId(1),
                            name: "in".to_string(),
                            offset: Offset::zero(),
                        }),
                    })],
                }],
            }],
        };
        lower(&ir).unwrap()
    }

    #[test]
    fn dot_output_has_cluster_per_state() {
        let dot = emit_dot(&sample_graph());
        assert!(dot.starts_with("digraph dot_sample {"));
        assert!(dot.contains("subgraph cluster_state_0"));
        assert!(dot.contains("subgraph cluster_state_1"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn movement_edges_are_labeled_with_subsets() {
        let dot = emit_dot(&sample_graph());
        assert!(dot.contains("label=\"1:I+6, 1:J+6, 0:K+0\""));
    }

    #[test]
    fn interstate_edge_links_entry_anchor() {
        let dot = emit_dot(&sample_graph());
        assert!(dot.contains("state_0_anchor -> "));
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(emit_dot(&sample_graph()), emit_dot(&sample_graph()));
    }
}
