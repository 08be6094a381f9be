use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use std::collections::BTreeMap;

use sgc::id::IdAllocator;
use sgc::ir::*;
use sgc::pass::PassId;
use sgc::pipeline::{lower, run_lowering, LoweringState};

/// Scaling generator: a chain of `n_blocks` shift-sum blocks over `n_fields`
/// fields, each reading its predecessor with a five-point window.
fn generate_stencil(n_blocks: usize) -> StencilIr {
    let mut ids = IdAllocator::new();
    let n_fields = n_blocks + 1;

    let mut fields = BTreeMap::new();
    for i in 0..n_fields {
        let name = format!("f{}", i);
        fields.insert(
            name.clone(),
            FieldMetadata {
                name,
                dtype: Dtype::Float64,
                halo: Halo::symmetric(2, 2, 0),
                is_api_argument: i == 0 || i == n_fields - 1,
            },
        );
    }
    let mut parameters = BTreeMap::new();
    parameters.insert("weight".to_string(), Dtype::Float64);

    let mut blocks = Vec::new();
    for b in 0..n_blocks {
        let src = format!("f{}", b);
        let dst = format!("f{}", b + 1);
        let mut fa = |name: &str, offset: Offset| {
            Expr::Field(FieldAccess {
                id: ids.alloc_ref(),
                name: name.to_string(),
                offset,
            })
        };
        let add = |lhs: Expr, rhs: Expr| {
            Expr::Binary(BinaryExpr {
                op: BinaryOp::Add,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })
        };
        let value = add(
            add(
                add(fa(&src, Offset::ijk(1, 0, 0)), fa(&src, Offset::ijk(-1, 0, 0))),
                fa(&src, Offset::ijk(0, 1, 0)),
            ),
            add(fa(&src, Offset::ijk(0, -1, 0)), fa(&src, Offset::zero())),
        );
        let target = FieldAccess {
            id: ids.alloc_ref(),
            name: dst,
            offset: Offset::zero(),
        };
        blocks.push(ComputationBlock {
            id: ids.alloc_block(),
            order: IterationOrder::Parallel,
            interval: VerticalInterval::full(),
            body: vec![Stmt::Assign(Assign { target, value })],
        });
    }

    StencilIr {
        name: format!("bench_{}", n_blocks),
        fields,
        parameters,
        regions: vec![ComputeRegion {
            i_extent: (0, 64),
            j_extent: (0, 64),
            blocks,
        }],
    }
}

fn bench_full_lowering(c: &mut Criterion) {
    let mut group = c.benchmark_group("lowering/full");
    for n_blocks in [1_usize, 8, 32] {
        let ir = generate_stencil(n_blocks);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}blocks", n_blocks)),
            &ir,
            |b, ir| {
                b.iter(|| {
                    let graph = lower(black_box(ir)).unwrap();
                    black_box(&graph);
                });
            },
        );
    }
    group.finish();
}

fn bench_access_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("lowering/classify_accesses");
    let ir = generate_stencil(32);
    group.bench_function("32blocks", |b| {
        b.iter(|| {
            let mut state = LoweringState::new(ir.clone());
            run_lowering(&mut state, PassId::ClassifyAccesses, false, |_| {}).unwrap();
            black_box(&state.accesses);
        });
    });
    group.finish();
}

fn bench_graph_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("lowering/assemble_graph");
    let ir = generate_stencil(32);
    group.bench_function("32blocks", |b| {
        b.iter(|| {
            let mut state = LoweringState::new(ir.clone());
            run_lowering(&mut state, PassId::AssembleGraph, false, |_| {}).unwrap();
            black_box(&state.graph);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_full_lowering,
    bench_access_classification,
    bench_graph_assembly
);
criterion_main!(benches);
