// access.rs — Access and dependency classification (pass 2)
//
// Bottom-up analysis computing, per computation block, the set of accessed
// local names and the subset of those that are only conditionally executed
// ("dynamic"). Also records the local-name binding of every reference site,
// applying the output-naming rule: a read of a name+offset that an earlier
// statement already wrote binds to the output variant, so in-kernel reuse of
// a just-written value resolves to the written variable.
//
// Preconditions: input tree is well formed; every reference site has a
//   fresh id.
// Postconditions: every block id has an AccessInfo entry; every reference id
//   has a binding; dynamic_accesses is a subset of accesses.
// Failure modes: reference to a field or scalar absent from the metadata
//   tables (fatal, upstream contract violation).
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};

use crate::diag::{codes, LoweringError};
use crate::id::{BlockId, RefId};
use crate::ir::{Assign, Expr, FieldAccess, IfStmt, ScalarAccess, StencilIr, Stmt};
use crate::names::LocalName;

// ── Output types ────────────────────────────────────────────────────────────

/// Per-block access classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessInfo {
    pub accesses: BTreeSet<LocalName>,
    pub dynamic_accesses: BTreeSet<LocalName>,
}

/// Side table produced by this pass: per-block access sets plus per-reference
/// local-name bindings.
#[derive(Debug, Default)]
pub struct AccessTable {
    info: BTreeMap<BlockId, AccessInfo>,
    bindings: BTreeMap<RefId, LocalName>,
}

impl AccessTable {
    pub fn info(&self, id: BlockId) -> Option<&AccessInfo> {
        self.info.get(&id)
    }

    pub fn binding(&self, id: RefId) -> Option<&LocalName> {
        self.bindings.get(&id)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Classify every block's accesses and record reference bindings.
pub fn classify_accesses(ir: &StencilIr) -> Result<AccessTable, LoweringError> {
    let mut classifier = Classifier {
        ir,
        bindings: BTreeMap::new(),
    };
    let mut info = BTreeMap::new();
    for block in ir.blocks() {
        let (accesses, dynamic_accesses) = classifier.stmts(&block.body, &BTreeSet::new())?;
        info.insert(
            block.id,
            AccessInfo {
                accesses,
                dynamic_accesses,
            },
        );
    }
    Ok(AccessTable {
        info,
        bindings: classifier.bindings,
    })
}

// ── Classifier ──────────────────────────────────────────────────────────────

/// `(accesses, dynamic_accesses)` of one subtree.
type Sets = (BTreeSet<LocalName>, BTreeSet<LocalName>);

struct Classifier<'a> {
    ir: &'a StencilIr,
    bindings: BTreeMap<RefId, LocalName>,
}

fn diff(a: &BTreeSet<LocalName>, b: &BTreeSet<LocalName>) -> BTreeSet<LocalName> {
    a.difference(b).cloned().collect()
}

fn intersect(a: &BTreeSet<LocalName>, b: &BTreeSet<LocalName>) -> BTreeSet<LocalName> {
    a.intersection(b).cloned().collect()
}

impl<'a> Classifier<'a> {
    /// Left-to-right accumulation over a statement sequence.
    ///
    /// A name already known non-dynamic from an earlier statement stays
    /// non-dynamic even if a later statement accesses it dynamically; a name
    /// already dynamic becomes non-dynamic once some statement accesses it
    /// unconditionally. `ctx` carries the names accessed by statements before
    /// this sequence (for the output-naming rule).
    fn stmts(&mut self, stmts: &[Stmt], ctx: &BTreeSet<LocalName>) -> Result<Sets, LoweringError> {
        let mut accesses: BTreeSet<LocalName> = BTreeSet::new();
        let mut dynamic: BTreeSet<LocalName> = BTreeSet::new();
        let mut inner = ctx.clone();
        for stmt in stmts {
            let (a, d) = self.stmt(stmt, &inner)?;
            let guaranteed = diff(&accesses, &dynamic);
            let stmt_guaranteed = diff(&a, &d);
            dynamic = diff(&d, &guaranteed)
                .union(&diff(&dynamic, &stmt_guaranteed))
                .cloned()
                .collect();
            inner.extend(a.iter().cloned());
            accesses.extend(a);
        }
        Ok((accesses, dynamic))
    }

    fn stmt(&mut self, stmt: &Stmt, ctx: &BTreeSet<LocalName>) -> Result<Sets, LoweringError> {
        match stmt {
            Stmt::Assign(assign) => self.assign(assign, ctx),
            Stmt::If(if_stmt) => self.if_stmt(if_stmt, ctx),
        }
    }

    /// Value is visited before the target, so a read in the value binds to
    /// the input variant unless an earlier statement already wrote the name.
    fn assign(&mut self, assign: &Assign, ctx: &BTreeSet<LocalName>) -> Result<Sets, LoweringError> {
        let (va, vd) = self.expr(&assign.value, ctx)?;
        let (ta, td) = self.field_ref(&assign.target, true, ctx)?;
        Ok((
            va.union(&ta).cloned().collect(),
            vd.union(&td).cloned().collect(),
        ))
    }

    fn if_stmt(&mut self, if_stmt: &IfStmt, ctx: &BTreeSet<LocalName>) -> Result<Sets, LoweringError> {
        let cond = self.expr(&if_stmt.condition, ctx)?;
        let then = self.stmts(&if_stmt.then_body, ctx)?;
        let els = self.stmts(&if_stmt.else_body, ctx)?;
        Ok(Self::combine_branches(cond, then, els))
    }

    /// Conditional combination rule. An access is guaranteed (non-dynamic)
    /// iff it occurs non-dynamically in the condition, or non-dynamically in
    /// both branches; any other occurring access is dynamic. Deliberately
    /// conservative: a name written unconditionally in only one branch stays
    /// dynamic.
    fn combine_branches(cond: Sets, then: Sets, els: Sets) -> Sets {
        let (ac, dc) = cond;
        let (at, dt) = then;
        let (ae, de) = els;

        let mut accesses: BTreeSet<LocalName> = ac.union(&at).cloned().collect();
        accesses.extend(ae.iter().cloned());

        let mut dynamic = diff(&accesses, &diff(&ac, &dc));
        dynamic = diff(&dynamic, &intersect(&diff(&at, &dt), &diff(&ae, &de)));

        (accesses, dynamic)
    }

    fn expr(&mut self, expr: &Expr, ctx: &BTreeSet<LocalName>) -> Result<Sets, LoweringError> {
        match expr {
            Expr::Field(f) => self.field_ref(f, false, ctx),
            Expr::Scalar(s) => self.scalar_ref(s, ctx),
            Expr::Literal(_) | Expr::Builtin(_) => Ok((BTreeSet::new(), BTreeSet::new())),
            Expr::Unary(u) => self.expr(&u.expr, ctx),
            Expr::Binary(b) => {
                let (la, ld) = self.expr(&b.lhs, ctx)?;
                let (ra, rd) = self.expr(&b.rhs, ctx)?;
                Ok((
                    la.union(&ra).cloned().collect(),
                    ld.union(&rd).cloned().collect(),
                ))
            }
            Expr::Ternary(t) => {
                let cond = self.expr(&t.condition, ctx)?;
                let then = self.expr(&t.then_expr, ctx)?;
                let els = self.expr(&t.else_expr, ctx)?;
                Ok(Self::combine_branches(cond, then, els))
            }
        }
    }

    fn field_ref(
        &mut self,
        access: &FieldAccess,
        is_target: bool,
        ctx: &BTreeSet<LocalName>,
    ) -> Result<Sets, LoweringError> {
        if !self.ir.fields.contains_key(&access.name) {
            return Err(LoweringError::malformed_input(
                codes::E0100,
                format!("reference to undeclared field '{}'", access.name),
            ));
        }
        let was_output =
            is_target || ctx.contains(&LocalName::field(&access.name, &access.offset, true));
        let local = LocalName::field(&access.name, &access.offset, was_output);
        self.bindings.insert(access.id, local.clone());
        let mut accesses = BTreeSet::new();
        accesses.insert(local);
        Ok((accesses, BTreeSet::new()))
    }

    fn scalar_ref(
        &mut self,
        access: &ScalarAccess,
        ctx: &BTreeSet<LocalName>,
    ) -> Result<Sets, LoweringError> {
        if !self.ir.parameters.contains_key(&access.name) {
            return Err(LoweringError::malformed_input(
                codes::E0101,
                format!("reference to undeclared scalar parameter '{}'", access.name),
            ));
        }
        let was_output = ctx.contains(&LocalName::scalar(&access.name, true));
        let local = LocalName::scalar(&access.name, was_output);
        self.bindings.insert(access.id, local.clone());
        let mut accesses = BTreeSet::new();
        accesses.insert(local);
        Ok((accesses, BTreeSet::new()))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::BlockId;
    use crate::ir::*;

    fn test_ir(body: Vec<Stmt>) -> StencilIr {
        let mut fields = BTreeMap::new();
        for name in ["f", "g", "x", "y", "z", "c"] {
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
        let mut parameters = BTreeMap::new();
        parameters.insert("dt".to_string(), Dtype::Float64);
        StencilIr {
            name: "test".to_string(),
            fields,
            parameters,
            regions: vec![ComputeRegion {
                i_extent: (0, 10),
                j_extent: (0, 10),
                blocks: vec![ComputationBlock {
                    id: BlockId(0),
                    order: IterationOrder::Parallel,
                    interval: VerticalInterval::full(),
                    body,
                }],
            }],
        }
    }

    fn fa(id: u32, name: &str) -> FieldAccess {
        FieldAccess {
            id: RefId(id),
            name: name.to_string(),
            offset: Offset::zero(),
        }
    }

    fn read(id: u32, name: &str) -> Expr {
        Expr::Field(fa(id, name))
    }

    fn lit(v: i64) -> Expr {
        Expr::Literal(Literal {
            value: LiteralValue::Int(v),
            dtype: Dtype::Int32,
        })
    }

    fn assign(target: FieldAccess, value: Expr) -> Stmt {
        Stmt::Assign(Assign { target, value })
    }

    fn gt_zero(id: u32, name: &str) -> Expr {
        Expr::Binary(BinaryExpr {
            op: BinaryOp::Gt,
            lhs: Box::new(read(id, name)),
            rhs: Box::new(lit(0)),
        })
    }

    fn in_name(name: &str) -> LocalName {
        LocalName::field(name, &Offset::zero(), false)
    }

    fn out_name(name: &str) -> LocalName {
        LocalName::field(name, &Offset::zero(), true)
    }

    #[test]
    fn branch_dynamic_set_law() {
        // if x > 0 { y = 1; z = 2 } else { y = 3 }
        let body = vec![Stmt::If(IfStmt {
            condition: gt_zero(0, "x"),
            then_body: vec![assign(fa(1, "y"), lit(1)), assign(fa(2, "z"), lit(2))],
            else_body: vec![assign(fa(3, "y"), lit(3))],
        })];
        let table = classify_accesses(&test_ir(body)).unwrap();
        let info = table.info(BlockId(0)).unwrap();

        assert!(info.accesses.contains(&in_name("x")));
        assert!(info.accesses.contains(&out_name("y")));
        assert!(info.accesses.contains(&out_name("z")));

        // x guaranteed via the condition, y guaranteed via both branches,
        // z dynamic (then branch only).
        assert!(!info.dynamic_accesses.contains(&in_name("x")));
        assert!(!info.dynamic_accesses.contains(&out_name("y")));
        assert!(info.dynamic_accesses.contains(&out_name("z")));
    }

    #[test]
    fn later_unconditional_access_clears_dynamic() {
        // if c > 0 { y = f }; x = f
        let body = vec![
            Stmt::If(IfStmt {
                condition: gt_zero(0, "c"),
                then_body: vec![assign(fa(1, "y"), read(2, "f"))],
                else_body: vec![],
            }),
            assign(fa(3, "x"), read(4, "f")),
        ];
        let table = classify_accesses(&test_ir(body)).unwrap();
        let info = table.info(BlockId(0)).unwrap();

        assert!(!info.dynamic_accesses.contains(&in_name("f")));
        assert!(info.dynamic_accesses.contains(&out_name("y")));
    }

    #[test]
    fn earlier_unconditional_access_stays_non_dynamic() {
        // x = f; if c > 0 { y = f }
        let body = vec![
            assign(fa(0, "x"), read(1, "f")),
            Stmt::If(IfStmt {
                condition: gt_zero(2, "c"),
                then_body: vec![assign(fa(3, "y"), read(4, "f"))],
                else_body: vec![],
            }),
        ];
        let table = classify_accesses(&test_ir(body)).unwrap();
        let info = table.info(BlockId(0)).unwrap();

        assert!(!info.dynamic_accesses.contains(&in_name("f")));
        assert!(info.dynamic_accesses.contains(&out_name("y")));
    }

    #[test]
    fn ternary_branch_accesses_are_dynamic() {
        // x = f if c > 0 else g
        let body = vec![assign(
            fa(0, "x"),
            Expr::Ternary(TernaryExpr {
                condition: Box::new(gt_zero(1, "c")),
                then_expr: Box::new(read(2, "f")),
                else_expr: Box::new(read(3, "g")),
            }),
        )];
        let table = classify_accesses(&test_ir(body)).unwrap();
        let info = table.info(BlockId(0)).unwrap();

        assert!(!info.dynamic_accesses.contains(&in_name("c")));
        assert!(info.dynamic_accesses.contains(&in_name("f")));
        assert!(info.dynamic_accesses.contains(&in_name("g")));
        assert!(!info.dynamic_accesses.contains(&out_name("x")));
    }

    #[test]
    fn read_after_write_binds_output_variant() {
        // f = 1; g = f
        let body = vec![assign(fa(0, "f"), lit(1)), assign(fa(1, "g"), read(2, "f"))];
        let table = classify_accesses(&test_ir(body)).unwrap();

        // The read at ref 2 reuses the just-written output binding.
        assert_eq!(table.binding(RefId(2)).unwrap(), &out_name("f"));
        let info = table.info(BlockId(0)).unwrap();
        assert!(info.accesses.contains(&out_name("f")));
        assert!(!info.accesses.contains(&in_name("f")));
    }

    #[test]
    fn read_before_write_keeps_distinct_variants() {
        // g = f; f = 2
        let body = vec![assign(fa(0, "g"), read(1, "f")), assign(fa(2, "f"), lit(2))];
        let table = classify_accesses(&test_ir(body)).unwrap();

        assert_eq!(table.binding(RefId(1)).unwrap(), &in_name("f"));
        assert_eq!(table.binding(RefId(2)).unwrap(), &out_name("f"));
        let info = table.info(BlockId(0)).unwrap();
        assert!(info.accesses.contains(&in_name("f")));
        assert!(info.accesses.contains(&out_name("f")));
    }

    #[test]
    fn scalar_parameters_are_accesses() {
        // f = dt
        let body = vec![assign(
            fa(0, "f"),
            Expr::Scalar(ScalarAccess {
                id: RefId(1),
                name: "dt".to_string(),
            }),
        )];
        let table = classify_accesses(&test_ir(body)).unwrap();
        let info = table.info(BlockId(0)).unwrap();
        assert!(info.accesses.contains(&LocalName::scalar("dt", false)));
    }

    #[test]
    fn dynamic_is_subset_of_accesses() {
        let body = vec![
            Stmt::If(IfStmt {
                condition: gt_zero(0, "c"),
                then_body: vec![assign(fa(1, "y"), read(2, "f"))],
                else_body: vec![assign(fa(3, "z"), read(4, "g"))],
            }),
            assign(fa(5, "x"), read(6, "y")),
        ];
        let table = classify_accesses(&test_ir(body)).unwrap();
        let info = table.info(BlockId(0)).unwrap();
        assert!(info.dynamic_accesses.is_subset(&info.accesses));
    }

    #[test]
    fn undeclared_field_is_fatal() {
        let body = vec![assign(fa(0, "nope"), lit(1))];
        let err = classify_accesses(&test_ir(body)).unwrap_err();
        assert_eq!(err.code, codes::E0100);
    }

    #[test]
    fn undeclared_scalar_is_fatal() {
        let body = vec![assign(
            fa(0, "f"),
            Expr::Scalar(ScalarAccess {
                id: RefId(1),
                name: "gamma".to_string(),
            }),
        )];
        let err = classify_accesses(&test_ir(body)).unwrap_err();
        assert_eq!(err.code, codes::E0101);
    }

    #[test]
    fn distinct_offsets_are_distinct_accesses() {
        // x = f[I+1] + f[I-1]
        let body = vec![assign(
            fa(0, "x"),
            Expr::Binary(BinaryExpr {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Field(FieldAccess {
                    id: RefId(1),
                    name: "f".to_string(),
                    offset: Offset::ijk(1, 0, 0),
                })),
                rhs: Box::new(Expr::Field(FieldAccess {
                    id: RefId(2),
                    name: "f".to_string(),
                    offset: Offset::ijk(-1, 0, 0),
                })),
            }),
        )];
        let table = classify_accesses(&test_ir(body)).unwrap();
        let info = table.info(BlockId(0)).unwrap();
        let plus = LocalName::field("f", &Offset::ijk(1, 0, 0), false);
        let minus = LocalName::field("f", &Offset::ijk(-1, 0, 0), false);
        assert!(info.accesses.contains(&plus));
        assert!(info.accesses.contains(&minus));
        assert_ne!(plus, minus);
    }
}
