// subsets.rs — Windowed subset descriptors (pass 3)
//
// Consumes access classification plus field halo metadata and computes, per
// computation block, one data-movement descriptor per distinct accessed local
// name, split into input and output maps. Subsets are expressed in absolute
// buffer-index space: the halo origin is folded into the horizontal bounds,
// so two descriptors for the same outer buffer are directly unionable.
//
// Preconditions: range and access tables populated for every block.
// Postconditions: every accessed local name has exactly one descriptor,
//   routed to the output map iff the name is output-bound.
// Failure modes: missing field metadata (fatal, malformed input contract).
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::access::{AccessInfo, AccessTable};
use crate::diag::{codes, LoweringError};
use crate::id::{BlockId, RefId};
use crate::ir::{
    Assign, Axis, ComputationBlock, Expr, FieldAccess, IfStmt, ScalarAccess, StencilIr, Stmt,
};
use crate::names::LocalName;
use crate::ranges::{BlockRanges, RangeTable, VerticalBound};

// ── Subset model ────────────────────────────────────────────────────────────

/// One per-axis index range of a subset, in absolute buffer-index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRange {
    /// Horizontal bounds with the halo origin folded in; the upper bound is
    /// an offset against the axis extent symbol.
    Horizontal { axis: Axis, lower: i64, upper: i64 },
    /// Vertical bounds relative to the block's resolved interval; the
    /// vertical extent is not haloed in this model.
    Vertical {
        lower: VerticalBound,
        upper: VerticalBound,
    },
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisRange::Horizontal { axis, lower, upper } => {
                write!(f, "{}:{}{:+}", lower, axis, upper)
            }
            AxisRange::Vertical { lower, upper } => write!(f, "{}:{}", lower, upper),
        }
    }
}

/// The index set a descriptor moves: a per-axis window for field accesses, or
/// the degenerate single point for scalars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subset {
    Window(Vec<AxisRange>),
    Point,
}

impl Subset {
    /// Axis-wise union of two subsets of the same buffer. Both sides must
    /// have the same shape; anything else is a pipeline invariant violation.
    pub fn union(&self, other: &Subset) -> Result<Subset, LoweringError> {
        match (self, other) {
            (Subset::Point, Subset::Point) => Ok(Subset::Point),
            (Subset::Window(a), Subset::Window(b)) if a.len() == b.len() => {
                let mut merged = Vec::with_capacity(a.len());
                for (ra, rb) in a.iter().zip(b.iter()) {
                    merged.push(union_axis(ra, rb)?);
                }
                Ok(Subset::Window(merged))
            }
            _ => Err(LoweringError::inconsistent_access(
                codes::E0300,
                "cannot union subsets of mismatched shape",
            )),
        }
    }
}

fn union_axis(a: &AxisRange, b: &AxisRange) -> Result<AxisRange, LoweringError> {
    match (a, b) {
        (
            AxisRange::Horizontal {
                axis: ax,
                lower: la,
                upper: ua,
            },
            AxisRange::Horizontal {
                axis: bx,
                lower: lb,
                upper: ub,
            },
        ) if ax == bx => Ok(AxisRange::Horizontal {
            axis: *ax,
            lower: (*la).min(*lb),
            upper: (*ua).max(*ub),
        }),
        (
            AxisRange::Vertical {
                lower: la,
                upper: ua,
            },
            AxisRange::Vertical {
                lower: lb,
                upper: ub,
            },
        ) => Ok(AxisRange::Vertical {
            lower: (*la).min(*lb),
            upper: (*ua).max(*ub),
        }),
        _ => Err(LoweringError::inconsistent_access(
            codes::E0300,
            "cannot union subsets over mismatched axes",
        )),
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subset::Point => write!(f, "0"),
            Subset::Window(ranges) => {
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", r)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Subset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ── Descriptors ─────────────────────────────────────────────────────────────

/// A data-movement descriptor: which slice of which buffer one local name
/// touches, and whether the access is guaranteed on every kernel execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsetDescriptor {
    pub outer_name: String,
    pub local_name: LocalName,
    pub subset: Subset,
    /// True when the access happens on at most one (not guaranteed)
    /// execution path through the kernel. Selects best-effort movement.
    pub dynamic: bool,
}

/// Input/output descriptor maps of one block.
#[derive(Debug, Clone, Default)]
pub struct BlockSubsets {
    pub inputs: BTreeMap<LocalName, SubsetDescriptor>,
    pub outputs: BTreeMap<LocalName, SubsetDescriptor>,
}

/// Side table produced by this pass, keyed by block id.
#[derive(Debug, Default)]
pub struct SubsetTable {
    per_block: BTreeMap<BlockId, BlockSubsets>,
}

impl SubsetTable {
    pub fn get(&self, id: BlockId) -> Option<&BlockSubsets> {
        self.per_block.get(&id)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Compute input/output descriptor maps for every block.
pub fn map_subsets(
    ir: &StencilIr,
    ranges: &RangeTable,
    accesses: &AccessTable,
) -> Result<SubsetTable, LoweringError> {
    let mut table = SubsetTable::default();
    for block in ir.blocks() {
        let block_ranges = ranges.get(block.id).ok_or_else(|| {
            LoweringError::inconsistent_access(
                codes::E0300,
                format!("no resolved ranges for block {:?}", block.id),
            )
        })?;
        let info = accesses.info(block.id).ok_or_else(|| {
            LoweringError::inconsistent_access(
                codes::E0300,
                format!("no access classification for block {:?}", block.id),
            )
        })?;
        let mut mapper = Mapper {
            ir,
            accesses,
            info,
            ranges: block_ranges,
            subsets: BlockSubsets::default(),
        };
        mapper.block(block)?;
        table.per_block.insert(block.id, mapper.subsets);
    }
    Ok(table)
}

// ── Mapper ──────────────────────────────────────────────────────────────────

struct Mapper<'a> {
    ir: &'a StencilIr,
    accesses: &'a AccessTable,
    info: &'a AccessInfo,
    ranges: &'a BlockRanges,
    subsets: BlockSubsets,
}

impl<'a> Mapper<'a> {
    fn block(&mut self, block: &ComputationBlock) -> Result<(), LoweringError> {
        self.stmts(&block.body)
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<(), LoweringError> {
        for stmt in stmts {
            match stmt {
                Stmt::Assign(assign) => self.assign(assign)?,
                Stmt::If(if_stmt) => self.if_stmt(if_stmt)?,
            }
        }
        Ok(())
    }

    /// Value before target: source order decides which access is seen first.
    fn assign(&mut self, assign: &Assign) -> Result<(), LoweringError> {
        self.expr(&assign.value)?;
        self.field(&assign.target)
    }

    fn if_stmt(&mut self, if_stmt: &IfStmt) -> Result<(), LoweringError> {
        self.expr(&if_stmt.condition)?;
        self.stmts(&if_stmt.then_body)?;
        self.stmts(&if_stmt.else_body)
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), LoweringError> {
        match expr {
            Expr::Field(f) => self.field(f),
            Expr::Scalar(s) => self.scalar(s),
            Expr::Literal(_) | Expr::Builtin(_) => Ok(()),
            Expr::Unary(u) => self.expr(&u.expr),
            Expr::Binary(b) => {
                self.expr(&b.lhs)?;
                self.expr(&b.rhs)
            }
            Expr::Ternary(t) => {
                self.expr(&t.condition)?;
                self.expr(&t.then_expr)?;
                self.expr(&t.else_expr)
            }
        }
    }

    fn field(&mut self, access: &FieldAccess) -> Result<(), LoweringError> {
        let local = self.binding(access.id)?.clone();
        if self.routed(&local).contains_key(&local) {
            return Ok(()); // first seen wins
        }
        let meta = self.ir.fields.get(&access.name).ok_or_else(|| {
            LoweringError::malformed_input(
                codes::E0102,
                format!("no field metadata for '{}'", access.name),
            )
        })?;

        let mut window = Vec::with_capacity(3);
        for axis in Axis::ALL {
            let v = access.offset.at(axis);
            match axis {
                Axis::I | Axis::J => {
                    let origin = meta.halo.origin(axis);
                    let range = if axis == Axis::I {
                        self.ranges.i_range
                    } else {
                        self.ranges.j_range
                    };
                    window.push(AxisRange::Horizontal {
                        axis,
                        lower: origin + range.0 + v,
                        upper: origin + range.1 + v,
                    });
                }
                Axis::K => {
                    window.push(AxisRange::Vertical {
                        lower: self.ranges.k_range.0.shifted(v),
                        upper: self.ranges.k_range.1.shifted(v),
                    });
                }
            }
        }

        let descriptor = SubsetDescriptor {
            outer_name: access.name.clone(),
            local_name: local.clone(),
            subset: Subset::Window(window),
            dynamic: self.info.dynamic_accesses.contains(&local),
        };
        self.routed(&local).insert(local, descriptor);
        Ok(())
    }

    fn scalar(&mut self, access: &ScalarAccess) -> Result<(), LoweringError> {
        let local = self.binding(access.id)?.clone();
        if self.routed(&local).contains_key(&local) {
            return Ok(());
        }
        let descriptor = SubsetDescriptor {
            outer_name: access.name.clone(),
            local_name: local.clone(),
            subset: Subset::Point,
            dynamic: self.info.dynamic_accesses.contains(&local),
        };
        self.routed(&local).insert(local, descriptor);
        Ok(())
    }

    fn binding(&self, id: RefId) -> Result<&LocalName, LoweringError> {
        self.accesses.binding(id).ok_or_else(|| {
            LoweringError::inconsistent_access(
                codes::E0300,
                format!("reference {:?} has no local-name binding", id),
            )
        })
    }

    fn routed(&mut self, local: &LocalName) -> &mut BTreeMap<LocalName, SubsetDescriptor> {
        if local.is_output {
            &mut self.subsets.outputs
        } else {
            &mut self.subsets.inputs
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
