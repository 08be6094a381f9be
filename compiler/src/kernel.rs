// kernel.rs — Scalar kernel source emission (pass 4)
//
// Renders each computation block's statement tree as flat scalar kernel
// source: one line per assignment, `if`/`else` as nested indented blocks.
// Every reference renders through its pass-2 local-name binding, so the
// emitted body operates purely on the windowed local bindings.
//
// Preconditions: access classification has bound every reference site.
// Postconditions: every block id has a kernel source string.
// Failure modes: a builtin literal with no kernel rendering (fatal);
//   a reference without a binding (internal invariant violation).
// Side effects: none.

use std::collections::BTreeMap;

use crate::access::AccessTable;
use crate::diag::{codes, LoweringError};
use crate::id::{BlockId, RefId};
use crate::ir::{BuiltinLiteral, Expr, IfStmt, Literal, LiteralValue, StencilIr, Stmt};

const INDENT: &str = "    ";

/// Side table produced by this pass: kernel source per block.
#[derive(Debug, Default)]
pub struct KernelTable {
    sources: BTreeMap<BlockId, String>,
}

impl KernelTable {
    pub fn source(&self, id: BlockId) -> Option<&str> {
        self.sources.get(&id).map(|s| s.as_str())
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Emit kernel source for every computation block.
pub fn emit_kernels(ir: &StencilIr, accesses: &AccessTable) -> Result<KernelTable, LoweringError> {
    let emitter = Emitter { accesses };
    let mut table = KernelTable::default();
    for block in ir.blocks() {
        let lines = emitter.stmts(&block.body, 0)?;
        table.sources.insert(block.id, lines.join("\n"));
    }
    Ok(table)
}

// ── Emitter ─────────────────────────────────────────────────────────────────

struct Emitter<'a> {
    accesses: &'a AccessTable,
}

impl<'a> Emitter<'a> {
    fn stmts(&self, stmts: &[Stmt], depth: usize) -> Result<Vec<String>, LoweringError> {
        let indent = INDENT.repeat(depth);
        let mut lines = Vec::new();
        for stmt in stmts {
            match stmt {
                Stmt::Assign(assign) => {
                    lines.push(format!(
                        "{}{} = {}",
                        indent,
                        self.reference(assign.target.id)?,
                        self.expr(&assign.value)?
                    ));
                }
                Stmt::If(if_stmt) => self.if_stmt(if_stmt, depth, &mut lines)?,
            }
        }
        Ok(lines)
    }

    fn if_stmt(
        &self,
        if_stmt: &IfStmt,
        depth: usize,
        lines: &mut Vec<String>,
    ) -> Result<(), LoweringError> {
        let indent = INDENT.repeat(depth);
        lines.push(format!("{}if {}:", indent, self.expr(&if_stmt.condition)?));
        lines.extend(self.stmts(&if_stmt.then_body, depth + 1)?);
        if !if_stmt.else_body.is_empty() {
            lines.push(format!("{}else:", indent));
            lines.extend(self.stmts(&if_stmt.else_body, depth + 1)?);
        }
        Ok(())
    }

    fn expr(&self, expr: &Expr) -> Result<String, LoweringError> {
        match expr {
            Expr::Field(f) => self.reference(f.id),
            Expr::Scalar(s) => self.reference(s.id),
            Expr::Literal(lit) => Ok(render_literal(lit)),
            Expr::Builtin(b) => render_builtin(*b),
            Expr::Unary(u) => Ok(format!("{} {}", u.op.symbol(), self.operand(&u.expr)?)),
            Expr::Binary(b) => Ok(format!(
                "{} {} {}",
                self.operand(&b.lhs)?,
                b.op.symbol(),
                self.operand(&b.rhs)?
            )),
            Expr::Ternary(t) => Ok(format!(
                "{} if {} else {}",
                self.operand(&t.then_expr)?,
                self.expr(&t.condition)?,
                self.operand(&t.else_expr)?
            )),
        }
    }

    /// Composite operands are parenthesized; atoms are not.
    fn operand(&self, expr: &Expr) -> Result<String, LoweringError> {
        let rendered = self.expr(expr)?;
        if expr.is_composite() {
            Ok(format!("({})", rendered))
        } else {
            Ok(rendered)
        }
    }

    fn reference(&self, id: RefId) -> Result<String, LoweringError> {
        self.accesses
            .binding(id)
            .map(|local| local.to_string())
            .ok_or_else(|| {
                LoweringError::inconsistent_access(
                    codes::E0300,
                    format!("reference {:?} has no local-name binding", id),
                )
            })
    }
}

/// Floating literals are rendered as explicit casts to the destination kind;
/// integer literals render as bare digits.
fn render_literal(lit: &Literal) -> String {
    match lit.value {
        LiteralValue::Int(v) => v.to_string(),
        LiteralValue::Float(v) => format!("{}({:?})", lit.dtype.name(), v),
    }
}

fn render_builtin(b: BuiltinLiteral) -> Result<String, LoweringError> {
    match b {
        BuiltinLiteral::True => Ok("True".to_string()),
        BuiltinLiteral::False => Ok("False".to_string()),
        BuiltinLiteral::None => Err(LoweringError::unsupported_construct(
            codes::E0200,
            "builtin literal 'None' has no kernel rendering",
        )),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
