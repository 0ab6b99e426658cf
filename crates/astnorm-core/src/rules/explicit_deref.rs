/*!
# Dereference Insertion

Makes implicit pointer indirection explicit:

- `p[i]` and `p[lo:hi]` where `p` is a pointer to an array become `(*p)[i]`
  and `(*p)[lo:hi]`
- `p.f` where `p` is a pointer to a struct and `f` is a field becomes `(*p).f`
- a field promoted through embedded fields is spelled along its full path,
  dereferencing each embedded pointer: with `type S struct{ *T }`, `s.f`
  becomes `(*s.T).f`

Method selectors and package-qualified names are left alone.
*/

use crate::ast::visit::{walk_expr, VisitMut};
use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult};
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::types::Selection;

pub struct DerefInserter;

impl DerefInserter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DerefInserter {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for DerefInserter {
    fn name(&self) -> &'static str {
        "explicit-deref"
    }

    fn description(&self) -> &'static str {
        "Wraps pointer operands of array indexing, slicing and field selection in an explicit dereference"
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::ExplicitDeref]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = DerefVisitor { cx, rewrites: 0 };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

struct DerefVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    rewrites: usize,
}

impl DerefVisitor<'_, '_> {
    fn operand_type(&self, x: &Expr) -> NormalizeResult<crate::types::TypeId> {
        self.cx.table.type_of(x.id).ok_or(NormalizeError::MissingType {
            node: x.id,
            what: "operand",
        })
    }

    /// Whether `expr`'s operand is dereferenced implicitly.
    fn needs_deref(&self, expr: &Expr) -> NormalizeResult<bool> {
        match &expr.kind {
            ExprKind::Index { x, .. } | ExprKind::Slice { x, .. } => {
                if matches!(x.kind, ExprKind::Type(_)) {
                    return Ok(false);
                }
                let ty = self.operand_type(x)?;
                Ok(self.cx.table.is_pointer_to_array(ty))
            }
            ExprKind::Selector { x, sel } => match self.cx.table.selection(expr.id) {
                Some(Selection::Field) => {
                    let ty = self.operand_type(x)?;
                    Ok(self.cx.table.implicit_field_deref(ty, sel))
                }
                Some(Selection::Method) | None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    fn wrap_operand(&mut self, expr: &mut Expr) {
        let cx = &mut *self.cx;
        match &mut expr.kind {
            ExprKind::Index { x, .. } | ExprKind::Slice { x, .. } => {
                edit::replace_expr(x, |inner| deref(cx, inner));
            }
            ExprKind::Selector { x, sel } => {
                let path = cx
                    .table
                    .type_of(x.id)
                    .and_then(|ty| {
                        let base = cx.table.pointer_elem(ty).unwrap_or(ty);
                        cx.table.field_path(base, sel)
                    })
                    .unwrap_or_default();
                edit::replace_expr(x, |inner| {
                    let mut operand = deref(cx, inner);
                    for field in path {
                        let id = cx.next_id();
                        cx.table.record_type(id, field.ty);
                        cx.table.record_selection(id, Selection::Field);
                        let step = ExprKind::Selector {
                            x: Box::new(operand),
                            sel: field.name,
                        };
                        operand = deref(cx, Expr::new(id, step));
                    }
                    operand
                });
            }
            _ => return,
        }
        self.rewrites += 1;
    }
}

/// `*operand` when the operand is a pointer, the operand itself otherwise.
fn deref(cx: &mut RuleContext<'_>, operand: Expr) -> Expr {
    let elem = cx
        .table
        .type_of(operand.id)
        .and_then(|ty| cx.table.pointer_elem(ty));
    match elem {
        Some(elem) => {
            let id = cx.next_id();
            cx.table.record_type(id, elem);
            Expr::new(id, ExprKind::Star(Box::new(operand)))
        }
        None => operand,
    }
}

impl VisitMut for DerefVisitor<'_, '_> {
    fn visit_expr(&mut self, expr: &mut Expr) -> NormalizeResult<()> {
        walk_expr(self, expr)?;
        if self.needs_deref(expr)? {
            self.wrap_operand(expr);
        }
        Ok(())
    }
}
