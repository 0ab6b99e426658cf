/*!
# Discard Expander

Makes dropped results visible. An expression statement whose value is thrown
away becomes an assignment to blanks, one per result:

```text
f()        =>   _ = f()           (one result)
g()        =>   _, _ = g()        (two results)
h()        =>   h()               (no results)
```
*/

use crate::ast::visit::{walk_stmt_list, VisitMut};
use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult};
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::types::Type;

pub struct DiscardExpander;

impl DiscardExpander {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DiscardExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for DiscardExpander {
    fn name(&self) -> &'static str {
        "explicit-discard"
    }

    fn description(&self) -> &'static str {
        "Assigns the results of value-producing expression statements to blanks"
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::ExplicitDiscard]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = DiscardVisitor { cx, rewrites: 0 };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

struct DiscardVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    rewrites: usize,
}

impl DiscardVisitor<'_, '_> {
    /// Number of values `expr` produces.
    fn arity(&self, expr: &Expr) -> NormalizeResult<usize> {
        let ty = self.cx.table.type_of(expr.id).ok_or(NormalizeError::MissingType {
            node: expr.id,
            what: "expression statement",
        })?;
        Ok(match self.cx.table.ty(ty) {
            Type::Tuple(members) => members.len(),
            _ => 1,
        })
    }
}

impl VisitMut for DiscardVisitor<'_, '_> {
    fn visit_stmt_list(&mut self, owner: NodeId, stmts: &mut Vec<Stmt>) -> NormalizeResult<()> {
        walk_stmt_list(self, owner, stmts)?;

        for stmt in stmts.iter_mut() {
            let stmt = stmt.unlabeled_mut();
            let StmtKind::Expr(expr) = &stmt.kind else {
                continue;
            };
            let arity = self.arity(expr)?;
            if arity == 0 {
                continue;
            }
            let lhs = (0..arity)
                .map(|_| self.cx.expr(ExprKind::Ident("_".to_string()), None))
                .collect();
            let kind = std::mem::replace(&mut stmt.kind, StmtKind::Empty);
            if let StmtKind::Expr(expr) = kind {
                stmt.kind = StmtKind::Assign {
                    lhs,
                    op: AssignOp::Assign,
                    rhs: vec![expr],
                };
                self.rewrites += 1;
            }
        }
        Ok(())
    }
}
