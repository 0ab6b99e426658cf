/*!
# Initializer Hoisting

Moves the initializer of `if`, `switch` and type-switch statements into a new
block that encloses exactly the control statement:

```text
if v, ok := m[k]; ok { ... }      =>      {
                                              v, ok := m[k]
                                              if ok { ... }
                                          }
```

The new block takes over the control statement's scope, so names bound by the
initializer stay invisible past the end of the original statement. An
`else if` with an initializer becomes an `else` whose block holds the hoisted
initializer and the inner `if`.
*/

use std::mem;

use crate::ast::edit::{self, peel_labels, splice_stmts, wrap_labels, Label, Splice};
use crate::ast::visit::{walk_stmt, walk_stmt_list, VisitMut};
use crate::ast::*;
use crate::error::NormalizeResult;
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::rules::common::current_scope;
use crate::types::ScopeStack;

pub struct InitHoister;

impl InitHoister {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InitHoister {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for InitHoister {
    fn name(&self) -> &'static str {
        "hoist-init"
    }

    fn description(&self) -> &'static str {
        "Moves if/switch initializers into a new block enclosing the control statement"
    }

    fn fixpoint(&self) -> bool {
        true
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::NoControlInit]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = HoistVisitor {
            cx,
            scopes: ScopeStack::new(),
            rewrites: 0,
        };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

/// Wrap `control` (with its labels) in a new block that first runs `init`.
/// The block inherits the control statement's scope, or gets a fresh child of
/// the current scope when the control statement has none.
pub(crate) fn extract(
    cx: &mut RuleContext<'_>,
    scopes: &ScopeStack,
    labels: Vec<Label>,
    control: Stmt,
    init: Stmt,
) -> NormalizeResult<Stmt> {
    let block_id = cx.next_id();
    if cx.table.move_scope(control.id, block_id).is_none() {
        let parent = current_scope(scopes, control.id)?;
        let scope = cx.table.new_scope(parent);
        cx.table.attach_scope(block_id, scope);
    }
    let block = Block::new(block_id, vec![init, wrap_labels(labels, control)]);
    Ok(cx.stmt(StmtKind::Block(block)))
}

/// Detach the initializer of an `if`, `switch` or type switch.
fn take_init(stmt: &mut Stmt) -> Option<Stmt> {
    match &mut stmt.kind {
        StmtKind::If { init, .. }
        | StmtKind::Switch { init, .. }
        | StmtKind::TypeSwitch { init, .. } => init.take().map(|init| *init),
        _ => None,
    }
}

struct HoistVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    scopes: ScopeStack,
    rewrites: usize,
}

impl VisitMut for HoistVisitor<'_, '_> {
    fn enter_scope(&mut self, node: NodeId) -> NormalizeResult<()> {
        self.scopes.enter(node, self.cx.table);
        Ok(())
    }

    fn exit_scope(&mut self, node: NodeId) -> NormalizeResult<()> {
        self.scopes.exit(node);
        Ok(())
    }

    fn visit_stmt_list(&mut self, owner: NodeId, stmts: &mut Vec<Stmt>) -> NormalizeResult<()> {
        walk_stmt_list(self, owner, stmts)?;

        let cx = &mut *self.cx;
        let scopes = &self.scopes;
        self.rewrites += splice_stmts(stmts, |stmt| {
            let (labels, mut control) = peel_labels(stmt);
            match take_init(&mut control) {
                Some(init) => Ok(Splice::Replace(vec![extract(
                    cx, scopes, labels, control, init,
                )?])),
                None => Ok(Splice::Keep(wrap_labels(labels, control))),
            }
        })?;
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> NormalizeResult<()> {
        walk_stmt(self, stmt)?;

        if let StmtKind::If { els: Some(els), .. } = &mut stmt.kind {
            if matches!(els.kind, StmtKind::If { init: Some(_), .. }) {
                let mut inner = mem::replace(&mut **els, edit::placeholder_stmt());
                if let Some(init) = take_init(&mut inner) {
                    **els = extract(self.cx, &self.scopes, Vec::new(), inner, init)?;
                    self.rewrites += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::TreeBuilder;
    use crate::rules::testing;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_if_initializer_moves_into_enclosing_block() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let string = b.string();
        let m = b.map(string, int);
        let mut if_id = NodeId::default();
        let main = b.func("main", &[("m", m)], &[], |b| {
            let stmt = b.if_stmt(
                |b| {
                    let (m, k) = (b.ident("m"), b.string_lit("k"));
                    let lookup = b.comma_ok_index(m, k);
                    Some(b.define(&["v", "ok"], vec![lookup]))
                },
                |b| b.ident("ok"),
                |b| {
                    let v = b.ident("v");
                    vec![b.inc(v)]
                },
            );
            if_id = stmt.id;
            vec![stmt]
        });
        let (mut file, mut table) = b.finish(vec![main]);
        let if_scope = table.scope_of(if_id).unwrap();

        let (rewrites, _) = testing::apply(&InitHoister::new(), &mut file, &mut table).unwrap();
        assert_eq!(rewrites, 1);
        assert_eq!(
            testing::body(&file),
            vec!["{\n    v, ok := m[\"k\"]\n    if ok {\n        v++\n    }\n}"]
        );

        // The hoisted block owns the bindings; the function body does not.
        let TopDecl::Func(func) = &file.decls[0] else {
            panic!("expected function");
        };
        let body = func.body.as_ref().unwrap();
        let StmtKind::Block(block) = &body.stmts[0].kind else {
            panic!("expected block");
        };
        assert_eq!(table.scope_of(block.id), Some(if_scope));
        assert_eq!(table.scope_of(if_id), None);
        let body_scope = table.scope_of(body.id).unwrap();
        assert!(table.lookup(body_scope, "ok").is_none());
        assert!(table.lookup(if_scope, "ok").is_some());
    }

    #[test]
    fn test_else_if_initializer_and_labels() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[("x", int)], &[], |b| {
            let chain = b.if_else(
                |_| None,
                |b| {
                    let x = b.ident("x");
                    let zero = b.int_lit(0);
                    b.binary(BinaryOp::Gtr, x, zero)
                },
                |_| Vec::new(),
                |b| {
                    Some(b.if_stmt(
                        |b| {
                            let x = b.ident("x");
                            Some(b.define(&["y"], vec![x]))
                        },
                        |b| {
                            let y = b.ident("y");
                            let zero = b.int_lit(0);
                            b.binary(BinaryOp::Lss, y, zero)
                        },
                        |_| Vec::new(),
                    ))
                },
            );
            let switch = b.switch_stmt(
                |b| {
                    let x = b.ident("x");
                    Some(b.define(&["z"], vec![x]))
                },
                |b| Some(b.ident("z")),
                |_| Vec::new(),
            );
            let labeled = b.labeled("L", switch);
            vec![chain, labeled]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        let (rewrites, _) = testing::apply(&InitHoister::new(), &mut file, &mut table).unwrap();
        assert_eq!(rewrites, 2);
        assert_eq!(
            testing::body(&file),
            vec![
                "if x > 0 {} else {\n    y := x\n    if y < 0 {}\n}",
                "{\n    z := x\n    L: switch z {\n    }\n}",
            ]
        );

        let (again, _) = testing::apply(&InitHoister::new(), &mut file, &mut table).unwrap();
        assert_eq!(again, 0);
    }
}
