/*!
# Short Declaration Eliminator

Replaces `:=` in statement lists with explicit declarations followed by a
plain assignment. Each name the statement newly declares gets a typed,
zero-initialized `var`; names it merely reuses are assigned as before:

```text
y, err := f()       =>      var err error = nil
(y already declared)        y, err = f()
```

When a right-hand side mentions one of the new names (so it still reads the
outer variable of that name), the values are first captured in temporaries,
because declaring the new variable first would change what the name refers
to:

```text
x := x + 1          =>      var tmp int = x + 1
                            var x int = 0
                            x = tmp
```

Loop headers, `range` clauses, type-switch guards and `select` receives keep
their `:=`; init statements have already been hoisted into statement lists by
the time this rule runs.
*/

use crate::ast::edit::{attach_labels_to_first, peel_labels, splice_stmts, Splice};
use crate::ast::visit::{walk_stmt_list, VisitMut};
use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult, Severity};
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::rules::common::{current_scope, mentions_any, zero_value};
use crate::types::{BindingId, ScopeId, ScopeStack, TypeId};
use tracing::debug;

pub struct ShortDeclEliminator;

impl ShortDeclEliminator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShortDeclEliminator {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for ShortDeclEliminator {
    fn name(&self) -> &'static str {
        "short-decl"
    }

    fn description(&self) -> &'static str {
        "Replaces := with typed var declarations and a plain assignment"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["hoist-init", "for-loop", "zero-value"]
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::NoShortDecl]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = ShortDeclVisitor {
            cx,
            scopes: ScopeStack::new(),
            rewrites: 0,
        };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

struct ShortDeclVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    scopes: ScopeStack,
    rewrites: usize,
}

impl VisitMut for ShortDeclVisitor<'_, '_> {
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

        let mut eliminator = Eliminator {
            cx: &mut *self.cx,
            scope: current_scope(&self.scopes, owner),
        };
        self.rewrites += splice_stmts(stmts, |stmt| {
            if !matches!(
                stmt.unlabeled().kind,
                StmtKind::Assign {
                    op: AssignOp::Define,
                    ..
                }
            ) {
                return Ok(Splice::Keep(stmt));
            }
            let original = stmt.clone();
            let (labels, stmt) = peel_labels(stmt);
            match eliminator.rewrite(stmt) {
                Ok(out) => Ok(Splice::Replace(attach_labels_to_first(labels, out))),
                Err(error) if error.severity() == Severity::Declaration => {
                    let snippet = original.to_source();
                    eliminator.cx.tolerate(error, Some(snippet))?;
                    Ok(Splice::Keep(original))
                }
                Err(error) => Err(error),
            }
        })?;
        Ok(())
    }
}

/// One left-hand operand of a `:=`.
enum Target {
    Blank(Expr),
    /// Declared by this statement
    Fresh { ident: Expr, binding: BindingId },
    /// Declared earlier in the same scope
    Existing(Expr),
}

#[derive(Clone, Copy, PartialEq)]
enum Form {
    /// `a, b := x, y`
    List,
    /// `a, b := f()`
    Tuple,
}

/// `var name T = zero` for a fresh name, ready to emit.
struct FreshDecl {
    ident: Ident,
    ty: TypeExpr,
    zero: Expr,
}

struct Eliminator<'t, 'a> {
    cx: &'t mut RuleContext<'a>,
    scope: NormalizeResult<ScopeId>,
}

impl Eliminator<'_, '_> {
    fn rewrite(&mut self, stmt: Stmt) -> NormalizeResult<Vec<Stmt>> {
        let (lhs, rhs) = match stmt.kind {
            StmtKind::Assign {
                lhs,
                op: AssignOp::Define,
                rhs,
            } => (lhs, rhs),
            kind => return Ok(vec![Stmt::new(stmt.id, kind)]),
        };
        let form = match (lhs.len(), rhs.len()) {
            (names, values) if names == values => Form::List,
            (names, 1) if names > 1 => Form::Tuple,
            (names, values) => {
                return Err(NormalizeError::MalformedDeclaration {
                    node: stmt.id,
                    names,
                    values,
                })
            }
        };
        let scope = self.scope.clone()?;
        let targets = lhs
            .into_iter()
            .map(|expr| self.classify(scope, expr))
            .collect::<NormalizeResult<Vec<_>>>()?;

        // Everything that can fail for this one declaration happens before the
        // table gains temporaries.
        let mut fresh = Vec::new();
        for target in &targets {
            if let Target::Fresh { ident, binding } = target {
                let name = ident.as_ident().unwrap_or_default().to_string();
                let ty = self.binding_type(*binding, ident.id)?;
                fresh.push(FreshDecl {
                    ty: self.cx.spell(ty, stmt.id)?,
                    zero: zero_value(self.cx, ty, &name, stmt.id)?,
                    ident: Ident::new(ident.id, name),
                });
            }
        }
        let shadowed = rhs.iter().any(|value| {
            mentions_any(
                self.cx.table,
                Some(scope),
                value,
                fresh.iter().map(|decl| decl.ident.name.as_str()),
            )
        });

        let mut out = Vec::new();
        let rhs = if shadowed {
            debug!(node = %stmt.id, "right-hand side reads a shadowed name");
            match form {
                Form::List => self.capture_list(stmt.id, &targets, rhs, &mut out)?,
                Form::Tuple => self.capture_tuple(stmt.id, &targets, rhs, &mut out)?,
            }
        } else {
            rhs
        };
        for decl in fresh {
            out.push(self.cx.var_decl(decl.ident, Some(decl.ty), vec![decl.zero]));
        }
        let lhs = targets
            .into_iter()
            .map(|target| match target {
                Target::Fresh { binding, .. } => self.cx.use_binding(binding),
                Target::Blank(expr) | Target::Existing(expr) => expr,
            })
            .collect();
        out.push(Stmt::new(
            stmt.id,
            StmtKind::Assign {
                lhs,
                op: AssignOp::Assign,
                rhs,
            },
        ));
        Ok(out)
    }

    /// Decide whether `expr` is declared or reused by the statement. Either
    /// way its binding must live in the statement's own scope.
    fn classify(&self, scope: ScopeId, expr: Expr) -> NormalizeResult<Target> {
        if expr.is_blank() {
            return Ok(Target::Blank(expr));
        }
        let table = &*self.cx.table;
        let in_scope = |binding: BindingId| {
            table
                .binding(binding)
                .map_or(false, |b| b.scope == scope)
        };
        if expr.as_ident().is_some() {
            if let Some(binding) = table.def(expr.id).filter(|b| in_scope(*b)) {
                return Ok(Target::Fresh {
                    ident: expr,
                    binding,
                });
            }
            if table.use_of(expr.id).map_or(false, in_scope) {
                return Ok(Target::Existing(expr));
            }
        }
        Err(NormalizeError::AmbiguousRedeclaration {
            node: expr.id,
            name: expr.to_source(),
        })
    }

    fn binding_type(&self, binding: BindingId, node: NodeId) -> NormalizeResult<TypeId> {
        self.cx
            .table
            .binding(binding)
            .and_then(|b| b.ty)
            .ok_or(NormalizeError::MissingType {
                node,
                what: "declared name",
            })
    }

    fn target_type(&mut self, target: &Target, value: Option<&Expr>) -> NormalizeResult<TypeId> {
        let ty = match target {
            Target::Fresh { binding, ident } => Some(self.binding_type(*binding, ident.id)?),
            Target::Existing(expr) | Target::Blank(expr) => self.cx.table.type_of(expr.id),
        };
        let ty = ty
            .or_else(|| value.and_then(|v| self.cx.table.type_of(v.id)))
            .ok_or(NormalizeError::MissingType {
                node: value.map_or_else(|| target_node(target), |v| v.id),
                what: "assigned value",
            })?;
        Ok(self.cx.table.default_type(ty))
    }

    /// `var tmp T = value` per value; the assignment then reads the temporaries.
    fn capture_list(
        &mut self,
        node: NodeId,
        targets: &[Target],
        rhs: Vec<Expr>,
        out: &mut Vec<Stmt>,
    ) -> NormalizeResult<Vec<Expr>> {
        let mut typed = Vec::with_capacity(rhs.len());
        for (target, value) in targets.iter().zip(&rhs) {
            let ty = self.target_type(target, Some(value))?;
            typed.push((ty, self.cx.spell(ty, node)?));
        }
        let scope = self.scope.clone()?;
        let mut reads = Vec::with_capacity(rhs.len());
        for ((ty, spelled), value) in typed.into_iter().zip(rhs) {
            let temp = self.cx.declare_temp(scope, ty);
            out.push(self.cx.var_stmt(temp, spelled, value));
            reads.push(self.cx.use_binding(temp));
        }
        Ok(reads)
    }

    /// Zero-initialized temporaries receive the multi-value result first.
    fn capture_tuple(
        &mut self,
        node: NodeId,
        targets: &[Target],
        mut rhs: Vec<Expr>,
        out: &mut Vec<Stmt>,
    ) -> NormalizeResult<Vec<Expr>> {
        let value = rhs.remove(0);
        let members = self
            .cx
            .table
            .type_of(value.id)
            .map(|tuple| self.cx.table.results(tuple))
            .ok_or(NormalizeError::MissingType {
                node: value.id,
                what: "multi-value initializer",
            })?;
        if members.len() != targets.len() {
            return Err(NormalizeError::MalformedDeclaration {
                node,
                names: targets.len(),
                values: members.len(),
            });
        }
        let mut typed = Vec::with_capacity(members.len());
        for member in members {
            let member = self.cx.table.default_type(member);
            let spelled = self.cx.spell(member, node)?;
            let name = self.cx.table.display(member);
            let zero = zero_value(self.cx, member, &name, node)?;
            typed.push((member, spelled, zero));
        }
        let scope = self.scope.clone()?;
        let mut temps = Vec::with_capacity(typed.len());
        for (member, spelled, zero) in typed {
            let temp = self.cx.declare_temp(scope, member);
            out.push(self.cx.var_stmt(temp, spelled, zero));
            temps.push(temp);
        }
        let receivers = temps.iter().map(|t| self.cx.use_binding(*t)).collect();
        out.push(self.cx.stmt(StmtKind::Assign {
            lhs: receivers,
            op: AssignOp::Assign,
            rhs: vec![value],
        }));
        Ok(temps.into_iter().map(|t| self.cx.use_binding(t)).collect())
    }
}

fn target_node(target: &Target) -> NodeId {
    match target {
        Target::Blank(expr) | Target::Existing(expr) => expr.id,
        Target::Fresh { ident, .. } => ident.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::TreeBuilder;
    use crate::rules::testing;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mixed_freshness_declares_only_new_names() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let err_ty = b.error_type();
        let sig = b.signature(vec![], vec![int, err_ty]);
        b.declare_func("f", sig);
        let main = b.func("main", &[], &[], |b| {
            let one = b.int_lit(1);
            let first = b.define(&["y"], vec![one]);
            let f = b.ident("f");
            let call = b.call(f, vec![]);
            let second = b.define(&["y", "err"], vec![call]);
            vec![first, second]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        let (rewrites, _) =
            testing::apply(&ShortDeclEliminator::new(), &mut file, &mut table).unwrap();
        assert_eq!(rewrites, 2);
        assert_eq!(
            testing::body(&file),
            vec![
                "var y int = 0",
                "y = 1",
                "var err error = nil",
                "y, err = f()",
            ]
        );
    }

    #[test]
    fn test_shadowing_initializer_reads_outer_variable_first() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[("x", int)], &[], |b| {
            let inner = b.block(|b| {
                let (x, one) = (b.ident("x"), b.int_lit(1));
                let sum = b.binary(BinaryOp::Add, x, one);
                vec![b.define(&["x"], vec![sum])]
            });
            vec![inner]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&ShortDeclEliminator::new(), &mut file, &mut table).unwrap();
        assert_eq!(
            testing::body(&file),
            vec!["{\n    var tmp int = x + 1\n    var x int = 0\n    x = tmp\n}"]
        );
    }

    #[test]
    fn test_shadowing_tuple_goes_through_zeroed_temporaries() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let bool_type = b.bool_type();
        let sig = b.signature(vec![int], vec![int, bool_type]);
        b.declare_func("lookup", sig);
        let main = b.func("main", &[("n", int)], &[], |b| {
            let inner = b.block(|b| {
                let (f, n) = (b.ident("lookup"), b.ident("n"));
                let call = b.call(f, vec![n]);
                vec![b.define(&["n", "ok"], vec![call])]
            });
            vec![inner]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&ShortDeclEliminator::new(), &mut file, &mut table).unwrap();
        assert_eq!(
            testing::body(&file),
            vec![concat!(
                "{\n",
                "    var tmp int = 0\n",
                "    var tmp1 bool = false\n",
                "    tmp, tmp1 = lookup(n)\n",
                "    var n int = 0\n",
                "    var ok bool = false\n",
                "    n, ok = tmp, tmp1\n",
                "}"
            )]
        );
    }

    #[test]
    fn test_repeated_comma_ok_declares_ok_once() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let string = b.string();
        let table_ty = b.map(string, int);
        let main = b.func("main", &[("m", table_ty), ("a", string), ("c", string)], &[], |b| {
            let (m, a) = (b.ident("m"), b.ident("a"));
            let first = b.comma_ok_index(m, a);
            let first = b.define(&["v", "ok"], vec![first]);
            let (m, c) = (b.ident("m"), b.ident("c"));
            let second = b.comma_ok_index(m, c);
            let second = b.define(&["w", "ok"], vec![second]);
            vec![first, second]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&ShortDeclEliminator::new(), &mut file, &mut table).unwrap();
        let body = testing::body(&file);
        assert_eq!(
            body,
            vec![
                "var v int = 0",
                "var ok bool = false",
                "v, ok = m[a]",
                "var w int = 0",
                "w, ok = m[c]",
            ]
        );
        let ok_decls = body.iter().filter(|s| s.as_str() == "var ok bool = false").count();
        assert_eq!(ok_decls, 1);
    }

    #[test]
    fn test_name_bound_inside_initializer_needs_no_temporary() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[], &[], |b| {
            let double = b.func_lit(&[("y", int)], &[int], |b| {
                let (y, two) = (b.ident("y"), b.int_lit(2));
                let product = b.binary(BinaryOp::Mul, y, two);
                vec![b.ret(vec![product])]
            });
            let one = b.int_lit(1);
            let call = b.call(double, vec![one]);
            vec![b.define(&["y"], vec![call])]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&ShortDeclEliminator::new(), &mut file, &mut table).unwrap();
        let body = testing::body(&file);
        assert_eq!(body.len(), 2);
        assert_eq!(body[0], "var y int = 0");
        assert!(body[1].starts_with("y = func("));
        assert!(body.iter().all(|s| !s.contains("tmp")));
    }

    #[test]
    fn test_labels_stay_on_first_statement() {
        let mut b = TreeBuilder::new("main");
        let main = b.func("main", &[], &[], |b| {
            let one = b.int_lit(1);
            let define = b.define(&["a"], vec![one]);
            vec![b.labeled("L", define)]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&ShortDeclEliminator::new(), &mut file, &mut table).unwrap();
        assert_eq!(testing::body(&file), vec!["L: var a int = 0", "a = 1"]);
    }

    #[test]
    fn test_unresolved_name_is_fatal() {
        let mut b = TreeBuilder::new("main");
        let main = b.func("main", &[], &[], |b| {
            let stray = Expr::new(b.next_id(), ExprKind::Ident("q".to_string()));
            let one = b.int_lit(1);
            vec![b.stmt(StmtKind::Assign {
                lhs: vec![stray],
                op: AssignOp::Define,
                rhs: vec![one],
            })]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        let error = testing::apply(&ShortDeclEliminator::new(), &mut file, &mut table).unwrap_err();
        assert!(matches!(error, NormalizeError::AmbiguousRedeclaration { ref name, .. } if name == "q"));
        assert_eq!(error.severity(), Severity::Fatal);
    }
}
