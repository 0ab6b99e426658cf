/*!
# Loop Canonicalizer

Reduces three-clause loops to condition-only loops:

```text
for i := 0; i < n; i++ {          =>      {
    if skip(i) { continue }                   i := 0
    use(i)                                    for i < n {
}                                                 if skip(i) { i++; continue }
                                                  use(i)
                                                  i++
                                              }
                                          }
```

The init statement is hoisted into an enclosing block the same way
`hoist-init` does it, a missing condition becomes `true`, and the post
statement is appended to the body. Every `continue` that targets the loop
(unlabeled at the loop's own level, or carrying one of the loop's labels)
runs a copy of the post statement first. Function literals are never entered.

When the body declares a name the post statement uses, the post statement
cannot move into the body's scope. The body then stays a nested block, the
post statement follows it, and each `continue` jumps to it:

```text
for i := 0; i < n; i++ {          =>      {
    i := i * 2                                i := 0
    if i > 4 { continue }                     for i < n {
    use(i)                                        {
}                                                     i := i * 2
                                                      if i > 4 { goto next }
                                                      use(i)
                                                  }
                                              next: i++
                                              }
                                          }
```
*/

use crate::ast::edit::{
    for_each_id_in_stmt, peel_labels, refresh_stmt, splice_stmts, wrap_labels, Splice,
};
use crate::ast::visit::{walk_stmt_list, VisitMut};
use crate::ast::*;
use crate::error::NormalizeResult;
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::rules::hoist_init::extract;
use crate::types::{BasicKind, ScopeStack, SymbolTable};
use tracing::debug;

pub struct LoopCanonicalizer;

impl LoopCanonicalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoopCanonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for LoopCanonicalizer {
    fn name(&self) -> &'static str {
        "for-loop"
    }

    fn description(&self) -> &'static str {
        "Rewrites three-clause loops as condition-only loops, keeping the post step on every continue"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["hoist-init"]
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::NoThreeClauseLoop]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = LoopVisitor {
            cx,
            scopes: ScopeStack::new(),
            rewrites: 0,
        };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

struct LoopVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    scopes: ScopeStack,
    rewrites: usize,
}

impl VisitMut for LoopVisitor<'_, '_> {
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
            if !matches!(
                stmt.unlabeled().kind,
                StmtKind::For { init: Some(_), .. } | StmtKind::For { post: Some(_), .. }
            ) {
                return Ok(Splice::Keep(stmt));
            }
            let (labels, control) = peel_labels(stmt);
            let (init, cond, post, mut body) = match control.kind {
                StmtKind::For {
                    init,
                    cond,
                    post,
                    body,
                } => (init, cond, post, body),
                kind => {
                    return Ok(Splice::Keep(wrap_labels(labels, Stmt::new(control.id, kind))))
                }
            };

            if let Some(post) = post {
                let names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
                if post_is_shadowed(cx.table, &post, &body) {
                    debug!(node = %control.id, "body shadows the post statement");
                    let resume = cx.table.fresh_name("next");
                    let mut target = ContinueTarget {
                        cx: &mut *cx,
                        resume: Resume::Goto(&resume),
                        labels: &names,
                        rewritten: 0,
                    };
                    target.rewrite_list(&mut body.stmts, 0);
                    // Go rejects labels nothing jumps to.
                    let post = if target.rewritten > 0 {
                        cx.stmt(StmtKind::Labeled {
                            label: resume,
                            stmt: post,
                        })
                    } else {
                        *post
                    };
                    let inner = cx.stmt(StmtKind::Block(body));
                    body = cx.block(vec![inner, post], None);
                } else {
                    let mut target = ContinueTarget {
                        cx: &mut *cx,
                        resume: Resume::Inline(&post),
                        labels: &names,
                        rewritten: 0,
                    };
                    target.rewrite_list(&mut body.stmts, 0);
                    body.stmts.push(*post);
                }
            }

            let cond = match cond {
                Some(cond) => cond,
                None => {
                    let bool_type = cx.table.basic(BasicKind::Bool);
                    cx.expr(ExprKind::Lit(Literal::Bool(true)), Some(bool_type))
                }
            };
            let canonical = Stmt::new(
                control.id,
                StmtKind::For {
                    init: None,
                    cond: Some(cond),
                    post: None,
                    body,
                },
            );
            let replacement = match init {
                Some(init) => extract(cx, scopes, labels, canonical, *init)?,
                None => wrap_labels(labels, canonical),
            };
            Ok(Splice::Replace(vec![replacement]))
        })?;
        Ok(())
    }
}

/// Whether the body declares a name the post statement refers to, anywhere
/// in its nested scopes.
fn post_is_shadowed(table: &SymbolTable, post: &Stmt, body: &Block) -> bool {
    let Some(body_scope) = table.scope_of(body.id) else {
        return true;
    };
    let mut names = Vec::new();
    let mut copy = post.clone();
    for_each_id_in_stmt(&mut copy, &mut |id| {
        if let Some(binding) = table.binding_of(*id).and_then(|b| table.binding(b)) {
            names.push(binding.name.clone());
        }
    });
    table.bindings().any(|(_, binding)| {
        names.contains(&binding.name) && table.is_within(binding.scope, body_scope)
    })
}

/// How a rewritten `continue` reaches the post statement.
enum Resume<'t> {
    /// Run a copy of it, then continue
    Inline(&'t Stmt),
    /// Jump to the label in front of it
    Goto(&'t str),
}

/// Rewrites the `continue` statements of one loop.
struct ContinueTarget<'t, 'a> {
    cx: &'t mut RuleContext<'a>,
    resume: Resume<'t>,
    labels: &'t [&'t str],
    rewritten: usize,
}

impl ContinueTarget<'_, '_> {
    fn rewrite_list(&mut self, stmts: &mut [Stmt], depth: usize) {
        for stmt in stmts {
            self.rewrite(stmt, depth);
        }
    }

    /// Whether a `continue` with `label` at loop nesting `depth` targets this loop.
    fn targets(&self, label: Option<&str>, depth: usize) -> bool {
        match label {
            None => depth == 0,
            Some(label) => self.labels.contains(&label),
        }
    }

    fn rewrite(&mut self, stmt: &mut Stmt, depth: usize) {
        match &mut stmt.kind {
            StmtKind::Branch {
                kind: BranchKind::Continue,
                label,
            } => {
                if self.targets(label.as_deref(), depth) {
                    self.rewritten += 1;
                    stmt.kind = match self.resume {
                        Resume::Inline(post) => {
                            let label = label.clone();
                            let post = refresh_stmt(post, self.cx.ids, self.cx.table);
                            let jump = self.cx.stmt(StmtKind::Branch {
                                kind: BranchKind::Continue,
                                label,
                            });
                            StmtKind::Block(Block::new(self.cx.next_id(), vec![post, jump]))
                        }
                        Resume::Goto(target) => StmtKind::Branch {
                            kind: BranchKind::Goto,
                            label: Some(target.to_string()),
                        },
                    };
                }
            }
            StmtKind::Block(block) => self.rewrite_list(&mut block.stmts, depth),
            StmtKind::If { then, els, .. } => {
                self.rewrite_list(&mut then.stmts, depth);
                if let Some(els) = els {
                    self.rewrite(els, depth);
                }
            }
            StmtKind::Switch { clauses, .. } => {
                for clause in clauses {
                    self.rewrite_list(&mut clause.body, depth);
                }
            }
            StmtKind::TypeSwitch { clauses, .. } => {
                for clause in clauses {
                    self.rewrite_list(&mut clause.body, depth);
                }
            }
            StmtKind::Select { clauses } => {
                for clause in clauses {
                    self.rewrite_list(&mut clause.body, depth);
                }
            }
            StmtKind::For { body, .. } | StmtKind::Range { body, .. } => {
                self.rewrite_list(&mut body.stmts, depth + 1)
            }
            StmtKind::Labeled { stmt, .. } => self.rewrite(stmt, depth),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::TreeBuilder;
    use crate::rules::testing;
    use pretty_assertions::assert_eq;

    fn counting_loop<B>(b: &mut TreeBuilder, body: B) -> Stmt
    where
        B: FnOnce(&mut TreeBuilder) -> Vec<Stmt>,
    {
        b.for_stmt(
            |b| {
                let zero = b.int_lit(0);
                Some(b.define(&["i"], vec![zero]))
            },
            |b| {
                let (i, n) = (b.ident("i"), b.int_lit(10));
                Some(b.binary(BinaryOp::Lss, i, n))
            },
            |b| {
                let i = b.ident("i");
                Some(b.inc(i))
            },
            body,
        )
    }

    #[test]
    fn test_continue_runs_post_step() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let sig = b.signature(vec![int], vec![]);
        b.declare_func("use", sig);
        let main = b.func("main", &[], &[], |b| {
            let stmt = counting_loop(b, |b| {
                let skip = b.if_stmt(
                    |_| None,
                    |b| {
                        let (i, two) = (b.ident("i"), b.int_lit(2));
                        b.binary(BinaryOp::Eql, i, two)
                    },
                    |b| vec![b.branch(BranchKind::Continue, None)],
                );
                let (f, i) = (b.ident("use"), b.ident("i"));
                let call = b.call(f, vec![i]);
                vec![skip, b.expr_stmt(call)]
            });
            vec![stmt]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        let (rewrites, _) = testing::apply(&LoopCanonicalizer::new(), &mut file, &mut table).unwrap();
        assert_eq!(rewrites, 1);
        assert_eq!(
            testing::body(&file),
            vec![concat!(
                "{\n",
                "    i := 0\n",
                "    for i < 10 {\n",
                "        if i == 2 {\n",
                "            {\n",
                "                i++\n",
                "                continue\n",
                "            }\n",
                "        }\n",
                "        use(i)\n",
                "        i++\n",
                "    }\n",
                "}"
            )]
        );
    }

    #[test]
    fn test_nested_loops_only_take_their_own_continues() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let xs = b.slice(int);
        let main = b.func("main", &[("xs", xs)], &[], |b| {
            let outer = counting_loop(b, |b| {
                let xs = b.ident("xs");
                let inner = b.range_stmt(Some("_"), Some("x"), xs, |b| {
                    vec![
                        b.branch(BranchKind::Continue, None),
                        b.branch(BranchKind::Continue, Some("Outer")),
                    ]
                });
                vec![inner]
            });
            vec![b.labeled("Outer", outer)]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&LoopCanonicalizer::new(), &mut file, &mut table).unwrap();
        assert_eq!(
            testing::body(&file),
            vec![concat!(
                "{\n",
                "    i := 0\n",
                "    Outer: for i < 10 {\n",
                "        for _, x := range xs {\n",
                "            continue\n",
                "            {\n",
                "                i++\n",
                "                continue Outer\n",
                "            }\n",
                "        }\n",
                "        i++\n",
                "    }\n",
                "}"
            )]
        );
    }

    /// `for i := 0; i < 10; i++ { i := 100; [if i > 4 { continue }]; use(i) }`
    fn shadowing_loop(skip: bool) -> (SourceFile, SymbolTable) {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let sig = b.signature(vec![int], vec![]);
        b.declare_func("use", sig);
        let main = b.func("main", &[], &[], |b| {
            let stmt = counting_loop(b, |b| {
                let hundred = b.int_lit(100);
                let mut body = vec![b.define(&["i"], vec![hundred])];
                if skip {
                    body.push(b.if_stmt(
                        |_| None,
                        |b| {
                            let (i, four) = (b.ident("i"), b.int_lit(4));
                            b.binary(BinaryOp::Gtr, i, four)
                        },
                        |b| vec![b.branch(BranchKind::Continue, None)],
                    ));
                }
                let (f, i) = (b.ident("use"), b.ident("i"));
                let call = b.call(f, vec![i]);
                body.push(b.expr_stmt(call));
                body
            });
            vec![stmt]
        });
        b.finish(vec![main])
    }

    #[test]
    fn test_shadowing_body_keeps_post_step_in_loop_scope() {
        let (mut file, mut table) = shadowing_loop(false);

        let (rewrites, _) = testing::apply(&LoopCanonicalizer::new(), &mut file, &mut table).unwrap();
        assert_eq!(rewrites, 1);
        assert_eq!(
            testing::body(&file),
            vec![concat!(
                "{\n",
                "    i := 0\n",
                "    for i < 10 {\n",
                "        {\n",
                "            i := 100\n",
                "            use(i)\n",
                "        }\n",
                "        i++\n",
                "    }\n",
                "}"
            )]
        );
    }

    #[test]
    fn test_shadowing_body_continue_jumps_to_post_step() {
        let (mut file, mut table) = shadowing_loop(true);

        testing::apply(&LoopCanonicalizer::new(), &mut file, &mut table).unwrap();
        assert_eq!(
            testing::body(&file),
            vec![concat!(
                "{\n",
                "    i := 0\n",
                "    for i < 10 {\n",
                "        {\n",
                "            i := 100\n",
                "            if i > 4 {\n",
                "                goto next\n",
                "            }\n",
                "            use(i)\n",
                "        }\n",
                "        next: i++\n",
                "    }\n",
                "}"
            )]
        );
        let violations =
            crate::invariants::check_only(&file, &table, &[Invariant::NoThreeClauseLoop]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_post_only_loop_gets_true_condition_and_no_block() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[("n", int)], &[], |b| {
            let stmt = b.for_stmt(
                |_| None,
                |_| None,
                |b| {
                    let n = b.ident("n");
                    Some(b.inc(n))
                },
                |_| Vec::new(),
            );
            vec![stmt]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&LoopCanonicalizer::new(), &mut file, &mut table).unwrap();
        assert_eq!(testing::body(&file), vec!["for true {\n    n++\n}"]);
    }
}
