/*!
# Tree Pattern Matching Utilities

Read-only traversal of a source file and small composable predicates over its
nodes. Statements are reported with their position: list statements (block and
clause bodies) separately from header statements (initializers, post steps,
type-switch guards and select communications).
*/

use std::ops::ControlFlow;

use crate::ast::*;

/// A borrowed node, as yielded by [`AstWalker`].
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Decl { decl: &'a GenDecl, top_level: bool },
    Func(&'a FuncDecl),
    Block(&'a Block),
    /// A statement that sits in a statement list (or an `else` branch)
    Stmt(&'a Stmt),
    /// A statement in a control-statement header
    Header(&'a Stmt),
    Expr(&'a Expr),
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        match self {
            NodeRef::Decl { decl, .. } => decl.id,
            NodeRef::Func(func) => func.id,
            NodeRef::Block(block) => block.id,
            NodeRef::Stmt(stmt) | NodeRef::Header(stmt) => stmt.id,
            NodeRef::Expr(expr) => expr.id,
        }
    }

    /// Statement in either position.
    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match self {
            NodeRef::Stmt(stmt) | NodeRef::Header(stmt) => Some(stmt),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            NodeRef::Expr(expr) => Some(expr),
            _ => None,
        }
    }
}

/// Pattern matcher for tree nodes
pub trait AstPattern {
    fn matches(&self, node: NodeRef<'_>) -> bool;
}

/// Pattern constructors
pub struct PatternMatcher;

impl PatternMatcher {
    /// Match nodes accepted by an arbitrary predicate
    pub fn node_type<F>(predicate: F) -> NodeTypeMatcher<F>
    where
        F: Fn(NodeRef<'_>) -> bool,
    {
        NodeTypeMatcher { predicate }
    }

    /// Match `:=` assignments in statement lists
    pub fn short_decl() -> NodeTypeMatcher<fn(NodeRef<'_>) -> bool> {
        NodeTypeMatcher {
            predicate: |node| {
                matches!(node, NodeRef::Stmt(stmt)
                    if matches!(stmt.unlabeled().kind, StmtKind::Assign { op: AssignOp::Define, .. }))
            },
        }
    }

    /// Match `if`/`switch`/type-switch statements that carry an initializer
    pub fn control_with_init() -> NodeTypeMatcher<fn(NodeRef<'_>) -> bool> {
        NodeTypeMatcher {
            predicate: |node| {
                node.as_stmt().map_or(false, |stmt| {
                    matches!(
                        &stmt.kind,
                        StmtKind::If { init: Some(_), .. }
                            | StmtKind::Switch { init: Some(_), .. }
                            | StmtKind::TypeSwitch { init: Some(_), .. }
                    )
                })
            },
        }
    }

    /// Match `for` loops with an init or post statement
    pub fn three_clause_loop() -> NodeTypeMatcher<fn(NodeRef<'_>) -> bool> {
        NodeTypeMatcher {
            predicate: |node| {
                node.as_stmt().map_or(false, |stmt| {
                    matches!(
                        &stmt.kind,
                        StmtKind::For { init: Some(_), .. } | StmtKind::For { post: Some(_), .. }
                    )
                })
            },
        }
    }

    /// Match expression-switches without a tag
    pub fn tagless_switch() -> NodeTypeMatcher<fn(NodeRef<'_>) -> bool> {
        NodeTypeMatcher {
            predicate: |node| {
                node.as_stmt()
                    .map_or(false, |stmt| matches!(&stmt.kind, StmtKind::Switch { tag: None, .. }))
            },
        }
    }
}

/// Generic predicate matcher
pub struct NodeTypeMatcher<F>
where
    F: Fn(NodeRef<'_>) -> bool,
{
    predicate: F,
}

impl<F> AstPattern for NodeTypeMatcher<F>
where
    F: Fn(NodeRef<'_>) -> bool,
{
    fn matches(&self, node: NodeRef<'_>) -> bool {
        (self.predicate)(node)
    }
}

/// Deep traversal and pattern search
pub struct AstWalker;

impl AstWalker {
    /// All nodes in the file matching `pattern`, in tree order.
    pub fn find_all<'a, P: AstPattern>(file: &'a SourceFile, pattern: &P) -> Vec<NodeRef<'a>> {
        let mut found = Vec::new();
        let _ = Self::walk_file(file, &mut |node| {
            if pattern.matches(node) {
                found.push(node);
            }
            ControlFlow::Continue(())
        });
        found
    }

    /// First node under an expression (the expression included) matching `pattern`.
    pub fn find_first_in_expr<'a, P: AstPattern>(expr: &'a Expr, pattern: &P) -> Option<NodeRef<'a>> {
        let mut hit = None;
        let _ = Self::walk_expr(expr, &mut |node| {
            if pattern.matches(node) {
                hit = Some(node);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        hit
    }

    pub fn contains<P: AstPattern>(expr: &Expr, pattern: &P) -> bool {
        Self::find_first_in_expr(expr, pattern).is_some()
    }

    /// Visit every node of the file in tree order until `f` breaks.
    pub fn walk_file<'a>(
        file: &'a SourceFile,
        f: &mut dyn FnMut(NodeRef<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        for decl in &file.decls {
            match decl {
                TopDecl::Gen(gen) => Self::walk_decl(gen, true, f)?,
                TopDecl::Func(func) => {
                    f(NodeRef::Func(func))?;
                    if let Some(body) = &func.body {
                        Self::walk_block(body, f)?;
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn walk_decl<'a>(
        decl: &'a GenDecl,
        top_level: bool,
        f: &mut dyn FnMut(NodeRef<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        f(NodeRef::Decl { decl, top_level })?;
        for spec in &decl.specs {
            if let Spec::Value(value) = spec {
                for expr in &value.values {
                    Self::walk_expr(expr, f)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn walk_block<'a>(
        block: &'a Block,
        f: &mut dyn FnMut(NodeRef<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        f(NodeRef::Block(block))?;
        Self::walk_list(&block.stmts, f)
    }

    fn walk_list<'a>(
        stmts: &'a [Stmt],
        f: &mut dyn FnMut(NodeRef<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        for stmt in stmts {
            Self::walk_stmt(NodeRef::Stmt(stmt), f)?;
        }
        ControlFlow::Continue(())
    }

    fn walk_header<'a>(
        stmt: &'a Stmt,
        f: &mut dyn FnMut(NodeRef<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        Self::walk_stmt(NodeRef::Header(stmt), f)
    }

    fn walk_stmt<'a>(
        node: NodeRef<'a>,
        f: &mut dyn FnMut(NodeRef<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let Some(stmt) = node.as_stmt() else {
            return ControlFlow::Continue(());
        };
        f(node)?;
        match &stmt.kind {
            StmtKind::Decl(gen) => Self::walk_decl(gen, false, f)?,
            StmtKind::Assign { lhs, rhs, .. } => {
                for expr in lhs.iter().chain(rhs.iter()) {
                    Self::walk_expr(expr, f)?;
                }
            }
            StmtKind::Expr(x) | StmtKind::Go(x) | StmtKind::Defer(x) | StmtKind::IncDec { x, .. } => {
                Self::walk_expr(x, f)?
            }
            StmtKind::Send { chan, value } => {
                Self::walk_expr(chan, f)?;
                Self::walk_expr(value, f)?;
            }
            StmtKind::Return(values) => {
                for expr in values {
                    Self::walk_expr(expr, f)?;
                }
            }
            StmtKind::Branch { .. } | StmtKind::Empty => {}
            StmtKind::Block(block) => Self::walk_block(block, f)?,
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                if let Some(init) = init {
                    Self::walk_header(init, f)?;
                }
                Self::walk_expr(cond, f)?;
                Self::walk_block(then, f)?;
                if let Some(els) = els {
                    Self::walk_stmt(NodeRef::Stmt(els), f)?;
                }
            }
            StmtKind::Switch { init, tag, clauses } => {
                if let Some(init) = init {
                    Self::walk_header(init, f)?;
                }
                if let Some(tag) = tag {
                    Self::walk_expr(tag, f)?;
                }
                for clause in clauses {
                    for expr in clause.list.iter().flatten() {
                        Self::walk_expr(expr, f)?;
                    }
                    Self::walk_list(&clause.body, f)?;
                }
            }
            StmtKind::TypeSwitch {
                init,
                guard,
                clauses,
            } => {
                if let Some(init) = init {
                    Self::walk_header(init, f)?;
                }
                Self::walk_header(guard, f)?;
                for clause in clauses {
                    Self::walk_list(&clause.body, f)?;
                }
            }
            StmtKind::Select { clauses } => {
                for clause in clauses {
                    if let Some(comm) = &clause.comm {
                        Self::walk_header(comm, f)?;
                    }
                    Self::walk_list(&clause.body, f)?;
                }
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    Self::walk_header(init, f)?;
                }
                if let Some(cond) = cond {
                    Self::walk_expr(cond, f)?;
                }
                if let Some(post) = post {
                    Self::walk_header(post, f)?;
                }
                Self::walk_block(body, f)?;
            }
            StmtKind::Range {
                key,
                value,
                x,
                body,
                ..
            } => {
                for expr in [key, value].into_iter().flatten() {
                    Self::walk_expr(expr, f)?;
                }
                Self::walk_expr(x, f)?;
                Self::walk_block(body, f)?;
            }
            StmtKind::Labeled { stmt: inner, .. } => Self::walk_stmt(NodeRef::Stmt(inner), f)?,
        }
        ControlFlow::Continue(())
    }

    fn walk_expr<'a>(
        expr: &'a Expr,
        f: &mut dyn FnMut(NodeRef<'a>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        f(NodeRef::Expr(expr))?;
        match &expr.kind {
            ExprKind::Ident(_) | ExprKind::Lit(_) | ExprKind::Type(_) => {}
            ExprKind::CompositeLit { elts, .. } => {
                for elt in elts {
                    Self::walk_expr(elt, f)?;
                }
            }
            ExprKind::KeyValue { key, value } => {
                Self::walk_expr(key, f)?;
                Self::walk_expr(value, f)?;
            }
            ExprKind::FuncLit { body, .. } => Self::walk_block(body, f)?,
            ExprKind::Paren(x)
            | ExprKind::Star(x)
            | ExprKind::Selector { x, .. }
            | ExprKind::TypeAssert { x, .. }
            | ExprKind::Unary { x, .. } => Self::walk_expr(x, f)?,
            ExprKind::Index { x, index } => {
                Self::walk_expr(x, f)?;
                Self::walk_expr(index, f)?;
            }
            ExprKind::Slice { x, low, high, max } => {
                Self::walk_expr(x, f)?;
                for part in [low, high, max].into_iter().flatten() {
                    Self::walk_expr(part, f)?;
                }
            }
            ExprKind::Call { fun, args, .. } => {
                Self::walk_expr(fun, f)?;
                for arg in args {
                    Self::walk_expr(arg, f)?;
                }
            }
            ExprKind::Binary { x, y, .. } => {
                Self::walk_expr(x, f)?;
                Self::walk_expr(y, f)?;
            }
        }
        ControlFlow::Continue(())
    }
}
