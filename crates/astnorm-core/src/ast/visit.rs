//! Mutable tree traversal.
//!
//! Implementors override the `visit_*` methods they care about and call the
//! matching `walk_*` function to continue into children. `enter_scope` and
//! `exit_scope` bracket every node that may own a lexical scope, so a visitor can
//! keep a [`crate::types::ScopeStack`] in step with the walk.

use super::*;
use crate::error::NormalizeResult;

pub trait VisitMut {
    fn enter_scope(&mut self, _node: NodeId) -> NormalizeResult<()> {
        Ok(())
    }

    fn exit_scope(&mut self, _node: NodeId) -> NormalizeResult<()> {
        Ok(())
    }

    fn visit_file(&mut self, file: &mut SourceFile) -> NormalizeResult<()> {
        walk_file(self, file)
    }

    fn visit_func_decl(&mut self, func: &mut FuncDecl) -> NormalizeResult<()> {
        walk_func_decl(self, func)
    }

    fn visit_gen_decl(&mut self, gen: &mut GenDecl) -> NormalizeResult<()> {
        walk_gen_decl(self, gen)
    }

    /// A statement list owned by a block or a case clause.
    fn visit_stmt_list(&mut self, owner: NodeId, stmts: &mut Vec<Stmt>) -> NormalizeResult<()> {
        walk_stmt_list(self, owner, stmts)
    }

    fn visit_block(&mut self, block: &mut Block) -> NormalizeResult<()> {
        walk_block(self, block)
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> NormalizeResult<()> {
        walk_stmt(self, stmt)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> NormalizeResult<()> {
        walk_expr(self, expr)
    }
}

pub fn walk_file<V: VisitMut + ?Sized>(v: &mut V, file: &mut SourceFile) -> NormalizeResult<()> {
    v.enter_scope(file.id)?;
    for decl in &mut file.decls {
        match decl {
            TopDecl::Gen(gen) => v.visit_gen_decl(gen)?,
            TopDecl::Func(func) => v.visit_func_decl(func)?,
        }
    }
    v.exit_scope(file.id)
}

pub fn walk_func_decl<V: VisitMut + ?Sized>(v: &mut V, func: &mut FuncDecl) -> NormalizeResult<()> {
    v.enter_scope(func.id)?;
    if let Some(body) = &mut func.body {
        v.visit_block(body)?;
    }
    v.exit_scope(func.id)
}

pub fn walk_gen_decl<V: VisitMut + ?Sized>(v: &mut V, gen: &mut GenDecl) -> NormalizeResult<()> {
    for spec in &mut gen.specs {
        if let Spec::Value(value) = spec {
            for expr in &mut value.values {
                v.visit_expr(expr)?;
            }
        }
    }
    Ok(())
}

pub fn walk_stmt_list<V: VisitMut + ?Sized>(
    v: &mut V,
    _owner: NodeId,
    stmts: &mut Vec<Stmt>,
) -> NormalizeResult<()> {
    for stmt in stmts.iter_mut() {
        v.visit_stmt(stmt)?;
    }
    Ok(())
}

pub fn walk_block<V: VisitMut + ?Sized>(v: &mut V, block: &mut Block) -> NormalizeResult<()> {
    v.enter_scope(block.id)?;
    v.visit_stmt_list(block.id, &mut block.stmts)?;
    v.exit_scope(block.id)
}

pub fn walk_stmt<V: VisitMut + ?Sized>(v: &mut V, stmt: &mut Stmt) -> NormalizeResult<()> {
    let id = stmt.id;
    match &mut stmt.kind {
        StmtKind::Decl(gen) => v.visit_gen_decl(gen)?,
        StmtKind::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter_mut().chain(rhs.iter_mut()) {
                v.visit_expr(expr)?;
            }
        }
        StmtKind::Expr(x) | StmtKind::Go(x) | StmtKind::Defer(x) | StmtKind::IncDec { x, .. } => {
            v.visit_expr(x)?
        }
        StmtKind::Send { chan, value } => {
            v.visit_expr(chan)?;
            v.visit_expr(value)?;
        }
        StmtKind::Return(values) => {
            for expr in values {
                v.visit_expr(expr)?;
            }
        }
        StmtKind::Branch { .. } | StmtKind::Empty => {}
        StmtKind::Block(block) => v.visit_block(block)?,
        StmtKind::If {
            init,
            cond,
            then,
            els,
        } => {
            v.enter_scope(id)?;
            if let Some(init) = init {
                v.visit_stmt(init)?;
            }
            v.visit_expr(cond)?;
            v.visit_block(then)?;
            if let Some(els) = els {
                v.visit_stmt(els)?;
            }
            v.exit_scope(id)?;
        }
        StmtKind::Switch { init, tag, clauses } => {
            v.enter_scope(id)?;
            if let Some(init) = init {
                v.visit_stmt(init)?;
            }
            if let Some(tag) = tag {
                v.visit_expr(tag)?;
            }
            for clause in clauses {
                v.enter_scope(clause.id)?;
                for expr in clause.list.iter_mut().flatten() {
                    v.visit_expr(expr)?;
                }
                v.visit_stmt_list(clause.id, &mut clause.body)?;
                v.exit_scope(clause.id)?;
            }
            v.exit_scope(id)?;
        }
        StmtKind::TypeSwitch {
            init,
            guard,
            clauses,
        } => {
            v.enter_scope(id)?;
            if let Some(init) = init {
                v.visit_stmt(init)?;
            }
            v.visit_stmt(guard)?;
            for clause in clauses {
                v.enter_scope(clause.id)?;
                v.visit_stmt_list(clause.id, &mut clause.body)?;
                v.exit_scope(clause.id)?;
            }
            v.exit_scope(id)?;
        }
        StmtKind::Select { clauses } => {
            for clause in clauses {
                v.enter_scope(clause.id)?;
                if let Some(comm) = &mut clause.comm {
                    v.visit_stmt(comm)?;
                }
                v.visit_stmt_list(clause.id, &mut clause.body)?;
                v.exit_scope(clause.id)?;
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            v.enter_scope(id)?;
            if let Some(init) = init {
                v.visit_stmt(init)?;
            }
            if let Some(cond) = cond {
                v.visit_expr(cond)?;
            }
            if let Some(post) = post {
                v.visit_stmt(post)?;
            }
            v.visit_block(body)?;
            v.exit_scope(id)?;
        }
        StmtKind::Range {
            key,
            value,
            x,
            body,
            ..
        } => {
            v.visit_expr(x)?;
            v.enter_scope(id)?;
            if let Some(key) = key {
                v.visit_expr(key)?;
            }
            if let Some(value) = value {
                v.visit_expr(value)?;
            }
            v.visit_block(body)?;
            v.exit_scope(id)?;
        }
        StmtKind::Labeled { stmt, .. } => v.visit_stmt(stmt)?,
    }
    Ok(())
}

pub fn walk_expr<V: VisitMut + ?Sized>(v: &mut V, expr: &mut Expr) -> NormalizeResult<()> {
    let id = expr.id;
    match &mut expr.kind {
        ExprKind::Ident(_) | ExprKind::Lit(_) | ExprKind::Type(_) => {}
        ExprKind::CompositeLit { elts, .. } => {
            for elt in elts {
                v.visit_expr(elt)?;
            }
        }
        ExprKind::KeyValue { key, value } => {
            v.visit_expr(key)?;
            v.visit_expr(value)?;
        }
        ExprKind::FuncLit { body, .. } => {
            v.enter_scope(id)?;
            v.visit_block(body)?;
            v.exit_scope(id)?;
        }
        ExprKind::Paren(x)
        | ExprKind::Star(x)
        | ExprKind::Selector { x, .. }
        | ExprKind::TypeAssert { x, .. }
        | ExprKind::Unary { x, .. } => v.visit_expr(x)?,
        ExprKind::Index { x, index } => {
            v.visit_expr(x)?;
            v.visit_expr(index)?;
        }
        ExprKind::Slice { x, low, high, max } => {
            v.visit_expr(x)?;
            for part in [low, high, max].into_iter().flatten() {
                v.visit_expr(part)?;
            }
        }
        ExprKind::Call { fun, args, .. } => {
            v.visit_expr(fun)?;
            for arg in args {
                v.visit_expr(arg)?;
            }
        }
        ExprKind::Binary { x, y, .. } => {
            v.visit_expr(x)?;
            v.visit_expr(y)?;
        }
    }
    Ok(())
}
