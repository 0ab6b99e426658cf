//! Tree mutation helpers: id allocation, statement splicing, label handling
//! and fresh-id cloning.

use std::mem;

use super::*;
use crate::error::NormalizeResult;
use crate::types::SymbolTable;

/// Allocator for node ids that are not yet used by the tree or the table.
#[derive(Debug, Clone)]
pub struct NodeIds {
    next: u32,
}

impl NodeIds {
    /// Allocator handing out ids strictly greater than `max`.
    pub fn after(max: NodeId) -> Self {
        Self { next: max.0 + 1 }
    }

    pub fn next(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// What a splice callback wants done with one statement.
#[derive(Debug)]
pub enum Splice {
    Keep(Stmt),
    Replace(Vec<Stmt>),
}

/// Rebuild a statement list, letting `f` replace each statement by zero or more
/// statements. Returns how many statements were replaced.
pub fn splice_stmts<F>(stmts: &mut Vec<Stmt>, mut f: F) -> NormalizeResult<usize>
where
    F: FnMut(Stmt) -> NormalizeResult<Splice>,
{
    let original = mem::take(stmts);
    let mut out = Vec::with_capacity(original.len());
    let mut replaced = 0;

    for stmt in original {
        match f(stmt)? {
            Splice::Keep(stmt) => out.push(stmt),
            Splice::Replace(new_stmts) => {
                replaced += 1;
                out.extend(new_stmts);
            }
        }
    }

    *stmts = out;
    Ok(replaced)
}

/// A label peeled off a statement, with the id of its `Labeled` node.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub id: NodeId,
    pub name: String,
}

/// Strip every `Labeled` wrapper, outermost first.
pub fn peel_labels(stmt: Stmt) -> (Vec<Label>, Stmt) {
    let mut labels = Vec::new();
    let mut current = stmt;
    loop {
        match current.kind {
            StmtKind::Labeled { label, stmt } => {
                labels.push(Label {
                    id: current.id,
                    name: label,
                });
                current = *stmt;
            }
            kind => {
                return (
                    labels,
                    Stmt {
                        id: current.id,
                        kind,
                    },
                )
            }
        }
    }
}

/// Inverse of [`peel_labels`].
pub fn wrap_labels(labels: Vec<Label>, stmt: Stmt) -> Stmt {
    labels.into_iter().rev().fold(stmt, |inner, label| Stmt {
        id: label.id,
        kind: StmtKind::Labeled {
            label: label.name,
            stmt: Box::new(inner),
        },
    })
}

/// Put the labels back on the first statement of an expansion.
pub fn attach_labels_to_first(labels: Vec<Label>, mut stmts: Vec<Stmt>) -> Vec<Stmt> {
    if labels.is_empty() || stmts.is_empty() {
        return stmts;
    }
    let first = stmts.remove(0);
    stmts.insert(0, wrap_labels(labels, first));
    stmts
}

/// Temporary stand-in used while an owned child is moved out of its slot.
pub fn placeholder_expr() -> Expr {
    Expr::new(NodeId::default(), ExprKind::Ident(String::new()))
}

pub fn placeholder_stmt() -> Stmt {
    Stmt::new(NodeId::default(), StmtKind::Empty)
}

/// Replace the expression in `slot` by `f(old)`.
pub fn replace_expr<F>(slot: &mut Expr, f: F)
where
    F: FnOnce(Expr) -> Expr,
{
    let old = mem::replace(slot, placeholder_expr());
    *slot = f(old);
}

/// Deep copy of a statement with fresh ids. Every table entry recorded for an
/// original node (type, binding use/def, selection, scope) is copied onto its clone.
pub fn refresh_stmt(stmt: &Stmt, ids: &mut NodeIds, table: &mut SymbolTable) -> Stmt {
    let mut copy = stmt.clone();
    for_each_id_in_stmt(&mut copy, &mut |id| {
        let fresh = ids.next();
        table.copy_node_info(*id, fresh);
        *id = fresh;
    });
    copy
}

/// Largest node id used anywhere in the file.
pub fn max_node_id(file: &mut SourceFile) -> NodeId {
    let mut max = file.id;
    for_each_id_in_file(file, &mut |id| max = max.max(*id));
    max
}

/// Visit every node id in the file, in tree order.
pub fn for_each_id_in_file(file: &mut SourceFile, f: &mut dyn FnMut(&mut NodeId)) {
    f(&mut file.id);
    for decl in &mut file.decls {
        match decl {
            TopDecl::Gen(gen) => ids_in_gen_decl(gen, f),
            TopDecl::Func(func) => {
                f(&mut func.id);
                f(&mut func.name.id);
                if let Some(recv) = &mut func.recv {
                    ids_in_field(recv, f);
                }
                ids_in_func_type(&mut func.sig, f);
                if let Some(body) = &mut func.body {
                    ids_in_block(body, f);
                }
            }
        }
    }
}

pub fn for_each_id_in_stmt(stmt: &mut Stmt, f: &mut dyn FnMut(&mut NodeId)) {
    f(&mut stmt.id);
    match &mut stmt.kind {
        StmtKind::Decl(gen) => ids_in_gen_decl(gen, f),
        StmtKind::Assign { lhs, rhs, .. } => {
            for e in lhs.iter_mut().chain(rhs.iter_mut()) {
                for_each_id_in_expr(e, f);
            }
        }
        StmtKind::Expr(x) | StmtKind::Go(x) | StmtKind::Defer(x) | StmtKind::IncDec { x, .. } => {
            for_each_id_in_expr(x, f)
        }
        StmtKind::Send { chan, value } => {
            for_each_id_in_expr(chan, f);
            for_each_id_in_expr(value, f);
        }
        StmtKind::Return(values) => {
            for e in values {
                for_each_id_in_expr(e, f);
            }
        }
        StmtKind::Branch { .. } | StmtKind::Empty => {}
        StmtKind::Block(block) => ids_in_block(block, f),
        StmtKind::If {
            init,
            cond,
            then,
            els,
        } => {
            if let Some(init) = init {
                for_each_id_in_stmt(init, f);
            }
            for_each_id_in_expr(cond, f);
            ids_in_block(then, f);
            if let Some(els) = els {
                for_each_id_in_stmt(els, f);
            }
        }
        StmtKind::Switch { init, tag, clauses } => {
            if let Some(init) = init {
                for_each_id_in_stmt(init, f);
            }
            if let Some(tag) = tag {
                for_each_id_in_expr(tag, f);
            }
            for clause in clauses {
                f(&mut clause.id);
                for e in clause.list.iter_mut().flatten() {
                    for_each_id_in_expr(e, f);
                }
                for s in &mut clause.body {
                    for_each_id_in_stmt(s, f);
                }
            }
        }
        StmtKind::TypeSwitch {
            init,
            guard,
            clauses,
        } => {
            if let Some(init) = init {
                for_each_id_in_stmt(init, f);
            }
            for_each_id_in_stmt(guard, f);
            for clause in clauses {
                f(&mut clause.id);
                for s in &mut clause.body {
                    for_each_id_in_stmt(s, f);
                }
            }
        }
        StmtKind::Select { clauses } => {
            for clause in clauses {
                f(&mut clause.id);
                if let Some(comm) = &mut clause.comm {
                    for_each_id_in_stmt(comm, f);
                }
                for s in &mut clause.body {
                    for_each_id_in_stmt(s, f);
                }
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                for_each_id_in_stmt(init, f);
            }
            if let Some(cond) = cond {
                for_each_id_in_expr(cond, f);
            }
            if let Some(post) = post {
                for_each_id_in_stmt(post, f);
            }
            ids_in_block(body, f);
        }
        StmtKind::Range {
            key,
            value,
            x,
            body,
            ..
        } => {
            if let Some(key) = key {
                for_each_id_in_expr(key, f);
            }
            if let Some(value) = value {
                for_each_id_in_expr(value, f);
            }
            for_each_id_in_expr(x, f);
            ids_in_block(body, f);
        }
        StmtKind::Labeled { stmt, .. } => for_each_id_in_stmt(stmt, f),
    }
}

pub fn for_each_id_in_expr(expr: &mut Expr, f: &mut dyn FnMut(&mut NodeId)) {
    f(&mut expr.id);
    match &mut expr.kind {
        ExprKind::Ident(_) | ExprKind::Lit(_) | ExprKind::Type(_) => {}
        ExprKind::CompositeLit { elts, .. } => {
            for e in elts {
                for_each_id_in_expr(e, f);
            }
        }
        ExprKind::KeyValue { key, value } => {
            for_each_id_in_expr(key, f);
            for_each_id_in_expr(value, f);
        }
        ExprKind::FuncLit { sig, body } => {
            ids_in_func_type(sig, f);
            ids_in_block(body, f);
        }
        ExprKind::Paren(x)
        | ExprKind::Star(x)
        | ExprKind::Selector { x, .. }
        | ExprKind::TypeAssert { x, .. }
        | ExprKind::Unary { x, .. } => for_each_id_in_expr(x, f),
        ExprKind::Index { x, index } => {
            for_each_id_in_expr(x, f);
            for_each_id_in_expr(index, f);
        }
        ExprKind::Slice { x, low, high, max } => {
            for_each_id_in_expr(x, f);
            for part in [low, high, max].into_iter().flatten() {
                for_each_id_in_expr(part, f);
            }
        }
        ExprKind::Call { fun, args, .. } => {
            for_each_id_in_expr(fun, f);
            for e in args {
                for_each_id_in_expr(e, f);
            }
        }
        ExprKind::Binary { x, y, .. } => {
            for_each_id_in_expr(x, f);
            for_each_id_in_expr(y, f);
        }
    }
}

fn ids_in_block(block: &mut Block, f: &mut dyn FnMut(&mut NodeId)) {
    f(&mut block.id);
    for s in &mut block.stmts {
        for_each_id_in_stmt(s, f);
    }
}

fn ids_in_gen_decl(gen: &mut GenDecl, f: &mut dyn FnMut(&mut NodeId)) {
    f(&mut gen.id);
    for spec in &mut gen.specs {
        match spec {
            Spec::Value(value) => {
                f(&mut value.id);
                for name in &mut value.names {
                    f(&mut name.id);
                }
                for e in &mut value.values {
                    for_each_id_in_expr(e, f);
                }
            }
            Spec::Type(ty) => f(&mut ty.name.id),
        }
    }
}

fn ids_in_func_type(sig: &mut FuncType, f: &mut dyn FnMut(&mut NodeId)) {
    for field in sig.params.iter_mut().chain(sig.results.iter_mut()) {
        ids_in_field(field, f);
    }
}

fn ids_in_field(field: &mut Field, f: &mut dyn FnMut(&mut NodeId)) {
    for name in &mut field.names {
        f(&mut name.id);
    }
}
