/*!
# Parallel Assignment Splitter

Turns `a, b = x, y` into one assignment per target. Go evaluates every
right-hand side and every index or pointer operand on the left before it
assigns anything, so the split is only done directly when no assignment can
change what a later one reads:

```text
a, b = 1, 2         =>      a = 1
                            b = 2

x, y = y, x         =>      {
                                var tmp int = y
                                var tmp1 int = x
                                x = tmp
                                y = tmp1
                            }
```

Otherwise the statement becomes a block with its own scope that first pins
down the left-hand locations (`var tmp *T = &a[i]`, or the map and key for
`m[k]`), then evaluates every right-hand side into a temporary in order, and
finally assigns. Literals need no temporary. Calls are assumed to read and
write anything, and a read through a pointer, slice, map or field is assumed
to see any variable written before it.
*/

use crate::ast::edit::{attach_labels_to_first, peel_labels, splice_stmts, wrap_labels, Splice};
use crate::ast::visit::{walk_stmt_list, VisitMut};
use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult, Severity};
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::rules::common::current_scope;
use crate::types::{
    BindingId, BindingKind, ScopeId, ScopeStack, Selection, SymbolTable, Type, TypeId,
};
use tracing::debug;

/// Builtins that neither read nor write memory beyond their arguments.
const PURE_BUILTINS: &[&str] = &["len", "cap", "new", "make", "complex", "real", "imag", "min", "max"];

pub struct ParallelAssignSplitter;

impl ParallelAssignSplitter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ParallelAssignSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for ParallelAssignSplitter {
    fn name(&self) -> &'static str {
        "parallel-assign"
    }

    fn description(&self) -> &'static str {
        "Splits multi-target assignments into single assignments, through temporaries when needed"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["short-decl", "for-loop"]
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::SingleTargetAssign]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = ParallelVisitor {
            cx,
            scopes: ScopeStack::new(),
            rewrites: 0,
        };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

fn is_parallel(stmt: &Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::Assign { lhs, op: AssignOp::Assign, rhs }
        if lhs.len() > 1 && lhs.len() == rhs.len())
}

struct ParallelVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    scopes: ScopeStack,
    rewrites: usize,
}

impl VisitMut for ParallelVisitor<'_, '_> {
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

        let mut splitter = Splitter {
            cx: &mut *self.cx,
            scope: current_scope(&self.scopes, owner),
        };
        self.rewrites += splice_stmts(stmts, |stmt| {
            if !is_parallel(stmt.unlabeled()) {
                return Ok(Splice::Keep(stmt));
            }
            let original = stmt.clone();
            let (labels, stmt) = peel_labels(stmt);
            let (lhs, rhs) = match stmt.kind {
                StmtKind::Assign { lhs, rhs, .. } => (lhs, rhs),
                kind => return Ok(Splice::Keep(wrap_labels(labels, Stmt::new(stmt.id, kind)))),
            };
            let result = if hazardous(&*splitter.cx.table, &lhs, &rhs) {
                debug!(node = %stmt.id, targets = lhs.len(), "operands overlap, capturing");
                splitter
                    .sequence(stmt.id, lhs, rhs)
                    .map(|block| vec![wrap_labels(labels, block)])
            } else {
                let out = splitter.direct(lhs, rhs);
                Ok(attach_labels_to_first(labels, out))
            };
            match result {
                Ok(out) => Ok(Splice::Replace(out)),
                Err(error) if error.severity() == Severity::Declaration => {
                    let snippet = original.to_source();
                    splitter.cx.tolerate(error, Some(snippet))?;
                    Ok(Splice::Keep(original))
                }
                Err(error) => Err(error),
            }
        })?;
        Ok(())
    }
}

/// A storage location an expression may read or an assignment may write.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Loc {
    Binding(BindingId),
    /// Unresolved identifier
    Name(String),
    /// Anything reached through a pointer, slice, map or package
    Memory,
}

#[derive(Debug, Default)]
struct Effects {
    reads: Vec<Loc>,
    calls: bool,
}

impl Effects {
    fn of(table: &SymbolTable, expr: &Expr) -> Self {
        let mut effects = Self::default();
        effects.add(table, expr);
        effects
    }

    /// Reads done to locate a target, not counting the target itself.
    fn of_target(table: &SymbolTable, target: &Expr) -> Self {
        let mut effects = Self::default();
        match &target.unparen().kind {
            ExprKind::Ident(_) => {}
            ExprKind::Index { x, index } => {
                effects.add(table, x);
                effects.add(table, index);
            }
            ExprKind::Star(x) | ExprKind::Selector { x, .. } => effects.add(table, x),
            _ => effects.add(table, target),
        }
        effects
    }

    fn merge(&mut self, other: Effects) {
        self.reads.extend(other.reads);
        self.calls |= other.calls;
    }

    fn add(&mut self, table: &SymbolTable, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if name != "_" {
                    self.reads.push(variable(table, expr.id, name));
                }
            }
            ExprKind::Lit(_) | ExprKind::Type(_) | ExprKind::FuncLit { .. } => {}
            ExprKind::CompositeLit { elts, .. } => {
                for elt in elts {
                    self.add(table, elt);
                }
            }
            ExprKind::KeyValue { key, value } => {
                self.add(table, key);
                self.add(table, value);
            }
            ExprKind::Paren(x) | ExprKind::TypeAssert { x, .. } | ExprKind::Unary { x, .. } => {
                self.add(table, x)
            }
            ExprKind::Selector { x, .. } => {
                if table.selection(expr.id) != Some(Selection::Method) {
                    self.reads.push(Loc::Memory);
                }
                if !is_package(table, x) {
                    self.add(table, x);
                }
            }
            ExprKind::Index { x, index } => {
                self.reads.push(Loc::Memory);
                self.add(table, x);
                self.add(table, index);
            }
            ExprKind::Slice { x, low, high, max } => {
                self.reads.push(Loc::Memory);
                self.add(table, x);
                for bound in [low, high, max].into_iter().flatten() {
                    self.add(table, bound);
                }
            }
            ExprKind::Star(x) => {
                self.reads.push(Loc::Memory);
                self.add(table, x);
            }
            ExprKind::Call { fun, args, .. } => {
                if !is_pure_callee(table, fun) {
                    self.calls = true;
                    self.add(table, fun);
                }
                for arg in args {
                    self.add(table, arg);
                }
            }
            ExprKind::Binary { x, y, .. } => {
                self.add(table, x);
                self.add(table, y);
            }
        }
    }
}

fn variable(table: &SymbolTable, node: NodeId, name: &str) -> Loc {
    match table.binding_of(node) {
        Some(binding) => Loc::Binding(binding),
        None => Loc::Name(name.to_string()),
    }
}

fn binding_kind(table: &SymbolTable, expr: &Expr) -> Option<BindingKind> {
    table
        .binding_of(expr.id)
        .and_then(|b| table.binding(b))
        .map(|b| b.kind)
}

fn is_package(table: &SymbolTable, expr: &Expr) -> bool {
    binding_kind(table, expr) == Some(BindingKind::Package)
}

/// Conversions and the side-effect-free builtins.
fn is_pure_callee(table: &SymbolTable, fun: &Expr) -> bool {
    let fun = fun.unparen();
    match &fun.kind {
        ExprKind::Type(_) => true,
        ExprKind::Ident(name) => match binding_kind(table, fun) {
            Some(BindingKind::TypeName) => true,
            Some(BindingKind::Builtin) => PURE_BUILTINS.contains(&name.as_str()),
            _ => false,
        },
        _ => false,
    }
}

/// Location an assignment to `target` writes; `None` for `_`.
fn written(table: &SymbolTable, target: &Expr) -> Option<Loc> {
    let target = target.unparen();
    match &target.kind {
        ExprKind::Ident(name) if name == "_" => None,
        ExprKind::Ident(name) => Some(variable(table, target.id, name)),
        _ => Some(Loc::Memory),
    }
}

/// Whether assigning in order could change a value a later assignment
/// evaluates.
fn hazardous(table: &SymbolTable, lhs: &[Expr], rhs: &[Expr]) -> bool {
    let sources: Vec<Effects> = rhs.iter().map(|s| Effects::of(table, s)).collect();
    for (i, target) in lhs.iter().enumerate() {
        let mut later = Effects::default();
        for k in i + 1..lhs.len() {
            later.merge(Effects::of(table, &rhs[k]));
            later.merge(Effects::of_target(table, &lhs[k]));
        }
        // A variable may be aliased by any pointer, so a read through memory
        // can observe the write as well.
        let clobbers = match written(table, target) {
            None => false,
            Some(Loc::Memory) => later.calls || !later.reads.is_empty(),
            Some(loc) => {
                later.calls || later.reads.iter().any(|read| *read == loc || *read == Loc::Memory)
            }
        };
        let later_targets_read = lhs[i + 1..]
            .iter()
            .any(|t| !Effects::of_target(table, t).reads.is_empty());
        if clobbers || (sources[i].calls && later_targets_read) {
            return true;
        }
    }
    false
}

fn map_key(table: &SymbolTable, ty: TypeId) -> Option<TypeId> {
    match table.ty(table.underlying(ty)) {
        Type::Map { key, .. } => Some(*key),
        _ => None,
    }
}

struct Splitter<'t, 'a> {
    cx: &'t mut RuleContext<'a>,
    scope: NormalizeResult<ScopeId>,
}

impl Splitter<'_, '_> {
    fn assign(&mut self, target: Expr, value: Expr) -> Stmt {
        self.cx.stmt(StmtKind::Assign {
            lhs: vec![target],
            op: AssignOp::Assign,
            rhs: vec![value],
        })
    }

    fn direct(&mut self, lhs: Vec<Expr>, rhs: Vec<Expr>) -> Vec<Stmt> {
        lhs.into_iter()
            .zip(rhs)
            .map(|(target, value)| self.assign(target, value))
            .collect()
    }

    fn sequence(&mut self, node: NodeId, lhs: Vec<Expr>, rhs: Vec<Expr>) -> NormalizeResult<Stmt> {
        let parent = self.scope.clone()?;
        let scope = self.cx.table.new_scope(parent);
        let mut stmts = Vec::new();

        let mut targets = Vec::with_capacity(lhs.len());
        for target in lhs {
            targets.push(self.pin(scope, target, &mut stmts)?);
        }

        let mut finals = Vec::with_capacity(targets.len());
        for (target, source) in targets.into_iter().zip(rhs) {
            if target.is_blank() {
                stmts.push(self.assign(target, source));
                continue;
            }
            let value = if matches!(source.kind, ExprKind::Lit(_)) {
                source
            } else {
                let ty = self.cx.table.type_of(target.id).ok_or(NormalizeError::MissingType {
                    node: target.id,
                    what: "assignment target",
                })?;
                let spelled = self.cx.spell(ty, node)?;
                self.hold(scope, ty, spelled, source, &mut stmts)
            };
            finals.push(self.assign(target, value));
        }
        stmts.extend(finals);

        let block = self.cx.block(stmts, Some(scope));
        Ok(self.cx.stmt(StmtKind::Block(block)))
    }

    /// `var tmp T = value`, returning a read of `tmp`.
    fn hold(
        &mut self,
        scope: ScopeId,
        ty: TypeId,
        spelled: TypeExpr,
        value: Expr,
        stmts: &mut Vec<Stmt>,
    ) -> Expr {
        let temp = self.cx.declare_temp(scope, ty);
        stmts.push(self.cx.var_stmt(temp, spelled, value));
        self.cx.use_binding(temp)
    }

    fn hold_typed(
        &mut self,
        scope: ScopeId,
        value: Expr,
        stmts: &mut Vec<Stmt>,
    ) -> NormalizeResult<Expr> {
        let ty = self.cx.table.type_of(value.id).ok_or(NormalizeError::MissingType {
            node: value.id,
            what: "assignment operand",
        })?;
        let ty = self.cx.table.default_type(ty);
        let spelled = self.cx.spell(ty, value.id)?;
        Ok(self.hold(scope, ty, spelled, value, stmts))
    }

    /// Evaluate the operands of a target once, up front. Plain variables need
    /// nothing; map entries keep the map and key; everything else goes
    /// through its address.
    fn pin(&mut self, scope: ScopeId, target: Expr, stmts: &mut Vec<Stmt>) -> NormalizeResult<Expr> {
        let ty = self.cx.table.type_of(target.id);
        let is_map_entry = match &target.kind {
            ExprKind::Index { x, .. } => self
                .cx
                .table
                .type_of(x.id)
                .map_or(false, |t| self.cx.table.is_map(t)),
            _ => false,
        };
        match target.kind {
            ExprKind::Ident(name) => Ok(Expr::new(target.id, ExprKind::Ident(name))),
            ExprKind::Paren(inner) => self.pin(scope, *inner, stmts),
            ExprKind::Index { x, index } if is_map_entry => {
                let key_ty = self
                    .cx
                    .table
                    .type_of(x.id)
                    .and_then(|t| map_key(self.cx.table, t))
                    .ok_or(NormalizeError::MissingType {
                        node: x.id,
                        what: "map operand",
                    })?;
                let map = self.hold_typed(scope, *x, stmts)?;
                let key_spelled = self.cx.spell(key_ty, index.id)?;
                let key = self.hold(scope, key_ty, key_spelled, *index, stmts);
                Ok(self.cx.expr(
                    ExprKind::Index {
                        x: Box::new(map),
                        index: Box::new(key),
                    },
                    ty,
                ))
            }
            ExprKind::Star(x) => {
                let pointer = self.hold_typed(scope, *x, stmts)?;
                Ok(self.cx.expr(ExprKind::Star(Box::new(pointer)), ty))
            }
            kind => {
                let elem = ty.ok_or(NormalizeError::MissingType {
                    node: target.id,
                    what: "assignment target",
                })?;
                let pointer_ty = self.cx.table.intern(Type::Pointer(elem));
                let place = Expr::new(target.id, kind);
                let address = self.cx.expr(
                    ExprKind::Unary {
                        op: UnaryOp::Addr,
                        x: Box::new(place),
                    },
                    Some(pointer_ty),
                );
                let spelled = self.cx.spell(pointer_ty, target.id)?;
                let pointer = self.hold(scope, pointer_ty, spelled, address, stmts);
                Ok(self.cx.expr(ExprKind::Star(Box::new(pointer)), ty))
            }
        }
    }
}
