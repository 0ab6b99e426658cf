//! Post-conditions of a full normalization run, checked over a tree and its table.

use std::fmt;

use serde::Serialize;

use crate::ast::*;
use crate::pipeline::patterns::{AstPattern, AstWalker, NodeRef, PatternMatcher};
use crate::types::{Selection, SymbolTable, Type};

/// A property every normalized tree has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Invariant {
    /// Index, slice and field selectors never dereference a pointer implicitly
    ExplicitDeref,
    /// Every `var` spec binds one name
    SingleNameDecl,
    /// Every `var` spec has an explicit type
    TypedDecl,
    /// Every `var` spec has an initializer
    InitializedDecl,
    /// No `:=` remains in statement lists
    NoShortDecl,
    /// Multi-target assignments only take a single multi-value right-hand side
    SingleTargetAssign,
    /// `if`/`switch` carry no initializer
    NoControlInit,
    /// Loops have at most a condition
    NoThreeClauseLoop,
    /// Expression switches have a tag
    TaggedSwitch,
    /// Expression statements produce no value
    ExplicitDiscard,
}

impl Invariant {
    pub const ALL: [Invariant; 10] = [
        Invariant::ExplicitDeref,
        Invariant::SingleNameDecl,
        Invariant::TypedDecl,
        Invariant::InitializedDecl,
        Invariant::NoShortDecl,
        Invariant::SingleTargetAssign,
        Invariant::NoControlInit,
        Invariant::NoThreeClauseLoop,
        Invariant::TaggedSwitch,
        Invariant::ExplicitDiscard,
    ];
}

/// A node breaking an invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub invariant: Invariant,
    pub node: NodeId,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at node {}: {}", self.invariant, self.node, self.detail)
    }
}

/// Every violation of every invariant.
pub fn check(file: &SourceFile, table: &SymbolTable) -> Vec<Violation> {
    check_only(file, table, &Invariant::ALL)
}

/// Violations of the listed invariants, in tree order per invariant.
pub fn check_only(file: &SourceFile, table: &SymbolTable, which: &[Invariant]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for invariant in which {
        match invariant {
            Invariant::ExplicitDeref => {
                let implicit = PatternMatcher::node_type(|node| implicit_deref(node, table));
                report(&mut violations, file, *invariant, &implicit, |node| {
                    format!("implicit dereference in `{}`", render(node))
                });
            }
            Invariant::SingleNameDecl | Invariant::TypedDecl | Invariant::InitializedDecl => {
                check_var_specs(&mut violations, file, *invariant);
            }
            Invariant::NoShortDecl => {
                report(&mut violations, file, *invariant, &PatternMatcher::short_decl(), |node| {
                    format!("short declaration `{}`", render(node))
                });
            }
            Invariant::SingleTargetAssign => {
                let parallel = PatternMatcher::node_type(|node| {
                    node.as_stmt().map_or(false, |stmt| {
                        matches!(&stmt.kind, StmtKind::Assign { lhs, rhs, .. }
                            if lhs.len() > 1 && rhs.len() != 1)
                    })
                });
                report(&mut violations, file, *invariant, &parallel, |node| {
                    format!("parallel assignment `{}`", render(node))
                });
            }
            Invariant::NoControlInit => {
                report(
                    &mut violations,
                    file,
                    *invariant,
                    &PatternMatcher::control_with_init(),
                    |_| "control statement with initializer".to_string(),
                );
            }
            Invariant::NoThreeClauseLoop => {
                report(
                    &mut violations,
                    file,
                    *invariant,
                    &PatternMatcher::three_clause_loop(),
                    |_| "loop with init or post statement".to_string(),
                );
            }
            Invariant::TaggedSwitch => {
                report(
                    &mut violations,
                    file,
                    *invariant,
                    &PatternMatcher::tagless_switch(),
                    |_| "switch without tag".to_string(),
                );
            }
            Invariant::ExplicitDiscard => {
                let discarding = PatternMatcher::node_type(|node| discards_value(node, table));
                report(&mut violations, file, *invariant, &discarding, |node| {
                    format!("discarded value in `{}`", render(node))
                });
            }
        }
    }
    violations
}

fn report<P: AstPattern>(
    violations: &mut Vec<Violation>,
    file: &SourceFile,
    invariant: Invariant,
    pattern: &P,
    detail: impl Fn(NodeRef<'_>) -> String,
) {
    for node in AstWalker::find_all(file, pattern) {
        violations.push(Violation {
            invariant,
            node: node.id(),
            detail: detail(node),
        });
    }
}

fn render(node: NodeRef<'_>) -> String {
    match node {
        NodeRef::Stmt(stmt) | NodeRef::Header(stmt) => stmt.to_source(),
        NodeRef::Expr(expr) => expr.to_source(),
        NodeRef::Decl { decl, .. } => decl.to_source(),
        _ => String::new(),
    }
}

fn implicit_deref(node: NodeRef<'_>, table: &SymbolTable) -> bool {
    let Some(expr) = node.as_expr() else {
        return false;
    };
    let operand_type = |x: &Expr| table.type_of(x.id);
    match &expr.kind {
        ExprKind::Index { x, .. } | ExprKind::Slice { x, .. } => {
            operand_type(x).map_or(false, |ty| table.is_pointer_to_array(ty))
        }
        ExprKind::Selector { x, sel } => {
            table.selection(expr.id) == Some(Selection::Field)
                && operand_type(x).map_or(false, |ty| table.implicit_field_deref(ty, sel))
        }
        _ => false,
    }
}

fn discards_value(node: NodeRef<'_>, table: &SymbolTable) -> bool {
    let NodeRef::Stmt(stmt) = node else {
        return false;
    };
    let StmtKind::Expr(expr) = &stmt.kind else {
        return false;
    };
    match table.type_of(expr.id) {
        Some(ty) => !matches!(table.ty(ty), Type::Tuple(members) if members.is_empty()),
        None => true,
    }
}

fn check_var_specs(violations: &mut Vec<Violation>, file: &SourceFile, invariant: Invariant) {
    let var_decls = PatternMatcher::node_type(|node| {
        matches!(node, NodeRef::Decl { decl, .. } if decl.is_var())
    });
    for node in AstWalker::find_all(file, &var_decls) {
        let NodeRef::Decl { decl, .. } = node else {
            continue;
        };
        for spec in decl.value_specs() {
            let detail = match invariant {
                Invariant::SingleNameDecl if spec.names.len() != 1 => "declares several names",
                Invariant::TypedDecl if spec.ty.is_none() => "has no explicit type",
                Invariant::InitializedDecl if spec.values.is_empty() => "has no initializer",
                _ => continue,
            };
            violations.push(Violation {
                invariant,
                node: spec.id,
                detail: format!("`{}` {}", decl.to_source(), detail),
            });
        }
    }
}
