//! Helpers shared by the declaration rules.

use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult};
use crate::pipeline::patterns::{AstWalker, PatternMatcher};
use crate::pipeline::RuleContext;
use crate::types::{ScopeId, ScopeStack, SymbolTable, TypeCategory, TypeId};

/// Zero value of `ty` for the variable `name` declared at `node`.
pub(crate) fn zero_value(
    cx: &mut RuleContext<'_>,
    ty: TypeId,
    name: &str,
    node: NodeId,
) -> NormalizeResult<Expr> {
    let ty = cx.table.default_type(ty);
    let literal = match cx.table.category(ty) {
        TypeCategory::Numeric => Literal::Int("0".to_string()),
        TypeCategory::Boolean => Literal::Bool(false),
        TypeCategory::String => Literal::String(String::new()),
        TypeCategory::Nilable => Literal::Nil,
        TypeCategory::Composite => {
            let spelled = cx.spell(ty, node)?;
            return Ok(cx.expr(
                ExprKind::CompositeLit {
                    ty: Some(spelled),
                    elts: Vec::new(),
                },
                Some(ty),
            ));
        }
        TypeCategory::Unsupported => {
            return Err(NormalizeError::UnsupportedZeroValue {
                node,
                name: name.to_string(),
                ty: cx.table.display(ty),
            })
        }
    };
    Ok(cx.expr(ExprKind::Lit(literal), Some(ty)))
}

/// Whether `expr` reads a variable named like one of `names` that is visible
/// from `scope`, so declaring `names` there first would capture the read.
/// Names bound inside `expr` itself (function literal parameters and locals)
/// do not count; identifiers without a binding count by name alone.
pub(crate) fn mentions_any<'n, I>(
    table: &SymbolTable,
    scope: Option<ScopeId>,
    expr: &Expr,
    names: I,
) -> bool
where
    I: IntoIterator<Item = &'n str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    if names.is_empty() {
        return false;
    }
    let captured = PatternMatcher::node_type(|node| {
        let Some(name) = node.as_expr().and_then(Expr::as_ident) else {
            return false;
        };
        if !names.contains(&name) {
            return false;
        }
        let declared_in = node
            .as_expr()
            .and_then(|ident| table.binding_of(ident.id))
            .and_then(|binding| table.binding(binding))
            .map(|binding| binding.scope);
        match (scope, declared_in) {
            (Some(scope), Some(declared_in)) => table.is_within(scope, declared_in),
            _ => true,
        }
    });
    AstWalker::contains(expr, &captured)
}

/// Innermost scope of a walk, which must sit inside a statement list.
pub(crate) fn current_scope(scopes: &ScopeStack, node: NodeId) -> NormalizeResult<ScopeId> {
    scopes.current().ok_or(NormalizeError::MissingScope {
        node,
        what: "enclosing statement list",
    })
}

/// Short rendering of a spec for diagnostics: `var a, b`.
pub(crate) fn spec_snippet(spec: &ValueSpec) -> String {
    let names: Vec<&str> = spec.names.iter().map(|n| n.name.as_str()).collect();
    format!("var {}", names.join(", "))
}
