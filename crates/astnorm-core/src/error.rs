use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::NodeId;

/// Everything a rule pass can report.
///
/// Each variant names the offending node so the caller can point at it; how far
/// the failure reaches is decided by [`NormalizeError::severity`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("node {node}: no type information for {what}")]
    MissingType { node: NodeId, what: &'static str },

    #[error("node {node}: no scope recorded for {what}")]
    MissingScope { node: NodeId, what: &'static str },

    #[error("node {node}: `{name}` has type {ty}, which has no zero-value literal")]
    UnsupportedZeroValue {
        node: NodeId,
        name: String,
        ty: String,
    },

    #[error("node {node}: type {ty} cannot be spelled in this file")]
    UnspellableType { node: NodeId, ty: String },

    #[error("node {node}: cannot tell whether `{name}` is already declared in the current scope")]
    AmbiguousRedeclaration { node: NodeId, name: String },

    #[error("node {node}: {names} names bound to {values} values")]
    MalformedDeclaration {
        node: NodeId,
        names: usize,
        values: usize,
    },

    #[error("node {node}: multi-value declaration outside a function body is left unsplit")]
    TupleDeclaration { node: NodeId },

    #[error("rule `{rule}` still rewriting after {iterations} iterations")]
    NoFixpoint { rule: String, iterations: usize },

    #[error("rule `{rule}` left an invariant broken: {detail}")]
    InvariantViolated { rule: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// The node is left unrewritten, the rule carries on.
    Declaration,
    /// The rule's pass is aborted.
    Pass,
    /// The whole pipeline stops.
    Fatal,
}

impl NormalizeError {
    pub fn severity(&self) -> Severity {
        match self {
            NormalizeError::UnsupportedZeroValue { .. }
            | NormalizeError::UnspellableType { .. }
            | NormalizeError::TupleDeclaration { .. } => Severity::Declaration,
            NormalizeError::MissingType { .. }
            | NormalizeError::MissingScope { .. }
            | NormalizeError::MalformedDeclaration { .. }
            | NormalizeError::NoFixpoint { .. }
            | NormalizeError::InvariantViolated { .. } => Severity::Pass,
            NormalizeError::AmbiguousRedeclaration { .. } | NormalizeError::Config(_) => {
                Severity::Fatal
            }
        }
    }

    /// Node the failure is about, when there is one.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            NormalizeError::MissingType { node, .. }
            | NormalizeError::MissingScope { node, .. }
            | NormalizeError::UnsupportedZeroValue { node, .. }
            | NormalizeError::UnspellableType { node, .. }
            | NormalizeError::AmbiguousRedeclaration { node, .. }
            | NormalizeError::MalformedDeclaration { node, .. }
            | NormalizeError::TupleDeclaration { node } => Some(*node),
            NormalizeError::NoFixpoint { .. }
            | NormalizeError::InvariantViolated { .. }
            | NormalizeError::Config(_) => None,
        }
    }
}

pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// A structured report attached to a node, produced while a rule runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule: String,
    pub node: Option<NodeId>,
    pub severity: Severity,
    pub message: String,
    /// Rendered source of the offending node
    pub snippet: Option<String>,
}

impl Diagnostic {
    pub fn from_error(rule: &str, error: &NormalizeError, snippet: Option<String>) -> Self {
        Self {
            rule: rule.to_string(),
            node: error.node(),
            severity: error.severity(),
            message: error.to_string(),
            snippet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification() {
        let missing = NormalizeError::MissingType {
            node: NodeId(3),
            what: "index operand",
        };
        assert_eq!(missing.severity(), Severity::Pass);

        let zero = NormalizeError::UnsupportedZeroValue {
            node: NodeId(4),
            name: "x".to_string(),
            ty: "T".to_string(),
        };
        assert_eq!(zero.severity(), Severity::Declaration);

        let ambiguous = NormalizeError::AmbiguousRedeclaration {
            node: NodeId(5),
            name: "err".to_string(),
        };
        assert_eq!(ambiguous.severity(), Severity::Fatal);
    }

    #[test]
    fn test_diagnostic_names_node_and_rule() {
        let error = NormalizeError::MissingType {
            node: NodeId(12),
            what: "selector operand",
        };
        let diagnostic = Diagnostic::from_error("explicit-deref", &error, Some("p.x".to_string()));

        assert_eq!(diagnostic.rule, "explicit-deref");
        assert_eq!(diagnostic.node, Some(NodeId(12)));
        assert_eq!(
            diagnostic.message,
            "node #12: no type information for selector operand"
        );
    }
}
