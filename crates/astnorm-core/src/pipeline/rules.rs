/*!
# Normalization Rules

Core trait implemented by every rule unit, and per-rule statistics.
*/

use serde::Serialize;

use super::RuleContext;
use crate::ast::{NodeId, SourceFile};
use crate::error::{Diagnostic, NormalizeError, NormalizeResult};
use crate::invariants::{self, Invariant};
use crate::types::SymbolTable;

/// Core trait for normalization rules
///
/// A rule rewrites the whole file in one pass and reports how many rewrites it
/// made. Prerequisites are declared by name so the pipeline can check the
/// configured order before running anything.
pub trait NormalizationRule: Send + Sync {
    /// Stable name used in configuration and reports
    fn name(&self) -> &'static str;

    /// Detailed description of what this rule does
    fn description(&self) -> &'static str;

    /// Rules that must run before this one when they are enabled
    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the pass repeats until it stops rewriting
    fn fixpoint(&self) -> bool {
        false
    }

    /// Invariants that hold after this rule's pass
    fn establishes(&self) -> &'static [Invariant] {
        &[]
    }

    /// Rewrite the file, returning the number of rewrites
    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize>;

    /// Check the rule's post-condition. Nodes the pass reported as left
    /// unrewritten are exempt.
    fn validate(
        &self,
        file: &SourceFile,
        table: &SymbolTable,
        diagnostics: &[Diagnostic],
    ) -> NormalizeResult<()> {
        let exempt: Vec<NodeId> = diagnostics.iter().filter_map(|d| d.node).collect();
        let violations: Vec<_> = invariants::check_only(file, table, self.establishes())
            .into_iter()
            .filter(|v| !exempt.contains(&v.node))
            .collect();
        match violations.first() {
            None => Ok(()),
            Some(first) => Err(NormalizeError::InvariantViolated {
                rule: self.name().to_string(),
                detail: format!("{} ({} in total)", first, violations.len()),
            }),
        }
    }
}

/// Rule execution statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RuleStats {
    pub rule_name: String,
    /// Passes over the file, counting fixpoint iterations
    pub applications: u64,
    pub transformations: u64,
    pub errors: u64,
    pub total_time_ms: u64,
}

impl RuleStats {
    pub fn new(rule_name: String) -> Self {
        Self {
            rule_name,
            applications: 0,
            transformations: 0,
            errors: 0,
            total_time_ms: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        let attempts = self.transformations + self.errors;
        if attempts == 0 {
            1.0
        } else {
            (self.transformations as f64) / (attempts as f64)
        }
    }

    pub fn average_time_ms(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.total_time_ms as f64) / (self.applications as f64)
        }
    }
}
