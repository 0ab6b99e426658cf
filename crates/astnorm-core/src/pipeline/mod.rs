/*!
# Rule Pipeline

Drives the rule units over a file in a dependency-respecting order.

## Architecture

- `NormalizationRule`: trait implemented by every rule unit
- `Pipeline`: ordered list of rule objects plus the configuration they run under
- `RuleContext`: the table handle, id allocator and diagnostics sink a rule
  works through
- Pattern matching utilities for read-only checks

## Example Usage

```rust,ignore
use astnorm_core::pipeline::{Pipeline, PipelineConfig};

let config = PipelineConfig {
    disabled: vec!["explicit-discard".to_string()],
    ..Default::default()
};
let pipeline = Pipeline::with_config(config)?;
let report = pipeline.run(&mut file, &mut table)?;
```
*/

pub mod driver;
pub mod patterns;
pub mod rules;

pub use driver::Pipeline;
pub use patterns::{AstPattern, AstWalker, NodeRef, PatternMatcher};
pub use rules::{NormalizationRule, RuleStats};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ast::*;
use crate::error::{Diagnostic, NormalizeError, NormalizeResult, Severity};
use crate::types::{BindingId, FileInfo, ScopeId, SymbolTable, TypeId};

/// Which rules run, in what order, and how failures are handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rule names to skip
    pub disabled: Vec<String>,
    /// Explicit rule order; rules missing from the list do not run
    pub order: Option<Vec<String>>,
    /// Check each rule's post-condition after its pass
    pub verify: bool,
    /// Restore the tree after a failed pass and keep going with the rules
    /// that do not depend on it
    pub continue_on_pass_failure: bool,
    /// Prefix for synthetic temporaries
    pub temp_prefix: String,
    /// Bound on repeated passes of fixpoint rules
    pub max_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            order: None,
            verify: false,
            continue_on_pass_failure: false,
            temp_prefix: "tmp".to_string(),
            max_iterations: 10,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> NormalizeResult<Self> {
        serde_json::from_str(text).map_err(|e| NormalizeError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> NormalizeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NormalizeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }
}

/// Everything a rule pass works through: the table, the id allocator, and a
/// sink for declaration-local diagnostics.
pub struct RuleContext<'a> {
    pub table: &'a mut SymbolTable,
    pub ids: &'a mut NodeIds,
    pub config: &'a PipelineConfig,
    pub file: FileInfo,
    rule: &'static str,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        rule: &'static str,
        table: &'a mut SymbolTable,
        ids: &'a mut NodeIds,
        config: &'a PipelineConfig,
        file: FileInfo,
    ) -> Self {
        Self {
            table,
            ids,
            config,
            file,
            rule,
            diagnostics: Vec::new(),
        }
    }

    pub fn rule(&self) -> &'static str {
        self.rule
    }

    pub fn next_id(&mut self) -> NodeId {
        self.ids.next()
    }

    /// New expression node, with its type recorded when known.
    pub fn expr(&mut self, kind: ExprKind, ty: Option<TypeId>) -> Expr {
        let id = self.ids.next();
        if let Some(ty) = ty {
            self.table.record_type(id, ty);
        }
        Expr::new(id, kind)
    }

    pub fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt::new(self.ids.next(), kind)
    }

    /// New block owning `scope`.
    pub fn block(&mut self, stmts: Vec<Stmt>, scope: Option<ScopeId>) -> Block {
        let id = self.ids.next();
        if let Some(scope) = scope {
            self.table.attach_scope(id, scope);
        }
        Block::new(id, stmts)
    }

    /// Identifier expression referring to `binding`.
    pub fn use_binding(&mut self, binding: BindingId) -> Expr {
        let (name, ty) = match self.table.binding(binding) {
            Some(b) => (b.name.clone(), b.ty),
            None => (String::new(), None),
        };
        let expr = self.expr(ExprKind::Ident(name), ty);
        self.table.record_use(expr.id, binding);
        expr
    }

    /// Register a synthetic variable of type `ty` in `scope`.
    pub fn declare_temp(&mut self, scope: ScopeId, ty: TypeId) -> BindingId {
        let name = self.table.fresh_name(&self.config.temp_prefix);
        self.table.declare_synthetic(scope, &name, ty)
    }

    /// `var name T = value` declaring `binding`.
    pub fn var_stmt(&mut self, binding: BindingId, ty: TypeExpr, value: Expr) -> Stmt {
        let name = self
            .table
            .binding(binding)
            .map(|b| b.name.clone())
            .unwrap_or_default();
        let ident = Ident::new(self.ids.next(), name);
        self.table.record_def(ident.id, binding);
        self.var_decl(ident, Some(ty), vec![value])
    }

    /// Single-spec `var` declaration statement.
    pub fn var_decl(&mut self, name: Ident, ty: Option<TypeExpr>, values: Vec<Expr>) -> Stmt {
        let spec = ValueSpec {
            id: self.ids.next(),
            names: vec![name],
            ty,
            values,
        };
        let decl = GenDecl {
            id: self.ids.next(),
            kind: DeclKind::Var,
            specs: vec![Spec::Value(spec)],
        };
        self.stmt(StmtKind::Decl(decl))
    }

    pub fn spell(&self, ty: TypeId, node: NodeId) -> NormalizeResult<TypeExpr> {
        self.table.type_expr(ty, &self.file, node)
    }

    /// Record a diagnostic for an error that does not stop the pass.
    pub fn report(&mut self, error: &NormalizeError, snippet: Option<String>) {
        warn!(rule = self.rule, "{}", error);
        self.diagnostics
            .push(Diagnostic::from_error(self.rule, error, snippet));
    }

    /// Keep going after a declaration-local error; propagate anything wider.
    pub fn tolerate(&mut self, error: NormalizeError, snippet: Option<String>) -> NormalizeResult<()> {
        if error.severity() == Severity::Declaration {
            self.report(&error, snippet);
            Ok(())
        } else {
            Err(error)
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// How a rule's pass ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    Applied,
    Failed { error: String },
    /// A prerequisite failed earlier in the run
    Skipped { prerequisite: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub rule: String,
    pub outcome: PassOutcome,
    pub stats: RuleStats,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub passes: Vec<PassReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineReport {
    pub fn rewrites(&self) -> u64 {
        self.passes.iter().map(|p| p.stats.transformations).sum()
    }

    /// Whether any pass rewrote anything.
    pub fn changed(&self) -> bool {
        self.rewrites() > 0
    }

    pub fn failed(&self) -> impl Iterator<Item = &PassReport> {
        self.passes
            .iter()
            .filter(|p| matches!(p.outcome, PassOutcome::Failed { .. }))
    }

    pub fn pass(&self, rule: &str) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.rule == rule)
    }

    pub fn success(&self) -> bool {
        self.passes
            .iter()
            .all(|p| matches!(p.outcome, PassOutcome::Applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config = PipelineConfig::from_json(r#"{ "disabled": ["switch-tag"], "verify": true }"#)
            .unwrap();
        assert_eq!(config.disabled, vec!["switch-tag".to_string()]);
        assert!(config.verify);
        assert_eq!(config.temp_prefix, "tmp");
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn test_bad_config_is_a_config_error() {
        let error = PipelineConfig::from_json("{ \"verify\": 3 }").unwrap_err();
        assert!(matches!(error, NormalizeError::Config(_)));
        assert_eq!(error.severity(), Severity::Fatal);
    }

    #[test]
    fn test_tolerate_reports_declaration_errors_only() {
        let mut table = SymbolTable::new();
        let mut ids = NodeIds::after(NodeId(10));
        let config = PipelineConfig::default();
        let mut cx = RuleContext::new(
            "zero-value",
            &mut table,
            &mut ids,
            &config,
            FileInfo::default(),
        );

        let local = NormalizeError::UnsupportedZeroValue {
            node: NodeId(3),
            name: "v".to_string(),
            ty: "T".to_string(),
        };
        assert!(cx.tolerate(local, None).is_ok());

        let wide = NormalizeError::MissingType {
            node: NodeId(4),
            what: "initializer",
        };
        assert!(cx.tolerate(wide, None).is_err());

        let diagnostics = cx.into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, "zero-value");
        assert_eq!(diagnostics[0].node, Some(NodeId(3)));
    }
}
