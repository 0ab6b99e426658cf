/*!
# Pipeline Driver

Runs the configured rule objects over one file and its symbol table.
*/

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use super::patterns::{AstWalker, NodeRef};
use super::rules::{NormalizationRule, RuleStats};
use super::{PassOutcome, PassReport, PipelineConfig, PipelineReport, RuleContext};
use crate::ast::edit::max_node_id;
use crate::ast::{NodeIds, SourceFile, Spec, Stmt, StmtKind, ToSource};
use crate::error::{Diagnostic, NormalizeError, NormalizeResult, Severity};
use crate::rules;
use crate::types::{FileInfo, SymbolTable};

/// Ordered rule passes over a file
pub struct Pipeline {
    rules: Vec<Box<dyn NormalizationRule>>,
    config: PipelineConfig,
}

impl Pipeline {
    /// All rules in the default order, default configuration.
    pub fn new() -> Self {
        Self {
            rules: rules::default_rules(),
            config: PipelineConfig::default(),
        }
    }

    /// Default rules, selected and ordered by `config`.
    pub fn with_config(config: PipelineConfig) -> NormalizeResult<Self> {
        Self::from_rules(rules::default_rules(), config)
    }

    /// Select and order `available` according to `config`, then check that
    /// every enabled rule runs after its enabled prerequisites.
    pub fn from_rules(
        available: Vec<Box<dyn NormalizationRule>>,
        config: PipelineConfig,
    ) -> NormalizeResult<Self> {
        let known: Vec<&'static str> = available.iter().map(|r| r.name()).collect();
        for name in config.disabled.iter().chain(config.order.iter().flatten()) {
            if !known.contains(&name.as_str()) {
                return Err(NormalizeError::Config(format!("unknown rule `{}`", name)));
            }
        }

        let mut slots: Vec<Option<Box<dyn NormalizationRule>>> =
            available.into_iter().map(Some).collect();
        let ordered: Vec<Box<dyn NormalizationRule>> = match &config.order {
            None => slots.into_iter().flatten().collect(),
            Some(order) => {
                let mut ordered = Vec::with_capacity(order.len());
                for name in order {
                    let index = known
                        .iter()
                        .position(|k| *k == name.as_str())
                        .ok_or_else(|| NormalizeError::Config(format!("unknown rule `{}`", name)))?;
                    let rule = slots[index].take().ok_or_else(|| {
                        NormalizeError::Config(format!("rule `{}` listed twice", name))
                    })?;
                    ordered.push(rule);
                }
                ordered
            }
        };

        let rules: Vec<Box<dyn NormalizationRule>> = ordered
            .into_iter()
            .filter(|rule| !config.disabled.iter().any(|d| d == rule.name()))
            .collect();

        for (position, rule) in rules.iter().enumerate() {
            for prerequisite in rule.requires() {
                if !known.contains(prerequisite) {
                    return Err(NormalizeError::Config(format!(
                        "rule `{}` requires unknown rule `{}`",
                        rule.name(),
                        prerequisite
                    )));
                }
                let runs_at = rules.iter().position(|r| r.name() == *prerequisite);
                if matches!(runs_at, Some(at) if at > position) {
                    return Err(NormalizeError::Config(format!(
                        "rule `{}` must run after `{}`",
                        rule.name(),
                        prerequisite
                    )));
                }
            }
        }

        Ok(Self { rules, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Enabled rules in run order.
    pub fn rules(&self) -> impl Iterator<Item = &dyn NormalizationRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// Normalize `file` in place, extending `table` with every synthetic
    /// binding introduced.
    pub fn run(&self, file: &mut SourceFile, table: &mut SymbolTable) -> NormalizeResult<PipelineReport> {
        let span = info_span!("normalize", package = %file.package);
        let _enter = span.enter();

        table.reserve_names(spelled_names(file));
        let start_after = max_node_id(file).max(table.max_node_id());
        let mut ids = NodeIds::after(start_after);
        let info = FileInfo::of(file);

        let mut report = PipelineReport::default();
        let mut failed: HashSet<&'static str> = HashSet::new();

        for rule in &self.rules {
            let name = rule.name();
            if let Some(prerequisite) = rule.requires().iter().find(|r| failed.contains(*r)) {
                warn!(rule = name, "skipped: prerequisite `{}` failed", prerequisite);
                failed.insert(name);
                report.passes.push(PassReport {
                    rule: name.to_string(),
                    outcome: PassOutcome::Skipped {
                        prerequisite: prerequisite.to_string(),
                    },
                    stats: RuleStats::new(name.to_string()),
                });
                continue;
            }

            let span = info_span!("rule", name);
            let _enter = span.enter();

            let snapshot = self
                .config
                .continue_on_pass_failure
                .then(|| (file.clone(), table.clone()));
            let mut stats = RuleStats::new(name.to_string());
            let started = Instant::now();

            let mut cx = RuleContext::new(name, table, &mut ids, &self.config, info.clone());
            let result = self.run_pass(rule.as_ref(), file, &mut cx, &mut stats);
            let diagnostics = cx.into_diagnostics();

            let result = result.and_then(|rewrites| {
                if self.config.verify {
                    rule.validate(file, table, &diagnostics)?;
                }
                Ok(rewrites)
            });
            stats.total_time_ms = started.elapsed().as_millis() as u64;
            stats.errors = diagnostics.len() as u64;
            report.diagnostics.extend(diagnostics);

            match result {
                Ok(rewrites) => {
                    debug!(rule = name, rewrites, "pass complete");
                    stats.transformations = rewrites as u64;
                    report.passes.push(PassReport {
                        rule: name.to_string(),
                        outcome: PassOutcome::Applied,
                        stats,
                    });
                }
                Err(error) => {
                    let snapshot = match snapshot {
                        Some(snapshot) if error.severity() != Severity::Fatal => snapshot,
                        _ => return Err(error),
                    };
                    warn!(rule = name, "pass failed, tree restored: {}", error);
                    (*file, *table) = snapshot;
                    stats.errors += 1;
                    failed.insert(name);
                    report.diagnostics.push(Diagnostic::from_error(
                        name,
                        &error,
                        error.node().and_then(|node| snippet_of(file, node)),
                    ));
                    report.passes.push(PassReport {
                        rule: name.to_string(),
                        outcome: PassOutcome::Failed {
                            error: error.to_string(),
                        },
                        stats,
                    });
                }
            }
        }

        info!(
            rewrites = report.rewrites(),
            diagnostics = report.diagnostics.len(),
            "normalization finished"
        );
        Ok(report)
    }

    fn run_pass(
        &self,
        rule: &dyn NormalizationRule,
        file: &mut SourceFile,
        cx: &mut RuleContext<'_>,
        stats: &mut RuleStats,
    ) -> NormalizeResult<usize> {
        let mut total = 0;
        for _ in 0..self.config.max_iterations.max(1) {
            let rewrites = rule.apply(file, cx)?;
            stats.applications += 1;
            total += rewrites;
            if rewrites == 0 || !rule.fixpoint() {
                return Ok(total);
            }
        }
        Err(NormalizeError::NoFixpoint {
            rule: rule.name().to_string(),
            iterations: self.config.max_iterations,
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Every name spelled in the file, so synthetic names never collide with one.
fn spelled_names(file: &SourceFile) -> Vec<String> {
    let mut names: Vec<String> = file
        .imports
        .iter()
        .map(|import| import.local_name().to_string())
        .collect();
    let _ = AstWalker::walk_file(file, &mut |node| {
        match node {
            NodeRef::Expr(expr) => {
                if let Some(name) = expr.as_ident() {
                    names.push(name.to_string());
                }
            }
            NodeRef::Decl { decl, .. } => {
                for spec in &decl.specs {
                    match spec {
                        Spec::Value(value) => {
                            names.extend(value.names.iter().map(|n| n.name.clone()))
                        }
                        Spec::Type(ty) => names.push(ty.name.name.clone()),
                    }
                }
            }
            NodeRef::Func(func) => {
                names.push(func.name.name.clone());
                let fields = func
                    .recv
                    .iter()
                    .chain(func.sig.params.iter())
                    .chain(func.sig.results.iter());
                for field in fields {
                    names.extend(field.names.iter().map(|n| n.name.clone()));
                }
            }
            NodeRef::Stmt(Stmt {
                kind: StmtKind::Labeled { label, .. },
                ..
            }) => names.push(label.clone()),
            _ => {}
        }
        ControlFlow::Continue(())
    });
    names
}

/// Rendered source of the statement or expression with id `node`.
pub(crate) fn snippet_of(file: &SourceFile, node: crate::ast::NodeId) -> Option<String> {
    let mut found = None;
    let _ = AstWalker::walk_file(file, &mut |candidate| {
        if candidate.id() != node {
            return ControlFlow::Continue(());
        }
        found = match candidate {
            NodeRef::Stmt(stmt) | NodeRef::Header(stmt) => Some(stmt.to_source()),
            NodeRef::Expr(expr) => Some(expr.to_source()),
            NodeRef::Decl { decl, .. } => Some(decl.to_source()),
            _ => None,
        };
        ControlFlow::Break(())
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;
    use crate::error::NormalizeResult;
    use pretty_assertions::assert_eq;

    struct Named {
        name: &'static str,
        requires: &'static [&'static str],
        fail: bool,
    }

    impl NormalizationRule for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "test rule"
        }

        fn requires(&self) -> &'static [&'static str] {
            self.requires
        }

        fn apply(&self, file: &mut SourceFile, _cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
            file.package.push('!');
            if self.fail {
                return Err(NormalizeError::MissingType {
                    node: NodeId(0),
                    what: "test",
                });
            }
            Ok(1)
        }
    }

    fn rule(name: &'static str, requires: &'static [&'static str]) -> Box<dyn NormalizationRule> {
        Box::new(Named {
            name,
            requires,
            fail: false,
        })
    }

    fn empty_file() -> SourceFile {
        SourceFile {
            id: NodeId(0),
            package: "p".to_string(),
            path: String::new(),
            imports: Vec::new(),
            decls: Vec::new(),
        }
    }

    #[test]
    fn test_default_order_satisfies_prerequisites() {
        let pipeline = Pipeline::new();
        let names: Vec<&str> = pipeline.rules().map(|r| r.name()).collect();
        for (position, rule) in pipeline.rules().enumerate() {
            for prerequisite in rule.requires() {
                let at = names.iter().position(|n| n == prerequisite).unwrap();
                assert!(at < position, "{} before {}", prerequisite, rule.name());
            }
        }
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn test_reordering_dependent_pair_is_rejected() {
        let config = PipelineConfig {
            order: Some(vec!["b".to_string(), "a".to_string()]),
            ..Default::default()
        };
        let result = Pipeline::from_rules(vec![rule("a", &[]), rule("b", &["a"])], config);
        assert!(matches!(result, Err(NormalizeError::Config(_))));
    }

    #[test]
    fn test_disabling_a_prerequisite_is_allowed() {
        let config = PipelineConfig {
            disabled: vec!["a".to_string()],
            ..Default::default()
        };
        let pipeline =
            Pipeline::from_rules(vec![rule("a", &[]), rule("b", &["a"])], config).unwrap();
        let names: Vec<&str> = pipeline.rules().map(|r| r.name()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_unknown_rule_names_are_config_errors() {
        let config = PipelineConfig {
            disabled: vec!["nope".to_string()],
            ..Default::default()
        };
        assert!(Pipeline::from_rules(vec![rule("a", &[])], config).is_err());
    }

    #[test]
    fn test_failed_pass_restores_tree_and_skips_dependents() {
        let config = PipelineConfig {
            continue_on_pass_failure: true,
            ..Default::default()
        };
        let rules: Vec<Box<dyn NormalizationRule>> = vec![
            rule("a", &[]),
            Box::new(Named {
                name: "b",
                requires: &[],
                fail: true,
            }),
            rule("c", &["b"]),
            rule("d", &[]),
        ];
        let pipeline = Pipeline::from_rules(rules, config).unwrap();
        let mut file = empty_file();
        let mut table = SymbolTable::new();

        let report = pipeline.run(&mut file, &mut table).unwrap();

        // a and d ran; b's edit was rolled back; c never ran
        assert_eq!(file.package, "p!!");
        assert!(matches!(
            report.pass("b").unwrap().outcome,
            PassOutcome::Failed { .. }
        ));
        assert_eq!(
            report.pass("c").unwrap().outcome,
            PassOutcome::Skipped {
                prerequisite: "b".to_string()
            }
        );
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.rewrites(), 2);
    }

    #[test]
    fn test_failed_pass_aborts_without_keep_going() {
        let rules: Vec<Box<dyn NormalizationRule>> = vec![Box::new(Named {
            name: "b",
            requires: &[],
            fail: true,
        })];
        let pipeline = Pipeline::from_rules(rules, PipelineConfig::default()).unwrap();
        let result = pipeline.run(&mut empty_file(), &mut SymbolTable::new());
        assert!(matches!(result, Err(NormalizeError::MissingType { .. })));
    }
}
