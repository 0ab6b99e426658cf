//! # Astnorm CLI
//!
//! Command-line front door over the normalization engine. Documents are JSON
//! files holding a syntax tree and its symbol table:
//! - `normalize` runs the rule pipeline and writes the normalized document
//! - `check` reports every invariant the document violates
//! - `rules` lists the rules in their default order

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use astnorm_core::pipeline::PassOutcome;
use astnorm_core::rules::default_rules;
use astnorm_core::{Document, Pipeline, PipelineConfig, PipelineReport, Violation};
use tracing::{debug, info};

/// Options of the `normalize` subcommand.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub input: PathBuf,
    /// Destination for the normalized document; stdout when absent
    pub output: Option<PathBuf>,
    /// JSON pipeline configuration the flags below are layered over
    pub config: Option<PathBuf>,
    pub disable: Vec<String>,
    pub verify: bool,
    pub keep_going: bool,
}

impl NormalizeOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// The configuration file, if any, with the command-line flags applied.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        for name in &self.disable {
            if !config.disabled.contains(name) {
                config.disabled.push(name.clone());
            }
        }
        config.verify |= self.verify;
        config.continue_on_pass_failure |= self.keep_going;
        Ok(config)
    }
}

/// Load, normalize and return the document with its run report.
pub fn normalize_file(options: &NormalizeOptions) -> Result<(Document, PipelineReport)> {
    let config = options.pipeline_config()?;
    debug!(?config, "pipeline configuration");
    let pipeline = Pipeline::with_config(config)?;

    let mut document = Document::load(&options.input)?;
    let report = document
        .normalize_with(&pipeline)
        .with_context(|| format!("normalizing {}", options.input.display()))?;
    info!(
        rewrites = report.rewrites(),
        diagnostics = report.diagnostics.len(),
        "normalized {}",
        options.input.display()
    );
    Ok((document, report))
}

/// Write `document` to `output`, or to stdout.
pub fn write_document(document: &Document, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => document.save(path),
        None => {
            println!("{}", document.to_json()?);
            Ok(())
        }
    }
}

/// Violations of the document at `input`.
pub fn check_file(input: &Path) -> Result<Vec<Violation>> {
    let document = Document::load(input)?;
    Ok(document.violations())
}

/// Human-readable summary of a run: one line per pass, then diagnostics.
pub fn summarize(report: &PipelineReport) -> String {
    let mut out = String::new();
    for pass in &report.passes {
        let status = match &pass.outcome {
            PassOutcome::Applied if pass.stats.errors > 0 => format!(
                "{} rewrites, {} kept ({:.0}% rewritten), {:.1} ms/iteration",
                pass.stats.transformations,
                pass.stats.errors,
                pass.stats.success_rate() * 100.0,
                pass.stats.average_time_ms()
            ),
            PassOutcome::Applied => format!(
                "{} rewrites, {:.1} ms/iteration",
                pass.stats.transformations,
                pass.stats.average_time_ms()
            ),
            PassOutcome::Failed { error } => format!("failed: {}", error),
            PassOutcome::Skipped { prerequisite } => {
                format!("skipped, `{}` failed", prerequisite)
            }
        };
        let _ = writeln!(out, "{:<18} {}", pass.rule, status);
    }
    for diagnostic in &report.diagnostics {
        let node = diagnostic
            .node
            .map(|n| format!(" at node {}", n))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:?} [{}]{}: {}",
            diagnostic.severity, diagnostic.rule, node, diagnostic.message
        );
        if let Some(snippet) = &diagnostic.snippet {
            let _ = writeln!(out, "    {}", snippet);
        }
    }
    let _ = write!(out, "{} rewrites in total", report.rewrites());
    out
}

/// The default rule order with each rule's prerequisites.
pub fn list_rules() -> String {
    let mut out = String::new();
    for (position, rule) in default_rules().iter().enumerate() {
        let _ = writeln!(out, "{:>2}. {:<18} {}", position + 1, rule.name(), rule.description());
        if !rule.requires().is_empty() {
            let _ = writeln!(out, "    requires: {}", rule.requires().join(", "));
        }
    }
    out
}
