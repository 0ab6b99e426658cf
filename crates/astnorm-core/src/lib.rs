//! # Astnorm Core
//!
//! Normalization engine for type-checked Go syntax trees. It rewrites surface
//! shorthands into a smaller, semantically identical subset of the language,
//! so that later tooling only has to understand one spelling of each
//! construct:
//! - Tree model, visitor and source rendering
//! - Type/symbol adapter over the checker's results
//! - Rule pipeline with prerequisite checking and per-rule reports
//! - The ten rule units and the invariants they establish
//!
//! A [`Document`] bundles a tree with its symbol table; it is the JSON
//! exchange format the command-line tool reads and writes.

#![warn(clippy::all)]

pub mod ast;
pub mod build;
pub mod error;
pub mod invariants;
pub mod pipeline;
pub mod rules;
pub mod types;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use ast::{SourceFile, ToSource};
pub use error::{Diagnostic, NormalizeError, NormalizeResult, Severity};
pub use invariants::{Invariant, Violation};
pub use pipeline::{NormalizationRule, Pipeline, PipelineConfig, PipelineReport};
pub use types::SymbolTable;

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the engine. `RUST_LOG` overrides the default
/// `astnorm_core=info` filter; a second call is a no-op.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("astnorm_core=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run every rule in the default order over `file`.
pub fn normalize(file: &mut SourceFile, table: &mut SymbolTable) -> NormalizeResult<PipelineReport> {
    Pipeline::new().run(file, table)
}

/// A syntax tree together with the type information resolved for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub file: SourceFile,
    pub table: SymbolTable,
}

impl Document {
    pub fn new(file: SourceFile, table: SymbolTable) -> Self {
        Self { file, table }
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("malformed document")
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize document")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Normalize in place under `pipeline`.
    pub fn normalize_with(&mut self, pipeline: &Pipeline) -> NormalizeResult<PipelineReport> {
        pipeline.run(&mut self.file, &mut self.table)
    }

    /// Every invariant the tree currently violates.
    pub fn violations(&self) -> Vec<Violation> {
        invariants::check(&self.file, &self.table)
    }

    /// The tree rendered as source text.
    pub fn render(&self) -> String {
        self.file.to_source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::TreeBuilder;
    use pretty_assertions::assert_eq;

    fn sample() -> Document {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[("x", int), ("y", int)], &[], |b| {
            let (x, y) = (b.ident("x"), b.ident("y"));
            let (y2, x2) = (b.ident("y"), b.ident("x"));
            vec![b.assign(vec![x, y], vec![y2, x2])]
        });
        let (file, table) = b.finish(vec![main]);
        Document::new(file, table)
    }

    #[test]
    fn test_document_survives_json() {
        let document = sample();
        let text = document.to_json().unwrap();
        let back = Document::from_json(&text).unwrap();
        assert_eq!(back.file, document.file);
        assert_eq!(back.render(), document.render());
    }

    #[test]
    fn test_reloaded_document_still_normalizes() {
        let text = sample().to_json().unwrap();
        let mut document = Document::from_json(&text).unwrap();
        let report = document.normalize_with(&Pipeline::new()).unwrap();
        assert!(report.success());
        assert!(document.violations().is_empty());
        assert!(document.render().contains("var tmp int = y"));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(Document::from_json("{\"file\": 3}").is_err());
    }
}
