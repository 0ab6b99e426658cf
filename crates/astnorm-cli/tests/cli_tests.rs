use std::path::PathBuf;

use astnorm_cli::{check_file, normalize_file, summarize, write_document, NormalizeOptions};
use astnorm_core::build::TreeBuilder;
use astnorm_core::{Document, Invariant};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// `x, y = y, x` plus an unused call result.
fn swap_document() -> Document {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let one = b.signature(vec![], vec![int]);
    b.declare_func("next", one);
    let main = b.func("main", &[("x", int), ("y", int)], &[], |b| {
        let (x, y) = (b.ident("x"), b.ident("y"));
        let (y2, x2) = (b.ident("y"), b.ident("x"));
        let next = b.ident("next");
        let call = b.call(next, vec![]);
        vec![b.assign(vec![x, y], vec![y2, x2]), b.expr_stmt(call)]
    });
    let (file, table) = b.finish(vec![main]);
    Document::new(file, table)
}

fn write_input(dir: &TempDir, document: &Document) -> PathBuf {
    let path = dir.path().join("input.json");
    document.save(&path).unwrap();
    path
}

#[test]
fn test_normalize_writes_output_document() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, &swap_document());
    let output = temp_dir.path().join("out.json");

    let options = NormalizeOptions {
        output: Some(output.clone()),
        verify: true,
        ..NormalizeOptions::new(&input)
    };
    let (document, report) = normalize_file(&options).unwrap();
    write_document(&document, options.output.as_deref()).unwrap();

    assert!(report.success());
    let saved = Document::load(&output).unwrap();
    assert!(saved.violations().is_empty());
    let text = saved.render();
    assert!(text.contains("var tmp int = y"));
    assert!(text.contains("_ = next()"));
    assert!(summarize(&report).ends_with("rewrites in total"));
}

#[test]
fn test_check_reports_violations_until_normalized() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, &swap_document());

    let violations = check_file(&input).unwrap();
    let kinds: Vec<Invariant> = violations.iter().map(|v| v.invariant).collect();
    assert_eq!(
        kinds,
        vec![Invariant::SingleTargetAssign, Invariant::ExplicitDiscard]
    );

    let options = NormalizeOptions {
        output: Some(input.clone()),
        ..NormalizeOptions::new(&input)
    };
    let (document, _) = normalize_file(&options).unwrap();
    write_document(&document, options.output.as_deref()).unwrap();
    assert!(check_file(&input).unwrap().is_empty());
}

#[test]
fn test_disable_flag_and_config_file_combine() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, &swap_document());
    let config = temp_dir.path().join("config.json");
    std::fs::write(&config, r#"{ "disabled": ["parallel-assign"] }"#).unwrap();

    let options = NormalizeOptions {
        config: Some(config),
        disable: vec!["explicit-discard".to_string()],
        ..NormalizeOptions::new(&input)
    };
    let (document, report) = normalize_file(&options).unwrap();

    assert_eq!(report.passes.len(), 8);
    assert!(report.pass("parallel-assign").is_none());
    let text = document.render();
    assert!(text.contains("x, y = y, x"));
    assert!(!text.contains("_ = next()"));
}

#[test]
fn test_keep_going_reports_failed_pass() {
    let mut b = TreeBuilder::new("main");
    let main = b.func("main", &[], &[], |b| {
        let mystery = b.ident("mystery");
        let call = b.call(mystery, vec![]);
        vec![b.expr_stmt(call)]
    });
    let (file, table) = b.finish(vec![main]);

    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, &Document::new(file, table));

    let strict = NormalizeOptions::new(&input);
    let error = normalize_file(&strict).unwrap_err();
    assert!(format!("{:#}", error).contains("no type information"));

    let lenient = NormalizeOptions {
        keep_going: true,
        ..NormalizeOptions::new(&input)
    };
    let (document, report) = normalize_file(&lenient).unwrap();
    assert_eq!(report.failed().count(), 1);
    assert!(summarize(&report).contains("explicit-discard   failed"));
    assert!(document.render().contains("mystery()"));
}

#[test]
fn test_missing_input_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let options = NormalizeOptions::new(temp_dir.path().join("absent.json"));
    assert!(normalize_file(&options).is_err());
}

#[test]
fn test_unknown_rule_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, &swap_document());
    let options = NormalizeOptions {
        disable: vec!["no-such-rule".to_string()],
        ..NormalizeOptions::new(&input)
    };
    let error = normalize_file(&options).unwrap_err();
    assert!(error.to_string().contains("no-such-rule"));
}
