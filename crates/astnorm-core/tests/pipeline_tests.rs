use astnorm_core::ast::{BinaryOp, BranchKind, SourceFile, Stmt, StmtKind, ToSource, TopDecl};
use astnorm_core::build::TreeBuilder;
use astnorm_core::pipeline::PassOutcome;
use astnorm_core::{invariants, NormalizeError, Pipeline, PipelineConfig, SymbolTable};
use pretty_assertions::assert_eq;

/// Rendered statements of the file's first function body.
fn body(file: &SourceFile) -> Vec<String> {
    file.decls
        .iter()
        .find_map(|decl| match decl {
            TopDecl::Func(func) => func.body.as_ref(),
            TopDecl::Gen(_) => None,
        })
        .map(|body| body.stmts.iter().map(Stmt::to_source).collect())
        .unwrap_or_default()
}

/// A function using every shorthand the rules remove.
fn kitchen_sink() -> (SourceFile, SymbolTable) {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let string = b.string();
    let grid = b.array(3, int);
    let grid_ptr = b.pointer(grid);
    let point = b.named_struct("Point", &[("x", int), ("y", int)]);
    let point_ptr = b.pointer(point);
    let counts = b.map(string, int);
    let next_sig = b.signature(vec![], vec![int]);
    b.declare_func("next", next_sig);

    let params = [
        ("p", grid_ptr),
        ("s", point_ptr),
        ("m", counts),
        ("x", int),
        ("y", int),
    ];
    let main = b.func("main", &params, &[int], |b| {
        let mut stmts = Vec::new();

        let (one, two) = (b.int_lit(1), b.int_lit(2));
        stmts.push(b.var(&["a", "c"], None, vec![one, two]));
        stmts.push(b.var(&["total"], Some(int), Vec::new()));

        stmts.push(b.if_stmt(
            |b| {
                let (m, k) = (b.ident("m"), b.string_lit("k"));
                let lookup = b.comma_ok_index(m, k);
                Some(b.define(&["v", "ok"], vec![lookup]))
            },
            |b| b.ident("ok"),
            |b| {
                let (a, v) = (b.ident("a"), b.ident("v"));
                vec![b.assign(vec![a], vec![v])]
            },
        ));

        stmts.push(b.switch_stmt(
            |_| None,
            |_| None,
            |b| {
                let cond = {
                    let (x, zero) = (b.ident("x"), b.int_lit(0));
                    b.binary(BinaryOp::Gtr, x, zero)
                };
                let clause = b.case(
                    Some(vec![cond]),
                    |b| {
                        let (c, one) = (b.ident("c"), b.int_lit(1));
                        vec![b.assign(vec![c], vec![one])]
                    },
                );
                vec![clause]
            },
        ));

        stmts.push(b.for_stmt(
            |b| {
                let zero = b.int_lit(0);
                Some(b.define(&["i"], vec![zero]))
            },
            |b| {
                let (i, three) = (b.ident("i"), b.int_lit(3));
                Some(b.binary(BinaryOp::Lss, i, three))
            },
            |b| {
                let i = b.ident("i");
                Some(b.inc(i))
            },
            |b| {
                let skip = b.if_stmt(
                    |_| None,
                    |b| {
                        let (i, one) = (b.ident("i"), b.int_lit(1));
                        b.binary(BinaryOp::Eql, i, one)
                    },
                    |b| vec![b.branch(BranchKind::Continue, None)],
                );
                let (total, p, i) = (b.ident("total"), b.ident("p"), b.ident("i"));
                let cell = b.index(p, i);
                vec![skip, b.op_assign(total, BinaryOp::Add, cell)]
            },
        ));

        let (x, y) = (b.ident("x"), b.ident("y"));
        let (y2, x2) = (b.ident("y"), b.ident("x"));
        stmts.push(b.assign(vec![x, y], vec![y2, x2]));

        let s = b.ident("s");
        let field = b.field(s, "x");
        stmts.push(b.define(&["n"], vec![field]));

        let next = b.ident("next");
        let call = b.call(next, vec![]);
        stmts.push(b.expr_stmt(call));

        let (a, n) = (b.ident("a"), b.ident("n"));
        let sum = b.binary(BinaryOp::Add, a, n);
        stmts.push(b.ret(vec![sum]));
        stmts
    });
    b.finish(vec![main])
}

#[test]
fn test_full_pipeline_establishes_every_invariant() {
    let (mut file, mut table) = kitchen_sink();
    assert!(!invariants::check(&file, &table).is_empty());

    let config = PipelineConfig {
        verify: true,
        ..Default::default()
    };
    let report = Pipeline::with_config(config)
        .unwrap()
        .run(&mut file, &mut table)
        .unwrap();

    assert!(report.success(), "{:?}", report.failed().collect::<Vec<_>>());
    assert!(report.diagnostics.is_empty());
    assert_eq!(invariants::check(&file, &table), Vec::new());
    assert_eq!(report.passes.len(), 10);
}

#[test]
fn test_second_run_changes_nothing() {
    let (mut file, mut table) = kitchen_sink();
    let pipeline = Pipeline::new();
    pipeline.run(&mut file, &mut table).unwrap();
    let once = file.to_source();

    let report = pipeline.run(&mut file, &mut table).unwrap();
    assert_eq!(report.rewrites(), 0);
    assert!(!report.changed());
    assert_eq!(file.to_source(), once);
}

#[test]
fn test_swap_keeps_parallel_semantics() {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let main = b.func("main", &[("x", int), ("y", int)], &[], |b| {
        let (x, y) = (b.ident("x"), b.ident("y"));
        let (y2, x2) = (b.ident("y"), b.ident("x"));
        vec![b.assign(vec![x, y], vec![y2, x2])]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    astnorm_core::normalize(&mut file, &mut table).unwrap();
    assert_eq!(
        body(&file),
        vec!["{\n    var tmp int = y\n    var tmp1 int = x\n    x = tmp\n    y = tmp1\n}"]
    );
}

#[test]
fn test_mixed_freshness_declares_only_new_names() {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let err_ty = b.error_type();
    let sig = b.signature(vec![], vec![int, err_ty]);
    b.declare_func("f", sig);
    let main = b.func("main", &[], &[], |b| {
        let one = b.int_lit(1);
        let first = b.define(&["y"], vec![one]);
        let f = b.ident("f");
        let call = b.call(f, vec![]);
        vec![first, b.define(&["y", "err"], vec![call])]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    astnorm_core::normalize(&mut file, &mut table).unwrap();
    assert_eq!(
        body(&file),
        vec!["var y int = 0", "y = 1", "var err error = nil", "y, err = f()"]
    );
}

#[test]
fn test_continue_still_runs_post_step() {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let main = b.func("main", &[("total", int)], &[], |b| {
        let stmt = b.for_stmt(
            |b| {
                let zero = b.int_lit(0);
                Some(b.define(&["i"], vec![zero]))
            },
            |b| {
                let (i, three) = (b.ident("i"), b.int_lit(3));
                Some(b.binary(BinaryOp::Lss, i, three))
            },
            |b| {
                let i = b.ident("i");
                Some(b.inc(i))
            },
            |b| {
                let skip = b.if_stmt(
                    |_| None,
                    |b| {
                        let (i, one) = (b.ident("i"), b.int_lit(1));
                        b.binary(BinaryOp::Eql, i, one)
                    },
                    |b| vec![b.branch(BranchKind::Continue, None)],
                );
                let (total, i) = (b.ident("total"), b.ident("i"));
                vec![skip, b.op_assign(total, BinaryOp::Add, i)]
            },
        );
        vec![stmt]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    astnorm_core::normalize(&mut file, &mut table).unwrap();
    assert_eq!(
        body(&file),
        vec![concat!(
            "{\n",
            "    var i int = 0\n",
            "    i = 0\n",
            "    for i < 3 {\n",
            "        if i == 1 {\n",
            "            {\n",
            "                i++\n",
            "                continue\n",
            "            }\n",
            "        }\n",
            "        total += i\n",
            "        i++\n",
            "    }\n",
            "}"
        )]
    );
}

#[test]
fn test_loop_body_redeclaring_counter_keeps_post_step_outside() {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let main = b.func("main", &[("total", int)], &[], |b| {
        let stmt = b.for_stmt(
            |b| {
                let zero = b.int_lit(0);
                Some(b.define(&["i"], vec![zero]))
            },
            |b| {
                let (i, three) = (b.ident("i"), b.int_lit(3));
                Some(b.binary(BinaryOp::Lss, i, three))
            },
            |b| {
                let i = b.ident("i");
                Some(b.inc(i))
            },
            |b| {
                let hundred = b.int_lit(100);
                let shadow = b.define(&["i"], vec![hundred]);
                let skip = b.if_stmt(
                    |_| None,
                    |b| {
                        let (i, one) = (b.ident("i"), b.int_lit(1));
                        b.binary(BinaryOp::Gtr, i, one)
                    },
                    |b| vec![b.branch(BranchKind::Continue, None)],
                );
                let (total, i) = (b.ident("total"), b.ident("i"));
                vec![shadow, skip, b.op_assign(total, BinaryOp::Add, i)]
            },
        );
        vec![b.labeled("next", stmt)]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    astnorm_core::normalize(&mut file, &mut table).unwrap();
    let text = body(&file).join("\n");
    // The loop's own label is taken, so the jump target gets another name.
    assert!(text.contains("goto next1"));
    assert!(text.contains("next1: i++"));
    assert!(!text.contains("{\n                i++"));
    assert!(invariants::check(&file, &table).is_empty());
}

#[test]
fn test_hoisted_names_do_not_leak() {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let string = b.string();
    let counts = b.map(string, int);
    let main = b.func("main", &[("m", counts)], &[], |b| {
        let lookup = b.if_stmt(
            |b| {
                let (m, k) = (b.ident("m"), b.string_lit("k"));
                let index = b.comma_ok_index(m, k);
                Some(b.define(&["v", "ok"], vec![index]))
            },
            |b| b.ident("ok"),
            |b| {
                let v = b.ident("v");
                vec![b.inc(v)]
            },
        );
        let one = b.int_lit(1);
        let later = b.define(&["v"], vec![one]);
        vec![lookup, later]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    astnorm_core::normalize(&mut file, &mut table).unwrap();
    let stmts = body(&file);
    assert_eq!(stmts.len(), 3);
    assert!(stmts[0].starts_with("{\n    var v int = 0\n    var ok bool = false\n"));
    assert_eq!(&stmts[1..], &["var v int = 0", "v = 1"]);

    let TopDecl::Func(func) = &file.decls[0] else {
        panic!("expected function");
    };
    let body_scope = table.scope_of(func.body.as_ref().unwrap().id).unwrap();
    assert!(table.lookup_local(body_scope, "ok").is_none());
    assert!(table.lookup_local(body_scope, "v").is_some());
}

#[test]
fn test_misordered_rules_are_rejected_before_running() {
    let config = PipelineConfig {
        order: Some(vec!["short-decl".to_string(), "hoist-init".to_string()]),
        ..Default::default()
    };
    assert!(matches!(
        Pipeline::with_config(config),
        Err(NormalizeError::Config(_))
    ));
}

#[test]
fn test_disabled_rule_leaves_its_construct() {
    let mut b = TreeBuilder::new("main");
    let int = b.int();
    let sig = b.signature(vec![], vec![int]);
    b.declare_func("next", sig);
    let main = b.func("main", &[], &[], |b| {
        let next = b.ident("next");
        let call = b.call(next, vec![]);
        vec![b.expr_stmt(call)]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    let config = PipelineConfig {
        disabled: vec!["explicit-discard".to_string()],
        ..Default::default()
    };
    let pipeline = Pipeline::with_config(config).unwrap();
    assert_eq!(pipeline.rules().count(), 9);
    pipeline.run(&mut file, &mut table).unwrap();
    assert_eq!(body(&file), vec!["next()"]);
}

#[test]
fn test_failed_pass_is_reported_when_continuing() {
    let mut b = TreeBuilder::new("main");
    let main = b.func("main", &[], &[], |b| {
        let one = b.int_lit(1);
        let define = b.define(&["a"], vec![one]);
        let mystery = b.ident("mystery");
        let call = b.call(mystery, vec![]);
        vec![define, b.expr_stmt(call)]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    let config = PipelineConfig {
        continue_on_pass_failure: true,
        ..Default::default()
    };
    let report = Pipeline::with_config(config)
        .unwrap()
        .run(&mut file, &mut table)
        .unwrap();

    assert!(!report.success());
    let failed: Vec<&str> = report.failed().map(|p| p.rule.as_str()).collect();
    assert_eq!(failed, vec!["explicit-discard"]);
    assert!(matches!(
        report.pass("short-decl").map(|p| &p.outcome),
        Some(PassOutcome::Applied)
    ));
    assert_eq!(body(&file), vec!["var a int = 0", "a = 1", "mystery()"]);
}

#[test]
fn test_fatal_error_stops_the_run() {
    let mut b = TreeBuilder::new("main");
    let main = b.func("main", &[], &[], |b| {
        let stray = astnorm_core::ast::Expr::new(
            b.next_id(),
            astnorm_core::ast::ExprKind::Ident("q".to_string()),
        );
        let one = b.int_lit(1);
        vec![b.stmt(StmtKind::Assign {
            lhs: vec![stray],
            op: astnorm_core::ast::AssignOp::Define,
            rhs: vec![one],
        })]
    });
    let (mut file, mut table) = b.finish(vec![main]);

    let config = PipelineConfig {
        continue_on_pass_failure: true,
        ..Default::default()
    };
    let result = Pipeline::with_config(config)
        .unwrap()
        .run(&mut file, &mut table);
    assert!(matches!(
        result,
        Err(NormalizeError::AmbiguousRedeclaration { .. })
    ));
}
