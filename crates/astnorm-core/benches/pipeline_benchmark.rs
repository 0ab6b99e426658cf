use astnorm_core::ast::{BinaryOp, BranchKind, SourceFile, Stmt, TopDecl};
use astnorm_core::build::TreeBuilder;
use astnorm_core::rules::default_rules;
use astnorm_core::{Pipeline, PipelineConfig, SymbolTable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// One function body mixing the constructs every rule rewrites.
fn function(b: &mut TreeBuilder, name: &str) -> TopDecl {
    let int = b.int();
    let ints = b.slice(int);
    let cells = b.array(8, int);
    let list = b.pointer(cells);
    b.func(name, &[("xs", ints), ("p", list), ("x", int), ("y", int)], &[], |b| {
        let mut stmts: Vec<Stmt> = Vec::new();
        let (one, two) = (b.int_lit(1), b.int_lit(2));
        stmts.push(b.var(&["a", "c"], None, vec![one, two]));
        stmts.push(b.for_stmt(
            |b| {
                let zero = b.int_lit(0);
                Some(b.define(&["i"], vec![zero]))
            },
            |b| {
                let (i, n) = (b.ident("i"), b.int_lit(8));
                Some(b.binary(BinaryOp::Lss, i, n))
            },
            |b| {
                let i = b.ident("i");
                Some(b.inc(i))
            },
            |b| {
                let skip = b.if_stmt(
                    |b| {
                        let (p, i) = (b.ident("p"), b.ident("i"));
                        let cell = b.index(p, i);
                        Some(b.define(&["v"], vec![cell]))
                    },
                    |b| {
                        let (v, zero) = (b.ident("v"), b.int_lit(0));
                        b.binary(BinaryOp::Eql, v, zero)
                    },
                    |b| vec![b.branch(BranchKind::Continue, None)],
                );
                let (a, i) = (b.ident("a"), b.ident("i"));
                vec![skip, b.op_assign(a, BinaryOp::Add, i)]
            },
        ));
        stmts.push(b.switch_stmt(
            |_| None,
            |_| None,
            |b| {
                let cond = {
                    let (a, c) = (b.ident("a"), b.ident("c"));
                    b.binary(BinaryOp::Gtr, a, c)
                };
                let clause = b.case(Some(vec![cond]), |b| {
                    let (x, y) = (b.ident("x"), b.ident("y"));
                    let (y2, x2) = (b.ident("y"), b.ident("x"));
                    vec![b.assign(vec![x, y], vec![y2, x2])]
                });
                vec![clause]
            },
        ));
        stmts
    })
}

fn build_file(functions: usize) -> (SourceFile, SymbolTable) {
    let mut b = TreeBuilder::new("bench");
    let decls = (0..functions)
        .map(|index| function(&mut b, &format!("f{}", index)))
        .collect();
    b.finish(decls)
}

fn benchmark_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    let pipeline = Pipeline::new();
    for functions in [1, 10, 100] {
        let (file, table) = build_file(functions);
        group.bench_with_input(BenchmarkId::from_parameter(functions), &functions, |bench, _| {
            bench.iter(|| {
                let (mut file, mut table) = (file.clone(), table.clone());
                black_box(pipeline.run(&mut file, &mut table).ok())
            })
        });
    }
    group.finish();
}

fn benchmark_verified_pipeline(c: &mut Criterion) {
    let config = PipelineConfig {
        verify: true,
        ..Default::default()
    };
    let Ok(pipeline) = Pipeline::with_config(config) else {
        return;
    };
    let (file, table) = build_file(10);
    c.bench_function("verified_pipeline_10", |bench| {
        bench.iter(|| {
            let (mut file, mut table) = (file.clone(), table.clone());
            black_box(pipeline.run(&mut file, &mut table).ok())
        })
    });
}

/// Rules that introduce temporaries and blocks, each run alone.
fn benchmark_single_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_rule");
    let (file, table) = build_file(50);
    for name in ["for-loop", "short-decl", "parallel-assign"] {
        let config = PipelineConfig {
            disabled: default_rules()
                .iter()
                .map(|rule| rule.name().to_string())
                .filter(|other| other != name)
                .collect(),
            ..Default::default()
        };
        let Ok(pipeline) = Pipeline::with_config(config) else {
            continue;
        };
        group.bench_function(name, |bench| {
            bench.iter(|| {
                let (mut file, mut table) = (file.clone(), table.clone());
                black_box(pipeline.run(&mut file, &mut table).ok())
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_full_pipeline,
    benchmark_verified_pipeline,
    benchmark_single_rules
);
criterion_main!(benches);
