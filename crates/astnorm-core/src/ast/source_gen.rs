// Go-like source rendering of the tree.
// Used for diagnostic snippets and test assertions; comments and positions are
// not part of the tree, so this never round-trips the original text exactly.

use super::*;

const INDENT: &str = "    ";

/// Precedence of unary and star operands.
const UNARY_PREC: u8 = 6;
/// Precedence of operands, selectors, calls, literals.
const PRIMARY_PREC: u8 = 7;

/// Trait for tree nodes that can render their source text
pub trait ToSource {
    fn to_source(&self) -> String;
}

impl ToSource for SourceFile {
    fn to_source(&self) -> String {
        let mut out = format!("package {}\n", self.package);
        if !self.imports.is_empty() {
            out.push('\n');
            for import in &self.imports {
                match &import.name {
                    Some(name) => out.push_str(&format!("import {} {}\n", name, quote(&import.path))),
                    None => out.push_str(&format!("import {}\n", quote(&import.path))),
                }
            }
        }
        for decl in &self.decls {
            out.push('\n');
            match decl {
                TopDecl::Gen(gen) => out.push_str(&gen_decl(gen, 0)),
                TopDecl::Func(func) => out.push_str(&func.to_source()),
            }
            out.push('\n');
        }
        out
    }
}

impl ToSource for FuncDecl {
    fn to_source(&self) -> String {
        let mut out = String::from("func ");
        if let Some(recv) = &self.recv {
            out.push_str(&format!("({}) ", field(recv)));
        }
        out.push_str(&self.name.name);
        out.push_str(&signature(&self.sig));
        if let Some(body) = &self.body {
            out.push(' ');
            out.push_str(&block(body, 0));
        }
        out
    }
}

impl ToSource for Block {
    fn to_source(&self) -> String {
        block(self, 0)
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        stmt(self, 0)
    }
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        expr(self, 0)
    }
}

impl ToSource for TypeExpr {
    fn to_source(&self) -> String {
        type_expr(self)
    }
}

impl ToSource for GenDecl {
    fn to_source(&self) -> String {
        gen_decl(self, 0)
    }
}

fn pad(indent: usize) -> String {
    INDENT.repeat(indent)
}

fn block(block: &Block, indent: usize) -> String {
    if block.stmts.is_empty() {
        return "{}".to_string();
    }
    let mut out = String::from("{\n");
    push_stmts(&mut out, &block.stmts, indent + 1);
    out.push_str(&pad(indent));
    out.push('}');
    out
}

fn push_stmts(out: &mut String, stmts: &[Stmt], indent: usize) {
    for s in stmts {
        out.push_str(&pad(indent));
        out.push_str(&stmt(s, indent));
        out.push('\n');
    }
}

fn stmt(s: &Stmt, indent: usize) -> String {
    match &s.kind {
        StmtKind::Decl(gen) => gen_decl(gen, indent),
        StmtKind::Assign { lhs, op, rhs } => {
            let op = match op {
                AssignOp::Assign => "=".to_string(),
                AssignOp::Define => ":=".to_string(),
                AssignOp::Compound(op) => format!("{}=", op.as_str()),
            };
            format!("{} {} {}", exprs(lhs, indent), op, exprs(rhs, indent))
        }
        StmtKind::Expr(x) => expr(x, indent),
        StmtKind::IncDec { x, inc } => {
            format!("{}{}", expr(x, indent), if *inc { "++" } else { "--" })
        }
        StmtKind::Send { chan, value } => {
            format!("{} <- {}", expr(chan, indent), expr(value, indent))
        }
        StmtKind::Go(call) => format!("go {}", expr(call, indent)),
        StmtKind::Defer(call) => format!("defer {}", expr(call, indent)),
        StmtKind::Return(values) if values.is_empty() => "return".to_string(),
        StmtKind::Return(values) => format!("return {}", exprs(values, indent)),
        StmtKind::Branch { kind, label } => {
            let keyword = match kind {
                BranchKind::Break => "break",
                BranchKind::Continue => "continue",
                BranchKind::Goto => "goto",
                BranchKind::Fallthrough => "fallthrough",
            };
            match label {
                Some(label) => format!("{} {}", keyword, label),
                None => keyword.to_string(),
            }
        }
        StmtKind::Block(b) => block(b, indent),
        StmtKind::If {
            init,
            cond,
            then,
            els,
        } => {
            let mut out = String::from("if ");
            if let Some(init) = init {
                out.push_str(&stmt(init, indent));
                out.push_str("; ");
            }
            out.push_str(&expr(cond, indent));
            out.push(' ');
            out.push_str(&block(then, indent));
            if let Some(els) = els {
                out.push_str(" else ");
                out.push_str(&stmt(els, indent));
            }
            out
        }
        StmtKind::Switch { init, tag, clauses } => {
            let mut header = String::from("switch ");
            if let Some(init) = init {
                header.push_str(&stmt(init, indent));
                header.push_str("; ");
            }
            if let Some(tag) = tag {
                header.push_str(&expr(tag, indent));
                header.push(' ');
            }
            let mut out = header;
            out.push_str("{\n");
            for clause in clauses {
                out.push_str(&pad(indent));
                match &clause.list {
                    Some(list) => out.push_str(&format!("case {}:\n", exprs(list, indent))),
                    None => out.push_str("default:\n"),
                }
                push_stmts(&mut out, &clause.body, indent + 1);
            }
            out.push_str(&pad(indent));
            out.push('}');
            out
        }
        StmtKind::TypeSwitch {
            init,
            guard,
            clauses,
        } => {
            let mut out = String::from("switch ");
            if let Some(init) = init {
                out.push_str(&stmt(init, indent));
                out.push_str("; ");
            }
            out.push_str(&stmt(guard, indent));
            out.push_str(" {\n");
            for clause in clauses {
                out.push_str(&pad(indent));
                match &clause.types {
                    Some(types) => {
                        let types: Vec<String> = types.iter().map(type_expr).collect();
                        out.push_str(&format!("case {}:\n", types.join(", ")));
                    }
                    None => out.push_str("default:\n"),
                }
                push_stmts(&mut out, &clause.body, indent + 1);
            }
            out.push_str(&pad(indent));
            out.push('}');
            out
        }
        StmtKind::Select { clauses } => {
            let mut out = String::from("select {\n");
            for clause in clauses {
                out.push_str(&pad(indent));
                match &clause.comm {
                    Some(comm) => out.push_str(&format!("case {}:\n", stmt(comm, indent))),
                    None => out.push_str("default:\n"),
                }
                push_stmts(&mut out, &clause.body, indent + 1);
            }
            out.push_str(&pad(indent));
            out.push('}');
            out
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            let header = match (init, cond, post) {
                (None, None, None) => "for ".to_string(),
                (None, Some(cond), None) => format!("for {} ", expr(cond, indent)),
                _ => format!(
                    "for {}; {}; {} ",
                    init.as_ref().map(|s| stmt(s, indent)).unwrap_or_default(),
                    cond.as_ref().map(|e| expr(e, indent)).unwrap_or_default(),
                    post.as_ref().map(|s| stmt(s, indent)).unwrap_or_default(),
                ),
            };
            format!("{}{}", header, block(body, indent))
        }
        StmtKind::Range {
            key,
            value,
            define,
            x,
            body,
        } => {
            let targets: Vec<String> = [key, value]
                .into_iter()
                .flatten()
                .map(|e| expr(e, indent))
                .collect();
            let head = if targets.is_empty() {
                "for range ".to_string()
            } else {
                let op = if *define { ":=" } else { "=" };
                format!("for {} {} range ", targets.join(", "), op)
            };
            format!("{}{} {}", head, expr(x, indent), block(body, indent))
        }
        StmtKind::Labeled { label, stmt: inner } => format!("{}: {}", label, stmt(inner, indent)),
        StmtKind::Empty => String::new(),
    }
}

fn gen_decl(gen: &GenDecl, indent: usize) -> String {
    let keyword = match gen.kind {
        DeclKind::Var => "var",
        DeclKind::Const => "const",
        DeclKind::Type => "type",
    };
    if gen.specs.len() == 1 {
        return format!("{} {}", keyword, spec(&gen.specs[0], indent));
    }
    let mut out = format!("{} (\n", keyword);
    for s in &gen.specs {
        out.push_str(&pad(indent + 1));
        out.push_str(&spec(s, indent + 1));
        out.push('\n');
    }
    out.push_str(&pad(indent));
    out.push(')');
    out
}

fn spec(spec: &Spec, indent: usize) -> String {
    match spec {
        Spec::Value(value) => {
            let names: Vec<&str> = value.names.iter().map(|n| n.name.as_str()).collect();
            let mut out = names.join(", ");
            if let Some(ty) = &value.ty {
                out.push(' ');
                out.push_str(&type_expr(ty));
            }
            if !value.values.is_empty() {
                out.push_str(" = ");
                out.push_str(&exprs(&value.values, indent));
            }
            out
        }
        Spec::Type(ty) => {
            let eq = if ty.alias { " = " } else { " " };
            format!("{}{}{}", ty.name.name, eq, type_expr(&ty.ty))
        }
    }
}

fn exprs(list: &[Expr], indent: usize) -> String {
    list.iter()
        .map(|e| expr(e, indent))
        .collect::<Vec<_>>()
        .join(", ")
}

fn precedence(e: &Expr) -> u8 {
    match &e.kind {
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } | ExprKind::Star(_) => UNARY_PREC,
        _ => PRIMARY_PREC,
    }
}

/// Render `e`, parenthesized when it binds looser than `min`.
fn operand(e: &Expr, min: u8, indent: usize) -> String {
    if precedence(e) < min {
        format!("({})", expr(e, indent))
    } else {
        expr(e, indent)
    }
}

fn expr(e: &Expr, indent: usize) -> String {
    match &e.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Lit(lit) => literal(lit),
        ExprKind::CompositeLit { ty, elts } => {
            let ty = ty.as_ref().map(type_expr).unwrap_or_default();
            format!("{}{{{}}}", ty, exprs(elts, indent))
        }
        ExprKind::KeyValue { key, value } => {
            format!("{}: {}", expr(key, indent), expr(value, indent))
        }
        ExprKind::FuncLit { sig, body } => {
            format!("func{} {}", signature(sig), block(body, indent))
        }
        ExprKind::Paren(inner) => format!("({})", expr(inner, indent)),
        ExprKind::Selector { x, sel } => {
            format!("{}.{}", operand(x, PRIMARY_PREC, indent), sel)
        }
        ExprKind::Index { x, index } => format!(
            "{}[{}]",
            operand(x, PRIMARY_PREC, indent),
            expr(index, indent)
        ),
        ExprKind::Slice { x, low, high, max } => {
            let part = |p: &Option<Box<Expr>>| p.as_ref().map(|e| expr(e, indent)).unwrap_or_default();
            let mut out = format!(
                "{}[{}:{}",
                operand(x, PRIMARY_PREC, indent),
                part(low),
                part(high)
            );
            if max.is_some() {
                out.push(':');
                out.push_str(&part(max));
            }
            out.push(']');
            out
        }
        ExprKind::TypeAssert { x, ty } => {
            let ty = ty.as_ref().map(type_expr).unwrap_or_else(|| "type".to_string());
            format!("{}.({})", operand(x, PRIMARY_PREC, indent), ty)
        }
        ExprKind::Call { fun, args, spread } => format!(
            "{}({}{})",
            operand(fun, PRIMARY_PREC, indent),
            exprs(args, indent),
            if *spread { "..." } else { "" }
        ),
        ExprKind::Star(x) => format!("*{}", operand(x, UNARY_PREC, indent)),
        ExprKind::Unary { op, x } => format!("{}{}", op.as_str(), operand(x, UNARY_PREC, indent)),
        ExprKind::Binary { op, x, y } => {
            let prec = op.precedence();
            format!(
                "{} {} {}",
                operand(x, prec, indent),
                op.as_str(),
                operand(y, prec + 1, indent)
            )
        }
        ExprKind::Type(ty) => type_expr(ty),
    }
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Int(text) | Literal::Float(text) | Literal::Imag(text) | Literal::Char(text) => {
            text.clone()
        }
        Literal::String(value) => quote(value),
        Literal::Bool(value) => value.to_string(),
        Literal::Nil => "nil".to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn field(f: &Field) -> String {
    let names: Vec<&str> = f.names.iter().map(|n| n.name.as_str()).collect();
    if names.is_empty() {
        type_expr(&f.ty)
    } else {
        format!("{} {}", names.join(", "), type_expr(&f.ty))
    }
}

fn signature(sig: &FuncType) -> String {
    let mut params: Vec<String> = sig.params.iter().map(field).collect();
    if sig.variadic {
        if let Some(last) = sig.params.last() {
            let names: Vec<&str> = last.names.iter().map(|n| n.name.as_str()).collect();
            let spread = format!("...{}", type_expr(&last.ty));
            let rendered = if names.is_empty() {
                spread
            } else {
                format!("{} {}", names.join(", "), spread)
            };
            if let Some(slot) = params.last_mut() {
                *slot = rendered;
            }
        }
    }
    let results = match sig.results.as_slice() {
        [] => String::new(),
        [only] if only.names.is_empty() => format!(" {}", type_expr(&only.ty)),
        many => format!(
            " ({})",
            many.iter().map(field).collect::<Vec<_>>().join(", ")
        ),
    };
    format!("({}){}", params.join(", "), results)
}

fn type_expr(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Named(name) => name.clone(),
        TypeExpr::Qualified { package, name } => format!("{}.{}", package, name),
        TypeExpr::Generic { base, args } => format!(
            "{}[{}]",
            type_expr(base),
            args.iter().map(type_expr).collect::<Vec<_>>().join(", ")
        ),
        TypeExpr::Pointer(elem) => format!("*{}", type_expr(elem)),
        TypeExpr::Slice(elem) => format!("[]{}", type_expr(elem)),
        TypeExpr::Array { len: Some(len), elem } => format!("[{}]{}", len, type_expr(elem)),
        TypeExpr::Array { len: None, elem } => format!("[...]{}", type_expr(elem)),
        TypeExpr::Map { key, value } => format!("map[{}]{}", type_expr(key), type_expr(value)),
        TypeExpr::Chan { dir, elem } => match dir {
            ChanDir::Both => format!("chan {}", type_expr(elem)),
            ChanDir::Send => format!("chan<- {}", type_expr(elem)),
            ChanDir::Recv => format!("<-chan {}", type_expr(elem)),
        },
        TypeExpr::Func { .. } => format!("func{}", func_type_tail(ty)),
        TypeExpr::Struct(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|f| match &f.name {
                    Some(name) => format!("{} {}", name, type_expr(&f.ty)),
                    None => type_expr(&f.ty),
                })
                .collect();
            format!("struct{{{}}}", fields.join("; "))
        }
        TypeExpr::Interface(methods) => {
            let methods: Vec<String> = methods
                .iter()
                .map(|m| format!("{}{}", m.name, func_type_tail(&m.sig)))
                .collect();
            format!("interface{{{}}}", methods.join("; "))
        }
    }
}

/// `(params) results` of a function type.
fn func_type_tail(ty: &TypeExpr) -> String {
    let TypeExpr::Func {
        params,
        results,
        variadic,
    } = ty
    else {
        return "()".to_string();
    };
    let mut rendered: Vec<String> = params.iter().map(type_expr).collect();
    if *variadic {
        if let Some(last) = rendered.last_mut() {
            *last = format!("...{}", last);
        }
    }
    let results = match results.as_slice() {
        [] => String::new(),
        [only] => format!(" {}", type_expr(only)),
        many => format!(
            " ({})",
            many.iter().map(type_expr).collect::<Vec<_>>().join(", ")
        ),
    };
    format!("({}){}", rendered.join(", "), results)
}
