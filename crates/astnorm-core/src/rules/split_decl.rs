/*!
# Declaration Splitter

Splits `var` declarations so that each declares exactly one name:

- `var a, b int` becomes `var a int; var b int`
- `var a, b = 1, 2` becomes `var a = 1; var b = 2`
- grouped `var ( ... )` becomes one declaration per name
- inside a function, `var a, b = f()` becomes `var a T1; var b T2; a, b = f()`

When a later initializer mentions an earlier name of the same declaration
(which, before splitting, still refers to an outer binding) every initializer
is first captured in a temporary. Multi-value declarations at package level
are left whole and reported.
*/

use crate::ast::edit::{attach_labels_to_first, peel_labels, splice_stmts, wrap_labels, Splice};
use crate::ast::visit::{walk_stmt_list, VisitMut};
use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult, Severity};
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::rules::common::{current_scope, mentions_any, spec_snippet};
use crate::types::{BindingId, ScopeId, ScopeStack, TypeId};

pub struct DeclSplitter;

impl DeclSplitter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeclSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for DeclSplitter {
    fn name(&self) -> &'static str {
        "split-decl"
    }

    fn description(&self) -> &'static str {
        "Splits multi-name and grouped var declarations into single-name declarations"
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::SingleNameDecl]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut rewrites = split_package_decls(file, cx)?;
        let mut visitor = SplitVisitor {
            cx,
            scopes: ScopeStack::new(),
            rewrites: 0,
        };
        visitor.visit_file(file)?;
        rewrites += visitor.rewrites;
        Ok(rewrites)
    }
}

fn needs_split(gen: &GenDecl) -> bool {
    gen.is_var() && (gen.specs.len() > 1 || gen.value_specs().any(|s| s.names.len() > 1))
}

fn declared_type(cx: &RuleContext<'_>, name: &Ident) -> Option<TypeId> {
    cx.table
        .def(name.id)
        .and_then(|b| cx.table.binding(b))
        .and_then(|b| b.ty)
}

/// Package-level declarations: split without temporaries, since package
/// initialization does not see the names in textual order.
fn split_package_decls(file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
    let mut rewrites = 0;
    let mut decls = Vec::with_capacity(file.decls.len());
    for decl in std::mem::take(&mut file.decls) {
        let gen = match decl {
            TopDecl::Gen(gen) if needs_split(&gen) => gen,
            other => {
                decls.push(other);
                continue;
            }
        };
        rewrites += 1;
        let mut first_id = Some(gen.id);
        for spec in gen.specs {
            for piece in split_package_spec(cx, spec)? {
                let id = first_id.take().unwrap_or_else(|| cx.next_id());
                decls.push(TopDecl::Gen(GenDecl {
                    id,
                    kind: DeclKind::Var,
                    specs: vec![piece],
                }));
            }
        }
    }
    file.decls = decls;
    Ok(rewrites)
}

fn split_package_spec(cx: &mut RuleContext<'_>, spec: Spec) -> NormalizeResult<Vec<Spec>> {
    let value = match spec {
        Spec::Value(value) if value.names.len() > 1 => value,
        other => return Ok(vec![other]),
    };
    let (names, values) = (value.names.len(), value.values.len());
    if values == 1 {
        cx.tolerate(
            NormalizeError::TupleDeclaration { node: value.id },
            Some(spec_snippet(&value)),
        )?;
        return Ok(vec![Spec::Value(value)]);
    }
    if values != 0 && values != names {
        return Err(NormalizeError::MalformedDeclaration {
            node: value.id,
            names,
            values,
        });
    }

    let mut values_iter = value.values.into_iter();
    let mut first_id = Some(value.id);
    let mut pieces = Vec::with_capacity(names);
    for name in value.names {
        pieces.push(Spec::Value(ValueSpec {
            id: first_id.take().unwrap_or_else(|| cx.next_id()),
            names: vec![name],
            ty: value.ty.clone(),
            values: values_iter.next().into_iter().collect(),
        }));
    }
    Ok(pieces)
}

struct SplitVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    scopes: ScopeStack,
    rewrites: usize,
}

impl VisitMut for SplitVisitor<'_, '_> {
    fn enter_scope(&mut self, node: NodeId) -> NormalizeResult<()> {
        self.scopes.enter(node, self.cx.table);
        Ok(())
    }

    fn exit_scope(&mut self, node: NodeId) -> NormalizeResult<()> {
        self.scopes.exit(node);
        Ok(())
    }

    fn visit_stmt_list(&mut self, owner: NodeId, stmts: &mut Vec<Stmt>) -> NormalizeResult<()> {
        walk_stmt_list(self, owner, stmts)?;

        let mut splitter = LocalSplitter {
            cx: &mut *self.cx,
            scope: current_scope(&self.scopes, owner),
        };
        self.rewrites += splice_stmts(stmts, |stmt| {
            if !matches!(&stmt.unlabeled().kind, StmtKind::Decl(gen) if needs_split(gen)) {
                return Ok(Splice::Keep(stmt));
            }
            let (labels, stmt) = peel_labels(stmt);
            let gen = match stmt.kind {
                StmtKind::Decl(gen) => gen,
                kind => return Ok(Splice::Keep(wrap_labels(labels, Stmt::new(stmt.id, kind)))),
            };
            let mut out = Vec::new();
            for spec in gen.specs {
                out.extend(splitter.split(spec)?);
            }
            Ok(Splice::Replace(attach_labels_to_first(labels, out)))
        })?;
        Ok(())
    }
}

/// Splits the specs of one function-local declaration into statements.
struct LocalSplitter<'t, 'a> {
    cx: &'t mut RuleContext<'a>,
    /// Scope for temporaries, checked only when one is declared
    scope: NormalizeResult<ScopeId>,
}

impl LocalSplitter<'_, '_> {
    /// Statements replacing one spec. A spec whose pieces cannot be typed is
    /// kept whole and reported.
    fn split(&mut self, spec: Spec) -> NormalizeResult<Vec<Stmt>> {
        let value = match spec {
            Spec::Value(value) if value.names.len() > 1 => value,
            other => return Ok(vec![self.decl_of(other)]),
        };
        let original = value.clone();
        match self.split_value(value) {
            Err(error) if error.severity() == Severity::Declaration => {
                let snippet = spec_snippet(&original);
                self.cx.tolerate(error, Some(snippet))?;
                Ok(vec![self.decl_of(Spec::Value(original))])
            }
            result => result,
        }
    }

    fn temp_scope(&self) -> NormalizeResult<ScopeId> {
        self.scope.clone()
    }

    fn split_value(&mut self, value: ValueSpec) -> NormalizeResult<Vec<Stmt>> {
        let (names, values) = (value.names.len(), value.values.len());
        if values == 0 {
            let ty = value.ty;
            return Ok(value
                .names
                .into_iter()
                .map(|name| self.cx.var_decl(name, ty.clone(), Vec::new()))
                .collect());
        }
        if values == names {
            return self.split_list(value);
        }
        if values == 1 {
            return self.split_tuple(value);
        }
        Err(NormalizeError::MalformedDeclaration {
            node: value.id,
            names,
            values,
        })
    }

    fn decl_of(&mut self, spec: Spec) -> Stmt {
        let gen = GenDecl {
            id: self.cx.next_id(),
            kind: DeclKind::Var,
            specs: vec![spec],
        };
        self.cx.stmt(StmtKind::Decl(gen))
    }

    /// `var a, b = x, y`
    fn split_list(&mut self, spec: ValueSpec) -> NormalizeResult<Vec<Stmt>> {
        let scope = self.scope.as_ref().ok().copied();
        let shadowed = spec.values.iter().enumerate().any(|(j, value)| {
            mentions_any(
                self.cx.table,
                scope,
                value,
                spec.names[..j]
                    .iter()
                    .filter(|n| !n.is_blank())
                    .map(|n| n.name.as_str()),
            )
        });
        let ValueSpec {
            names, ty, values, ..
        } = spec;

        if !shadowed {
            return Ok(names
                .into_iter()
                .zip(values)
                .map(|(name, value)| self.cx.var_decl(name, ty.clone(), vec![value]))
                .collect());
        }

        let mut temps = Vec::with_capacity(values.len());
        let mut out = Vec::with_capacity(values.len() * 2);
        for (name, value) in names.iter().zip(values) {
            let temp_ty = match declared_type(self.cx, name) {
                Some(ty) => ty,
                None => {
                    let ty = self.cx.table.type_of(value.id).ok_or(NormalizeError::MissingType {
                        node: value.id,
                        what: "initializer",
                    })?;
                    self.cx.table.default_type(ty)
                }
            };
            let temp = self.cx.declare_temp(self.temp_scope()?, temp_ty);
            out.push(self.temp_decl(temp, ty.clone(), Some(value)));
            temps.push(temp);
        }
        for (name, temp) in names.into_iter().zip(temps) {
            let value = self.cx.use_binding(temp);
            out.push(self.cx.var_decl(name, ty.clone(), vec![value]));
        }
        Ok(out)
    }

    /// `var a, b = f()`
    fn split_tuple(&mut self, spec: ValueSpec) -> NormalizeResult<Vec<Stmt>> {
        let ValueSpec {
            id,
            names,
            ty,
            mut values,
        } = spec;
        let value = values.remove(0);
        let shadowed = mentions_any(
            self.cx.table,
            self.scope.as_ref().ok().copied(),
            &value,
            names.iter().filter(|n| !n.is_blank()).map(|n| n.name.as_str()),
        );

        let mut targets = Vec::with_capacity(names.len());
        for name in &names {
            if name.is_blank() {
                targets.push(None);
                continue;
            }
            let binding = self.cx.table.def(name.id).ok_or(NormalizeError::MissingType {
                node: name.id,
                what: "declared name",
            })?;
            targets.push(Some(binding));
        }

        if !shadowed {
            let mut out = Vec::with_capacity(names.len() + 1);
            for name in names.into_iter().filter(|n| !n.is_blank()) {
                out.push(self.cx.var_decl(name, ty.clone(), Vec::new()));
            }
            let lhs = targets.into_iter().map(|t| self.target(t)).collect();
            out.push(self.assign(lhs, value));
            return Ok(out);
        }

        let member_types = match self.cx.table.type_of(value.id) {
            Some(tuple) => self.cx.table.results(tuple),
            None => {
                return Err(NormalizeError::MissingType {
                    node: value.id,
                    what: "multi-value initializer",
                })
            }
        };
        let mut out = Vec::new();
        let mut temps = Vec::with_capacity(names.len());
        for (position, target) in targets.iter().enumerate() {
            if target.is_none() {
                temps.push(None);
                continue;
            }
            let member = member_types
                .get(position)
                .copied()
                .ok_or(NormalizeError::MalformedDeclaration {
                    node: id,
                    names: names.len(),
                    values: member_types.len(),
                })?;
            let spelled = self.cx.spell(member, id)?;
            let temp = self.cx.declare_temp(self.temp_scope()?, member);
            out.push(self.temp_decl(temp, Some(spelled), None));
            temps.push(Some(temp));
        }
        let lhs = temps.iter().map(|t| self.target(*t)).collect();
        out.push(self.assign(lhs, value));
        for (name, temp) in names.into_iter().zip(temps) {
            if let Some(temp) = temp {
                let value = self.cx.use_binding(temp);
                out.push(self.cx.var_decl(name, ty.clone(), vec![value]));
            }
        }
        Ok(out)
    }

    fn temp_decl(&mut self, temp: BindingId, ty: Option<TypeExpr>, value: Option<Expr>) -> Stmt {
        let name = self
            .cx
            .table
            .binding(temp)
            .map(|b| b.name.clone())
            .unwrap_or_default();
        let ident = Ident::new(self.cx.next_id(), name);
        self.cx.table.record_def(ident.id, temp);
        self.cx.var_decl(ident, ty, value.into_iter().collect())
    }

    /// Assignment target for a binding, or `_`.
    fn target(&mut self, binding: Option<BindingId>) -> Expr {
        match binding {
            Some(binding) => self.cx.use_binding(binding),
            None => self.cx.expr(ExprKind::Ident("_".to_string()), None),
        }
    }

    fn assign(&mut self, lhs: Vec<Expr>, value: Expr) -> Stmt {
        self.cx.stmt(StmtKind::Assign {
            lhs,
            op: AssignOp::Assign,
            rhs: vec![value],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::TreeBuilder;
    use crate::rules::testing;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_list_and_typed_declarations_split_in_order() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[], &[], |b| {
            let (one, two) = (b.int_lit(1), b.int_lit(2));
            let list = b.var(&["a", "b"], None, vec![one, two]);
            let typed = b.var(&["c", "d"], Some(int), Vec::new());
            vec![list, b.labeled("L", typed)]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        let (rewrites, diagnostics) =
            testing::apply(&DeclSplitter::new(), &mut file, &mut table).unwrap();
        assert_eq!(rewrites, 2);
        assert!(diagnostics.is_empty());
        assert_eq!(
            testing::body(&file),
            vec!["var a = 1", "var b = 2", "L: var c int", "var d int"]
        );
    }

    #[test]
    fn test_grouped_local_declaration_splits_per_name() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[], &[], |b| {
            let (one, two) = (b.int_lit(1), b.int_lit(2));
            let pair: &[&str] = &["a", "b"];
            let single: &[&str] = &["c"];
            vec![b.var_group(vec![(pair, None, vec![one, two]), (single, Some(int), Vec::new())])]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&DeclSplitter::new(), &mut file, &mut table).unwrap();
        assert_eq!(
            testing::body(&file),
            vec!["var a = 1", "var b = 2", "var c int"]
        );
    }

    #[test]
    fn test_shadowing_initializers_are_captured_first() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let main = b.func("main", &[("a", int)], &[], |b| {
            let inner = b.block(|b| {
                let one = b.int_lit(1);
                let outer_a = b.ident("a");
                vec![b.var(&["a", "b"], None, vec![one, outer_a])]
            });
            vec![inner]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&DeclSplitter::new(), &mut file, &mut table).unwrap();
        assert_eq!(
            testing::body(&file),
            vec![concat!(
                "{\n",
                "    var tmp = 1\n",
                "    var tmp1 = a\n",
                "    var a = tmp\n",
                "    var b = tmp1\n",
                "}"
            )]
        );
    }

    #[test]
    fn test_tuple_declaration_in_function_becomes_assignment() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let err = b.error_type();
        let sig = b.signature(vec![], vec![int, err]);
        b.declare_func("f", sig);
        let main = b.func("main", &[], &[], |b| {
            let f = b.ident("f");
            let call = b.call(f, vec![]);
            vec![b.var(&["n", "err"], None, vec![call])]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        testing::apply(&DeclSplitter::new(), &mut file, &mut table).unwrap();
        assert_eq!(
            testing::body(&file),
            vec!["var n", "var err", "n, err = f()"]
        );
    }

    #[test]
    fn test_package_level_grouped_and_tuple_declarations() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let sig = b.signature(vec![], vec![int, int]);
        b.declare_func("pair", sig);
        let (x, y) = (b.int_lit(1), b.int_lit(2));
        let list = b.top_var(&["x", "y"], None, vec![x, y]);
        let pair = b.ident("pair");
        let call = b.call(pair, vec![]);
        let tuple = b.top_var(&["p", "q"], None, vec![call]);
        let (mut file, mut table) = b.finish(vec![list, tuple]);

        let (rewrites, diagnostics) =
            testing::apply(&DeclSplitter::new(), &mut file, &mut table).unwrap();
        assert_eq!(rewrites, 2);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Declaration);

        let rendered: Vec<String> = file
            .decls
            .iter()
            .map(|d| match d {
                TopDecl::Gen(gen) => gen.to_source(),
                TopDecl::Func(func) => func.to_source(),
            })
            .collect();
        assert_eq!(rendered, vec!["var x = 1", "var y = 2", "var p, q = pair()"]);
    }

    #[test]
    fn test_count_mismatch_is_malformed() {
        let mut b = TreeBuilder::new("main");
        let main = b.func("main", &[], &[], |b| {
            let (one, two, three) = (b.int_lit(1), b.int_lit(2), b.int_lit(3));
            vec![b.var(&["a", "b"], None, vec![one, two, three])]
        });
        let (mut file, mut table) = b.finish(vec![main]);

        let error = testing::apply(&DeclSplitter::new(), &mut file, &mut table).unwrap_err();
        assert!(matches!(
            error,
            NormalizeError::MalformedDeclaration {
                names: 2,
                values: 3,
                ..
            }
        ));
    }
}
