/*!
# Tree Builder

Builds a tree together with the symbol table a type checker would produce for
it: every expression typed, every identifier resolved to a binding, every
scope-introducing node mapped to its scope.

Scope-introducing constructs take closures so that their parts are built while
their scope is current:

```rust,ignore
let mut b = TreeBuilder::new("main");
let int = b.int();
let main = b.func("main", &[], &[], |b| {
    let x = b.int_lit(1);
    let def = b.define(&["x"], vec![x]);
    let loop_ = b.for_stmt(
        |b| { let zero = b.int_lit(0); Some(b.define(&["i"], vec![zero])) },
        |b| { let (i, n) = (b.ident("i"), b.int_lit(3)); Some(b.binary(BinaryOp::Lss, i, n)) },
        |b| { let i = b.ident("i"); Some(b.inc(i)) },
        |_| vec![],
    );
    vec![def, loop_]
});
let (file, table) = b.finish(vec![main]);
```
*/

use crate::ast::*;
use crate::types::*;

pub struct TreeBuilder {
    table: SymbolTable,
    ids: NodeIds,
    scopes: Vec<ScopeId>,
    file_id: NodeId,
    package: String,
    path: String,
    imports: Vec<Import>,
}

impl TreeBuilder {
    pub fn new(package: &str) -> Self {
        let mut table = SymbolTable::new();
        let mut ids = NodeIds::after(NodeId(0));
        let file_id = ids.next();
        let file_scope = table.new_scope(table.universe());
        table.attach_scope(file_id, file_scope);
        Self {
            table,
            ids,
            scopes: vec![file_scope],
            file_id,
            package: package.to_string(),
            path: String::new(),
            imports: Vec::new(),
        }
    }

    /// Set the package's import path.
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut SymbolTable {
        &mut self.table
    }

    pub fn next_id(&mut self) -> NodeId {
        self.ids.next()
    }

    /// Innermost scope under construction.
    pub fn scope(&self) -> ScopeId {
        self.scopes.last().copied().unwrap_or_else(|| self.table.universe())
    }

    fn push_scope(&mut self, node: NodeId) -> ScopeId {
        let scope = self.table.new_scope(self.scope());
        self.table.attach_scope(node, scope);
        self.scopes.push(scope);
        scope
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn file_info(&self) -> FileInfo {
        FileInfo {
            package: self.package.clone(),
            path: self.path.clone(),
            imports: self.imports.clone(),
        }
    }

    fn local_package(&self) -> Package {
        Package {
            path: self.path.clone(),
            name: self.package.clone(),
        }
    }

    /// Type expression spelling `ty` in this file.
    pub fn spell(&self, ty: TypeId) -> TypeExpr {
        self.table
            .type_expr(ty, &self.file_info(), NodeId::default())
            .unwrap_or_else(|_| TypeExpr::named(self.table.display(ty)))
    }

    // ---- types ----

    pub fn basic(&mut self, kind: BasicKind) -> TypeId {
        self.table.basic(kind)
    }

    pub fn int(&mut self) -> TypeId {
        self.basic(BasicKind::Int)
    }

    pub fn bool_type(&mut self) -> TypeId {
        self.basic(BasicKind::Bool)
    }

    pub fn string(&mut self) -> TypeId {
        self.basic(BasicKind::String)
    }

    pub fn float64(&mut self) -> TypeId {
        self.basic(BasicKind::Float64)
    }

    /// The predeclared `error` interface.
    pub fn error_type(&mut self) -> TypeId {
        let existing = self.table.bindings().find_map(|(_, b)| {
            (b.kind == BindingKind::TypeName && b.name == "error" && b.scope == self.table.universe())
                .then_some(b.ty)
                .flatten()
        });
        if let Some(ty) = existing {
            return ty;
        }
        let string = self.string();
        let sig = self.signature(vec![], vec![string]);
        let iface = self.table.intern(Type::Interface(vec![InterfaceMethod {
            name: "Error".to_string(),
            sig,
        }]));
        let error = self.table.new_named(None, "error");
        self.table.set_underlying(error, iface);
        let universe = self.table.universe();
        self.table
            .declare(universe, "error", Some(error), BindingKind::TypeName);
        error
    }

    pub fn pointer(&mut self, elem: TypeId) -> TypeId {
        self.table.intern(Type::Pointer(elem))
    }

    pub fn slice(&mut self, elem: TypeId) -> TypeId {
        self.table.intern(Type::Slice(elem))
    }

    pub fn array(&mut self, len: u64, elem: TypeId) -> TypeId {
        self.table.intern(Type::Array { len, elem })
    }

    pub fn map(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.table.intern(Type::Map { key, value })
    }

    pub fn chan(&mut self, elem: TypeId) -> TypeId {
        self.table.intern(Type::Chan {
            dir: ChanDir::Both,
            elem,
        })
    }

    pub fn tuple(&mut self, members: Vec<TypeId>) -> TypeId {
        self.table.intern(Type::Tuple(members))
    }

    pub fn signature(&mut self, params: Vec<TypeId>, results: Vec<TypeId>) -> TypeId {
        self.table.intern(Type::Signature {
            params,
            results,
            variadic: false,
        })
    }

    pub fn type_param(&mut self, name: &str) -> TypeId {
        self.table.intern(Type::TypeParam {
            name: name.to_string(),
        })
    }

    /// Struct type declared in this package, registered as a type name in the
    /// file scope.
    pub fn named_struct(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId {
        let underlying = self.table.intern(Type::Struct(
            fields
                .iter()
                .map(|(field, ty)| StructField {
                    name: field.to_string(),
                    ty: *ty,
                    embedded: false,
                })
                .collect(),
        ));
        self.named(name, underlying)
    }

    /// Struct type embedding each of `embedded` (a named type or a pointer to
    /// one) ahead of its own `fields`.
    pub fn named_struct_embedding(
        &mut self,
        name: &str,
        embedded: &[TypeId],
        fields: &[(&str, TypeId)],
    ) -> TypeId {
        let mut members = Vec::new();
        for ty in embedded {
            let target = self.table.pointer_elem(*ty).unwrap_or(*ty);
            let field = match self.table.ty(target) {
                Type::Named { name, .. } => name.clone(),
                _ => "_".to_string(),
            };
            members.push(StructField {
                name: field,
                ty: *ty,
                embedded: true,
            });
        }
        members.extend(fields.iter().map(|(field, ty)| StructField {
            name: field.to_string(),
            ty: *ty,
            embedded: false,
        }));
        let underlying = self.table.intern(Type::Struct(members));
        self.named(name, underlying)
    }

    /// Named type of this package over `underlying`.
    pub fn named(&mut self, name: &str, underlying: TypeId) -> TypeId {
        let named = self.table.new_named(Some(self.local_package()), name);
        self.table.set_underlying(named, underlying);
        let file_scope = self.scopes[0];
        self.table
            .declare(file_scope, name, Some(named), BindingKind::TypeName);
        named
    }

    /// Named type from another package.
    pub fn foreign(&mut self, path: &str, package: &str, name: &str, underlying: TypeId) -> TypeId {
        let named = self.table.new_named(
            Some(Package {
                path: path.to_string(),
                name: package.to_string(),
            }),
            name,
        );
        self.table.set_underlying(named, underlying);
        named
    }

    // ---- bindings ----

    /// Variable in the current scope with no declaring node (a parameter or a
    /// name declared elsewhere).
    pub fn declare_var(&mut self, name: &str, ty: TypeId) -> BindingId {
        let scope = self.scope();
        self.table.declare(scope, name, Some(ty), BindingKind::Var)
    }

    /// Function in the file scope.
    pub fn declare_func(&mut self, name: &str, sig: TypeId) -> BindingId {
        let scope = self.scopes[0];
        self.table.declare(scope, name, Some(sig), BindingKind::Func)
    }

    /// Predeclared function such as `len`.
    pub fn declare_builtin(&mut self, name: &str) -> BindingId {
        let universe = self.table.universe();
        self.table.declare(universe, name, None, BindingKind::Builtin)
    }

    /// Import a package, making its name resolvable in the file scope.
    pub fn import(&mut self, path: &str, name: Option<&str>) -> BindingId {
        let import = Import {
            name: name.map(str::to_string),
            path: path.to_string(),
        };
        let local = import.local_name().to_string();
        self.imports.push(import);
        let scope = self.scopes[0];
        self.table.declare(scope, local, None, BindingKind::Package)
    }

    // ---- expressions ----

    fn typed(&mut self, kind: ExprKind, ty: Option<TypeId>) -> Expr {
        let id = self.ids.next();
        if let Some(ty) = ty {
            self.table.record_type(id, ty);
        }
        Expr::new(id, kind)
    }

    /// Identifier resolved from the current scope outwards.
    pub fn ident(&mut self, name: &str) -> Expr {
        let binding = self.table.lookup(self.scope(), name);
        let ty = binding.and_then(|b| self.table.binding(b)).and_then(|b| b.ty);
        let expr = self.typed(ExprKind::Ident(name.to_string()), ty);
        if let Some(binding) = binding {
            self.table.record_use(expr.id, binding);
        }
        expr
    }

    pub fn blank(&mut self) -> Expr {
        self.typed(ExprKind::Ident("_".to_string()), None)
    }

    pub fn int_lit(&mut self, value: i64) -> Expr {
        let ty = self.basic(BasicKind::UntypedInt);
        self.typed(ExprKind::Lit(Literal::Int(value.to_string())), Some(ty))
    }

    pub fn bool_lit(&mut self, value: bool) -> Expr {
        let ty = self.basic(BasicKind::UntypedBool);
        self.typed(ExprKind::Lit(Literal::Bool(value)), Some(ty))
    }

    pub fn string_lit(&mut self, value: &str) -> Expr {
        let ty = self.basic(BasicKind::UntypedString);
        self.typed(ExprKind::Lit(Literal::String(value.to_string())), Some(ty))
    }

    pub fn nil(&mut self) -> Expr {
        let ty = self.basic(BasicKind::UntypedNil);
        self.typed(ExprKind::Lit(Literal::Nil), Some(ty))
    }

    /// Call whose type follows the callee's signature: no results is the empty
    /// tuple, several results a tuple.
    pub fn call(&mut self, fun: Expr, args: Vec<Expr>) -> Expr {
        let results = self
            .table
            .type_of(fun.id)
            .map(|ty| self.table.underlying(ty))
            .and_then(|ty| match self.table.ty(ty) {
                Type::Signature { results, .. } => Some(results.clone()),
                _ => None,
            });
        let ty = match results {
            Some(results) if results.len() == 1 => Some(results[0]),
            Some(results) => Some(self.tuple(results)),
            None => None,
        };
        self.typed(
            ExprKind::Call {
                fun: Box::new(fun),
                args,
                spread: false,
            },
            ty,
        )
    }

    /// Call of an untyped callee (a builtin), with an explicit result type.
    pub fn call_typed(&mut self, fun: Expr, args: Vec<Expr>, ty: TypeId) -> Expr {
        self.typed(
            ExprKind::Call {
                fun: Box::new(fun),
                args,
                spread: false,
            },
            Some(ty),
        )
    }

    pub fn binary(&mut self, op: BinaryOp, x: Expr, y: Expr) -> Expr {
        let ty = match op {
            BinaryOp::Eql
            | BinaryOp::Neq
            | BinaryOp::Lss
            | BinaryOp::Leq
            | BinaryOp::Gtr
            | BinaryOp::Geq
            | BinaryOp::LAnd
            | BinaryOp::LOr => Some(self.bool_type()),
            _ => {
                let tx = self.table.type_of(x.id);
                let ty = self.table.type_of(y.id);
                let untyped =
                    |t: TypeId| matches!(self.table.ty(t), Type::Basic(kind) if kind.is_untyped());
                match (tx, ty) {
                    (Some(a), Some(b)) if untyped(a) && !untyped(b) => Some(b),
                    (Some(a), _) => Some(a),
                    (None, b) => b,
                }
            }
        };
        self.typed(
            ExprKind::Binary {
                op,
                x: Box::new(x),
                y: Box::new(y),
            },
            ty,
        )
    }

    pub fn unary(&mut self, op: UnaryOp, x: Expr) -> Expr {
        let operand = self.table.type_of(x.id);
        let ty = match op {
            UnaryOp::Addr => operand.map(|t| self.pointer(t)),
            UnaryOp::Recv => operand.and_then(|t| match self.table.ty(self.table.underlying(t)) {
                Type::Chan { elem, .. } => Some(*elem),
                _ => None,
            }),
            _ => operand,
        };
        self.typed(ExprKind::Unary { op, x: Box::new(x) }, ty)
    }

    fn elem_type(&self, container: Option<TypeId>) -> Option<TypeId> {
        let container = self.table.underlying(container?);
        match self.table.ty(container) {
            Type::Slice(elem) | Type::Array { elem, .. } => Some(*elem),
            Type::Map { value, .. } => Some(*value),
            Type::Pointer(inner) => match self.table.ty(self.table.underlying(*inner)) {
                Type::Array { elem, .. } => Some(*elem),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn index(&mut self, x: Expr, index: Expr) -> Expr {
        let operand = self.table.type_of(x.id);
        let is_string = operand.map_or(false, |t| {
            matches!(self.table.ty(self.table.underlying(t)), Type::Basic(BasicKind::String))
        });
        let ty = if is_string {
            Some(self.basic(BasicKind::Uint8))
        } else {
            self.elem_type(operand)
        };
        self.typed(
            ExprKind::Index {
                x: Box::new(x),
                index: Box::new(index),
            },
            ty,
        )
    }

    /// `m[k]` in a two-value context: typed `(V, bool)`.
    pub fn comma_ok_index(&mut self, m: Expr, key: Expr) -> Expr {
        let value = self.elem_type(self.table.type_of(m.id));
        let ok = self.bool_type();
        let ty = value.map(|v| self.tuple(vec![v, ok]));
        self.typed(
            ExprKind::Index {
                x: Box::new(m),
                index: Box::new(key),
            },
            ty,
        )
    }

    pub fn slice_expr(&mut self, x: Expr, low: Option<Expr>, high: Option<Expr>) -> Expr {
        let operand = self.table.type_of(x.id);
        let ty = operand.and_then(|t| {
            let under = self.table.underlying(t);
            match self.table.ty(under).clone() {
                Type::Slice(_) | Type::Basic(_) => Some(t),
                Type::Array { elem, .. } => Some(self.slice(elem)),
                Type::Pointer(inner) => match self.table.ty(self.table.underlying(inner)).clone() {
                    Type::Array { elem, .. } => Some(self.slice(elem)),
                    _ => None,
                },
                _ => None,
            }
        });
        self.typed(
            ExprKind::Slice {
                x: Box::new(x),
                low: low.map(Box::new),
                high: high.map(Box::new),
                max: None,
            },
            ty,
        )
    }

    /// Field selector, typed from the operand's struct type (through one
    /// pointer if the operand is a pointer, and through embedded fields).
    pub fn field(&mut self, x: Expr, name: &str) -> Expr {
        let ty = self.table.type_of(x.id).and_then(|t| {
            let base = self.table.pointer_elem(t).unwrap_or(t);
            let holder = self.table.field_path(base, name)?.last().map_or(base, |f| f.ty);
            let holder = self.table.pointer_elem(holder).unwrap_or(holder);
            match self.table.ty(self.table.underlying(holder)) {
                Type::Struct(fields) => fields.iter().find(|f| f.name == name).map(|f| f.ty),
                _ => None,
            }
        });
        let expr = self.typed(
            ExprKind::Selector {
                x: Box::new(x),
                sel: name.to_string(),
            },
            ty,
        );
        self.table.record_selection(expr.id, Selection::Field);
        expr
    }

    /// Method value `x.name` of signature `sig`.
    pub fn method(&mut self, x: Expr, name: &str, sig: TypeId) -> Expr {
        let expr = self.typed(
            ExprKind::Selector {
                x: Box::new(x),
                sel: name.to_string(),
            },
            Some(sig),
        );
        self.table.record_selection(expr.id, Selection::Method);
        expr
    }

    /// Qualified identifier `pkg.name` of type `ty`.
    pub fn qualified(&mut self, package: &str, name: &str, ty: TypeId) -> Expr {
        let x = self.ident(package);
        self.typed(
            ExprKind::Selector {
                x: Box::new(x),
                sel: name.to_string(),
            },
            Some(ty),
        )
    }

    pub fn star(&mut self, x: Expr) -> Expr {
        let ty = self.table.type_of(x.id).and_then(|t| self.table.pointer_elem(t));
        self.typed(ExprKind::Star(Box::new(x)), ty)
    }

    /// `T{elts...}` of type `ty`.
    pub fn composite(&mut self, ty: TypeId, elts: Vec<Expr>) -> Expr {
        let spelled = self.spell(ty);
        self.typed(
            ExprKind::CompositeLit {
                ty: Some(spelled),
                elts,
            },
            Some(ty),
        )
    }

    /// Function literal with its own scope holding the parameters.
    pub fn func_lit<F>(&mut self, params: &[(&str, TypeId)], results: &[TypeId], body: F) -> Expr
    where
        F: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        let sig_ty = self.signature(params.iter().map(|(_, t)| *t).collect(), results.to_vec());
        let id = self.ids.next();
        self.table.record_type(id, sig_ty);
        self.push_scope(id);
        let sig = self.func_type(params, results);
        let stmts = body(self);
        let body = Block::new(self.ids.next(), stmts);
        self.pop_scope();
        Expr::new(id, ExprKind::FuncLit { sig, body })
    }

    fn func_type(&mut self, params: &[(&str, TypeId)], results: &[TypeId]) -> FuncType {
        let mut fields = Vec::with_capacity(params.len());
        for (name, ty) in params {
            let ident = Ident::new(self.ids.next(), *name);
            let binding = self.declare_var(name, *ty);
            self.table.record_def(ident.id, binding);
            fields.push(Field {
                names: vec![ident],
                ty: self.spell(*ty),
            });
        }
        let results = results
            .iter()
            .map(|ty| Field {
                names: Vec::new(),
                ty: self.spell(*ty),
            })
            .collect();
        FuncType {
            params: fields,
            results,
            variadic: false,
        }
    }

    // ---- statements ----

    pub fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt::new(self.ids.next(), kind)
    }

    /// Types produced by a right-hand side, one per value.
    fn rhs_types(&mut self, rhs: &[Expr]) -> Vec<Option<TypeId>> {
        if let [single] = rhs {
            if let Some(ty) = self.table.type_of(single.id) {
                if let Type::Tuple(members) = self.table.ty(ty) {
                    return members.clone().into_iter().map(Some).collect();
                }
            }
        }
        rhs.iter()
            .map(|e| self.table.type_of(e.id))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|ty| ty.map(|t| self.table.default_type(t)))
            .collect()
    }

    /// Declare-or-reuse `names := rhs`. Names already bound in the current
    /// scope are reused; the others become new variables typed from `rhs`.
    pub fn define(&mut self, names: &[&str], rhs: Vec<Expr>) -> Stmt {
        let types = self.rhs_types(&rhs);
        let scope = self.scope();
        let mut lhs = Vec::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if *name == "_" {
                lhs.push(self.blank());
                continue;
            }
            let ty = types.get(position).copied().flatten();
            match self.table.lookup_local(scope, name) {
                Some(existing) => {
                    let existing_ty = self.table.binding(existing).and_then(|b| b.ty);
                    let expr = self.typed(ExprKind::Ident(name.to_string()), existing_ty);
                    self.table.record_use(expr.id, existing);
                    lhs.push(expr);
                }
                None => {
                    let binding = self.table.declare(scope, *name, ty, BindingKind::Var);
                    let expr = self.typed(ExprKind::Ident(name.to_string()), ty);
                    self.table.record_def(expr.id, binding);
                    lhs.push(expr);
                }
            }
        }
        self.stmt(StmtKind::Assign {
            lhs,
            op: AssignOp::Define,
            rhs,
        })
    }

    pub fn assign(&mut self, lhs: Vec<Expr>, rhs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Assign {
            lhs,
            op: AssignOp::Assign,
            rhs,
        })
    }

    pub fn op_assign(&mut self, lhs: Expr, op: BinaryOp, rhs: Expr) -> Stmt {
        self.stmt(StmtKind::Assign {
            lhs: vec![lhs],
            op: AssignOp::Compound(op),
            rhs: vec![rhs],
        })
    }

    pub fn expr_stmt(&mut self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn inc(&mut self, x: Expr) -> Stmt {
        self.stmt(StmtKind::IncDec { x, inc: true })
    }

    pub fn ret(&mut self, values: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(values))
    }

    pub fn branch(&mut self, kind: BranchKind, label: Option<&str>) -> Stmt {
        self.stmt(StmtKind::Branch {
            kind,
            label: label.map(str::to_string),
        })
    }

    pub fn labeled(&mut self, label: &str, stmt: Stmt) -> Stmt {
        self.stmt(StmtKind::Labeled {
            label: label.to_string(),
            stmt: Box::new(stmt),
        })
    }

    /// `var` spec declaring `names` in the current scope. Each name takes
    /// `ty` when given, otherwise the type of its value.
    fn value_spec(&mut self, names: &[&str], ty: Option<TypeId>, values: Vec<Expr>) -> ValueSpec {
        let types = self.rhs_types(&values);
        let scope = self.scope();
        let idents = names
            .iter()
            .enumerate()
            .map(|(position, name)| {
                let ident = Ident::new(self.ids.next(), *name);
                let declared = ty.or_else(|| types.get(position).copied().flatten());
                let binding = self.table.declare(scope, *name, declared, BindingKind::Var);
                self.table.record_def(ident.id, binding);
                ident
            })
            .collect();
        ValueSpec {
            id: self.ids.next(),
            names: idents,
            ty: ty.map(|t| self.spell(t)),
            values,
        }
    }

    /// `var names [ty] [= values]` as a statement.
    pub fn var(&mut self, names: &[&str], ty: Option<TypeId>, values: Vec<Expr>) -> Stmt {
        let decl = self.var_gen_decl(names, ty, values);
        self.stmt(StmtKind::Decl(decl))
    }

    /// Grouped `var ( ... )` statement, one spec per entry.
    pub fn var_group(&mut self, specs: Vec<(&[&str], Option<TypeId>, Vec<Expr>)>) -> Stmt {
        let specs = specs
            .into_iter()
            .map(|(names, ty, values)| Spec::Value(self.value_spec(names, ty, values)))
            .collect();
        let decl = GenDecl {
            id: self.ids.next(),
            kind: DeclKind::Var,
            specs,
        };
        self.stmt(StmtKind::Decl(decl))
    }

    fn var_gen_decl(&mut self, names: &[&str], ty: Option<TypeId>, values: Vec<Expr>) -> GenDecl {
        let spec = self.value_spec(names, ty, values);
        GenDecl {
            id: self.ids.next(),
            kind: DeclKind::Var,
            specs: vec![Spec::Value(spec)],
        }
    }

    /// Package-level `var` declaration.
    pub fn top_var(&mut self, names: &[&str], ty: Option<TypeId>, values: Vec<Expr>) -> TopDecl {
        TopDecl::Gen(self.var_gen_decl(names, ty, values))
    }

    /// Package-level `const name = value`.
    pub fn top_const(&mut self, name: &str, value: Expr) -> TopDecl {
        let ty = self.table.type_of(value.id);
        let ident = Ident::new(self.ids.next(), name);
        let scope = self.scope();
        let binding = self.table.declare(scope, name, ty, BindingKind::Const);
        self.table.record_def(ident.id, binding);
        TopDecl::Gen(GenDecl {
            id: self.ids.next(),
            kind: DeclKind::Const,
            specs: vec![Spec::Value(ValueSpec {
                id: self.ids.next(),
                names: vec![ident],
                ty: None,
                values: vec![value],
            })],
        })
    }

    fn scoped_block<F>(&mut self, body: F) -> Block
    where
        F: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        let id = self.ids.next();
        self.push_scope(id);
        let stmts = body(self);
        self.pop_scope();
        Block::new(id, stmts)
    }

    pub fn block<F>(&mut self, body: F) -> Stmt
    where
        F: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        let block = self.scoped_block(body);
        self.stmt(StmtKind::Block(block))
    }

    pub fn if_stmt<I, C, T>(&mut self, init: I, cond: C, then: T) -> Stmt
    where
        I: FnOnce(&mut Self) -> Option<Stmt>,
        C: FnOnce(&mut Self) -> Expr,
        T: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        self.if_else(init, cond, then, |_| None)
    }

    /// `if` with an optional `else` branch built inside the statement's scope.
    pub fn if_else<I, C, T, E>(&mut self, init: I, cond: C, then: T, els: E) -> Stmt
    where
        I: FnOnce(&mut Self) -> Option<Stmt>,
        C: FnOnce(&mut Self) -> Expr,
        T: FnOnce(&mut Self) -> Vec<Stmt>,
        E: FnOnce(&mut Self) -> Option<Stmt>,
    {
        let id = self.ids.next();
        self.push_scope(id);
        let init = init(self).map(Box::new);
        let cond = cond(self);
        let then = self.scoped_block(then);
        let els = els(self).map(Box::new);
        self.pop_scope();
        Stmt::new(
            id,
            StmtKind::If {
                init,
                cond,
                then,
                els,
            },
        )
    }

    pub fn for_stmt<I, C, P, B>(&mut self, init: I, cond: C, post: P, body: B) -> Stmt
    where
        I: FnOnce(&mut Self) -> Option<Stmt>,
        C: FnOnce(&mut Self) -> Option<Expr>,
        P: FnOnce(&mut Self) -> Option<Stmt>,
        B: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        let id = self.ids.next();
        self.push_scope(id);
        let init = init(self).map(Box::new);
        let cond = cond(self);
        let post = post(self).map(Box::new);
        let body = self.scoped_block(body);
        self.pop_scope();
        Stmt::new(
            id,
            StmtKind::For {
                init,
                cond,
                post,
                body,
            },
        )
    }

    /// `for key, value := range x`, declaring the iteration variables.
    pub fn range_stmt<B>(&mut self, key: Option<&str>, value: Option<&str>, x: Expr, body: B) -> Stmt
    where
        B: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        let (key_ty, value_ty) = match self.table.type_of(x.id).map(|t| self.table.underlying(t)) {
            Some(t) => match self.table.ty(t).clone() {
                Type::Slice(elem) | Type::Array { elem, .. } => (Some(self.int()), Some(elem)),
                Type::Map { key, value } => (Some(key), Some(value)),
                Type::Chan { elem, .. } => (Some(elem), None),
                Type::Basic(_) => (Some(self.int()), Some(self.basic(BasicKind::Int32))),
                _ => (None, None),
            },
            None => (None, None),
        };
        let id = self.ids.next();
        self.push_scope(id);
        let mut targets = Vec::new();
        for (name, ty) in [(key, key_ty), (value, value_ty)] {
            let Some(name) = name else {
                targets.push(None);
                continue;
            };
            if name == "_" {
                targets.push(Some(self.blank()));
                continue;
            }
            let scope = self.scope();
            let binding = self.table.declare(scope, name, ty, BindingKind::Var);
            let expr = self.typed(ExprKind::Ident(name.to_string()), ty);
            self.table.record_def(expr.id, binding);
            targets.push(Some(expr));
        }
        let body = self.scoped_block(body);
        self.pop_scope();
        let mut targets = targets.into_iter();
        let key = targets.next().flatten();
        let value = targets.next().flatten();
        Stmt::new(
            id,
            StmtKind::Range {
                define: key.is_some() || value.is_some(),
                key,
                value,
                x,
                body,
            },
        )
    }

    pub fn switch_stmt<I, T, C>(&mut self, init: I, tag: T, clauses: C) -> Stmt
    where
        I: FnOnce(&mut Self) -> Option<Stmt>,
        T: FnOnce(&mut Self) -> Option<Expr>,
        C: FnOnce(&mut Self) -> Vec<CaseClause>,
    {
        let id = self.ids.next();
        self.push_scope(id);
        let init = init(self).map(Box::new);
        let tag = tag(self);
        let clauses = clauses(self);
        self.pop_scope();
        Stmt::new(id, StmtKind::Switch { init, tag, clauses })
    }

    /// `case list:` (or `default:` when `list` is `None`) with its own scope.
    pub fn case<B>(&mut self, list: Option<Vec<Expr>>, body: B) -> CaseClause
    where
        B: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        let id = self.ids.next();
        self.push_scope(id);
        let body = body(self);
        self.pop_scope();
        CaseClause { id, list, body }
    }

    /// Function declaration; the body block owns the scope holding the
    /// parameters.
    pub fn func<F>(&mut self, name: &str, params: &[(&str, TypeId)], results: &[TypeId], body: F) -> TopDecl
    where
        F: FnOnce(&mut Self) -> Vec<Stmt>,
    {
        let sig_ty = self.signature(params.iter().map(|(_, t)| *t).collect(), results.to_vec());
        let name_ident = Ident::new(self.ids.next(), name);
        let binding = match self.table.lookup_local(self.scopes[0], name) {
            Some(existing) => existing,
            None => self.declare_func(name, sig_ty),
        };
        self.table.record_def(name_ident.id, binding);

        let id = self.ids.next();
        let body_id = self.ids.next();
        self.push_scope(body_id);
        let sig = self.func_type(params, results);
        let stmts = body(self);
        self.pop_scope();
        TopDecl::Func(FuncDecl {
            id,
            name: name_ident,
            recv: None,
            sig,
            body: Some(Block::new(body_id, stmts)),
        })
    }

    pub fn finish(self, decls: Vec<TopDecl>) -> (SourceFile, SymbolTable) {
        let file = SourceFile {
            id: self.file_id,
            package: self.package,
            path: self.path,
            imports: self.imports,
            decls,
        };
        (file, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_resolves_fresh_and_existing_names() {
        let mut b = TreeBuilder::new("main");
        let int = b.int();
        let err_ty = b.error_type();
        let f_sig = b.signature(vec![], vec![int, err_ty]);
        b.declare_func("f", f_sig);

        let mut stmts = Vec::new();
        b.func("main", &[], &[], |b| {
            b.declare_var("y", int);
            let f = b.ident("f");
            let call = b.call(f, vec![]);
            stmts.push(b.define(&["y", "err"], vec![call]));
            Vec::new()
        });

        let StmtKind::Assign { lhs, .. } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        let table = b.table();
        assert!(table.use_of(lhs[0].id).is_some());
        let err = table.def(lhs[1].id).expect("err is fresh");
        assert_eq!(table.binding(err).and_then(|b| b.ty), Some(err_ty));
    }

    #[test]
    fn test_if_scope_holds_init_bindings() {
        let mut b = TreeBuilder::new("main");
        let mut if_id = NodeId::default();
        b.func("main", &[], &[], |b| {
            let stmt = b.if_stmt(
                |b| {
                    let one = b.int_lit(1);
                    Some(b.define(&["v"], vec![one]))
                },
                |b| b.bool_lit(true),
                |_| Vec::new(),
            );
            if_id = stmt.id;
            vec![stmt]
        });

        let table = b.table();
        let scope = table.scope_of(if_id).expect("if has a scope");
        assert!(table.lookup_local(scope, "v").is_some());
    }

    #[test]
    fn test_types_from_the_files_own_path_spell_unqualified() {
        use crate::ast::ToSource;

        let mut b = TreeBuilder::new("app").with_path("example.com/app");
        let int = b.int();
        let local = b.foreign("example.com/app", "app", "Config", int);
        let other = b.foreign("example.com/cfg", "cfg", "Config", int);
        assert_eq!(b.spell(local).to_source(), "Config");

        let (file, table) = b.finish(Vec::new());
        assert_eq!(file.path, "example.com/app");
        let unimported = table.type_expr(other, &FileInfo::of(&file), NodeId::default());
        assert!(unimported.is_err());
    }
}
