use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::*;
use crate::ast::NodeId;

static INVALID: Type = Type::Invalid;

/// Nesting bound when following named types to their underlying type.
const MAX_NAMED_DEPTH: usize = 64;

/// The symbol/type table threaded through every rule.
///
/// Node-keyed maps are ordered so that serialized tables are stable. The
/// interning and name indexes are rebuilt lazily after deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    types: Vec<Type>,
    #[serde(default)]
    expr_types: BTreeMap<NodeId, TypeId>,
    #[serde(default)]
    defs: BTreeMap<NodeId, BindingId>,
    #[serde(default)]
    uses: BTreeMap<NodeId, BindingId>,
    #[serde(default)]
    selections: BTreeMap<NodeId, Selection>,
    scopes: Vec<Scope>,
    #[serde(default)]
    scope_of: BTreeMap<NodeId, ScopeId>,
    #[serde(default)]
    bindings: Vec<Binding>,

    #[serde(skip)]
    interned: HashMap<Type, TypeId>,
    #[serde(skip)]
    types_indexed: usize,
    #[serde(skip)]
    taken_names: HashSet<String>,
    #[serde(skip)]
    bindings_indexed: usize,
}

impl SymbolTable {
    /// Empty table with a single universe scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            ..Default::default()
        }
    }

    /// The outermost scope.
    pub fn universe(&self) -> ScopeId {
        ScopeId(0)
    }

    // ---- types ----

    pub fn basic(&mut self, kind: BasicKind) -> TypeId {
        self.intern(Type::Basic(kind))
    }

    /// Arena id for a structural type, reusing an identical entry. Named types
    /// have identity and are created with [`SymbolTable::new_named`] instead.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if matches!(ty, Type::Named { .. }) {
            return self.push_type(ty);
        }
        self.reindex_types();
        if let Some(id) = self.interned.get(&ty) {
            return *id;
        }
        let id = self.push_type(ty.clone());
        self.interned.insert(ty, id);
        self.types_indexed = self.types.len();
        id
    }

    pub fn new_named(&mut self, package: Option<Package>, name: impl Into<String>) -> TypeId {
        self.push_type(Type::Named {
            package,
            name: name.into(),
            underlying: None,
            args: Vec::new(),
        })
    }

    pub fn set_underlying(&mut self, named: TypeId, ty: TypeId) {
        if let Some(Type::Named { underlying, .. }) = self.types.get_mut(named.0 as usize) {
            *underlying = Some(ty);
        }
    }

    fn push_type(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    fn reindex_types(&mut self) {
        for index in self.types_indexed..self.types.len() {
            let ty = &self.types[index];
            if !matches!(ty, Type::Named { .. }) {
                self.interned
                    .entry(ty.clone())
                    .or_insert(TypeId(index as u32));
            }
        }
        self.types_indexed = self.types.len();
    }

    /// The type behind an id; unknown ids read as `Invalid`.
    pub fn ty(&self, id: TypeId) -> &Type {
        self.types.get(id.0 as usize).unwrap_or(&INVALID)
    }

    /// Follow named types down to their underlying structure.
    pub fn underlying(&self, id: TypeId) -> TypeId {
        let mut current = id;
        for _ in 0..MAX_NAMED_DEPTH {
            match self.ty(current) {
                Type::Named {
                    underlying: Some(next),
                    ..
                } => current = *next,
                _ => return current,
            }
        }
        current
    }

    pub fn category(&self, id: TypeId) -> TypeCategory {
        let under = self.underlying(id);
        self.ty(under)
            .shallow_category()
            .unwrap_or(TypeCategory::Unsupported)
    }

    /// Element type when `id` is (or is defined as) a pointer.
    pub fn pointer_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.ty(self.underlying(id)) {
            Type::Pointer(elem) => Some(*elem),
            _ => None,
        }
    }

    pub fn is_pointer_to_array(&self, id: TypeId) -> bool {
        self.pointer_elem(id)
            .map(|elem| matches!(self.ty(self.underlying(elem)), Type::Array { .. }))
            .unwrap_or(false)
    }

    /// Embedded fields a selection of `name` on a value of type `base` passes
    /// through, shallowest depth first; empty for a field of `base` itself.
    pub fn field_path(&self, base: TypeId, name: &str) -> Option<Vec<StructField>> {
        let mut level = vec![(base, Vec::new())];
        let mut seen = HashSet::new();
        for _ in 0..MAX_NAMED_DEPTH {
            let mut next = Vec::new();
            for (ty, path) in level {
                let holder = self.pointer_elem(ty).unwrap_or(ty);
                if !seen.insert(holder) {
                    continue;
                }
                let Type::Struct(fields) = self.ty(self.underlying(holder)) else {
                    continue;
                };
                if fields.iter().any(|f| f.name == name) {
                    return Some(path);
                }
                for field in fields.iter().filter(|f| f.embedded) {
                    let mut deeper: Vec<StructField> = path.clone();
                    deeper.push(field.clone());
                    next.push((field.ty, deeper));
                }
            }
            if next.is_empty() {
                return None;
            }
            level = next;
        }
        None
    }

    /// Whether selecting field `name` on an operand of type `operand`
    /// follows a pointer the source does not spell.
    pub fn implicit_field_deref(&self, operand: TypeId, name: &str) -> bool {
        if self.pointer_elem(operand).is_some() {
            return true;
        }
        self.field_path(operand, name).map_or(false, |path| {
            path.iter().any(|field| self.pointer_elem(field.ty).is_some())
        })
    }

    pub fn is_map(&self, id: TypeId) -> bool {
        matches!(self.ty(self.underlying(id)), Type::Map { .. })
    }

    /// Values produced by an expression of this type: a tuple's members, or
    /// the type itself.
    pub fn results(&self, id: TypeId) -> Vec<TypeId> {
        match self.ty(id) {
            Type::Tuple(members) => members.clone(),
            _ => vec![id],
        }
    }

    /// Untyped constant types replaced by their default type.
    pub fn default_type(&mut self, id: TypeId) -> TypeId {
        match self.ty(id) {
            Type::Basic(kind) if kind.is_untyped() => match kind.default_kind() {
                Some(default) => self.basic(default),
                None => id,
            },
            _ => id,
        }
    }

    // ---- nodes ----

    pub fn type_of(&self, node: NodeId) -> Option<TypeId> {
        self.expr_types.get(&node).copied()
    }

    pub fn record_type(&mut self, node: NodeId, ty: TypeId) {
        self.expr_types.insert(node, ty);
    }

    pub fn def(&self, node: NodeId) -> Option<BindingId> {
        self.defs.get(&node).copied()
    }

    pub fn use_of(&self, node: NodeId) -> Option<BindingId> {
        self.uses.get(&node).copied()
    }

    /// Binding an identifier node defines or refers to.
    pub fn binding_of(&self, node: NodeId) -> Option<BindingId> {
        self.def(node).or_else(|| self.use_of(node))
    }

    pub fn record_def(&mut self, node: NodeId, binding: BindingId) {
        self.uses.remove(&node);
        self.defs.insert(node, binding);
    }

    pub fn record_use(&mut self, node: NodeId, binding: BindingId) {
        self.defs.remove(&node);
        self.uses.insert(node, binding);
    }

    pub fn selection(&self, node: NodeId) -> Option<Selection> {
        self.selections.get(&node).copied()
    }

    pub fn record_selection(&mut self, node: NodeId, selection: Selection) {
        self.selections.insert(node, selection);
    }

    /// Copy every entry recorded for `from` onto `to`.
    pub fn copy_node_info(&mut self, from: NodeId, to: NodeId) {
        if let Some(ty) = self.type_of(from) {
            self.expr_types.insert(to, ty);
        }
        if let Some(binding) = self.def(from) {
            self.defs.insert(to, binding);
        }
        if let Some(binding) = self.use_of(from) {
            self.uses.insert(to, binding);
        }
        if let Some(selection) = self.selection(from) {
            self.selections.insert(to, selection);
        }
        if let Some(scope) = self.scope_of(from) {
            self.scope_of.insert(to, scope);
        }
    }

    /// Largest node id the table mentions.
    pub fn max_node_id(&self) -> NodeId {
        [
            self.expr_types.keys().next_back(),
            self.defs.keys().next_back(),
            self.uses.keys().next_back(),
            self.selections.keys().next_back(),
            self.scope_of.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or_default()
    }

    // ---- bindings and scopes ----

    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id.0 as usize)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(index, binding)| (BindingId(index as u32), binding))
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0 as usize)
    }

    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.scope_of.get(&node).copied()
    }

    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            names: Default::default(),
        });
        id
    }

    pub fn attach_scope(&mut self, node: NodeId, scope: ScopeId) {
        self.scope_of.insert(node, scope);
    }

    /// Re-key the scope of `from` onto `to`, e.g. when a new block takes over
    /// the scope of the statement it wraps.
    pub fn move_scope(&mut self, from: NodeId, to: NodeId) -> Option<ScopeId> {
        let scope = self.scope_of.remove(&from)?;
        self.scope_of.insert(to, scope);
        Some(scope)
    }

    /// Whether `inner` is `outer` or nested inside it.
    pub fn is_within(&self, inner: ScopeId, outer: ScopeId) -> bool {
        let mut current = Some(inner);
        while let Some(scope) = current {
            if scope == outer {
                return true;
            }
            current = self.scope(scope).and_then(|s| s.parent);
        }
        false
    }

    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<BindingId> {
        self.scope(scope)?.names.get(name).copied()
    }

    /// Resolve a name from `scope` outwards.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<BindingId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id)?;
            if let Some(binding) = scope.names.get(name) {
                return Some(*binding);
            }
            current = scope.parent;
        }
        None
    }

    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        ty: Option<TypeId>,
        kind: BindingKind,
    ) -> BindingId {
        self.push_binding(Binding {
            name: name.into(),
            ty,
            scope,
            kind,
            synthetic: false,
        })
    }

    /// Register an engine-introduced variable.
    pub fn declare_synthetic(&mut self, scope: ScopeId, name: &str, ty: TypeId) -> BindingId {
        debug!("declaring synthetic `{}` in scope {}", name, scope.0);
        self.push_binding(Binding {
            name: name.to_string(),
            ty: Some(ty),
            scope,
            kind: BindingKind::Var,
            synthetic: true,
        })
    }

    fn push_binding(&mut self, binding: Binding) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        if let Some(scope) = self.scopes.get_mut(binding.scope.0 as usize) {
            scope.names.insert(binding.name.clone(), id);
        }
        self.bindings.push(binding);
        id
    }

    /// Mark names (typically every identifier spelled in the tree) as unavailable
    /// for synthetic bindings.
    pub fn reserve_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.taken_names.extend(names.into_iter().map(Into::into));
    }

    /// A name no binding and no reserved identifier uses: `prefix`, then
    /// `prefix1`, `prefix2`, ... The result is reserved.
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        for index in self.bindings_indexed..self.bindings.len() {
            let name = self.bindings[index].name.clone();
            self.taken_names.insert(name);
        }
        self.bindings_indexed = self.bindings.len();

        let mut candidate = prefix.to_string();
        let mut counter = 0u32;
        while self.taken_names.contains(&candidate) {
            counter += 1;
            candidate = format!("{}{}", prefix, counter);
        }
        self.taken_names.insert(candidate.clone());
        candidate
    }
}

/// Scope tracking for tree walks: pushes a node's recorded scope on entry and
/// pops it on exit. Nodes without a recorded scope leave the stack unchanged.
#[derive(Debug, Default, Clone)]
pub struct ScopeStack {
    frames: Vec<(NodeId, ScopeId)>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, node: NodeId, table: &SymbolTable) {
        if let Some(scope) = table.scope_of(node) {
            self.frames.push((node, scope));
        }
    }

    pub fn exit(&mut self, node: NodeId) {
        if matches!(self.frames.last(), Some((top, _)) if *top == node) {
            self.frames.pop();
        }
    }

    /// Innermost scope entered so far.
    pub fn current(&self) -> Option<ScopeId> {
        self.frames.last().map(|(_, scope)| *scope)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedups_structural_types() {
        let mut table = SymbolTable::new();
        let int = table.basic(BasicKind::Int);
        let p1 = table.intern(Type::Pointer(int));
        let p2 = table.intern(Type::Pointer(int));
        assert_eq!(p1, p2);

        let a = table.new_named(None, "T");
        let b = table.new_named(None, "T");
        assert_ne!(a, b);
    }

    #[test]
    fn test_category_follows_named_types() {
        let mut table = SymbolTable::new();
        let int = table.basic(BasicKind::Int);
        let point = table.new_named(None, "Point");
        let fields = table.intern(Type::Struct(vec![StructField {
            name: "x".to_string(),
            ty: int,
            embedded: false,
        }]));
        table.set_underlying(point, fields);
        let ptr = table.intern(Type::Pointer(point));
        let param = table.intern(Type::TypeParam {
            name: "T".to_string(),
        });

        assert_eq!(table.category(int), TypeCategory::Numeric);
        assert_eq!(table.category(point), TypeCategory::Composite);
        assert_eq!(table.category(ptr), TypeCategory::Nilable);
        assert_eq!(table.category(param), TypeCategory::Unsupported);
    }

    #[test]
    fn test_pointer_to_array_detection() {
        let mut table = SymbolTable::new();
        let int = table.basic(BasicKind::Int);
        let array = table.intern(Type::Array { len: 3, elem: int });
        let ptr = table.intern(Type::Pointer(array));
        let slice = table.intern(Type::Slice(int));
        let slice_ptr = table.intern(Type::Pointer(slice));

        assert!(table.is_pointer_to_array(ptr));
        assert!(!table.is_pointer_to_array(array));
        assert!(!table.is_pointer_to_array(slice_ptr));
    }

    #[test]
    fn test_lookup_local_ignores_outer_scopes() {
        let mut table = SymbolTable::new();
        let int = table.basic(BasicKind::Int);
        let outer = table.new_scope(table.universe());
        let inner = table.new_scope(outer);
        let x = table.declare(outer, "x", Some(int), BindingKind::Var);

        assert_eq!(table.lookup(inner, "x"), Some(x));
        assert_eq!(table.lookup_local(inner, "x"), None);
        assert!(table.is_within(inner, outer));
        assert!(!table.is_within(outer, inner));
    }

    #[test]
    fn test_fresh_name_avoids_bindings_and_reserved_names() {
        let mut table = SymbolTable::new();
        let int = table.basic(BasicKind::Int);
        let scope = table.new_scope(table.universe());
        table.declare(scope, "tmp", Some(int), BindingKind::Var);
        table.reserve_names(["tmp1"]);

        assert_eq!(table.fresh_name("tmp"), "tmp2");
        assert_eq!(table.fresh_name("tmp"), "tmp3");
    }

    #[test]
    fn test_interning_survives_serialization() {
        let mut table = SymbolTable::new();
        let int = table.basic(BasicKind::Int);
        let json = serde_json::to_string(&table).unwrap();
        let mut restored: SymbolTable = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.basic(BasicKind::Int), int);
    }

    #[test]
    fn test_scope_stack_only_tracks_scoped_nodes() {
        let mut table = SymbolTable::new();
        let scope = table.new_scope(table.universe());
        table.attach_scope(NodeId(1), scope);

        let mut stack = ScopeStack::new();
        stack.enter(NodeId(1), &table);
        stack.enter(NodeId(2), &table);
        assert_eq!(stack.current(), Some(scope));
        stack.exit(NodeId(2));
        assert_eq!(stack.depth(), 1);
        stack.exit(NodeId(1));
        assert_eq!(stack.current(), None);
    }
}
