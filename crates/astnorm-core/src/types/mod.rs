/*!
# Type/Symbol Adapter

Resolved types and scope bindings supplied by the external type checker. The
engine reads them to decide dereferences, annotations and zero values, and
extends them when it introduces synthetic names.
*/

pub mod spell;
pub mod table;

pub use spell::FileInfo;
pub use table::{ScopeStack, SymbolTable};

use serde::{Deserialize, Serialize};

use crate::ast::ChanDir;

/// Index into the table's type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,
    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedComplex,
    UntypedString,
    UntypedNil,
}

impl BasicKind {
    pub fn name(&self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::UnsafePointer => "unsafe.Pointer",
            BasicKind::UntypedBool => "untyped bool",
            BasicKind::UntypedInt => "untyped int",
            BasicKind::UntypedRune => "untyped rune",
            BasicKind::UntypedFloat => "untyped float",
            BasicKind::UntypedComplex => "untyped complex",
            BasicKind::UntypedString => "untyped string",
            BasicKind::UntypedNil => "untyped nil",
        }
    }

    pub fn is_untyped(&self) -> bool {
        matches!(
            self,
            BasicKind::UntypedBool
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
                | BasicKind::UntypedFloat
                | BasicKind::UntypedComplex
                | BasicKind::UntypedString
                | BasicKind::UntypedNil
        )
    }

    /// Type an untyped constant takes when nothing else constrains it.
    /// `untyped nil` has no default.
    pub fn default_kind(&self) -> Option<BasicKind> {
        match self {
            BasicKind::UntypedBool => Some(BasicKind::Bool),
            BasicKind::UntypedInt => Some(BasicKind::Int),
            BasicKind::UntypedRune => Some(BasicKind::Int32),
            BasicKind::UntypedFloat => Some(BasicKind::Float64),
            BasicKind::UntypedComplex => Some(BasicKind::Complex128),
            BasicKind::UntypedString => Some(BasicKind::String),
            BasicKind::UntypedNil => None,
            other => Some(*other),
        }
    }

    fn category(&self) -> TypeCategory {
        match self {
            BasicKind::Bool | BasicKind::UntypedBool => TypeCategory::Boolean,
            BasicKind::String | BasicKind::UntypedString => TypeCategory::String,
            BasicKind::UnsafePointer | BasicKind::UntypedNil => TypeCategory::Nilable,
            _ => TypeCategory::Numeric,
        }
    }
}

/// Package a named type belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
    #[serde(default)]
    pub embedded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceMethod {
    pub name: String,
    /// Always a `Type::Signature`
    pub sig: TypeId,
}

/// A resolved type. Composite types refer to their parts through the arena, so
/// recursive named types are expressible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Basic(BasicKind),
    /// `package: None` for predeclared names such as `error`
    Named {
        package: Option<Package>,
        name: String,
        underlying: Option<TypeId>,
        #[serde(default)]
        args: Vec<TypeId>,
    },
    Pointer(TypeId),
    Slice(TypeId),
    Array {
        len: u64,
        elem: TypeId,
    },
    Map {
        key: TypeId,
        value: TypeId,
    },
    Chan {
        dir: ChanDir,
        elem: TypeId,
    },
    Signature {
        params: Vec<TypeId>,
        results: Vec<TypeId>,
        #[serde(default)]
        variadic: bool,
    },
    Struct(Vec<StructField>),
    Interface(Vec<InterfaceMethod>),
    /// Result list of a multi-value call
    Tuple(Vec<TypeId>),
    TypeParam {
        name: String,
    },
    Invalid,
}

/// Coarse classification used to pick a zero value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCategory {
    /// zero is `0`
    Numeric,
    /// zero is `false`
    Boolean,
    /// zero is `""`
    String,
    /// pointer, interface, function, channel, slice, map: zero is `nil`
    Nilable,
    /// struct or array: zero is `T{}`
    Composite,
    Unsupported,
}

impl Type {
    fn shallow_category(&self) -> Option<TypeCategory> {
        let category = match self {
            Type::Basic(kind) => kind.category(),
            Type::Pointer(_)
            | Type::Slice(_)
            | Type::Map { .. }
            | Type::Chan { .. }
            | Type::Signature { .. }
            | Type::Interface(_) => TypeCategory::Nilable,
            Type::Struct(_) | Type::Array { .. } => TypeCategory::Composite,
            Type::Tuple(_) | Type::TypeParam { .. } | Type::Invalid => TypeCategory::Unsupported,
            Type::Named { .. } => return None,
        };
        Some(category)
    }
}

/// What a selector expression resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Field,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    Var,
    Const,
    TypeName,
    Func,
    Package,
    Builtin,
    Nil,
}

/// A (name, scope) pair with its resolved type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub ty: Option<TypeId>,
    pub scope: ScopeId,
    pub kind: BindingKind,
    /// Introduced by the engine rather than the type checker
    #[serde(default)]
    pub synthetic: bool,
}

/// A lexical scope: its parent and the names declared directly in it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub names: indexmap::IndexMap<String, BindingId>,
}
