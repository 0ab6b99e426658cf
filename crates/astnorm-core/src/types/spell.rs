//! Spelling resolved types back as syntax, and rendering them for messages.

use super::*;
use crate::ast::{FieldExpr, Import, MethodExpr, NodeId, SourceFile, TypeExpr};
use crate::error::{NormalizeError, NormalizeResult};

/// What a file can name: its own package and its imports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInfo {
    pub package: String,
    pub path: String,
    pub imports: Vec<Import>,
}

impl FileInfo {
    pub fn of(file: &SourceFile) -> Self {
        Self {
            package: file.package.clone(),
            path: file.path.clone(),
            imports: file.imports.clone(),
        }
    }

    fn is_local(&self, package: &Package) -> bool {
        if !self.path.is_empty() && !package.path.is_empty() {
            self.path == package.path
        } else {
            self.package == package.name
        }
    }

    /// Local name of the import bringing `package` into scope.
    fn qualifier(&self, package: &Package) -> Option<&str> {
        self.imports
            .iter()
            .find(|import| import.path == package.path)
            .map(Import::local_name)
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().map(char::is_uppercase).unwrap_or(false)
}

impl SymbolTable {
    /// Spell `ty` as a type expression valid inside `file`. `node` names the
    /// declaration the spelling is for, in case it fails.
    pub fn type_expr(&self, ty: TypeId, file: &FileInfo, node: NodeId) -> NormalizeResult<TypeExpr> {
        let unspellable = || NormalizeError::UnspellableType {
            node,
            ty: self.display(ty),
        };
        let spelled = match self.ty(ty) {
            Type::Basic(BasicKind::UnsafePointer) => {
                let unsafe_pkg = Package {
                    path: "unsafe".to_string(),
                    name: "unsafe".to_string(),
                };
                let qualifier = file.qualifier(&unsafe_pkg).ok_or_else(unspellable)?;
                TypeExpr::Qualified {
                    package: qualifier.to_string(),
                    name: "Pointer".to_string(),
                }
            }
            Type::Basic(kind) => {
                let kind = kind.default_kind().ok_or_else(unspellable)?;
                TypeExpr::Named(kind.name().to_string())
            }
            Type::Named {
                package,
                name,
                args,
                ..
            } => {
                let base = match package {
                    None => TypeExpr::Named(name.clone()),
                    Some(package) if file.is_local(package) => TypeExpr::Named(name.clone()),
                    Some(package) => {
                        if !is_exported(name) {
                            return Err(unspellable());
                        }
                        let qualifier = file.qualifier(package).ok_or_else(unspellable)?;
                        TypeExpr::Qualified {
                            package: qualifier.to_string(),
                            name: name.clone(),
                        }
                    }
                };
                if args.is_empty() {
                    base
                } else {
                    TypeExpr::Generic {
                        base: Box::new(base),
                        args: self.type_exprs(args, file, node)?,
                    }
                }
            }
            Type::Pointer(elem) => TypeExpr::Pointer(Box::new(self.type_expr(*elem, file, node)?)),
            Type::Slice(elem) => TypeExpr::Slice(Box::new(self.type_expr(*elem, file, node)?)),
            Type::Array { len, elem } => TypeExpr::Array {
                len: Some(*len),
                elem: Box::new(self.type_expr(*elem, file, node)?),
            },
            Type::Map { key, value } => TypeExpr::Map {
                key: Box::new(self.type_expr(*key, file, node)?),
                value: Box::new(self.type_expr(*value, file, node)?),
            },
            Type::Chan { dir, elem } => TypeExpr::Chan {
                dir: *dir,
                elem: Box::new(self.type_expr(*elem, file, node)?),
            },
            Type::Signature {
                params,
                results,
                variadic,
            } => TypeExpr::Func {
                params: self.type_exprs(params, file, node)?,
                results: self.type_exprs(results, file, node)?,
                variadic: *variadic,
            },
            Type::Struct(fields) => {
                let mut spelled = Vec::with_capacity(fields.len());
                for field in fields {
                    spelled.push(FieldExpr {
                        name: (!field.embedded).then(|| field.name.clone()),
                        ty: self.type_expr(field.ty, file, node)?,
                    });
                }
                TypeExpr::Struct(spelled)
            }
            Type::Interface(methods) => {
                let mut spelled = Vec::with_capacity(methods.len());
                for method in methods {
                    spelled.push(MethodExpr {
                        name: method.name.clone(),
                        sig: self.type_expr(method.sig, file, node)?,
                    });
                }
                TypeExpr::Interface(spelled)
            }
            Type::TypeParam { name } => TypeExpr::Named(name.clone()),
            Type::Tuple(_) | Type::Invalid => return Err(unspellable()),
        };
        Ok(spelled)
    }

    fn type_exprs(&self, types: &[TypeId], file: &FileInfo, node: NodeId) -> NormalizeResult<Vec<TypeExpr>> {
        types
            .iter()
            .map(|ty| self.type_expr(*ty, file, node))
            .collect()
    }

    /// Human-readable rendering of a type.
    pub fn display(&self, ty: TypeId) -> String {
        match self.ty(ty) {
            Type::Basic(kind) => kind.name().to_string(),
            Type::Named {
                package, name, args, ..
            } => {
                let mut out = match package {
                    Some(package) => format!("{}.{}", package.name, name),
                    None => name.clone(),
                };
                if !args.is_empty() {
                    out.push('[');
                    out.push_str(&self.display_list(args));
                    out.push(']');
                }
                out
            }
            Type::Pointer(elem) => format!("*{}", self.display(*elem)),
            Type::Slice(elem) => format!("[]{}", self.display(*elem)),
            Type::Array { len, elem } => format!("[{}]{}", len, self.display(*elem)),
            Type::Map { key, value } => {
                format!("map[{}]{}", self.display(*key), self.display(*value))
            }
            Type::Chan { dir, elem } => match dir {
                crate::ast::ChanDir::Both => format!("chan {}", self.display(*elem)),
                crate::ast::ChanDir::Send => format!("chan<- {}", self.display(*elem)),
                crate::ast::ChanDir::Recv => format!("<-chan {}", self.display(*elem)),
            },
            Type::Signature {
                params, results, ..
            } => match results.len() {
                0 => format!("func({})", self.display_list(params)),
                1 => format!(
                    "func({}) {}",
                    self.display_list(params),
                    self.display(results[0])
                ),
                _ => format!(
                    "func({}) ({})",
                    self.display_list(params),
                    self.display_list(results)
                ),
            },
            Type::Struct(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|field| {
                        if field.embedded {
                            self.display(field.ty)
                        } else {
                            format!("{} {}", field.name, self.display(field.ty))
                        }
                    })
                    .collect();
                format!("struct{{{}}}", parts.join("; "))
            }
            Type::Interface(methods) if methods.is_empty() => "interface{}".to_string(),
            Type::Interface(methods) => {
                let names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
                format!("interface{{{}}}", names.join("; "))
            }
            Type::Tuple(members) => format!("({})", self.display_list(members)),
            Type::TypeParam { name } => name.clone(),
            Type::Invalid => "invalid type".to_string(),
        }
    }

    fn display_list(&self, types: &[TypeId]) -> String {
        types
            .iter()
            .map(|ty| self.display(*ty))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
