/*!
# Type Annotator

Spells out the type of every `var` declaration that omits it, using the type
the checker resolved for the declared name (or, failing that, for its
initializer). Untyped constants take their default type: `var n = 1` becomes
`var n int = 1`.

A type that cannot be written in this file (an unexported type of another
package, say) leaves the declaration as it is and is reported.
*/

use crate::ast::visit::{walk_gen_decl, VisitMut};
use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult};
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::rules::common::spec_snippet;
use crate::types::TypeId;

pub struct TypeAnnotator;

impl TypeAnnotator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TypeAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for TypeAnnotator {
    fn name(&self) -> &'static str {
        "explicit-type"
    }

    fn description(&self) -> &'static str {
        "Adds the resolved type to var declarations that omit it"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["split-decl"]
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::TypedDecl]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = AnnotateVisitor { cx, rewrites: 0 };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

struct AnnotateVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    rewrites: usize,
}

impl AnnotateVisitor<'_, '_> {
    /// Resolved type of the `position`th name of `spec`.
    fn name_type(&mut self, spec: &ValueSpec, position: usize) -> NormalizeResult<TypeId> {
        let name = &spec.names[position];
        let declared = self
            .cx
            .table
            .def(name.id)
            .and_then(|b| self.cx.table.binding(b))
            .and_then(|b| b.ty);
        let from_value = || {
            if spec.values.len() == 1 && spec.names.len() > 1 {
                let tuple = self.cx.table.type_of(spec.values[0].id)?;
                self.cx.table.results(tuple).get(position).copied()
            } else {
                spec.values
                    .get(position)
                    .and_then(|value| self.cx.table.type_of(value.id))
            }
        };
        let ty = declared
            .or_else(from_value)
            .ok_or(NormalizeError::MissingType {
                node: name.id,
                what: "declared name",
            })?;
        Ok(self.cx.table.default_type(ty))
    }

    fn annotation(&mut self, spec: &ValueSpec) -> NormalizeResult<TypeExpr> {
        let mut types = Vec::with_capacity(spec.names.len());
        for position in 0..spec.names.len() {
            types.push(self.name_type(spec, position)?);
        }
        match types.as_slice() {
            [first, rest @ ..] if rest.iter().all(|ty| ty == first) => self.cx.spell(*first, spec.id),
            _ => Err(NormalizeError::TupleDeclaration { node: spec.id }),
        }
    }
}

impl VisitMut for AnnotateVisitor<'_, '_> {
    fn visit_gen_decl(&mut self, gen: &mut GenDecl) -> NormalizeResult<()> {
        walk_gen_decl(self, gen)?;
        if !gen.is_var() {
            return Ok(());
        }
        for spec in &mut gen.specs {
            let Spec::Value(spec) = spec else {
                continue;
            };
            if spec.ty.is_some() {
                continue;
            }
            match self.annotation(spec) {
                Ok(ty) => {
                    spec.ty = Some(ty);
                    self.rewrites += 1;
                }
                Err(error) => self.cx.tolerate(error, Some(spec_snippet(spec)))?,
            }
        }
        Ok(())
    }
}
