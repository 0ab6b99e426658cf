/*!
# Zero-Value Initializer

Gives every `var` declaration without initializers an explicit zero value per
name: `var n int` becomes `var n int = 0`, `var p *T` becomes `var p *T = nil`
and `var s S` becomes `var s S = S{}`.

Names whose type has no literal zero (type parameters, say) keep their
declaration as it is; the pass reports them and moves on.
*/

use crate::ast::visit::{walk_gen_decl, VisitMut};
use crate::ast::*;
use crate::error::{NormalizeError, NormalizeResult};
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::rules::common::{spec_snippet, zero_value};
use crate::types::TypeId;

pub struct ZeroValueInitializer;

impl ZeroValueInitializer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ZeroValueInitializer {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for ZeroValueInitializer {
    fn name(&self) -> &'static str {
        "zero-value"
    }

    fn description(&self) -> &'static str {
        "Adds an explicit zero-value initializer to var declarations without one"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["explicit-type"]
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::InitializedDecl]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = ZeroVisitor { cx, rewrites: 0 };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

struct ZeroVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    rewrites: usize,
}

impl ZeroVisitor<'_, '_> {
    fn binding_type(&self, name: &Ident) -> Option<TypeId> {
        self.cx
            .table
            .def(name.id)
            .and_then(|b| self.cx.table.binding(b))
            .and_then(|b| b.ty)
    }

    /// One zero per name. A blank name borrows the type of a named sibling,
    /// since blanks bind nothing.
    fn zeros(&mut self, spec: &ValueSpec) -> NormalizeResult<Vec<Expr>> {
        let sibling = spec.names.iter().find_map(|name| self.binding_type(name));
        let mut values = Vec::with_capacity(spec.names.len());
        for name in &spec.names {
            let ty = self
                .binding_type(name)
                .or(sibling)
                .ok_or(NormalizeError::MissingType {
                    node: name.id,
                    what: "declared name",
                })?;
            values.push(zero_value(self.cx, ty, &name.name, spec.id)?);
        }
        Ok(values)
    }
}

impl VisitMut for ZeroVisitor<'_, '_> {
    fn visit_gen_decl(&mut self, gen: &mut GenDecl) -> NormalizeResult<()> {
        walk_gen_decl(self, gen)?;
        if !gen.is_var() {
            return Ok(());
        }
        for spec in &mut gen.specs {
            let Spec::Value(spec) = spec else {
                continue;
            };
            if !spec.values.is_empty() {
                continue;
            }
            match self.zeros(spec) {
                Ok(values) => {
                    spec.values = values;
                    self.rewrites += 1;
                }
                Err(error) => self.cx.tolerate(error, Some(spec_snippet(spec)))?,
            }
        }
        Ok(())
    }
}
