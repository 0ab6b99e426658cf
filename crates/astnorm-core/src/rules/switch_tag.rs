/*!
# Switch Tagger

Gives every tag-less expression switch the constant tag `true`, so that
`switch { case x > 0: ... }` becomes `switch true { case x > 0: ... }`.
*/

use crate::ast::visit::{walk_stmt, VisitMut};
use crate::ast::*;
use crate::error::NormalizeResult;
use crate::invariants::Invariant;
use crate::pipeline::{NormalizationRule, RuleContext};
use crate::types::BasicKind;

pub struct SwitchTagger;

impl SwitchTagger {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SwitchTagger {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for SwitchTagger {
    fn name(&self) -> &'static str {
        "switch-tag"
    }

    fn description(&self) -> &'static str {
        "Adds the constant tag `true` to tag-less expression switches"
    }

    fn establishes(&self) -> &'static [Invariant] {
        &[Invariant::TaggedSwitch]
    }

    fn apply(&self, file: &mut SourceFile, cx: &mut RuleContext<'_>) -> NormalizeResult<usize> {
        let mut visitor = TagVisitor { cx, rewrites: 0 };
        visitor.visit_file(file)?;
        Ok(visitor.rewrites)
    }
}

struct TagVisitor<'c, 'a> {
    cx: &'c mut RuleContext<'a>,
    rewrites: usize,
}

impl VisitMut for TagVisitor<'_, '_> {
    fn visit_stmt(&mut self, stmt: &mut Stmt) -> NormalizeResult<()> {
        if let StmtKind::Switch { tag: tag @ None, .. } = &mut stmt.kind {
            let bool_type = self.cx.table.basic(BasicKind::Bool);
            *tag = Some(self.cx.expr(ExprKind::Lit(Literal::Bool(true)), Some(bool_type)));
            self.rewrites += 1;
        }
        walk_stmt(self, stmt)
    }
}
