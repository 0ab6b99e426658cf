/*!
# Normalization Rule Units

The ten rewrites that together bring a file into normal form. Each unit is a
[`NormalizationRule`](crate::pipeline::NormalizationRule) that walks the file
once (or to a fixpoint) through the symbol table.
*/

mod common;

pub mod explicit_deref;
pub mod explicit_discard;
pub mod explicit_type;
pub mod for_loop;
pub mod hoist_init;
pub mod parallel_assign;
pub mod short_decl;
pub mod split_decl;
pub mod switch_tag;
pub mod zero_value;

pub use explicit_deref::DerefInserter;
pub use explicit_discard::DiscardExpander;
pub use explicit_type::TypeAnnotator;
pub use for_loop::LoopCanonicalizer;
pub use hoist_init::InitHoister;
pub use parallel_assign::ParallelAssignSplitter;
pub use short_decl::ShortDeclEliminator;
pub use split_decl::DeclSplitter;
pub use switch_tag::SwitchTagger;
pub use zero_value::ZeroValueInitializer;

use crate::pipeline::NormalizationRule;

/// Every rule in the default, dependency-respecting order.
pub fn default_rules() -> Vec<Box<dyn NormalizationRule>> {
    vec![
        Box::new(DerefInserter::new()),
        Box::new(SwitchTagger::new()),
        Box::new(InitHoister::new()),
        Box::new(LoopCanonicalizer::new()),
        Box::new(DeclSplitter::new()),
        Box::new(TypeAnnotator::new()),
        Box::new(ZeroValueInitializer::new()),
        Box::new(ShortDeclEliminator::new()),
        Box::new(ParallelAssignSplitter::new()),
        Box::new(DiscardExpander::new()),
    ]
}
