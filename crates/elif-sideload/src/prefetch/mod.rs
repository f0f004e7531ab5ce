//! Prefetch directives and planning

pub mod directive;
pub mod planner;

pub use directive::{PrefetchDirective, PrefetchQuery};
pub use planner::{PrefetchPlan, RelationSource, ResolvedSource};
