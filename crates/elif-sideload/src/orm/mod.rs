//! Interfaces the ORM collaborator must provide
//!
//! Sideloading never builds SQL. It only decides which eager-load directives
//! a queryset carries, walks the rows it materializes, and issues
//! "identifier in set" lookups through [`TargetModel`].

pub mod predicate;
pub mod queryset;
pub mod record;

pub use predicate::*;
pub use queryset::*;
pub use record::*;

/// Separator between hops of a lookup path
pub const LOOKUP_SEP: &str = "__";

/// Normalize a dotted or `__` separated attribute path to `__` form
pub fn normalize_path(path: &str) -> String {
    path.split(|c| c == '.')
        .flat_map(|segment| segment.split(LOOKUP_SEP))
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(LOOKUP_SEP)
}

/// Hops of a `__` separated lookup path
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(LOOKUP_SEP).filter(|s| !s.is_empty()).collect()
}
