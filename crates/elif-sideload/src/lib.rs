//! # elif-sideload: Relation sideloading for elif.rs
//!
//! Lets a client ask for related collections next to the primary one with a
//! single query parameter (`?sideload=categories,suppliers`), without N+1
//! queries and without always eager-loading.
//!
//! The pipeline is: [`SideloadSelection::parse`] validates the parameter
//! against a [`RelationSchema`], [`PrefetchPlan::build`] gathers one prefetch
//! directive per attachment key, the reducer ([`reduce_page`] for a
//! materialized page, [`reduce_queryset`] for identifier fan-out) collects
//! deduplicated related rows, and [`render_page`] produces the nested or
//! flattened body.

pub mod config;
pub mod error;
pub mod fields;
pub mod flatten;
pub mod openapi;
pub mod orm;
pub mod prefetch;
pub mod reducer;
pub mod render;
pub mod schema;
pub mod selection;
pub mod serializer;
pub mod validation;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

// Re-export the pipeline
pub use config::{ConfigError, SideloadConfig, SideloadDefaults};
pub use error::{OrmError, OrmResult, SideloadError, SideloadResult};
pub use fields::FieldSelection;
pub use openapi::{sideload_parameter, ParameterDoc};
pub use orm::{
    Attribute, ExpandableRelation, Predicate, QueryOperator, QuerySet, Record, RecordKey,
    RecordRef, TargetModel,
};
pub use prefetch::{PrefetchDirective, PrefetchPlan, PrefetchQuery, RelationSource, ResolvedSource};
pub use reducer::{reduce_page, reduce_queryset, SideloadablePage};
pub use render::{render_page, render_records, RenderOptions};
pub use schema::{FieldSources, FieldSpec, PrefetchDefinition, PrefetchOverride, RelationSchema, RelationSchemaBuilder};
pub use selection::SideloadSelection;
pub use serializer::RecordSerializer;
pub use validation::{ValidationError, ValidationErrors};
