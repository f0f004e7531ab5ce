//! Relation schema: the declared sideloadable fields of a view
//!
//! Built once from static declarations and read-only afterwards, so a
//! schema can be cached per view and shared across requests. Nothing about
//! an individual request is ever stored here.

mod builder;
mod field;

pub use builder::RelationSchemaBuilder;
pub use field::{FieldSpec, PrefetchOverride};

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::SideloadResult;
use crate::prefetch::PrefetchDirective;

/// Normalized prefetch definition of a relation field
#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchDefinition {
    /// Directives feeding a plain relation; may be empty
    Directives(Vec<PrefetchDirective>),
    /// Directives per sub-source of a multi-source relation
    Sources(BTreeMap<String, Vec<PrefetchDirective>>),
}

/// Where a sideloadable field reads its data from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldSources {
    Path(String),
    Sources(BTreeMap<String, String>),
}

/// Validated set of sideloadable fields
#[derive(Debug, Clone)]
pub struct RelationSchema {
    primary_name: String,
    primary_index: usize,
    fields: Vec<FieldSpec>,
    prefetches: BTreeMap<String, PrefetchDefinition>,
}

impl RelationSchema {
    pub fn builder() -> RelationSchemaBuilder {
        RelationSchemaBuilder::new()
    }

    /// Build a schema from declared fields, the primary field name and
    /// user prefetch overrides
    pub fn build(
        fields: Vec<FieldSpec>,
        primary_name: &str,
        overrides: BTreeMap<String, PrefetchOverride>,
    ) -> SideloadResult<Self> {
        let mut builder = RelationSchemaBuilder::new().primary(primary_name);
        for field in fields {
            builder = builder.field(field);
        }
        for (name, prefetch) in overrides {
            builder = builder.prefetch(name, prefetch);
        }
        builder.build()
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    pub fn primary(&self) -> &FieldSpec {
        &self.fields[self.primary_index]
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Names of the sideloadable relations, in declaration order
    pub fn relation_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|field| field.name != self.primary_name)
            .map(|field| field.name.as_str())
            .collect()
    }

    /// Whether `name` is a declared, non-primary relation
    pub fn is_relation(&self, name: &str) -> bool {
        name != self.primary_name && self.field(name).is_some()
    }

    pub fn is_multi_source(&self, name: &str) -> bool {
        matches!(self.prefetches.get(name), Some(PrefetchDefinition::Sources(_)))
    }

    /// Declared sub-source keys of a multi-source relation
    pub fn sub_sources(&self, name: &str) -> Option<Vec<&str>> {
        match self.prefetches.get(name) {
            Some(PrefetchDefinition::Sources(sources)) => {
                Some(sources.keys().map(String::as_str).collect())
            }
            _ => None,
        }
    }

    pub fn prefetch_definition(&self, name: &str) -> Option<&PrefetchDefinition> {
        self.prefetches.get(name)
    }

    /// Source path per relation, or per sub-source for multi-source fields
    pub fn sideloading_field_sources(&self) -> BTreeMap<String, FieldSources> {
        self.prefetches
            .iter()
            .map(|(name, definition)| {
                let sources = match definition {
                    PrefetchDefinition::Directives(directives) => {
                        let path = self
                            .field(name)
                            .and_then(|field| field.source.clone())
                            .or_else(|| directives.first().map(PrefetchDirective::attachment_key))
                            .unwrap_or_else(|| name.clone());
                        FieldSources::Path(path)
                    }
                    PrefetchDefinition::Sources(sources) => FieldSources::Sources(
                        sources
                            .iter()
                            .map(|(key, directives)| {
                                let path = directives
                                    .first()
                                    .map(PrefetchDirective::attachment_key)
                                    .unwrap_or_default();
                                (key.clone(), path)
                            })
                            .collect(),
                    ),
                };
                (name.clone(), sources)
            })
            .collect()
    }
}
