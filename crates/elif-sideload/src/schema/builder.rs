//! Relation schema builder and validation

use std::collections::BTreeMap;

use tracing::warn;

use super::{FieldSpec, PrefetchDefinition, PrefetchOverride, RelationSchema};
use crate::error::{SideloadError, SideloadResult};
use crate::prefetch::PrefetchDirective;

/// Fluent builder for a [`RelationSchema`]
#[derive(Debug, Default)]
pub struct RelationSchemaBuilder {
    primary: Option<String>,
    fields: Vec<FieldSpec>,
    overrides: BTreeMap<String, PrefetchOverride>,
}

impl RelationSchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Designate the primary (base) field
    pub fn primary(mut self, name: impl Into<String>) -> Self {
        self.primary = Some(name.into());
        self
    }

    /// Declare a field
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Override the prefetches of a field
    pub fn prefetch(mut self, name: impl Into<String>, prefetch: impl Into<PrefetchOverride>) -> Self {
        self.overrides.insert(name.into(), prefetch.into());
        self
    }

    /// Validate the declarations and derive each relation's prefetches
    pub fn build(self) -> SideloadResult<RelationSchema> {
        self.try_build().map_err(|err| {
            warn!(target: "elif::sideload", error = %err, "invalid sideloadable schema");
            err
        })
    }

    fn try_build(self) -> SideloadResult<RelationSchema> {
        let primary_name = self.primary.ok_or_else(|| {
            SideloadError::schema(
                "Sideloadable schema must declare the 'primary' field name",
            )
        })?;

        let primary_index = self
            .fields
            .iter()
            .position(|field| field.name == primary_name)
            .ok_or_else(|| {
                SideloadError::schema(format!(
                    "Sideloadable schema primary '{}' must point to a declared field",
                    primary_name
                ))
            })?;

        for (index, field) in self.fields.iter().enumerate() {
            if self.fields[..index].iter().any(|other| other.name == field.name) {
                return Err(SideloadError::schema(format!(
                    "Sideloadable field '{}' is declared more than once",
                    field.name
                )));
            }
            if field.name != primary_name && !field.many {
                return Err(SideloadError::schema(format!(
                    "Sideloadable field '{}' must be set as many=True",
                    field.name
                )));
            }
            if field.multi_source && field.source.is_some() {
                return Err(SideloadError::schema(format!(
                    "Multi-source field '{}' can not declare a source; sources come from its prefetches",
                    field.name
                )));
            }
        }

        for name in self.overrides.keys() {
            if *name == primary_name {
                return Err(SideloadError::schema(format!(
                    "Primary field '{}' can not declare prefetches",
                    name
                )));
            }
            if !self.fields.iter().any(|field| field.name == *name) {
                return Err(SideloadError::schema(format!(
                    "Prefetches declared for '{}', which is not a sideloadable field",
                    name
                )));
            }
        }

        let primary_target = self.fields[primary_index].target.clone();
        let mut overrides = self.overrides;
        let mut prefetches = BTreeMap::new();

        for field in self.fields.iter().filter(|field| field.name != primary_name) {
            let definition = match overrides.remove(&field.name) {
                Some(PrefetchOverride::Sources(sources)) => {
                    if !field.multi_source {
                        return Err(SideloadError::schema(format!(
                            "Field '{}' declares multiple prefetch sources but is not a multi-source field",
                            field.name
                        )));
                    }
                    clean_sources(field, sources)?
                }
                Some(other) => {
                    if field.multi_source {
                        return Err(SideloadError::schema(format!(
                            "Multi-source field '{}' prefetches must map source keys to prefetches, got a {}",
                            field.name,
                            other.kind()
                        )));
                    }
                    PrefetchDefinition::Directives(clean_directives(&field.name, other)?)
                }
                None if field.multi_source => {
                    return Err(SideloadError::schema(format!(
                        "Cannot determine source for multi-source field '{}': declare its sources in prefetches",
                        field.name
                    )));
                }
                None => match &field.source {
                    Some(source) => PrefetchDefinition::Directives(vec![PrefetchDirective::new(source)]),
                    None if primary_target.has_relation(&field.name) => {
                        PrefetchDefinition::Directives(vec![PrefetchDirective::new(&field.name)])
                    }
                    None => {
                        return Err(SideloadError::schema(format!(
                            "Cannot determine source for sideloadable field '{}'",
                            field.name
                        )));
                    }
                },
            };
            prefetches.insert(field.name.clone(), definition);
        }

        Ok(RelationSchema {
            primary_name,
            primary_index,
            fields: self.fields,
            prefetches,
        })
    }
}

fn clean_directives(name: &str, prefetch: PrefetchOverride) -> SideloadResult<Vec<PrefetchDirective>> {
    let directives = match prefetch {
        PrefetchOverride::Path(path) => vec![PrefetchDirective::new(path)],
        PrefetchOverride::Directive(directive) => vec![directive],
        PrefetchOverride::List(directives) => directives,
        PrefetchOverride::Sources(_) => {
            return Err(SideloadError::schema(format!(
                "Prefetches for '{}' must be a path, a list of paths or a prefetch directive",
                name
            )));
        }
    };
    if let Some(empty) = directives.iter().find(|directive| directive.path.is_empty()) {
        return Err(SideloadError::schema(format!(
            "Prefetch for '{}' has an empty lookup path ({})",
            name, empty
        )));
    }
    Ok(directives)
}

fn clean_sources(
    field: &FieldSpec,
    sources: BTreeMap<String, PrefetchOverride>,
) -> SideloadResult<PrefetchDefinition> {
    if sources.is_empty() {
        return Err(SideloadError::schema(format!(
            "Multi-source field '{}' must declare at least one source",
            field.name
        )));
    }

    let mut cleaned = BTreeMap::new();
    for (key, prefetch) in sources {
        let qualified = format!("{}[{}]", field.name, key);
        let directives = clean_directives(&qualified, prefetch)?;
        if directives.is_empty() {
            return Err(SideloadError::schema(format!(
                "Source '{}' of multi-source field '{}' has no prefetch",
                key, field.name
            )));
        }
        let target = field.target.model_name();
        if let Some(query) = directives.iter().filter_map(|d| d.query.as_ref()).find(|q| q.model != target) {
            return Err(SideloadError::schema(format!(
                "Source '{}' of multi-source field '{}' selects '{}' records, expected '{}'",
                key, field.name, query.model, target
            )));
        }
        cleaned.insert(key, directives);
    }
    Ok(PrefetchDefinition::Sources(cleaned))
}
