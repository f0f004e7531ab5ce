//! Prefetch planning
//!
//! Turns a validated selection into exactly one prefetch directive per
//! attachment key, merged with whatever the queryset already carries, and
//! records where each selected relation reads its rows from.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{PrefetchDirective, PrefetchQuery};
use crate::error::{SideloadError, SideloadResult};
use crate::orm::{Predicate, QuerySet};
use crate::schema::{PrefetchDefinition, RelationSchema};
use crate::selection::SideloadSelection;

/// Where one relation (or one sub-source) reads its rows from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    /// Attribute path walked on materialized rows
    pub attachment_key: String,
    /// Relation path projected for identifier fan-out
    pub lookup_path: String,
    /// Filter narrowing the related rows
    pub query: Option<PrefetchQuery>,
}

impl ResolvedSource {
    fn from_directive(directive: &PrefetchDirective) -> Self {
        Self {
            attachment_key: directive.attachment_key(),
            lookup_path: directive.path.clone(),
            query: directive.query.clone(),
        }
    }

    fn from_path(path: &str) -> Self {
        Self {
            attachment_key: path.to_string(),
            lookup_path: path.to_string(),
            query: None,
        }
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.query.as_ref().map(|query| &query.predicate)
    }
}

/// Resolved source of a selected relation
#[derive(Debug, Clone, PartialEq)]
pub enum RelationSource {
    Single(ResolvedSource),
    /// Selected sub-source key to its source
    Multi(BTreeMap<String, ResolvedSource>),
}

impl RelationSource {
    /// Every source feeding the relation
    pub fn resolved(&self) -> Vec<&ResolvedSource> {
        match self {
            RelationSource::Single(source) => vec![source],
            RelationSource::Multi(sources) => sources.values().collect(),
        }
    }
}

/// Gathered directives and per-relation sources for one request
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchPlan {
    primary_name: String,
    directives: BTreeMap<String, PrefetchDirective>,
    sources: Vec<(String, RelationSource)>,
}

impl PrefetchPlan {
    /// Plan the prefetches for `selection`.
    ///
    /// `upstream` are the directives already attached to the queryset; they
    /// are kept, and an unfiltered one is never narrowed by sideloading.
    pub fn build(
        schema: &RelationSchema,
        selection: &SideloadSelection,
        upstream: &[PrefetchDirective],
    ) -> SideloadResult<Self> {
        let mut gatherer = Gatherer::default();
        for directive in upstream {
            gatherer.register(directive.clone())?;
        }
        gatherer.upstream_unfiltered = gatherer
            .directives
            .iter()
            .filter(|(_, directive)| !directive.is_filtered())
            .map(|(key, _)| key.clone())
            .collect();

        let mut sources = Vec::with_capacity(selection.len());
        for (name, requested) in selection.iter() {
            let definition = schema.prefetch_definition(name).ok_or_else(|| {
                SideloadError::internal(format!("No prefetch definition for selected relation '{}'", name))
            })?;

            let source = match definition {
                PrefetchDefinition::Directives(directives) => {
                    let explicit = schema.field(name).and_then(|field| field.source.as_deref());
                    let resolved = resolve_source(name, explicit, directives)?;
                    for directive in directives {
                        gatherer.register(directive.clone())?;
                    }
                    RelationSource::Single(resolved)
                }
                PrefetchDefinition::Sources(declared) => {
                    let mut resolved = BTreeMap::new();
                    for (key, directives) in declared {
                        if requested.is_some_and(|requested| !requested.contains(key)) {
                            continue;
                        }
                        let directive = match directives.as_slice() {
                            [directive] => directive,
                            [] => {
                                return Err(SideloadError::internal(format!(
                                    "Source '{}' of '{}' has no prefetch",
                                    key, name
                                )))
                            }
                            _ => {
                                return Err(SideloadError::schema(format!(
                                    "Source '{}' of '{}' chains {} prefetches; express the chain inside a single filtered prefetch",
                                    key,
                                    name,
                                    directives.len()
                                )))
                            }
                        };
                        gatherer.register(directive.clone())?;
                        resolved.insert(key.clone(), ResolvedSource::from_directive(directive));
                    }
                    RelationSource::Multi(resolved)
                }
            };
            sources.push((name.to_string(), source));
        }

        // A relation reads whatever ended up attached at its key.
        for (_, source) in sources.iter_mut() {
            let resolved: Vec<&mut ResolvedSource> = match source {
                RelationSource::Single(resolved) => vec![resolved],
                RelationSource::Multi(resolved) => resolved.values_mut().collect(),
            };
            for resolved in resolved {
                if let Some(directive) = gatherer.directives.get(&resolved.attachment_key) {
                    resolved.query = directive.query.clone();
                }
            }
        }

        let plan = Self {
            primary_name: schema.primary_name().to_string(),
            directives: gatherer.directives,
            sources,
        };
        debug!(
            target: "elif::sideload",
            directives = ?plan.directives.values().map(ToString::to_string).collect::<Vec<_>>(),
            "planned sideload prefetches"
        );
        Ok(plan)
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    /// Gathered directives in attachment key order
    pub fn directives(&self) -> Vec<PrefetchDirective> {
        self.directives.values().cloned().collect()
    }

    pub fn attachment_keys(&self) -> Vec<&str> {
        self.directives.keys().map(String::as_str).collect()
    }

    /// Selected relations and their sources, in selection order
    pub fn sources(&self) -> &[(String, RelationSource)] {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&RelationSource> {
        self.sources
            .iter()
            .find(|(relation, _)| relation == name)
            .map(|(_, source)| source)
    }

    /// Replace the queryset's prefetches with the gathered set
    pub fn apply<Q: QuerySet>(&self, queryset: Q) -> Q {
        queryset.without_prefetches().prefetch_related(self.directives())
    }
}

#[derive(Default)]
struct Gatherer {
    directives: BTreeMap<String, PrefetchDirective>,
    upstream_unfiltered: BTreeSet<String>,
}

impl Gatherer {
    fn register(&mut self, directive: PrefetchDirective) -> SideloadResult<()> {
        let key = directive.attachment_key();
        let Some(existing) = self.directives.get(&key) else {
            self.directives.insert(key, directive);
            return Ok(());
        };

        if existing.path != directive.path {
            return Err(SideloadError::collision(
                key,
                format!(
                    "different prefetches for the same attribute: '{}' and '{}'",
                    existing.path, directive.path
                ),
            ));
        }

        match (&existing.query, &directive.query) {
            (None, None) => Ok(()),
            (None, Some(_)) => {
                if self.upstream_unfiltered.contains(&key) {
                    return Err(SideloadError::collision(
                        key,
                        "the queryset already prefetches this attribute unfiltered; a filtered sideload prefetch would narrow it",
                    ));
                }
                self.directives.insert(key, directive);
                Ok(())
            }
            (Some(_), None) => Ok(()),
            (Some(current), Some(incoming)) => {
                if current.is_equivalent(incoming) {
                    Ok(())
                } else {
                    Err(SideloadError::collision(
                        key,
                        format!(
                            "conflicting filters: [{} WHERE {}] and [{} WHERE {}]",
                            current.model, current.predicate, incoming.model, incoming.predicate
                        ),
                    ))
                }
            }
        }
    }
}

fn resolve_source(
    name: &str,
    explicit: Option<&str>,
    directives: &[PrefetchDirective],
) -> SideloadResult<ResolvedSource> {
    if let Some(source) = explicit {
        let matching = directives
            .iter()
            .find(|directive| directive.attachment_key() == source)
            .or_else(|| directives.iter().find(|directive| directive.path == source));
        return Ok(match matching {
            Some(directive) => ResolvedSource::from_directive(directive),
            None => ResolvedSource::from_path(source),
        });
    }

    match directives {
        [] => Ok(ResolvedSource::from_path(name)),
        [directive] => Ok(ResolvedSource::from_directive(directive)),
        _ => directives
            .iter()
            .find(|directive| directive.attachment_key() == name)
            .map(ResolvedSource::from_directive)
            .ok_or_else(|| {
                SideloadError::schema(format!(
                    "Relation '{}' declares {} prefetches but no source; name the field after one of them or set its source",
                    name,
                    directives.len()
                ))
            }),
    }
}
