//! Declared sideloadable fields and prefetch overrides

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::orm::{normalize_path, TargetModel};
use crate::prefetch::PrefetchDirective;
use crate::serializer::RecordSerializer;

/// One declared output field of a sideloadable view
#[derive(Clone)]
pub struct FieldSpec {
    /// Output key
    pub name: String,
    /// `__` separated attribute path on the primary model
    pub source: Option<String>,
    /// Whether the field is a collection
    pub many: bool,
    /// Whether the field merges several relations, selected by sub-source key
    pub multi_source: bool,
    /// Model the field's records belong to
    pub target: Arc<dyn TargetModel>,
    pub serializer: RecordSerializer,
}

impl FieldSpec {
    /// A collection field
    pub fn many(name: impl Into<String>, target: Arc<dyn TargetModel>) -> Self {
        Self {
            name: name.into(),
            source: None,
            many: true,
            multi_source: false,
            target,
            serializer: RecordSerializer::all(),
        }
    }

    /// A single-object field; only useful as a misconfiguration
    pub fn single(name: impl Into<String>, target: Arc<dyn TargetModel>) -> Self {
        Self {
            many: false,
            ..Self::many(name, target)
        }
    }

    /// A collection merged from several relations
    pub fn multi_source(name: impl Into<String>, target: Arc<dyn TargetModel>) -> Self {
        Self {
            multi_source: true,
            ..Self::many(name, target)
        }
    }

    pub fn source(mut self, source: impl AsRef<str>) -> Self {
        self.source = Some(normalize_path(source.as_ref()));
        self
    }

    pub fn serializer(mut self, serializer: RecordSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.serializer(RecordSerializer::with_fields(fields))
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("many", &self.many)
            .field("multi_source", &self.multi_source)
            .field("target", &self.target.model_name())
            .finish()
    }
}

/// User supplied prefetch declaration for a field
#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchOverride {
    /// A single unfiltered lookup path
    Path(String),
    /// A single structured (filtered and/or renamed) directive
    Directive(PrefetchDirective),
    /// Several directives; an empty list means "no prefetch"
    List(Vec<PrefetchDirective>),
    /// Sub-source key to prefetch, for multi-source fields
    Sources(BTreeMap<String, PrefetchOverride>),
}

impl PrefetchOverride {
    /// Explicitly disable prefetching for a field
    pub fn none() -> Self {
        PrefetchOverride::List(Vec::new())
    }

    pub fn sources<I, K, V>(sources: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PrefetchOverride>,
    {
        PrefetchOverride::Sources(
            sources
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            PrefetchOverride::Path(_) => "path",
            PrefetchOverride::Directive(_) => "directive",
            PrefetchOverride::List(_) => "list",
            PrefetchOverride::Sources(_) => "sources",
        }
    }
}

impl From<&str> for PrefetchOverride {
    fn from(path: &str) -> Self {
        PrefetchOverride::Path(path.to_string())
    }
}

impl From<String> for PrefetchOverride {
    fn from(path: String) -> Self {
        PrefetchOverride::Path(path)
    }
}

impl From<PrefetchDirective> for PrefetchOverride {
    fn from(directive: PrefetchDirective) -> Self {
        PrefetchOverride::Directive(directive)
    }
}

impl From<Vec<PrefetchDirective>> for PrefetchOverride {
    fn from(directives: Vec<PrefetchDirective>) -> Self {
        PrefetchOverride::List(directives)
    }
}

impl From<Vec<&str>> for PrefetchOverride {
    fn from(paths: Vec<&str>) -> Self {
        PrefetchOverride::List(paths.into_iter().map(PrefetchDirective::new).collect())
    }
}
