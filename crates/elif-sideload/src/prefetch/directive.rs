//! Prefetch (eager-load) directives

use std::fmt;

use crate::orm::{normalize_path, Predicate, LOOKUP_SEP};

/// Filtered query backing a prefetch directive
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchQuery {
    /// Model the query selects from
    pub model: String,
    pub predicate: Predicate,
}

impl PrefetchQuery {
    pub fn new(model: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            model: model.into(),
            predicate,
        }
    }

    /// Same model and an equivalent predicate
    pub fn is_equivalent(&self, other: &PrefetchQuery) -> bool {
        self.model == other.model && self.predicate.is_equivalent(&other.predicate)
    }
}

/// One eager-load instruction: a lookup path, an optional filtered query
/// and an optional attribute to materialize the result into.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchDirective {
    pub path: String,
    pub query: Option<PrefetchQuery>,
    pub to_attr: Option<String>,
}

impl PrefetchDirective {
    /// Unfiltered prefetch of a lookup path
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            query: None,
            to_attr: None,
        }
    }

    /// Prefetch narrowed by a predicate over `model`
    pub fn filtered(path: impl AsRef<str>, model: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            query: Some(PrefetchQuery::new(model, predicate)),
            to_attr: None,
        }
    }

    /// Materialize the prefetched rows into a differently named attribute
    pub fn to_attr(mut self, attr: impl Into<String>) -> Self {
        self.to_attr = Some(attr.into());
        self
    }

    pub fn is_filtered(&self) -> bool {
        self.query.is_some()
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.query.as_ref().map(|query| &query.predicate)
    }

    /// The slot this directive occupies on the rows.
    ///
    /// A rename replaces the last hop of the path, so `products__supplier`
    /// renamed to `main_supplier` attaches at `products__main_supplier`.
    pub fn attachment_key(&self) -> String {
        match &self.to_attr {
            None => self.path.clone(),
            Some(attr) => match self.path.rsplit_once(LOOKUP_SEP) {
                Some((prefix, _)) => format!("{}{}{}", prefix, LOOKUP_SEP, attr),
                None => attr.clone(),
            },
        }
    }
}

impl From<&str> for PrefetchDirective {
    fn from(path: &str) -> Self {
        PrefetchDirective::new(path)
    }
}

impl From<String> for PrefetchDirective {
    fn from(path: String) -> Self {
        PrefetchDirective::new(path)
    }
}

impl fmt::Display for PrefetchDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(query) = &self.query {
            write!(f, " [{} WHERE {}]", query.model, query.predicate)?;
        }
        if let Some(attr) = &self.to_attr {
            write!(f, " -> {}", attr)?;
        }
        Ok(())
    }
}
