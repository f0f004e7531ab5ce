//! Selectable fields (`fields=name,categories__name`)

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::orm::{normalize_path, path_segments, LOOKUP_SEP};

/// Requested field paths, `__` separated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    paths: Vec<String>,
}

impl FieldSelection {
    /// `None` when the parameter is absent or names nothing
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let mut paths: Vec<String> = Vec::new();
        for path in raw?.split(',').map(normalize_path) {
            if !path.is_empty() && !paths.contains(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            None
        } else {
            Some(Self { paths })
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Top-level keys kept on the records of `collection`, or `None` for all.
    ///
    /// A path starting with a collection name is scoped to that collection;
    /// any other path applies to the primary records.
    pub fn nested_keys(&self, collection: &str, primary: &str, collections: &[&str]) -> Option<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        for path in &self.paths {
            let segments = path_segments(path);
            let (scope, rest) = match segments.split_first() {
                Some((first, rest)) if !rest.is_empty() && collections.contains(first) => (*first, rest),
                _ => (primary, segments.as_slice()),
            };
            if scope == collection {
                if let Some(key) = rest.first() {
                    keys.insert(key.to_string());
                }
            }
        }
        if keys.is_empty() {
            None
        } else {
            Some(keys)
        }
    }

    /// Top-level keys kept before flattening: every requested first segment
    /// plus the link keys flattening needs
    pub fn flat_prefilter_keys<'a, I>(&self, links: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.paths
            .iter()
            .filter_map(|path| path_segments(path).first().map(|s| s.to_string()))
            .chain(links.into_iter().filter_map(|link| path_segments(link).first().map(|s| s.to_string())))
            .collect()
    }

    /// Whether a flattened key was requested, ignoring index segments
    pub fn allows_flat_key(&self, key: &str) -> bool {
        let logical: Vec<&str> = path_segments(key)
            .into_iter()
            .filter(|segment| segment.parse::<usize>().is_err())
            .collect();
        let logical = logical.join(LOOKUP_SEP);
        self.paths.iter().any(|path| {
            logical == *path
                || logical
                    .strip_prefix(path.as_str())
                    .is_some_and(|rest| rest.starts_with(LOOKUP_SEP))
        })
    }
}

/// Keep only `keys`, preserving the record's order
pub fn retain_keys(record: Map<String, Value>, keys: &BTreeSet<String>) -> Map<String, Value> {
    record.into_iter().filter(|(key, _)| keys.contains(key)).collect()
}
