//! Sideload query parameter parsing
//!
//! The parameter is a comma separated list of relation names. Multi-source
//! relations may narrow their sources with `name[source_a,source_b]`; commas
//! inside brackets never split tokens.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{SideloadError, SideloadResult};
use crate::schema::RelationSchema;
use crate::validation::{ValidationError, ValidationErrors};

static TOKEN_SEPARATOR: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*\]|,"));

static TOKEN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(?P<name>[^\[\]]+?)(?:\[(?P<sources>[^\[\]]*)\])?$"));

fn grammar(pattern: &'static Lazy<Result<Regex, regex::Error>>) -> SideloadResult<&'static Regex> {
    pattern
        .as_ref()
        .map_err(|e| SideloadError::internal(format!("Invalid sideload grammar: {}", e)))
}

/// Relations requested by one request, in request order.
///
/// `None` sub-sources means every declared source of a multi-source
/// relation (and is always the value for plain relations).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideloadSelection {
    relations: Vec<(String, Option<BTreeSet<String>>)>,
}

impl SideloadSelection {
    /// Parse and validate a raw parameter value against `schema`.
    ///
    /// An absent or blank value yields an empty selection, which callers
    /// treat as "no sideloading". Every invalid token is reported under
    /// `param_name`; one bad token fails the whole selection.
    pub fn parse(raw: Option<&str>, schema: &RelationSchema, param_name: &str) -> SideloadResult<Self> {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(Self::default()),
        };

        let token_pattern = grammar(&TOKEN)?;
        let mut selection = Self::default();
        let mut errors = ValidationErrors::new();

        for token in split_tokens(raw)? {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let Some(captures) = token_pattern.captures(token) else {
                errors.add(ValidationError::with_code(
                    param_name,
                    format!("'{}' is not a valid sideload expression.", token),
                    "invalid_syntax",
                ));
                continue;
            };

            let name = captures.name("name").map(|m| m.as_str().trim()).unwrap_or_default();
            let sources = captures.name("sources").map(|m| m.as_str());

            if name == schema.primary_name() && sources.is_none() {
                continue;
            }
            if !schema.is_relation(name) {
                errors.add(ValidationError::invalid_choice(param_name, token));
                continue;
            }

            let requested = match sources {
                None => None,
                Some(_) if !schema.is_multi_source(name) => {
                    errors.add(ValidationError::with_code(
                        param_name,
                        format!("'{}' does not accept source selection; use '{}'.", token, name),
                        "invalid_source",
                    ));
                    continue;
                }
                Some(sources) => match parse_sources(name, sources, schema) {
                    Ok(requested) => Some(requested),
                    Err(message) => {
                        errors.add(ValidationError::with_code(param_name, message, "invalid_source"));
                        continue;
                    }
                },
            };
            selection.insert(name, requested);
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        debug!(
            target: "elif::sideload",
            param = param_name,
            relations = ?selection.relation_names(),
            "parsed sideload selection"
        );
        Ok(selection)
    }

    /// Build a selection directly, bypassing the parameter grammar
    pub fn from_relations<I, S>(relations: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<BTreeSet<String>>)>,
        S: Into<String>,
    {
        let mut selection = Self::default();
        for (name, sources) in relations {
            selection.insert(&name.into(), sources);
        }
        selection
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.iter().any(|(relation, _)| relation == name)
    }

    pub fn relation_names(&self) -> Vec<&str> {
        self.relations.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Requested sub-sources of `name`; `None` when all are requested
    pub fn sources(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.relations
            .iter()
            .find(|(relation, _)| relation == name)
            .and_then(|(_, sources)| sources.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&BTreeSet<String>>)> {
        self.relations
            .iter()
            .map(|(name, sources)| (name.as_str(), sources.as_ref()))
    }

    // A repeated relation keeps its first position; "all sources" absorbs
    // any explicit subset, otherwise subsets are unioned.
    fn insert(&mut self, name: &str, sources: Option<BTreeSet<String>>) {
        match self.relations.iter_mut().find(|(relation, _)| relation == name) {
            None => self.relations.push((name.to_string(), sources)),
            Some((_, existing)) => match (existing.as_mut(), sources) {
                (Some(current), Some(more)) => current.extend(more),
                (Some(_), None) => *existing = None,
                (None, _) => {}
            },
        }
    }
}

/// Split on commas that are not inside `[...]`
fn split_tokens(raw: &str) -> SideloadResult<Vec<&str>> {
    let separator = grammar(&TOKEN_SEPARATOR)?;
    let mut tokens = Vec::new();
    let mut start = 0;
    for found in separator.find_iter(raw) {
        if found.as_str() == "," {
            tokens.push(&raw[start..found.start()]);
            start = found.end();
        }
    }
    tokens.push(&raw[start..]);
    Ok(tokens)
}

fn parse_sources(name: &str, raw: &str, schema: &RelationSchema) -> Result<BTreeSet<String>, String> {
    let requested: BTreeSet<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|source| !source.is_empty())
        .map(str::to_string)
        .collect();

    if requested.is_empty() {
        return Err(format!("'{}' source can not be empty.", name));
    }

    let declared = schema.sub_sources(name).unwrap_or_default();
    let invalid: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|source| !declared.contains(source))
        .collect();
    if !invalid.is_empty() {
        return Err(format!(
            "'{}' sources {} are not one of the available choices: {}.",
            name,
            invalid.iter().map(|s| format!("'{}'", s)).collect::<Vec<_>>().join(", "),
            declared.join(", ")
        ));
    }
    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fixtures::ProductCatalog;

    fn schema() -> RelationSchema {
        ProductCatalog::new().schema().unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_absent_or_blank_is_empty() {
        let schema = schema();
        assert!(SideloadSelection::parse(None, &schema, "sideload").unwrap().is_empty());
        assert!(SideloadSelection::parse(Some(""), &schema, "sideload").unwrap().is_empty());
        assert!(SideloadSelection::parse(Some(" , ,"), &schema, "sideload").unwrap().is_empty());
    }

    #[test]
    fn test_keeps_request_order() {
        let schema = schema();
        let selection =
            SideloadSelection::parse(Some("suppliers,categories,partners"), &schema, "sideload").unwrap();
        assert_eq!(selection.relation_names(), vec!["suppliers", "categories", "partners"]);
        assert_eq!(selection.sources("suppliers"), None);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let schema = schema();
        let raw = Some("combined_suppliers[backup_suppliers],categories");
        let first = SideloadSelection::parse(raw, &schema, "sideload").unwrap();
        let second = SideloadSelection::parse(raw, &schema, "sideload").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bracket_commas_do_not_split() {
        let schema = schema();
        let selection = SideloadSelection::parse(
            Some("combined_suppliers[suppliers, backup_suppliers],partners"),
            &schema,
            "sideload",
        )
        .unwrap();
        assert_eq!(selection.relation_names(), vec!["combined_suppliers", "partners"]);
        assert_eq!(
            selection.sources("combined_suppliers"),
            Some(&set(&["backup_suppliers", "suppliers"]))
        );
    }

    #[test]
    fn test_primary_name_is_ignored() {
        let schema = schema();
        let selection = SideloadSelection::parse(Some("partners,products"), &schema, "sideload").unwrap();
        assert_eq!(selection.relation_names(), vec!["partners"]);
    }

    #[test]
    fn test_duplicates_are_merged() {
        let schema = schema();
        let selection = SideloadSelection::parse(
            Some("combined_suppliers[suppliers],categories,combined_suppliers[backup_suppliers]"),
            &schema,
            "sideload",
        )
        .unwrap();
        assert_eq!(selection.len(), 2);
        assert_eq!(
            selection.sources("combined_suppliers"),
            Some(&set(&["backup_suppliers", "suppliers"]))
        );

        let widened = SideloadSelection::parse(
            Some("combined_suppliers[suppliers],combined_suppliers"),
            &schema,
            "sideload",
        )
        .unwrap();
        assert_eq!(widened.sources("combined_suppliers"), None);
    }

    #[test]
    fn test_unknown_name_names_the_token() {
        let schema = schema();
        let err = SideloadSelection::parse(Some("categories,unexisting,suppliers"), &schema, "sideload")
            .unwrap_err();
        match err {
            SideloadError::Validation(errors) => {
                assert_eq!(
                    errors.messages("sideload"),
                    vec!["'unexisting' is not one of the available choices."]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_errors_use_configured_param_name() {
        let schema = schema();
        let err = SideloadSelection::parse(Some("nope"), &schema, "s").unwrap_err();
        match err {
            SideloadError::Validation(errors) => assert_eq!(errors.messages("s").len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bracket_misuse_is_rejected() {
        let schema = schema();
        for raw in [
            "combined_suppliers[]",
            "combined_suppliers[ , ]",
            "combined_suppliers[invalidsub]",
            "categories[anything]",
            "combined_suppliers[suppliers",
        ] {
            let err = SideloadSelection::parse(Some(raw), &schema, "sideload").unwrap_err();
            assert!(err.is_client_error(), "{raw} should be rejected");
        }

        let err = SideloadSelection::parse(Some("combined_suppliers[]"), &schema, "sideload").unwrap_err();
        assert!(err.to_string().contains("source can not be empty"));

        let err = SideloadSelection::parse(Some("combined_suppliers[suppliers,bogus]"), &schema, "sideload")
            .unwrap_err();
        assert!(err.to_string().contains("'bogus'"));
        assert!(!err.to_string().contains("'suppliers'"));
    }
}
