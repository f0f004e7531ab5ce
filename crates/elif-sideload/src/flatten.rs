//! Flattening of sideloaded records
//!
//! Related records are first inlined into each primary record in place of
//! their link identifiers, then the whole record is flattened into
//! `__` joined keys, with list positions as index segments
//! (`partners__0__name`).

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::orm::{identifier_key, path_segments, LOOKUP_SEP};

/// Escape one JSON pointer reference token
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Pointers to every value reached by `path`, fanning out over lists
pub fn link_pointers(record: &Value, path: &str) -> Vec<String> {
    let mut pointers = vec![String::new()];
    for segment in path_segments(path) {
        let mut next = Vec::new();
        for pointer in pointers {
            let candidates = match record.pointer(&pointer) {
                Some(Value::Array(items)) => (0..items.len()).map(|i| format!("{}/{}", pointer, i)).collect(),
                Some(_) => vec![pointer],
                None => Vec::new(),
            };
            for candidate in candidates {
                if let Some(Value::Object(object)) = record.pointer(&candidate) {
                    if object.contains_key(segment) {
                        next.push(format!("{}/{}", candidate, escape_pointer_token(segment)));
                    }
                }
            }
        }
        pointers = next;
    }
    pointers
}

/// Replace the identifiers at `path` with the records they link to.
///
/// Values that are already objects are left untouched. Identifiers missing
/// from `lookup` (filtered out of the relation) are dropped from lists and
/// nulled when single.
pub fn inline_links(record: &mut Value, path: &str, lookup: &HashMap<String, Value>) {
    for pointer in link_pointers(record, path) {
        let Some(slot) = record.pointer_mut(&pointer) else {
            continue;
        };
        match slot {
            Value::Array(items) => items.retain_mut(|item| replace_identifier(item, lookup)),
            other => {
                if !replace_identifier(other, lookup) {
                    *other = Value::Null;
                }
            }
        }
    }
}

// false for an identifier with no linked record
fn replace_identifier(slot: &mut Value, lookup: &HashMap<String, Value>) -> bool {
    if matches!(slot, Value::Object(_) | Value::Array(_) | Value::Null) {
        return true;
    }
    match lookup.get(&identifier_key(slot)) {
        Some(related) => {
            *slot = related.clone();
            true
        }
        None => false,
    }
}

/// Inline every link, shorter paths first so nested links can be reached
pub fn inline_all<'a, I>(record: &mut Value, links: I)
where
    I: IntoIterator<Item = (&'a str, &'a HashMap<String, Value>)>,
{
    let mut links: Vec<_> = links.into_iter().collect();
    links.sort_by_key(|(path, _)| path_segments(path).len());
    for (path, lookup) in links {
        inline_links(record, path, lookup);
    }
}

/// Flatten nested objects and lists into `__` joined keys.
///
/// Empty objects and lists are kept as values under their own key.
pub fn flatten_record(record: Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    let mut stack: Vec<(String, Value)> = record.into_iter().rev().collect();

    while let Some((key, value)) = stack.pop() {
        match value {
            Value::Object(object) if !object.is_empty() => {
                let children: Vec<_> = object
                    .into_iter()
                    .map(|(child, value)| (format!("{}{}{}", key, LOOKUP_SEP, child), value))
                    .collect();
                stack.extend(children.into_iter().rev());
            }
            Value::Array(items) if !items.is_empty() => {
                let children: Vec<_> = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| (format!("{}{}{}", key, LOOKUP_SEP, index), value))
                    .collect();
                stack.extend(children.into_iter().rev());
            }
            value => {
                flat.insert(key, value);
            }
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn lookup(records: Vec<Value>) -> HashMap<String, Value> {
        records
            .into_iter()
            .map(|record| (identifier_key(&record["id"]), record))
            .collect()
    }

    #[test]
    fn test_flatten_expands_objects_and_lists() {
        let flat = flatten_record(object(json!({
            "id": 1,
            "category": {"id": 1, "name": "Category 1"},
            "partners": [{"id": 1}, {"id": 2}],
            "tags": [],
            "meta": {}
        })));
        assert_eq!(
            flat.keys().collect::<Vec<_>>(),
            vec!["id", "category__id", "category__name", "partners__0__id", "partners__1__id", "tags", "meta"]
        );
        assert_eq!(flat["tags"], json!([]));
    }

    #[test]
    fn test_inline_replaces_single_and_many_links() {
        let categories = lookup(vec![json!({"id": 1, "name": "Category 1"})]);
        let partners = lookup(vec![json!({"id": 1, "name": "Partner 1"}), json!({"id": 2, "name": "Partner 2"})]);
        let mut record = json!({"id": 1, "category": 1, "partners": [2, 1, 9], "supplier": null});

        inline_all(&mut record, [("partners", &partners), ("category", &categories), ("supplier", &categories)]);
        assert_eq!(record["category"], json!({"id": 1, "name": "Category 1"}));
        assert_eq!(record["partners"][0]["name"], "Partner 2");
        assert_eq!(record["partners"].as_array().map(Vec::len), Some(2));
        assert_eq!(record["supplier"], Value::Null);
    }

    #[test]
    fn test_unmatched_links_are_dropped() {
        let categories = lookup(vec![json!({"id": 1, "name": "Category 1"})]);
        let partners = lookup(vec![json!({"id": 2, "name": "Partner 2"})]);
        let mut record = json!({"id": 1, "category": 7, "partners": [1, 2]});

        inline_all(&mut record, [("partners", &partners), ("category", &categories)]);
        assert_eq!(record["category"], Value::Null);
        assert_eq!(record["partners"], json!([{"id": 2, "name": "Partner 2"}]));
    }

    #[test]
    fn test_nested_links_follow_inlined_records() {
        let products = lookup(vec![json!({"id": 10, "supplier": 3})]);
        let suppliers = lookup(vec![json!({"id": 3, "name": "Supplier 3"})]);
        let mut record = json!({"id": 1, "products": [10]});

        inline_all(&mut record, [("products__supplier", &suppliers), ("products", &products)]);
        let flat = flatten_record(object(record));
        assert_eq!(flat["products__0__supplier__name"], "Supplier 3");
    }

    #[test]
    fn test_pointer_tokens_are_escaped() {
        assert_eq!(escape_pointer_token("a/b~c"), "a~1b~0c");
        let record = json!({"a/b": {"c": 1}});
        assert_eq!(link_pointers(&record, "a/b__c"), vec!["/a~1b/c".to_string()]);
    }
}
