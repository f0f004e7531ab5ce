//! Rendering of sideloaded pages to JSON

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{SideloadError, SideloadResult};
use crate::fields::{retain_keys, FieldSelection};
use crate::flatten::{flatten_record, inline_all};
use crate::orm::{identifier_key, RecordRef};
use crate::prefetch::PrefetchPlan;
use crate::reducer::SideloadablePage;
use crate::schema::RelationSchema;

/// Per-request presentation switches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub flat: bool,
    pub fields: Option<FieldSelection>,
}

impl RenderOptions {
    pub fn flat(mut self, flat: bool) -> Self {
        self.flat = flat;
        self
    }

    pub fn fields(mut self, fields: Option<FieldSelection>) -> Self {
        self.fields = fields;
        self
    }
}

/// Normal (non-sideloaded) representation of primary records
pub fn render_records(schema: &RelationSchema, records: &[RecordRef], fields: Option<&FieldSelection>) -> Vec<Value> {
    let primary = schema.primary();
    let keys = fields.and_then(|fields| fields.nested_keys(&primary.name, &primary.name, &[primary.name.as_str()]));
    records
        .iter()
        .map(|record| {
            let serialized = primary.serializer.serialize(record.as_ref());
            Value::Object(match &keys {
                Some(keys) => retain_keys(serialized, keys),
                None => serialized,
            })
        })
        .collect()
}

/// Render a sideloaded page: `{primary: [...], relation: [...], ...}`, or
/// a list of flattened primary records
pub fn render_page(
    schema: &RelationSchema,
    plan: &PrefetchPlan,
    page: &SideloadablePage,
    options: &RenderOptions,
) -> SideloadResult<Value> {
    if options.flat {
        render_flat(schema, plan, page, options.fields.as_ref())
    } else {
        render_nested(schema, page, options.fields.as_ref())
    }
}

fn render_nested(
    schema: &RelationSchema,
    page: &SideloadablePage,
    fields: Option<&FieldSelection>,
) -> SideloadResult<Value> {
    let collections = page.keys();
    let mut body = Map::new();

    let sections = std::iter::once((page.primary_name.as_str(), page.primary.as_slice()))
        .chain(page.relations.iter().map(|(name, records)| (name.as_str(), records.as_slice())));
    for (name, records) in sections {
        let field = schema
            .field(name)
            .ok_or_else(|| SideloadError::internal(format!("Rendered collection '{}' is not declared", name)))?;
        let keys = fields.and_then(|fields| fields.nested_keys(name, &page.primary_name, &collections));
        let rendered = records
            .iter()
            .map(|record| {
                let serialized = field.serializer.serialize(record.as_ref());
                Value::Object(match &keys {
                    Some(keys) => retain_keys(serialized, keys),
                    None => serialized,
                })
            })
            .collect();
        body.insert(name.to_string(), Value::Array(rendered));
    }
    Ok(Value::Object(body))
}

/// Related records of one relation, keyed by identifier, with the paths
/// on the primary records that link to them
struct LinkedCollection {
    link_paths: Vec<String>,
    lookup: HashMap<String, Value>,
}

fn linked_collections(
    schema: &RelationSchema,
    plan: &PrefetchPlan,
    page: &SideloadablePage,
) -> SideloadResult<Vec<LinkedCollection>> {
    let mut linked = Vec::with_capacity(page.relations.len());
    for (name, records) in &page.relations {
        let field = schema
            .field(name)
            .ok_or_else(|| SideloadError::internal(format!("Rendered collection '{}' is not declared", name)))?;
        let source = plan
            .source(name)
            .ok_or_else(|| SideloadError::internal(format!("Relation '{}' was not planned", name)))?;
        let lookup = records
            .iter()
            .map(|record| {
                let serialized = Value::Object(field.serializer.serialize(record.as_ref()));
                (identifier_key(&record.primary_key()), serialized)
            })
            .collect();
        linked.push(LinkedCollection {
            link_paths: source.resolved().iter().map(|resolved| resolved.lookup_path.clone()).collect(),
            lookup,
        });
    }
    Ok(linked)
}

fn render_flat(
    schema: &RelationSchema,
    plan: &PrefetchPlan,
    page: &SideloadablePage,
    fields: Option<&FieldSelection>,
) -> SideloadResult<Value> {
    let primary = schema.primary();
    let linked = linked_collections(schema, plan, page)?;

    // Relations sharing a link path inline from one merged lookup, so an
    // identifier is only dropped when no relation on that path kept it.
    let mut merged: Vec<(&str, HashMap<String, Value>)> = Vec::new();
    for collection in &linked {
        for path in &collection.link_paths {
            match merged.iter_mut().find(|(existing, _)| *existing == path.as_str()) {
                Some((_, lookup)) => {
                    for (key, record) in &collection.lookup {
                        lookup.entry(key.clone()).or_insert_with(|| record.clone());
                    }
                }
                None => merged.push((path.as_str(), collection.lookup.clone())),
            }
        }
    }
    let links: Vec<(&str, &HashMap<String, Value>)> =
        merged.iter().map(|(path, lookup)| (*path, lookup)).collect();
    let prefilter = fields.map(|fields| fields.flat_prefilter_keys(links.iter().map(|(path, _)| *path)));

    let rendered = page
        .primary
        .iter()
        .map(|record| {
            let mut serialized = primary.serializer.serialize(record.as_ref());
            if let Some(keys) = &prefilter {
                serialized = retain_keys(serialized, keys);
            }
            let mut value = Value::Object(serialized);
            inline_all(&mut value, links.iter().copied());

            let flat = match value {
                Value::Object(object) => flatten_record(object),
                _ => Map::new(),
            };
            Value::Object(match fields {
                Some(fields) => flat.into_iter().filter(|(key, _)| fields.allows_flat_key(key)).collect(),
                None => flat,
            })
        })
        .collect();
    Ok(Value::Array(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fixtures::ProductCatalog;
    use crate::orm::{Predicate, QuerySet};
    use crate::prefetch::PrefetchDirective;
    use crate::schema::FieldSpec;
    use crate::reducer::reduce_page;
    use crate::selection::SideloadSelection;
    use serde_json::json;

    async fn page(catalog: &ProductCatalog, raw: &str) -> (RelationSchema, PrefetchPlan, SideloadablePage) {
        let schema = catalog.schema().unwrap();
        let selection = SideloadSelection::parse(Some(raw), &schema, "sideload").unwrap();
        let plan = PrefetchPlan::build(&schema, &selection, &[]).unwrap();
        let rows = plan.apply(catalog.products()).fetch().await.unwrap();
        let page = reduce_page(&plan, rows);
        (schema, plan, page)
    }

    #[tokio::test]
    async fn test_nested_keys_follow_selection_order() {
        let catalog = ProductCatalog::single_product();
        let (schema, plan, page) = page(&catalog, "suppliers,categories").await;
        let body = render_page(&schema, &plan, &page, &RenderOptions::default()).unwrap();

        let keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["products", "suppliers", "categories"]);
        assert_eq!(body["categories"], json!([{"id": 1, "name": "Category 1"}]));
    }

    #[tokio::test]
    async fn test_flat_inlines_links() {
        let catalog = ProductCatalog::single_product();
        let (schema, plan, page) = page(&catalog, "categories,partners").await;
        let body = render_page(&schema, &plan, &page, &RenderOptions::default().flat(true)).unwrap();

        let record = &body[0];
        assert!(record.get("category").is_none());
        assert_eq!(record["category__id"], 1);
        assert_eq!(record["category__name"], "Category 1");
        assert_eq!(record["partners__1__name"], "Partner 2");
        assert_eq!(record["supplier"], 1);
    }

    #[tokio::test]
    async fn test_flat_drops_links_filtered_out_of_the_relation() {
        let catalog = ProductCatalog::single_product();
        let schema = RelationSchema::builder()
            .primary("products")
            .field(FieldSpec::many("products", catalog.target("product")))
            .field(FieldSpec::many("partners", catalog.target("partner")).fields(["id", "name"]))
            .prefetch(
                "partners",
                PrefetchDirective::filtered("partners", "partner", Predicate::eq("name", "Partner 2")),
            )
            .build()
            .unwrap();
        let selection = SideloadSelection::parse(Some("partners"), &schema, "sideload").unwrap();
        let plan = PrefetchPlan::build(&schema, &selection, &[]).unwrap();
        let rows = plan.apply(catalog.products()).fetch().await.unwrap();
        let page = reduce_page(&plan, rows);

        let body = render_page(&schema, &plan, &page, &RenderOptions::default().flat(true)).unwrap();
        assert_eq!(body[0]["partners__0__id"], 2);
        assert_eq!(body[0]["partners__0__name"], "Partner 2");
        assert!(body[0].get("partners__1").is_none());
        assert!(body[0].get("partners__1__id").is_none());
    }

    #[tokio::test]
    async fn test_flat_with_shared_link_path() {
        let catalog = ProductCatalog::single_product();
        let (schema, plan, page) = page(&catalog, "suppliers,combined_suppliers").await;
        let body = render_page(&schema, &plan, &page, &RenderOptions::default().flat(true)).unwrap();

        assert_eq!(body[0]["supplier__name"], "Supplier 1");
        assert_eq!(body[0]["backup_supplier__name"], "Supplier 4");
    }

    #[tokio::test]
    async fn test_flat_field_selection_strips_unrequested_links() {
        let catalog = ProductCatalog::single_product();
        let (schema, plan, page) = page(&catalog, "categories,partners").await;
        let options = RenderOptions::default()
            .flat(true)
            .fields(FieldSelection::parse(Some("name,partners__name")));
        let body = render_page(&schema, &plan, &page, &options).unwrap();

        assert_eq!(
            body[0],
            json!({"name": "Product 1", "partners__0__name": "Partner 1", "partners__1__name": "Partner 2"})
        );
    }

    #[tokio::test]
    async fn test_nested_field_selection() {
        let catalog = ProductCatalog::single_product();
        let (schema, plan, page) = page(&catalog, "categories,suppliers").await;
        let options = RenderOptions::default().fields(FieldSelection::parse(Some("name,categories__name")));
        let body = render_page(&schema, &plan, &page, &options).unwrap();

        assert_eq!(body["products"], json!([{"name": "Product 1"}]));
        assert_eq!(body["categories"], json!([{"name": "Category 1"}]));
        assert_eq!(body["suppliers"], json!([{"id": 1, "name": "Supplier 1"}]));
    }

    #[tokio::test]
    async fn test_render_records_without_sideloading() {
        let catalog = ProductCatalog::single_product();
        let schema = catalog.schema().unwrap();
        let rows = catalog.products().fetch().await.unwrap();

        let all = render_records(&schema, &rows, None);
        assert_eq!(all[0]["partners"], json!([1, 2]));

        let fields = FieldSelection::parse(Some("id"));
        assert_eq!(render_records(&schema, &rows, fields.as_ref()), vec![json!({"id": 1})]);
    }
}
