//! Page reduction: relation name to deduplicated related rows
//!
//! A materialized page is reduced by walking the prefetched object graph and
//! never queries. An unpaginated queryset (or a detail lookup) is reduced by
//! projecting identifiers and issuing one "identifier in set" lookup per
//! relation and distinct filter.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{SideloadError, SideloadResult};
use crate::orm::{identifier_key, path_segments, Predicate, QuerySet, RecordKey, RecordRef};
use crate::prefetch::{PrefetchPlan, RelationSource, ResolvedSource};
use crate::schema::RelationSchema;

/// Primary rows plus one deduplicated collection per selected relation
#[derive(Debug, Clone)]
pub struct SideloadablePage {
    pub primary_name: String,
    pub primary: Vec<RecordRef>,
    /// In selection order
    pub relations: Vec<(String, Vec<RecordRef>)>,
}

impl SideloadablePage {
    pub fn relation(&self, name: &str) -> Option<&[RecordRef]> {
        self.relations
            .iter()
            .find(|(relation, _)| relation == name)
            .map(|(_, records)| records.as_slice())
    }

    /// Output keys: the primary name followed by every selected relation
    pub fn keys(&self) -> Vec<&str> {
        std::iter::once(self.primary_name.as_str())
            .chain(self.relations.iter().map(|(name, _)| name.as_str()))
            .collect()
    }
}

/// Reduce a materialized page using only the rows its prefetches loaded
pub fn reduce_page(plan: &PrefetchPlan, page: Vec<RecordRef>) -> SideloadablePage {
    let relations = plan
        .sources()
        .iter()
        .map(|(name, source)| {
            let mut seen = HashSet::new();
            let mut related = Vec::new();
            for resolved in source.resolved() {
                for record in walk(&page, resolved) {
                    if seen.insert(RecordKey::of(record.as_ref())) {
                        related.push(record);
                    }
                }
            }
            debug!(target: "elif::sideload", relation = %name, count = related.len(), "reduced page relation");
            (name.clone(), related)
        })
        .collect();

    SideloadablePage {
        primary_name: plan.primary_name().to_string(),
        primary: page,
        relations,
    }
}

// Hop by hop over the attachment path, deduplicating at every level.
fn walk(page: &[RecordRef], source: &ResolvedSource) -> Vec<RecordRef> {
    let mut level: Vec<RecordRef> = page.to_vec();
    for hop in path_segments(&source.attachment_key) {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for record in &level {
            for related in record.attribute(hop).into_records() {
                if seen.insert(RecordKey::of(related.as_ref())) {
                    next.push(related);
                }
            }
        }
        trace!(target: "elif::sideload", hop, rows = next.len(), "walked relation hop");
        level = next;
    }

    match source.predicate() {
        Some(predicate) => level
            .into_iter()
            .filter(|record| predicate.matches(&record.to_fields()))
            .collect(),
        None => level,
    }
}

/// Reduce a queryset by identifier fan-out
pub async fn reduce_queryset<Q: QuerySet>(
    schema: &RelationSchema,
    plan: &PrefetchPlan,
    queryset: &Q,
) -> SideloadResult<SideloadablePage> {
    let primary = queryset.fetch().await?;

    let mut relations = Vec::with_capacity(plan.sources().len());
    for (name, source) in plan.sources() {
        let field = schema.field(name).ok_or_else(|| {
            SideloadError::internal(format!("Planned relation '{}' is not declared", name))
        })?;

        // Sources sharing a filter share one lookup.
        let mut groups: Vec<(Option<&Predicate>, Vec<Value>)> = Vec::new();
        for resolved in source.resolved() {
            let ids = queryset.values_list(&resolved.lookup_path).await?;
            let predicate = resolved.predicate();
            let position = groups.iter().position(|(existing, _)| match (existing, predicate) {
                (None, None) => true,
                (Some(a), Some(b)) => a.is_equivalent(b),
                _ => false,
            });
            match position {
                Some(index) => groups[index].1.extend(ids),
                None => groups.push((predicate, ids)),
            }
        }

        let mut seen = HashSet::new();
        let mut related = Vec::new();
        for (predicate, ids) in groups {
            let ids = distinct_ids(ids);
            if ids.is_empty() {
                continue;
            }
            trace!(target: "elif::sideload", relation = %name, ids = ids.len(), "identifier fan-out");
            for record in field.target.find_by_ids(&ids, predicate).await? {
                if seen.insert(RecordKey::of(record.as_ref())) {
                    related.push(record);
                }
            }
        }

        if let RelationSource::Multi(sources) = source {
            debug!(
                target: "elif::sideload",
                relation = %name,
                sources = ?sources.keys().collect::<Vec<_>>(),
                count = related.len(),
                "reduced multi-source relation"
            );
        } else {
            debug!(target: "elif::sideload", relation = %name, count = related.len(), "reduced relation");
        }
        relations.push((name.clone(), related));
    }

    Ok(SideloadablePage {
        primary_name: plan.primary_name().to_string(),
        primary,
        relations,
    })
}

fn distinct_ids(ids: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_null())
        .filter(|id| seen.insert(identifier_key(id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fixtures::ProductCatalog;
    use crate::prefetch::PrefetchDirective;
    use crate::schema::FieldSpec;
    use crate::selection::SideloadSelection;

    fn names(records: &[RecordRef]) -> Vec<String> {
        let mut names: Vec<String> = records
            .iter()
            .map(|record| record.to_fields()["name"].as_str().unwrap_or_default().to_string())
            .collect();
        names.sort();
        names
    }

    async fn both_modes(catalog: &ProductCatalog, schema: &RelationSchema, raw: &str) -> (SideloadablePage, SideloadablePage) {
        let selection = SideloadSelection::parse(Some(raw), schema, "sideload").unwrap();
        let products = catalog.products();
        let plan = PrefetchPlan::build(schema, &selection, products.prefetches()).unwrap();

        let page = plan.apply(products.clone()).fetch().await.unwrap();
        let paginated = reduce_page(&plan, page);
        let unpaginated = reduce_queryset(schema, &plan, &products).await.unwrap();
        (paginated, unpaginated)
    }

    #[tokio::test]
    async fn test_in_memory_reduction_issues_no_queries() {
        let catalog = ProductCatalog::seeded();
        let schema = catalog.schema().unwrap();
        let selection = SideloadSelection::parse(Some("categories,partners,combined_suppliers"), &schema, "sideload").unwrap();
        let plan = PrefetchPlan::build(&schema, &selection, &[]).unwrap();
        let page = plan.apply(catalog.products()).fetch().await.unwrap();

        catalog.db().reset_query_count();
        let reduced = reduce_page(&plan, page);
        assert_eq!(catalog.db().query_count(), 0);
        assert_eq!(reduced.keys(), vec!["products", "categories", "partners", "combined_suppliers"]);
    }

    #[tokio::test]
    async fn test_related_rows_are_deduplicated() {
        let catalog = ProductCatalog::seeded();
        let schema = catalog.schema().unwrap();
        let (paginated, unpaginated) = both_modes(&catalog, &schema, "categories,partners").await;

        for page in [&paginated, &unpaginated] {
            assert_eq!(page.primary.len(), 4);
            assert_eq!(
                names(page.relation("categories").unwrap()),
                vec!["Category 1", "Category 2", "Category 3"]
            );
            assert_eq!(
                names(page.relation("partners").unwrap()),
                vec!["Partner 1", "Partner 2", "Partner 3"]
            );
        }
    }

    #[tokio::test]
    async fn test_multi_source_is_the_union_of_its_sources() {
        let catalog = ProductCatalog::seeded();
        let schema = catalog.schema().unwrap();

        let (all, all_fanout) = both_modes(&catalog, &schema, "combined_suppliers").await;
        let (main, _) = both_modes(&catalog, &schema, "combined_suppliers[suppliers]").await;
        let (backup, backup_fanout) = both_modes(&catalog, &schema, "combined_suppliers[backup_suppliers]").await;

        let mut union = names(main.relation("combined_suppliers").unwrap());
        union.extend(names(backup.relation("combined_suppliers").unwrap()));
        union.sort();
        union.dedup();

        assert_eq!(names(all.relation("combined_suppliers").unwrap()), union);
        assert_eq!(names(all_fanout.relation("combined_suppliers").unwrap()), union);
        assert_eq!(
            names(backup_fanout.relation("combined_suppliers").unwrap()),
            vec!["Supplier 3", "Supplier 4"]
        );
    }

    #[tokio::test]
    async fn test_fan_out_costs_one_lookup_per_relation() {
        let catalog = ProductCatalog::seeded();
        let schema = catalog.schema().unwrap();
        let selection = SideloadSelection::parse(Some("categories,combined_suppliers"), &schema, "sideload").unwrap();
        let plan = PrefetchPlan::build(&schema, &selection, &[]).unwrap();

        catalog.db().reset_query_count();
        let page = reduce_queryset(&schema, &plan, &catalog.products()).await.unwrap();
        // fetch, then projection + lookup for categories, then two
        // projections + one lookup for both supplier sources
        assert_eq!(catalog.db().query_count(), 6);
        assert_eq!(page.relation("combined_suppliers").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_filtered_prefetch_narrows_both_modes() {
        let catalog = ProductCatalog::seeded();
        let schema = RelationSchema::builder()
            .primary("products")
            .field(FieldSpec::many("products", catalog.target("product")))
            .field(FieldSpec::many("partners", catalog.target("partner")))
            .prefetch(
                "partners",
                PrefetchDirective::filtered("partners", "partner", Predicate::ne("name", "Partner 1")),
            )
            .build()
            .unwrap();

        let (paginated, unpaginated) = both_modes(&catalog, &schema, "partners").await;
        assert_eq!(names(paginated.relation("partners").unwrap()), vec!["Partner 2", "Partner 3"]);
        assert_eq!(names(unpaginated.relation("partners").unwrap()), vec!["Partner 2", "Partner 3"]);
    }

    #[tokio::test]
    async fn test_detail_reduction() {
        let catalog = ProductCatalog::seeded();
        let schema = catalog.schema().unwrap();
        let selection = SideloadSelection::parse(Some("suppliers,categories"), &schema, "sideload").unwrap();
        let plan = PrefetchPlan::build(&schema, &selection, &[]).unwrap();

        let detail = catalog.products().filter(Predicate::eq("id", "2"));
        let page = reduce_queryset(&schema, &plan, &detail).await.unwrap();
        assert_eq!(page.primary.len(), 1);
        assert_eq!(page.primary[0].primary_key(), Value::from(2));
        assert_eq!(page.keys(), vec!["products", "suppliers", "categories"]);
        assert_eq!(names(page.relation("suppliers").unwrap()), vec!["Supplier 2"]);
    }

    #[tokio::test]
    async fn test_null_links_are_skipped() {
        let catalog = ProductCatalog::seeded();
        let schema = catalog.schema().unwrap();
        let only_second = catalog.products().filter(Predicate::eq("id", 2));
        let selection =
            SideloadSelection::parse(Some("combined_suppliers[backup_suppliers]"), &schema, "sideload").unwrap();
        let plan = PrefetchPlan::build(&schema, &selection, &[]).unwrap();

        let page = plan.apply(only_second.clone()).fetch().await.unwrap();
        assert!(reduce_page(&plan, page).relation("combined_suppliers").unwrap().is_empty());

        catalog.db().reset_query_count();
        let fanned = reduce_queryset(&schema, &plan, &only_second).await.unwrap();
        assert!(fanned.relation("combined_suppliers").unwrap().is_empty());
        // no lookup for an empty identifier set
        assert_eq!(catalog.db().query_count(), 2);
    }
}
