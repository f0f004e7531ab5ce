//! In-memory ORM backend
//!
//! A small relational store implementing the collaborator traits. Every
//! table scan (count, fetch, projection, identifier lookup, one prefetch hop
//! or one lazy relation access) counts as a query, so tests can assert how
//! many round trips a sideloaded response costs.

pub mod fixtures;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::error::{OrmError, OrmResult};
use crate::orm::{
    identifier_key, path_segments, Attribute, ExpandableRelation, Predicate, QuerySet, Record,
    RecordRef, TargetModel,
};
use crate::prefetch::PrefetchDirective;

type Row = Map<String, Value>;

const PRIMARY_KEY: &str = "id";

/// How a relation is stored
#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    /// The row's column holds the related primary key
    ForeignKey,
    /// The row's column holds a list of related primary keys
    ManyToMany,
    /// Related rows point back at this row through `field`
    Reverse { field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
}

impl RelationDef {
    fn is_single(&self) -> bool {
        self.kind == RelationKind::ForeignKey
    }
}

/// Table definition
#[derive(Debug, Clone, Default)]
pub struct ModelDef {
    pub name: String,
    relations: BTreeMap<String, RelationDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: BTreeMap::new(),
        }
    }

    pub fn foreign_key(self, name: &str, target: &str) -> Self {
        self.relation(name, target, RelationKind::ForeignKey)
    }

    pub fn many_to_many(self, name: &str, target: &str) -> Self {
        self.relation(name, target, RelationKind::ManyToMany)
    }

    pub fn reverse(self, name: &str, target: &str, field: &str) -> Self {
        self.relation(
            name,
            target,
            RelationKind::Reverse {
                field: field.to_string(),
            },
        )
    }

    fn relation(mut self, name: &str, target: &str, kind: RelationKind) -> Self {
        self.relations.insert(
            name.to_string(),
            RelationDef {
                name: name.to_string(),
                target: target.to_string(),
                kind,
            },
        );
        self
    }
}

#[derive(Debug, Default)]
struct Store {
    models: BTreeMap<String, ModelDef>,
    rows: BTreeMap<String, Vec<Row>>,
}

#[derive(Debug, Default)]
struct Inner {
    store: RwLock<Store>,
    queries: AtomicUsize,
}

/// Shared handle to an in-memory database
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.inner.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn define(&self, model: ModelDef) {
        let mut store = self.write();
        store.rows.entry(model.name.clone()).or_default();
        store.models.insert(model.name.clone(), model);
    }

    /// Insert a row; it must be an object carrying an `id`
    pub fn insert(&self, model: &str, row: Value) -> OrmResult<()> {
        let Value::Object(row) = row else {
            return Err(OrmError::Query(format!("Rows of '{}' must be JSON objects", model)));
        };
        if row.get(PRIMARY_KEY).map_or(true, Value::is_null) {
            return Err(OrmError::Query(format!("Rows of '{}' need a primary key", model)));
        }
        let mut store = self.write();
        if !store.models.contains_key(model) {
            return Err(OrmError::Query(format!("Unknown model '{}'", model)));
        }
        store.rows.entry(model.to_string()).or_default().push(row);
        Ok(())
    }

    /// Number of queries issued so far
    pub fn query_count(&self) -> usize {
        self.inner.queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.inner.queries.store(0, Ordering::SeqCst);
    }

    pub fn queryset(&self, model: &str) -> MemoryQuerySet {
        MemoryQuerySet {
            db: self.clone(),
            model: model.to_string(),
            filters: Vec::new(),
            prefetches: Vec::new(),
            window: None,
        }
    }

    pub fn target(&self, model: &str) -> Arc<dyn TargetModel> {
        Arc::new(MemoryTarget {
            db: self.clone(),
            model: model.to_string(),
        })
    }

    fn record_query(&self, model: &str, kind: &'static str) {
        let total = self.inner.queries.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(target: "elif::sideload::memory", model, kind, total, "query");
    }

    fn relation(&self, model: &str, name: &str) -> Option<RelationDef> {
        self.read()
            .models
            .get(model)
            .and_then(|def| def.relations.get(name))
            .cloned()
    }

    fn rows(&self, model: &str) -> OrmResult<Vec<Row>> {
        self.read()
            .rows
            .get(model)
            .cloned()
            .ok_or_else(|| OrmError::Query(format!("Unknown model '{}'", model)))
    }

    fn related_rows(&self, row: &Row, relation: &RelationDef) -> OrmResult<Vec<Row>> {
        let targets = self.rows(&relation.target)?;
        let related = match &relation.kind {
            RelationKind::ForeignKey => match row.get(&relation.name) {
                None | Some(Value::Null) => Vec::new(),
                Some(id) => {
                    let id = identifier_key(id);
                    targets.into_iter().filter(|t| row_key(t) == id).take(1).collect()
                }
            },
            RelationKind::ManyToMany => {
                let ids: Vec<String> = match row.get(&relation.name) {
                    Some(Value::Array(ids)) => ids.iter().map(identifier_key).collect(),
                    _ => Vec::new(),
                };
                ids.iter()
                    .filter_map(|id| targets.iter().find(|t| row_key(t) == *id).cloned())
                    .collect()
            }
            RelationKind::Reverse { field } => {
                let id = row_key(row);
                targets
                    .into_iter()
                    .filter(|t| match t.get(field) {
                        Some(Value::Array(ids)) => ids.iter().any(|v| identifier_key(v) == id),
                        Some(Value::Null) | None => false,
                        Some(value) => identifier_key(value) == id,
                    })
                    .collect()
            }
        };
        Ok(related)
    }

    fn materialize(&self, model: &str, rows: Vec<Row>) -> Vec<Arc<MemoryRecord>> {
        rows.into_iter()
            .map(|row| Arc::new(MemoryRecord::new(self.clone(), model, row)))
            .collect()
    }

    /// Run one prefetch directive over `records`, one query per hop
    fn prefetch(&self, records: &[Arc<MemoryRecord>], directive: &PrefetchDirective) -> OrmResult<()> {
        let segments = path_segments(&directive.path);
        let mut level: Vec<Arc<MemoryRecord>> = records.to_vec();

        for (index, segment) in segments.iter().enumerate() {
            let Some(first) = level.first() else {
                break;
            };
            let model = first.model.clone();
            let relation = self.relation(&model, segment).ok_or_else(|| {
                OrmError::Relationship(format!(
                    "Cannot prefetch '{}': '{}' is not a relation of '{}'",
                    directive.path, segment, model
                ))
            })?;
            let last = index + 1 == segments.len();

            // Intermediate hops reuse rows an earlier directive loaded.
            if !last && level.iter().all(|record| record.has_prefetched(segment)) {
                level = level
                    .iter()
                    .flat_map(|record| record.prefetched_records(segment))
                    .collect();
                continue;
            }

            self.record_query(&relation.target, "prefetch");
            let predicate = if last { directive.predicate() } else { None };
            let mut next = Vec::new();
            for record in &level {
                let rows = self
                    .related_rows(&record.row, &relation)?
                    .into_iter()
                    .filter(|row| predicate.map_or(true, |p| p.matches(row)))
                    .collect();
                let related = self.materialize(&relation.target, rows);
                match (&directive.to_attr, last) {
                    (Some(attr), true) => record.store(attr, Prefetched::Attr(related.clone())),
                    _ if relation.is_single() => {
                        record.store(segment, Prefetched::One(related.first().cloned()))
                    }
                    _ => record.store(segment, Prefetched::Many(related.clone())),
                }
                next.extend(related);
            }
            level = next;
        }
        Ok(())
    }
}

fn row_key(row: &Row) -> String {
    identifier_key(row.get(PRIMARY_KEY).unwrap_or(&Value::Null))
}

#[derive(Debug, Clone)]
enum Prefetched {
    One(Option<Arc<MemoryRecord>>),
    Many(Vec<Arc<MemoryRecord>>),
    Attr(Vec<Arc<MemoryRecord>>),
}

/// A materialized row
pub struct MemoryRecord {
    db: MemoryDatabase,
    model: String,
    row: Row,
    prefetched: RwLock<BTreeMap<String, Prefetched>>,
}

impl MemoryRecord {
    fn new(db: MemoryDatabase, model: &str, row: Row) -> Self {
        Self {
            db,
            model: model.to_string(),
            row,
            prefetched: RwLock::new(BTreeMap::new()),
        }
    }

    fn store(&self, name: &str, prefetched: Prefetched) {
        self.prefetched
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), prefetched);
    }

    fn cached(&self, name: &str) -> Option<Prefetched> {
        self.prefetched
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn has_prefetched(&self, name: &str) -> bool {
        self.cached(name).is_some()
    }

    fn prefetched_records(&self, name: &str) -> Vec<Arc<MemoryRecord>> {
        match self.cached(name) {
            Some(Prefetched::One(record)) => record.into_iter().collect(),
            Some(Prefetched::Many(records)) | Some(Prefetched::Attr(records)) => records,
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for MemoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRecord")
            .field("model", &self.model)
            .field("row", &self.row)
            .finish()
    }
}

fn erase(records: Vec<Arc<MemoryRecord>>) -> Vec<RecordRef> {
    records.into_iter().map(|record| record as RecordRef).collect()
}

impl Record for MemoryRecord {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn primary_key(&self) -> Value {
        self.row.get(PRIMARY_KEY).cloned().unwrap_or(Value::Null)
    }

    fn attribute(&self, name: &str) -> Attribute {
        if let Some(prefetched) = self.cached(name) {
            return match prefetched {
                Prefetched::One(Some(record)) => Attribute::Object(record),
                Prefetched::One(None) => Attribute::Null,
                Prefetched::Many(records) => Attribute::Many(Arc::new(MemoryRelation {
                    records: erase(records),
                })),
                Prefetched::Attr(records) => Attribute::List(erase(records)),
            };
        }

        let Some(relation) = self.db.relation(&self.model, name) else {
            return match self.row.get(name) {
                None | Some(Value::Null) => Attribute::Null,
                Some(value) => Attribute::Scalar(value.clone()),
            };
        };

        // Not prefetched: load lazily, one query per access.
        self.db.record_query(&relation.target, "lazy");
        let rows = match self.db.related_rows(&self.row, &relation) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(target: "elif::sideload::memory", error = %err, relation = name, "lazy load failed");
                return Attribute::Null;
            }
        };
        let mut related = self.db.materialize(&relation.target, rows);
        if relation.is_single() {
            match related.pop() {
                Some(record) => Attribute::Object(record),
                None => Attribute::Null,
            }
        } else {
            Attribute::Many(Arc::new(MemoryRelation {
                records: erase(related),
            }))
        }
    }

    fn to_fields(&self) -> Map<String, Value> {
        self.row.clone()
    }
}

/// A loaded to-many relation
#[derive(Debug)]
pub struct MemoryRelation {
    records: Vec<RecordRef>,
}

impl ExpandableRelation for MemoryRelation {
    fn all(&self) -> Vec<RecordRef> {
        self.records.clone()
    }
}

/// Lazy query over one in-memory table
#[derive(Debug, Clone)]
pub struct MemoryQuerySet {
    db: MemoryDatabase,
    model: String,
    filters: Vec<Predicate>,
    prefetches: Vec<PrefetchDirective>,
    window: Option<(usize, usize)>,
}

impl MemoryQuerySet {
    fn matching_rows(&self, windowed: bool) -> OrmResult<Vec<Row>> {
        let rows = self
            .db
            .rows(&self.model)?
            .into_iter()
            .filter(|row| self.filters.iter().all(|filter| filter.matches(row)));
        Ok(match self.window {
            Some((offset, limit)) if windowed => rows.skip(offset).take(limit).collect(),
            _ => rows.collect(),
        })
    }
}

#[async_trait]
impl QuerySet for MemoryQuerySet {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn prefetches(&self) -> &[PrefetchDirective] {
        &self.prefetches
    }

    fn without_prefetches(mut self) -> Self {
        self.prefetches.clear();
        self
    }

    fn prefetch_related(mut self, directives: Vec<PrefetchDirective>) -> Self {
        self.prefetches.extend(directives);
        self
    }

    fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    fn slice(mut self, offset: usize, limit: usize) -> Self {
        self.window = Some((offset, limit));
        self
    }

    async fn count(&self) -> OrmResult<usize> {
        self.db.record_query(&self.model, "count");
        Ok(self.matching_rows(false)?.len())
    }

    async fn fetch(&self) -> OrmResult<Vec<RecordRef>> {
        self.db.record_query(&self.model, "fetch");
        let records = self.db.materialize(&self.model, self.matching_rows(true)?);
        for directive in &self.prefetches {
            self.db.prefetch(&records, directive)?;
        }
        Ok(erase(records))
    }

    async fn values_list(&self, path: &str) -> OrmResult<Vec<Value>> {
        self.db.record_query(&self.model, "values_list");
        let segments = path_segments(path);
        let mut level = self.matching_rows(true)?;
        let mut model = self.model.clone();

        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            let Some(relation) = self.db.relation(&model, segment) else {
                if last {
                    return Ok(level
                        .iter()
                        .map(|row| row.get(*segment).cloned().unwrap_or(Value::Null))
                        .collect());
                }
                return Err(OrmError::Relationship(format!(
                    "'{}' is not a relation of '{}'",
                    segment, model
                )));
            };

            let mut next = Vec::new();
            for row in &level {
                let related = self.db.related_rows(row, &relation)?;
                if last && related.is_empty() {
                    next.push(Row::new());
                }
                next.extend(related);
            }
            if last {
                return Ok(next
                    .iter()
                    .map(|row| row.get(PRIMARY_KEY).cloned().unwrap_or(Value::Null))
                    .collect());
            }
            level = next;
            model = relation.target;
        }
        Ok(Vec::new())
    }
}

/// Identifier lookups against one table
#[derive(Debug)]
pub struct MemoryTarget {
    db: MemoryDatabase,
    model: String,
}

#[async_trait]
impl TargetModel for MemoryTarget {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn has_relation(&self, name: &str) -> bool {
        self.db.relation(&self.model, name).is_some()
    }

    async fn find_by_ids(&self, ids: &[Value], predicate: Option<&Predicate>) -> OrmResult<Vec<RecordRef>> {
        self.db.record_query(&self.model, "find_by_ids");
        let wanted: BTreeSet<String> = ids.iter().map(identifier_key).collect();
        let rows = self
            .db
            .rows(&self.model)?
            .into_iter()
            .filter(|row| wanted.contains(&row_key(row)))
            .filter(|row| predicate.map_or(true, |p| p.matches(row)))
            .collect();
        Ok(erase(self.db.materialize(&self.model, rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::ProductCatalog;
    use super::*;

    #[tokio::test]
    async fn test_prefetch_costs_one_query_per_hop() {
        let catalog = ProductCatalog::seeded();
        let db = catalog.db();
        db.reset_query_count();

        let products = catalog
            .products()
            .prefetch_related(vec![PrefetchDirective::new("category"), PrefetchDirective::new("partners")])
            .fetch()
            .await
            .unwrap();
        assert_eq!(db.query_count(), 3);

        for product in &products {
            let _ = product.attribute("category");
            let _ = product.attribute("partners").into_records();
        }
        assert_eq!(db.query_count(), 3);

        let _ = products[0].attribute("supplier");
        assert_eq!(db.query_count(), 4);
    }

    #[tokio::test]
    async fn test_filtered_prefetch_into_attribute() {
        let catalog = ProductCatalog::single_product();
        let directive = PrefetchDirective::filtered("partners", "partner", Predicate::eq("name", "Partner 2"))
            .to_attr("chosen_partners");
        let products = catalog.products().prefetch_related(vec![directive]).fetch().await.unwrap();

        let chosen = match products[0].attribute("chosen_partners") {
            Attribute::List(records) => records,
            other => panic!("unexpected attribute {other:?}"),
        };
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].to_fields()["name"], "Partner 2");
    }

    #[tokio::test]
    async fn test_values_list_follows_relations() {
        let catalog = ProductCatalog::single_product();
        let products = catalog.products();
        assert_eq!(products.values_list("category").await.unwrap(), vec![Value::from(1)]);
        assert_eq!(
            products.values_list("partners").await.unwrap(),
            vec![Value::from(1), Value::from(2)]
        );
        assert_eq!(products.values_list("name").await.unwrap(), vec![Value::from("Product 1")]);
        assert!(products.values_list("name__id").await.is_err());
    }

    #[tokio::test]
    async fn test_reverse_relation_and_find_by_ids() {
        let catalog = ProductCatalog::seeded();
        let categories = catalog.db().queryset("category");
        let product_ids = categories
            .filter(Predicate::eq("id", 1))
            .values_list("products")
            .await
            .unwrap();
        assert_eq!(product_ids, vec![Value::from(1), Value::from(3)]);

        let found = catalog
            .target("product")
            .find_by_ids(&product_ids, Some(&Predicate::eq("name", "Product 3")))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].primary_key(), Value::from(3));
    }

    #[test]
    fn test_insert_requires_defined_model_and_key() {
        let db = MemoryDatabase::new();
        assert!(db.insert("ghost", serde_json::json!({"id": 1})).is_err());
        db.define(ModelDef::new("ghost"));
        assert!(db.insert("ghost", serde_json::json!({"name": "no key"})).is_err());
        assert!(db.insert("ghost", serde_json::json!({"id": 1})).is_ok());
    }
}
