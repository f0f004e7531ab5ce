//! Product catalog fixture: products with a category, a supplier, an
//! optional backup supplier and many partners.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use super::{MemoryDatabase, MemoryQuerySet, ModelDef};
use crate::error::SideloadResult;
use crate::orm::TargetModel;
use crate::schema::{FieldSpec, PrefetchOverride, RelationSchema};

#[derive(Debug, Clone)]
pub struct ProductCatalog {
    db: MemoryDatabase,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductCatalog {
    /// Catalog tables without rows
    pub fn new() -> Self {
        let db = MemoryDatabase::new();
        db.define(ModelDef::new("category").reverse("products", "product", "category"));
        db.define(ModelDef::new("supplier").reverse("products", "product", "supplier"));
        db.define(ModelDef::new("partner").reverse("products", "product", "partners"));
        db.define(
            ModelDef::new("product")
                .foreign_key("category", "category")
                .foreign_key("supplier", "supplier")
                .foreign_key("backup_supplier", "supplier")
                .many_to_many("partners", "partner"),
        );
        Self { db }
    }

    /// One product `Product 1` in `Category 1`, supplied by `Supplier 1`,
    /// backed up by `Supplier 4`, with partners `Partner 1` and `Partner 2`
    pub fn single_product() -> Self {
        let catalog = Self::new();
        catalog.seed_lookups();
        catalog.seed(
            "product",
            vec![json!({
                "id": 1, "name": "Product 1", "category": 1, "supplier": 1,
                "backup_supplier": 4, "partners": [1, 2]
            })],
        );
        catalog
    }

    /// Four products sharing categories, suppliers and partners
    pub fn seeded() -> Self {
        let catalog = Self::new();
        catalog.seed_lookups();
        catalog.seed(
            "product",
            vec![
                json!({"id": 1, "name": "Product 1", "category": 1, "supplier": 1, "backup_supplier": 4, "partners": [1, 2]}),
                json!({"id": 2, "name": "Product 2", "category": 2, "supplier": 2, "backup_supplier": null, "partners": [1, 3]}),
                json!({"id": 3, "name": "Product 3", "category": 1, "supplier": 1, "backup_supplier": 3, "partners": [2]}),
                json!({"id": 4, "name": "Product 4", "category": 3, "supplier": 3, "backup_supplier": 4, "partners": []}),
            ],
        );
        catalog
    }

    fn seed_lookups(&self) {
        self.seed(
            "category",
            (1..=3).map(|id| json!({"id": id, "name": format!("Category {}", id)})).collect(),
        );
        self.seed(
            "supplier",
            (1..=4)
                .map(|id| json!({"id": id, "name": format!("Supplier {}", id), "rating": id}))
                .collect(),
        );
        self.seed(
            "partner",
            (1..=3).map(|id| json!({"id": id, "name": format!("Partner {}", id)})).collect(),
        );
    }

    fn seed(&self, model: &str, rows: Vec<Value>) {
        for row in rows {
            if let Err(err) = self.db.insert(model, row) {
                warn!(target: "elif::sideload::memory", model, error = %err, "fixture row rejected");
            }
        }
    }

    pub fn db(&self) -> &MemoryDatabase {
        &self.db
    }

    pub fn products(&self) -> MemoryQuerySet {
        self.db.queryset("product")
    }

    pub fn target(&self, model: &str) -> Arc<dyn TargetModel> {
        self.db.target(model)
    }

    /// `products` with `categories`, `suppliers`, `partners` and the
    /// multi-source `combined_suppliers` (`suppliers`, `backup_suppliers`)
    pub fn schema(&self) -> SideloadResult<RelationSchema> {
        RelationSchema::builder()
            .primary("products")
            .field(FieldSpec::many("products", self.target("product")))
            .field(
                FieldSpec::many("categories", self.target("category"))
                    .source("category")
                    .fields(["id", "name"]),
            )
            .field(
                FieldSpec::many("suppliers", self.target("supplier"))
                    .source("supplier")
                    .fields(["id", "name"]),
            )
            .field(FieldSpec::many("partners", self.target("partner")).fields(["id", "name"]))
            .field(
                FieldSpec::multi_source("combined_suppliers", self.target("supplier"))
                    .fields(["id", "name"]),
            )
            .prefetch(
                "combined_suppliers",
                PrefetchOverride::sources([
                    ("suppliers", "supplier"),
                    ("backup_suppliers", "backup_supplier"),
                ]),
            )
            .build()
    }
}
