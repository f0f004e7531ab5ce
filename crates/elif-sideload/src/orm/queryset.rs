//! Queryset and model collaborator interfaces

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::OrmResult;
use crate::orm::{Predicate, RecordRef};
use crate::prefetch::PrefetchDirective;

/// Lazy, composable query over one model.
///
/// Builder methods consume and return the queryset; nothing is executed
/// until `count`, `fetch` or `values_list` is awaited.
#[async_trait]
pub trait QuerySet: Clone + Send + Sync + 'static {
    /// Name of the model being queried
    fn model_name(&self) -> &str;

    /// Prefetch directives already attached to this queryset
    fn prefetches(&self) -> &[PrefetchDirective];

    /// Drop every attached prefetch directive
    fn without_prefetches(self) -> Self;

    /// Attach prefetch directives, in the given order
    fn prefetch_related(self, directives: Vec<PrefetchDirective>) -> Self;

    /// Narrow the queryset
    fn filter(self, predicate: Predicate) -> Self;

    /// Restrict to a window of rows
    fn slice(self, offset: usize, limit: usize) -> Self;

    /// Number of rows matched, ignoring any slice
    async fn count(&self) -> OrmResult<usize>;

    /// Materialize rows, honouring attached prefetches
    async fn fetch(&self) -> OrmResult<Vec<RecordRef>>;

    /// Project the values found at a `__` separated lookup path.
    ///
    /// One value per reachable related row; to-many hops fan out.
    async fn values_list(&self, path: &str) -> OrmResult<Vec<Value>>;
}

/// Descriptor for a model that can be re-queried by identifier
#[async_trait]
pub trait TargetModel: Send + Sync + fmt::Debug {
    fn model_name(&self) -> &str;

    fn primary_key_field(&self) -> &str {
        "id"
    }

    /// Whether `name` is a relation attribute on this model
    fn has_relation(&self, name: &str) -> bool;

    /// Fetch rows whose primary key is in `ids`, optionally narrowed further
    async fn find_by_ids(
        &self,
        ids: &[Value],
        predicate: Option<&Predicate>,
    ) -> OrmResult<Vec<RecordRef>>;
}
