//! Sideloadable list and detail views
//!
//! A view declares its relation schema once; the schema is cached in the
//! view and only ever read afterwards. Everything derived from a request
//! (selection, prefetch plan, reduced page) lives on the stack of the
//! handling call, so one view instance can serve concurrent requests.

use async_trait::async_trait;
use elif_sideload::{
    render_page, render_records, reduce_page, reduce_queryset, sideload_parameter, ParameterDoc,
    Predicate, PrefetchPlan, QuerySet, RelationSchema, RenderOptions, SideloadConfig,
    SideloadResult, SideloadSelection, TargetModel,
};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::debug;

use crate::error::{HttpError, HttpResult};
use crate::pagination::{paginated, Pagination};
use crate::request::SideloadRequest;

/// Read-only, lazily built relation schema of a view
#[derive(Debug, Default)]
pub struct SchemaCache {
    cell: OnceCell<RelationSchema>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached schema, building it on first use. A failed build is not
    /// cached and is retried by the next request.
    pub fn get_or_build<F>(&self, build: F) -> SideloadResult<&RelationSchema>
    where
        F: FnOnce() -> SideloadResult<RelationSchema>,
    {
        self.cell.get_or_try_init(build)
    }
}

/// A list/detail endpoint able to sideload related collections
#[async_trait]
pub trait SideloadableView: Send + Sync + 'static {
    type QuerySet: QuerySet;

    /// Declare the sideloadable fields
    fn build_schema(&self) -> SideloadResult<RelationSchema>;

    fn schema_cache(&self) -> &SchemaCache;

    /// Base queryset of the primary model
    fn queryset(&self) -> Self::QuerySet;

    fn config(&self) -> SideloadConfig {
        SideloadConfig::default()
    }

    fn schema(&self) -> SideloadResult<&RelationSchema> {
        self.schema_cache().get_or_build(|| self.build_schema())
    }

    /// OpenAPI description of the sideload parameter for `method`
    fn sideload_parameter(&self, method: &str) -> HttpResult<Option<ParameterDoc>> {
        let config = self.config();
        Ok(sideload_parameter(self.schema()?, &config.query_param_name, method))
    }

    /// List endpoint
    async fn list(&self, request: &SideloadRequest) -> HttpResult<Value> {
        let config = self.config();
        let schema = self.schema()?;
        let queryset = self.queryset();
        let pagination = Pagination::resolve(request.page_params()?, &config);
        let fields = request.fields(&config);

        let selection = SideloadSelection::parse(request.sideload(&config), schema, &config.query_param_name)?;
        if selection.is_empty() {
            return match pagination {
                Some(pagination) => {
                    let total = queryset.count().await?;
                    let rows = queryset
                        .slice(pagination.offset(), pagination.per_page)
                        .fetch()
                        .await?;
                    let data = Value::Array(render_records(schema, &rows, fields.as_ref()));
                    Ok(paginated(data, pagination.meta(total)))
                }
                None => {
                    let rows = queryset.fetch().await?;
                    Ok(Value::Array(render_records(schema, &rows, fields.as_ref())))
                }
            };
        }

        let plan = PrefetchPlan::build(schema, &selection, queryset.prefetches())?;
        let options = RenderOptions::default().flat(request.flat(&config)).fields(fields);
        debug!(
            target: "elif::sideload::http",
            relations = ?selection.relation_names(),
            paginated = pagination.is_some(),
            flat = options.flat,
            "sideloading list"
        );

        match pagination {
            Some(pagination) => {
                let total = queryset.count().await?;
                let rows = plan
                    .apply(queryset)
                    .slice(pagination.offset(), pagination.per_page)
                    .fetch()
                    .await?;
                let page = reduce_page(&plan, rows);
                let data = render_page(schema, &plan, &page, &options)?;
                Ok(paginated(data, pagination.meta(total)))
            }
            None => {
                let page = reduce_queryset(schema, &plan, &queryset).await?;
                Ok(render_page(schema, &plan, &page, &options)?)
            }
        }
    }

    /// Detail endpoint; a sideloaded detail keeps the list shape, with a
    /// one-element primary collection
    async fn retrieve(&self, id: &str, request: &SideloadRequest) -> HttpResult<Value> {
        let config = self.config();
        let schema = self.schema()?;
        let primary = schema.primary();
        let queryset = self
            .queryset()
            .filter(Predicate::eq(primary.target.primary_key_field(), path_identifier(id)));
        let fields = request.fields(&config);

        let selection = SideloadSelection::parse(request.sideload(&config), schema, &config.query_param_name)?;
        if selection.is_empty() {
            let rows = queryset.fetch().await?;
            return render_records(schema, &rows, fields.as_ref())
                .into_iter()
                .next()
                .ok_or_else(|| not_found(primary.target.as_ref(), id));
        }

        let plan = PrefetchPlan::build(schema, &selection, queryset.prefetches())?;
        let page = reduce_queryset(schema, &plan, &queryset).await?;
        if page.primary.is_empty() {
            return Err(not_found(primary.target.as_ref(), id));
        }
        let options = RenderOptions::default().flat(request.flat(&config)).fields(fields);
        Ok(render_page(schema, &plan, &page, &options)?)
    }
}

fn not_found(target: &dyn TargetModel, id: &str) -> HttpError {
    HttpError::not_found(format!("{} '{}'", target.model_name(), id))
}

/// Numeric path segments select numeric keys
fn path_identifier(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(number) => Value::from(number),
        Err(_) => Value::from(id),
    }
}
