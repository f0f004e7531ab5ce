//! axum routing for sideloadable views

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use crate::error::HttpResult;
use crate::request::SideloadRequest;
use crate::view::SideloadableView;

/// Mount `GET {path}` (list) and `GET {path}/:id` (detail) for a view
pub fn sideload_routes<V: SideloadableView>(path: &str, view: V) -> Router {
    let base = path.trim_end_matches('/');
    let detail = format!("{}/:id", base);
    Router::new()
        .route(if base.is_empty() { "/" } else { base }, get(list_handler::<V>))
        .route(&detail, get(retrieve_handler::<V>))
        .with_state(Arc::new(view))
}

async fn list_handler<V: SideloadableView>(
    State(view): State<Arc<V>>,
    method: Method,
    RawQuery(query): RawQuery,
) -> HttpResult<Json<Value>> {
    let request = SideloadRequest::from_query(method, query.as_deref())?;
    Ok(Json(view.list(&request).await?))
}

async fn retrieve_handler<V: SideloadableView>(
    State(view): State<Arc<V>>,
    Path(id): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
) -> HttpResult<Json<Value>> {
    let request = SideloadRequest::from_query(method, query.as_deref())?;
    Ok(Json(view.retrieve(&id, &request).await?))
}
