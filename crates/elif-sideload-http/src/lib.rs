//! # elif-sideload-http
//!
//! axum integration for elif-sideload: sideloadable list and detail views,
//! query parameter handling, pagination, error responses and logging setup.

pub mod error;
pub mod logging;
pub mod pagination;
pub mod request;
pub mod routes;
pub mod view;

pub use error::{HttpError, HttpResult};
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
pub use pagination::{paginated, PageParams, Pagination, PaginationMeta};
pub use request::SideloadRequest;
pub use routes::sideload_routes;
pub use view::{SchemaCache, SideloadableView};
