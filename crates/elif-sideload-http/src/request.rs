//! Query parameters of a sideloadable request

use axum::http::Method;
use elif_sideload::{FieldSelection, SideloadConfig};

use crate::error::{HttpError, HttpResult};
use crate::pagination::PageParams;

/// Method and decoded query string of one request
#[derive(Debug, Clone)]
pub struct SideloadRequest {
    method: Method,
    params: Vec<(String, String)>,
}

impl SideloadRequest {
    pub fn new(method: Method, params: Vec<(String, String)>) -> Self {
        Self { method, params }
    }

    /// Decode a raw `application/x-www-form-urlencoded` query string
    pub fn from_query(method: Method, query: Option<&str>) -> HttpResult<Self> {
        let params = match query {
            Some(query) if !query.is_empty() => serde_urlencoded::from_str(query)
                .map_err(|e| HttpError::bad_request(format!("Malformed query string: {}", e)))?,
            _ => Vec::new(),
        };
        Ok(Self::new(method, params))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// First value of a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Raw sideload parameter; only GET requests sideload
    pub fn sideload(&self, config: &SideloadConfig) -> Option<&str> {
        if self.method != Method::GET {
            return None;
        }
        self.param(&config.query_param_name)
            .filter(|raw| !raw.trim().is_empty())
    }

    pub fn flat(&self, config: &SideloadConfig) -> bool {
        config.enable_flattening
            && matches!(self.param(&config.flat_param_name), Some("true") | Some("1"))
    }

    pub fn fields(&self, config: &SideloadConfig) -> Option<FieldSelection> {
        if !config.enable_field_selection {
            return None;
        }
        FieldSelection::parse(self.param(&config.fields_param_name))
    }

    pub fn page_params(&self) -> HttpResult<PageParams> {
        let number = |name: &str| -> HttpResult<Option<usize>> {
            self.param(name)
                .map(|raw| {
                    raw.trim().parse::<usize>().map_err(|_| {
                        HttpError::bad_request(format!("'{}' must be a positive integer, got '{}'", name, raw))
                    })
                })
                .transpose()
        };
        Ok(PageParams {
            page: number("page")?,
            per_page: number("per_page")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_brackets_and_commas() {
        let request = SideloadRequest::from_query(
            Method::GET,
            Some("sideload=combined_suppliers%5Bsuppliers%2Cbackup_suppliers%5D,categories&flat=1"),
        )
        .unwrap();
        let config = SideloadConfig::default();
        assert_eq!(
            request.sideload(&config),
            Some("combined_suppliers[suppliers,backup_suppliers],categories")
        );
        assert!(request.flat(&config));
        assert!(!request.flat(&config.clone().with_flattening(false)));
    }

    #[test]
    fn test_only_get_sideloads() {
        let config = SideloadConfig::default();
        for method in [Method::POST, Method::PUT, Method::PATCH] {
            let request = SideloadRequest::from_query(method, Some("sideload=categories")).unwrap();
            assert_eq!(request.sideload(&config), None);
        }
        let blank = SideloadRequest::from_query(Method::GET, Some("sideload=")).unwrap();
        assert_eq!(blank.sideload(&config), None);
    }

    #[test]
    fn test_page_params() {
        let request = SideloadRequest::from_query(Method::GET, Some("page=2&per_page=5")).unwrap();
        assert_eq!(
            request.page_params().unwrap(),
            PageParams {
                page: Some(2),
                per_page: Some(5)
            }
        );

        let bad = SideloadRequest::from_query(Method::GET, Some("page=two")).unwrap();
        assert!(bad.page_params().is_err());
    }
}
