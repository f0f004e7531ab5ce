//! Sideloading configuration
//!
//! Query parameter names, feature toggles for flattening and field
//! selection, and pagination defaults. Values can be loaded from the
//! environment and are validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default configuration values
pub struct SideloadDefaults;

impl SideloadDefaults {
    pub const QUERY_PARAM_NAME: &'static str = "sideload";
    pub const FLAT_PARAM_NAME: &'static str = "flat";
    pub const FIELDS_PARAM_NAME: &'static str = "fields";
    pub const ENABLE_FLATTENING: bool = true;
    pub const ENABLE_FIELD_SELECTION: bool = true;
    pub const PAGE_SIZE: usize = 10;
    pub const MAX_PAGE_SIZE: usize = 100;
}

/// Configuration loading errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl ConfigError {
    pub fn validation_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Sideloading configuration for a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideloadConfig {
    /// Name of the query parameter listing the relations to sideload
    pub query_param_name: String,
    /// Name of the query parameter requesting a flattened response
    pub flat_param_name: String,
    /// Name of the query parameter restricting returned fields
    pub fields_param_name: String,
    /// Honour the flat parameter
    pub enable_flattening: bool,
    /// Honour the fields parameter
    pub enable_field_selection: bool,
    /// Records per page for list views, `None` disables pagination
    pub page_size: Option<usize>,
    /// Upper bound for a client supplied `per_page`
    pub max_page_size: usize,
}

impl Default for SideloadConfig {
    fn default() -> Self {
        Self {
            query_param_name: SideloadDefaults::QUERY_PARAM_NAME.to_string(),
            flat_param_name: SideloadDefaults::FLAT_PARAM_NAME.to_string(),
            fields_param_name: SideloadDefaults::FIELDS_PARAM_NAME.to_string(),
            enable_flattening: SideloadDefaults::ENABLE_FLATTENING,
            enable_field_selection: SideloadDefaults::ENABLE_FIELD_SELECTION,
            page_size: Some(SideloadDefaults::PAGE_SIZE),
            max_page_size: SideloadDefaults::MAX_PAGE_SIZE,
        }
    }
}

impl SideloadConfig {
    /// Use a different name for the sideload query parameter
    pub fn with_query_param_name(mut self, name: impl Into<String>) -> Self {
        self.query_param_name = name.into();
        self
    }

    /// Set the page size, `None` disables pagination
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_flattening(mut self, enabled: bool) -> Self {
        self.enable_flattening = enabled;
        self
    }

    pub fn with_field_selection(mut self, enabled: bool) -> Self {
        self.enable_field_selection = enabled;
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(name) = env::var("SIDELOAD_QUERY_PARAM") {
            config.query_param_name = name;
        }
        if let Ok(name) = env::var("SIDELOAD_FLAT_PARAM") {
            config.flat_param_name = name;
        }
        if let Ok(name) = env::var("SIDELOAD_FIELDS_PARAM") {
            config.fields_param_name = name;
        }
        if let Ok(value) = env::var("SIDELOAD_ENABLE_FLATTENING") {
            config.enable_flattening = parse_env("enable_flattening", &value, "true or false")?;
        }
        if let Ok(value) = env::var("SIDELOAD_ENABLE_FIELD_SELECTION") {
            config.enable_field_selection =
                parse_env("enable_field_selection", &value, "true or false")?;
        }
        if let Ok(value) = env::var("SIDELOAD_PAGE_SIZE") {
            config.page_size = match value.to_lowercase().as_str() {
                "" | "none" | "off" => None,
                _ => Some(parse_env("page_size", &value, "a positive integer or 'none'")?),
            };
        }
        if let Ok(value) = env::var("SIDELOAD_MAX_PAGE_SIZE") {
            config.max_page_size = parse_env("max_page_size", &value, "a positive integer")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("query_param_name", &self.query_param_name),
            ("flat_param_name", &self.flat_param_name),
            ("fields_param_name", &self.fields_param_name),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(ConfigError::validation_failed(field, "parameter name must not be empty"));
            }
        }
        if self.query_param_name == self.flat_param_name
            || self.query_param_name == self.fields_param_name
            || self.flat_param_name == self.fields_param_name
        {
            return Err(ConfigError::validation_failed(
                "query_param_name",
                "sideload, flat and fields parameters must have distinct names",
            ));
        }
        if self.page_size == Some(0) {
            return Err(ConfigError::validation_failed("page_size", "page size must be greater than 0"));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::validation_failed(
                "max_page_size",
                "maximum page size must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(field: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 7] = [
        "SIDELOAD_QUERY_PARAM",
        "SIDELOAD_FLAT_PARAM",
        "SIDELOAD_FIELDS_PARAM",
        "SIDELOAD_ENABLE_FLATTENING",
        "SIDELOAD_ENABLE_FIELD_SELECTION",
        "SIDELOAD_PAGE_SIZE",
        "SIDELOAD_MAX_PAGE_SIZE",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        assert_eq!(SideloadConfig::from_env().unwrap(), SideloadConfig::default());

        env::set_var("SIDELOAD_QUERY_PARAM", "include");
        env::set_var("SIDELOAD_PAGE_SIZE", "none");
        env::set_var("SIDELOAD_MAX_PAGE_SIZE", "50");
        let config = SideloadConfig::from_env();
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.query_param_name, "include");
        assert_eq!(config.page_size, None);
        assert_eq!(config.max_page_size, 50);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var("SIDELOAD_ENABLE_FLATTENING", "nope");
        let flattening = SideloadConfig::from_env();
        clear_env();
        assert!(matches!(
            flattening,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "enable_flattening"
        ));

        env::set_var("SIDELOAD_FLAT_PARAM", "sideload");
        let duplicate = SideloadConfig::from_env();
        clear_env();
        assert!(matches!(duplicate, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SideloadConfig::default();
        assert_eq!(config.query_param_name, "sideload");
        assert_eq!(config.flat_param_name, "flat");
        assert_eq!(config.fields_param_name, "fields");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_parameter_names_rejected() {
        let config = SideloadConfig::default().with_query_param_name("flat");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = SideloadConfig::default().with_page_size(Some(0));
        assert!(config.validate().is_err());
        assert!(SideloadConfig::default().with_page_size(None).validate().is_ok());
    }

    #[test]
    fn test_parse_env_reports_field() {
        let err = parse_env::<usize>("page_size", "ten", "a positive integer").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for page_size: 'ten', expected a positive integer"
        );
    }
}
