//! Declarative record serialization

use serde_json::{Map, Value};

use crate::orm::Record;

/// Renders a record as a JSON object, restricted to a declared field list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSerializer {
    fields: Option<Vec<String>>,
}

impl RecordSerializer {
    /// Serialize every field the record exposes
    pub fn all() -> Self {
        Self { fields: None }
    }

    /// Serialize only the listed fields, in the listed order
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Some(fields.into_iter().map(Into::into).collect()),
        }
    }

    /// Declared field names, `None` meaning all
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    pub fn serialize(&self, record: &dyn Record) -> Map<String, Value> {
        let mut source = record.to_fields();
        match &self.fields {
            None => source,
            Some(fields) => fields
                .iter()
                .filter_map(|name| source.remove(name).map(|value| (name.clone(), value)))
                .collect(),
        }
    }
}
