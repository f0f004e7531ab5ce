//! Row objects returned by the ORM collaborator

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a materialized row
pub type RecordRef = Arc<dyn Record>;

/// A materialized row object
pub trait Record: Send + Sync + fmt::Debug {
    /// Name of the model this row belongs to
    fn model_name(&self) -> &str;

    /// Primary key value
    fn primary_key(&self) -> Value;

    /// Read an attribute by name.
    ///
    /// Relations resolve to the related object, to an expandable relation
    /// for to-many managers, or to a plain list for renamed prefetches that
    /// were materialized into an attribute.
    fn attribute(&self, name: &str) -> Attribute;

    /// Scalar fields, with relations rendered as primary keys
    fn to_fields(&self) -> Map<String, Value>;
}

/// A to-many relation that can be expanded to its members
pub trait ExpandableRelation: Send + Sync + fmt::Debug {
    fn all(&self) -> Vec<RecordRef>;
}

/// Value of a row attribute
#[derive(Debug, Clone)]
pub enum Attribute {
    Null,
    Scalar(Value),
    Object(RecordRef),
    Many(Arc<dyn ExpandableRelation>),
    List(Vec<RecordRef>),
}

impl Attribute {
    pub fn is_null(&self) -> bool {
        matches!(self, Attribute::Null | Attribute::Scalar(Value::Null))
    }

    /// Related rows reachable through this attribute.
    ///
    /// Scalars and nulls contribute nothing; to-many relations and lists are
    /// expanded to their members.
    pub fn into_records(self) -> Vec<RecordRef> {
        match self {
            Attribute::Null | Attribute::Scalar(_) => Vec::new(),
            Attribute::Object(record) => vec![record],
            Attribute::Many(relation) => relation.all(),
            Attribute::List(records) => records,
        }
    }
}

/// Identity of a row: model name plus primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub model: String,
    pub primary_key: String,
}

impl RecordKey {
    pub fn of(record: &dyn Record) -> Self {
        Self {
            model: record.model_name().to_string(),
            primary_key: identifier_key(&record.primary_key()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model, self.primary_key)
    }
}

/// Hashable form of an identifier value, strings and numbers unified
pub fn identifier_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
