//! Filter predicates attached to prefetch directives

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Query operator types
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Single column condition
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Value,
}

impl WhereCondition {
    pub fn new(column: impl Into<String>, operator: QueryOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Stable textual form, used for order independent comparison
    fn canonical(&self) -> String {
        format!("{} {} {}", self.column, self.operator, self.value)
    }

    fn matches(&self, fields: &Map<String, Value>) -> bool {
        let actual = fields.get(&self.column).unwrap_or(&Value::Null);
        match self.operator {
            QueryOperator::Equal => loosely_equal(actual, &self.value),
            QueryOperator::NotEqual => !loosely_equal(actual, &self.value),
            QueryOperator::GreaterThan => compare(actual, &self.value) == Some(Ordering::Greater),
            QueryOperator::GreaterThanOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            QueryOperator::LessThan => compare(actual, &self.value) == Some(Ordering::Less),
            QueryOperator::LessThanOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            QueryOperator::Like => match (actual, &self.value) {
                (Value::String(actual), Value::String(pattern)) => like(actual, pattern),
                _ => false,
            },
            QueryOperator::In => in_list(actual, &self.value),
            QueryOperator::NotIn => !in_list(actual, &self.value),
            QueryOperator::IsNull => actual.is_null(),
            QueryOperator::IsNotNull => !actual.is_null(),
        }
    }
}

impl fmt::Display for WhereCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Predicate tree over a model's fields
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Condition(WhereCondition),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Condition(WhereCondition::new(column, QueryOperator::Equal, value))
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Condition(WhereCondition::new(column, QueryOperator::NotEqual, value))
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Condition(WhereCondition::new(column, QueryOperator::GreaterThan, value))
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Condition(WhereCondition::new(column, QueryOperator::LessThan, value))
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::Condition(WhereCondition::new(column, QueryOperator::In, Value::Array(values)))
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::Condition(WhereCondition::new(column, QueryOperator::IsNull, Value::Null))
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Condition(WhereCondition::new(
            column,
            QueryOperator::Like,
            Value::String(pattern.into()),
        ))
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut children) => {
                children.push(other);
                Predicate::And(children)
            }
            predicate => Predicate::And(vec![predicate, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut children) => {
                children.push(other);
                Predicate::Or(children)
            }
            predicate => Predicate::Or(vec![predicate, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Canonical leaf conditions reachable through AND nodes.
    ///
    /// OR subtrees (including negated ANDs) are skipped entirely, so two
    /// predicates that only differ inside an OR branch compare as
    /// equivalent. Negated leaves keep their negation in the canonical form.
    pub fn condition_set(&self) -> Vec<String> {
        let mut conditions = Vec::new();
        let mut stack: Vec<(&Predicate, bool)> = vec![(self, false)];
        while let Some((predicate, negated)) = stack.pop() {
            match predicate {
                Predicate::Condition(condition) => {
                    let canonical = condition.canonical();
                    conditions.push(if negated {
                        format!("NOT {}", canonical)
                    } else {
                        canonical
                    });
                }
                // De Morgan: a negated OR is an AND of negations, a negated
                // AND is an OR and is skipped like any other OR.
                Predicate::And(children) if !negated => {
                    stack.extend(children.iter().map(|child| (child, false)));
                }
                Predicate::Or(children) if negated => {
                    stack.extend(children.iter().map(|child| (child, true)));
                }
                Predicate::And(_) | Predicate::Or(_) => {}
                Predicate::Not(inner) => stack.push((inner, !negated)),
            }
        }
        conditions.sort();
        conditions.dedup();
        conditions
    }

    /// Order independent equivalence, ignoring OR subtrees
    pub fn is_equivalent(&self, other: &Predicate) -> bool {
        self.condition_set() == other.condition_set()
    }

    /// Evaluate the predicate against a record's fields
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Predicate::Condition(condition) => condition.matches(fields),
            Predicate::And(children) => children.iter().all(|child| child.matches(fields)),
            Predicate::Or(children) => children.iter().any(|child| child.matches(fields)),
            Predicate::Not(inner) => !inner.matches(fields),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Condition(condition) => write!(f, "{}", condition),
            Predicate::And(children) | Predicate::Or(children) => {
                let joiner = if matches!(self, Predicate::And(_)) { " AND " } else { " OR " };
                let parts: Vec<String> = children.iter().map(|c| format!("({})", c)).collect();
                write!(f, "{}", parts.join(joiner))
            }
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn in_list(actual: &Value, list: &Value) -> bool {
    match list {
        Value::Array(values) => values.iter().any(|value| loosely_equal(actual, value)),
        _ => false,
    }
}

/// SQL LIKE with `%` wildcards, case sensitive
fn like(actual: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return actual == pattern;
    }
    let mut rest = actual;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if index == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(position) => rest = &rest[position + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_equivalence_is_order_independent() {
        let left = Predicate::eq("name", "Supplier1").and(Predicate::gt("rating", 3));
        let right = Predicate::gt("rating", 3).and(Predicate::eq("name", "Supplier1"));
        assert!(left.is_equivalent(&right));
    }

    #[test]
    fn test_equivalence_ignores_or_subtrees() {
        let left = Predicate::eq("active", true)
            .and(Predicate::eq("name", "a").or(Predicate::eq("name", "b")));
        let right = Predicate::eq("active", true)
            .and(Predicate::eq("name", "c").or(Predicate::eq("name", "d")));
        assert!(left.is_equivalent(&right));
    }

    #[test]
    fn test_negated_conjunction_is_not_a_conjunction_of_negations() {
        let name = Predicate::eq("name", "A");
        let rating = Predicate::eq("rating", 1);
        let not_both = name.clone().and(rating.clone()).negate();
        let neither = name.clone().negate().and(rating.clone().negate());
        assert!(!not_both.is_equivalent(&neither));

        let record = fields(json!({"name": "A", "rating": 2}));
        assert!(not_both.matches(&record));
        assert!(!neither.matches(&record));

        // NOT (a OR b) is NOT a AND NOT b
        let not_either = name.or(rating).negate();
        assert!(not_either.is_equivalent(&neither));
    }

    #[test]
    fn test_different_values_not_equivalent() {
        let left = Predicate::eq("name", "Supplier1");
        let right = Predicate::eq("name", "Supplier2");
        assert!(!left.is_equivalent(&right));
        assert!(!left.is_equivalent(&left.clone().negate()));
    }

    #[test]
    fn test_matches_record_fields() {
        let record = fields(json!({"id": 1, "name": "Supplier1", "rating": 4, "deleted_at": null}));

        assert!(Predicate::eq("name", "Supplier1").matches(&record));
        assert!(Predicate::gt("rating", 3).matches(&record));
        assert!(!Predicate::lt("rating", 3).matches(&record));
        assert!(Predicate::is_null("deleted_at").matches(&record));
        assert!(Predicate::is_in("id", vec![json!(1), json!(2)]).matches(&record));
        assert!(Predicate::like("name", "Supp%").matches(&record));
        assert!(Predicate::like("name", "%lier1").matches(&record));
        assert!(!Predicate::like("name", "%other%").matches(&record));
        assert!(Predicate::eq("name", "x").or(Predicate::gt("rating", 1)).matches(&record));
        assert!(!Predicate::eq("name", "Supplier1").negate().matches(&record));
    }
}
