//! OpenAPI description of the sideload query parameter

use serde::Serialize;
use std::collections::BTreeMap;

use crate::schema::RelationSchema;

/// Query parameter object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDoc {
    pub name: String,

    #[serde(rename = "in")]
    pub location: String,

    pub description: String,

    pub required: bool,

    pub schema: ParameterSchema,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub examples: BTreeMap<String, ExampleDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Available relation names
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleDoc {
    pub summary: String,
    pub value: String,
}

/// Describe the sideload parameter of a view.
///
/// Only GET endpoints sideload, so other methods get no parameter.
pub fn sideload_parameter(schema: &RelationSchema, param_name: &str, method: &str) -> Option<ParameterDoc> {
    if !method.eq_ignore_ascii_case("GET") {
        return None;
    }

    let relations = schema.relation_names();
    let mut description = format!(
        "Comma separated relations to load alongside '{}'. Available choices: {}.",
        schema.primary_name(),
        relations.join(", ")
    );

    let mut examples = BTreeMap::new();
    let regular: Vec<&str> = relations
        .iter()
        .copied()
        .filter(|name| !schema.is_multi_source(name))
        .take(2)
        .collect();
    if !regular.is_empty() {
        examples.insert(
            "sideloading".to_string(),
            ExampleDoc {
                summary: "Load related collections".to_string(),
                value: regular.join(","),
            },
        );
    }

    for name in relations.iter().filter(|name| schema.is_multi_source(name)) {
        let sources = schema.sub_sources(name).unwrap_or_default();
        description.push_str(&format!(
            " '{}' merges several sources; narrow it with {}[{}].",
            name,
            name,
            sources.join(",")
        ));
        examples.insert(
            format!("{}_sources", name),
            ExampleDoc {
                summary: format!("Load '{}' from selected sources", name),
                value: format!("{}[{}]", name, sources.join(",")),
            },
        );
    }

    Some(ParameterDoc {
        name: param_name.to_string(),
        location: "query".to_string(),
        description,
        required: false,
        schema: ParameterSchema {
            schema_type: "string".to_string(),
            choices: relations.iter().map(|name| name.to_string()).collect(),
        },
        examples,
    })
}
