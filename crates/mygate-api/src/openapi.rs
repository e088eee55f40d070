//! OpenAPI document generation from the catalog

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use mygate_catalog::{Catalog, Column, Table, TypeClass};
use mygate_rls::POLICY_TABLE;

#[derive(Debug, Serialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: OpenApiInfo,
    pub paths: HashMap<String, OpenApiPath>,
    pub components: OpenApiComponents,
}

#[derive(Debug, Serialize)]
pub struct OpenApiInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct OpenApiPath {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<OpenApiOperation>,
}

#[derive(Debug, Serialize)]
pub struct OpenApiOperation {
    pub summary: String,
    pub tags: Vec<String>,
    pub parameters: Vec<OpenApiParameter>,
    pub responses: HashMap<String, OpenApiResponse>,
}

#[derive(Debug, Serialize)]
pub struct OpenApiParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct OpenApiResponse {
    pub description: String,
}

/// Build the OpenAPI document for every exposed table
pub fn document(catalog: &Catalog) -> OpenApiDocument {
    let mut paths = HashMap::new();
    let mut schemas = HashMap::new();

    for table in catalog.tables() {
        if table.name == POLICY_TABLE {
            continue;
        }

        schemas.insert(table.name.clone(), table_schema(table));
        paths.insert(
            format!("/api/{}", table.name),
            OpenApiPath {
                get: Some(operation(
                    format!("List rows from {}", table.name),
                    &table.name,
                    query_parameters(),
                    "200",
                    "OK",
                )),
                post: Some(operation(
                    format!("Create rows in {}", table.name),
                    &table.name,
                    vec![],
                    "201",
                    "Created",
                )),
                patch: Some(operation(
                    format!("Update rows in {}", table.name),
                    &table.name,
                    query_parameters(),
                    "200",
                    "OK",
                )),
                delete: Some(operation(
                    format!("Delete rows from {}", table.name),
                    &table.name,
                    query_parameters(),
                    "200",
                    "OK",
                )),
            },
        );
    }

    OpenApiDocument {
        openapi: "3.0.3".to_string(),
        info: OpenApiInfo {
            title: format!("mygate: {}", catalog.database),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some("REST endpoints generated from the database schema".to_string()),
        },
        paths,
        components: OpenApiComponents { schemas },
    }
}

#[derive(Debug, Serialize)]
pub struct OpenApiComponents {
    pub schemas: HashMap<String, JsonValue>,
}

fn operation(
    summary: String,
    tag: &str,
    parameters: Vec<OpenApiParameter>,
    status: &str,
    description: &str,
) -> OpenApiOperation {
    OpenApiOperation {
        summary,
        tags: vec![tag.to_string()],
        parameters,
        responses: HashMap::from([(
            status.to_string(),
            OpenApiResponse {
                description: description.to_string(),
            },
        )]),
    }
}

fn query_parameters() -> Vec<OpenApiParameter> {
    ["select", "order", "limit", "offset"]
        .into_iter()
        .map(|name| {
            let kind = if name == "limit" || name == "offset" {
                "integer"
            } else {
                "string"
            };
            OpenApiParameter {
                name: name.to_string(),
                location: "query".to_string(),
                required: false,
                schema: json!({ "type": kind }),
            }
        })
        .collect()
}

fn table_schema(table: &Table) -> JsonValue {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for column in &table.columns {
        properties.insert(column.name.clone(), column_schema(column));
        if !column.nullable && column.default.is_none() && !column.auto_increment {
            required.push(JsonValue::String(column.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn column_schema(column: &Column) -> JsonValue {
    let json_type = match column.type_class() {
        TypeClass::Int => "integer",
        TypeClass::Float => "number",
        TypeClass::Bool => "boolean",
        TypeClass::Json => "object",
        TypeClass::Date | TypeClass::Text => "string",
    };

    let mut schema = json!({ "type": json_type });
    if column.type_class() == TypeClass::Date {
        schema["format"] = JsonValue::String("date-time".to_string());
    }
    schema
}
