//! HTTP handlers for the gateway's REST operations
//!
//! Every handler follows the same pipeline: authenticate, parse the query
//! parameters, plan the select tree, look up row-level policies, compile
//! parameterized SQL, execute under the request's claim context, and shape
//! the response. Policies are consulted on every statement-emitting path;
//! `exists` alone skips the SELECT policy by design.

use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde_json::{json, Value as JsonValue};
use tracing::warn;

use mygate_auth::JwtVerifier;
use mygate_catalog::{load_catalog, Catalog, CatalogCache, Column, Table, TypeClass};
use mygate_common::error::Error;
use mygate_common::types::Claims;
use mygate_query::compile::{
    aggregate_list, column_list, fk_clause, grouped_fields, limit_clause, order_clause, pk_clause,
    quote_ident, where_clause,
};
use mygate_query::params::parse_query;
use mygate_query::select::parse_select_tree;
use mygate_query::{BindValue, SelectItem, SqlFragment};
use mygate_rls::{inject, scope_single, PolicyCache, PolicyOp, POLICY_TABLE};

use crate::executor::Executor;
use crate::openapi;
use crate::respond::{self, UpsertMode};

/// Shared gateway state
pub struct AppState {
    pub catalog: CatalogCache,
    pub policies: PolicyCache,
    pub executor: Executor,
    pub verifier: JwtVerifier,
    /// Target schema, needed for catalog rebuilds
    pub database: String,
}

/// Error wrapper carrying the gateway taxonomy through actix
#[derive(Debug)]
pub struct GatewayError(pub Error);

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Error> for GatewayError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        respond::error(&self.0)
    }
}

type ApiResult = Result<HttpResponse, GatewayError>;

// ============================================================================
// Request plumbing
// ============================================================================

fn authenticate(state: &AppState, req: &HttpRequest) -> Result<Option<Claims>, Error> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());
    state.verifier.authenticate(header)
}

fn query_pairs(req: &HttpRequest) -> Vec<(String, String)> {
    url::form_urlencoded::parse(req.query_string().as_bytes())
        .into_owned()
        .collect()
}

fn lookup_table<'a>(catalog: &'a Catalog, name: &str) -> Result<&'a Table, Error> {
    catalog
        .table(name)
        .ok_or_else(|| Error::TableNotFound(name.to_string()))
}

fn select_tree(raw: Option<&String>) -> Result<Vec<SelectItem>, Error> {
    match raw {
        Some(raw) => parse_select_tree(raw),
        None => Ok(Vec::new()),
    }
}

/// Join non-empty SQL pieces with single spaces
fn statement(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bind a JSON body value for a specific catalog column. JSON-typed columns
/// are pre-serialized so the server stores valid JSON text.
fn json_bind(value: &JsonValue, column: &Column) -> Result<BindValue, Error> {
    if column.type_class() == TypeClass::Json {
        return Ok(BindValue::Text(serde_json::to_string(value)?));
    }
    Ok(json_bind_plain(value))
}

/// Bind a JSON value with no column context (routine arguments)
fn json_bind_plain(value: &JsonValue) -> BindValue {
    match value {
        JsonValue::Null => BindValue::Null,
        JsonValue::Bool(b) => BindValue::Bool(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map(BindValue::Int)
            .unwrap_or_else(|| BindValue::Float(n.as_f64().unwrap_or(0.0))),
        JsonValue::String(s) => BindValue::Text(s.clone()),
        other => BindValue::Text(other.to_string()),
    }
}

/// `a = ?, b = ?` assignment list over the catalog-known keys of a body
/// object; `None` when nothing assignable remains.
fn set_clause(
    table: &Table,
    object: &serde_json::Map<String, JsonValue>,
) -> Result<Option<(String, Vec<BindValue>)>, Error> {
    let mut assignments = Vec::new();
    let mut params = Vec::new();

    for (key, value) in object {
        let Some(column) = table.column(key) else {
            continue;
        };
        assignments.push(format!("{} = ?", quote_ident(key)));
        params.push(json_bind(value, column)?);
    }

    if assignments.is_empty() {
        return Ok(None);
    }

    Ok(Some((assignments.join(", "), params)))
}

async fn count_rows(
    state: &AppState,
    table_name: &str,
    scope: &SqlFragment,
    claims: Option<&Claims>,
) -> Result<u64, Error> {
    let sql = statement(&[
        "SELECT COUNT(1) AS no_of_rows FROM",
        &quote_ident(table_name),
        &scope.sql,
    ]);
    let rows = state
        .executor
        .fetch(&sql, scope.params.clone(), claims)
        .await?;
    Ok(rows
        .first()
        .and_then(|r| r.get("no_of_rows"))
        .and_then(JsonValue::as_u64)
        .unwrap_or(0))
}

// ============================================================================
// Listing and reading
// ============================================================================

/// GET /api/{table}
pub async fn list(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let parsed = parse_query(&query_pairs(&req))?;
    let tree = select_tree(parsed.select.as_ref())?;
    let columns = column_list(&catalog, table, &tree)?;

    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Select);
    let scope = inject(where_clause(&parsed.predicates), predicate.as_deref());

    let total = if respond::wants_exact_count(&req) {
        Some(count_rows(&state, &table_name, &scope, claims.as_ref()).await?)
    } else {
        None
    };

    let order = order_clause(&parsed.order);
    let limits = limit_clause(parsed.page);
    let sql = statement(&[
        "SELECT",
        &columns,
        "FROM",
        &quote_ident(&table_name),
        &scope.sql,
        &order,
        &limits.sql,
    ]);

    let mut params = scope.params;
    params.extend(limits.params);
    let rows = state.executor.fetch(&sql, params, claims.as_ref()).await?;

    Ok(respond::list_response(&req, rows, parsed.page, total))
}

/// GET /api/{table}/{id}
pub async fn read(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> ApiResult {
    let (table_name, id) = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Select);
    let scope = scope_single(predicate.as_deref(), pk_clause(table, &id)?);

    let sql = statement(&[
        "SELECT * FROM",
        &quote_ident(&table_name),
        &scope.sql,
        "LIMIT 1",
    ]);
    let rows = state
        .executor
        .fetch(&sql, scope.params, claims.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// GET /api/{table}/{id}/exists
///
/// Existence is deliberately observable without the SELECT policy.
pub async fn exists(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> ApiResult {
    let (table_name, id) = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let scope = scope_single(None, pk_clause(table, &id)?);
    let sql = statement(&[
        "SELECT * FROM",
        &quote_ident(&table_name),
        &scope.sql,
        "LIMIT 1",
    ]);
    let rows = state
        .executor
        .fetch(&sql, scope.params, claims.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// GET /api/{parent}/{id}/{child}
pub async fn relational(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    req: HttpRequest,
) -> ApiResult {
    let (parent_name, id, child_name) = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let parent = lookup_table(&catalog, &parent_name)?;
    let child = lookup_table(&catalog, &child_name)?;

    let parsed = parse_query(&query_pairs(&req))?;
    let tree = select_tree(parsed.select.as_ref())?;
    let columns = column_list(&catalog, child, &tree)?;

    let fk = fk_clause(parent, child, &id)?;
    let user = where_clause(&parsed.predicates);
    let combined = if user.is_empty() {
        SqlFragment::new(format!("WHERE {}", fk.sql), fk.params)
    } else {
        let mut params = user.params;
        params.extend(fk.params);
        SqlFragment::new(format!("{} AND {}", user.sql, fk.sql), params)
    };

    let predicate = state
        .policies
        .snapshot()
        .predicate(&child_name, PolicyOp::Select);
    let scope = inject(combined, predicate.as_deref());

    let total = if respond::wants_exact_count(&req) {
        Some(count_rows(&state, &child_name, &scope, claims.as_ref()).await?)
    } else {
        None
    };

    let order = order_clause(&parsed.order);
    let limits = limit_clause(parsed.page);
    let sql = statement(&[
        "SELECT",
        &columns,
        "FROM",
        &quote_ident(&child_name),
        &scope.sql,
        &order,
        &limits.sql,
    ]);

    let mut params = scope.params;
    params.extend(limits.params);
    let rows = state.executor.fetch(&sql, params, claims.as_ref()).await?;

    Ok(respond::list_response(&req, rows, parsed.page, total))
}

// ============================================================================
// Mutations
// ============================================================================

/// POST /api/{table}
pub async fn create(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<JsonValue>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let mode = respond::resolution_mode(&req);
    let input_rows: Vec<JsonValue> = match body.into_inner() {
        JsonValue::Array(rows) => rows,
        single => vec![single],
    };
    if input_rows.is_empty() {
        return Err(Error::Validation("insert body is empty".into()).into());
    }

    let first = input_rows[0]
        .as_object()
        .ok_or_else(|| Error::Validation("insert body must be an object".into()))?;
    let columns: Vec<String> = first
        .keys()
        .filter(|k| table.has_column(k))
        .cloned()
        .collect();
    if columns.is_empty() {
        return Err(Error::Validation("insert body has no recognized columns".into()).into());
    }

    let mut params = Vec::with_capacity(columns.len() * input_rows.len());
    for row in &input_rows {
        let object = row
            .as_object()
            .ok_or_else(|| Error::Validation("insert rows must be objects".into()))?;
        for name in &columns {
            let column = table
                .column(name)
                .ok_or_else(|| Error::Validation(format!("unknown column: {name}")))?;
            params.push(json_bind(object.get(name).unwrap_or(&JsonValue::Null), column)?);
        }
    }

    let column_idents = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![row_placeholders; input_rows.len()].join(", ");

    let verb = if mode == UpsertMode::Ignore {
        "INSERT IGNORE INTO"
    } else {
        "INSERT INTO"
    };
    let mut sql = format!(
        "{verb} {} ({column_idents}) VALUES {values}",
        quote_ident(&table_name)
    );
    if mode == UpsertMode::Merge {
        let updates = columns
            .iter()
            .map(|c| {
                let ident = quote_ident(c);
                format!("{ident} = VALUES({ident})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&updates);
    }

    let outcome = state.executor.execute(&sql, params, claims.as_ref()).await?;

    if respond::wants_representation(&req) {
        if let Some(rows) =
            reselect_created(&state, table, &input_rows, outcome, claims.as_ref()).await?
        {
            return Ok(HttpResponse::Created().json(rows));
        }
        return Ok(HttpResponse::Created().json(respond::exec_metadata(outcome)));
    }

    Ok(HttpResponse::Ok().json(respond::exec_metadata(outcome)))
}

/// Re-select freshly inserted rows for return-representation.
///
/// A single auto-increment key allows the insert-id range select; any other
/// key shape requires every key component in every input row.
async fn reselect_created(
    state: &AppState,
    table: &Table,
    input_rows: &[JsonValue],
    outcome: crate::executor::ExecOutcome,
    claims: Option<&Claims>,
) -> Result<Option<Vec<JsonValue>>, Error> {
    let pk_columns = table.primary_key_columns();

    if pk_columns.len() == 1 && pk_columns[0].auto_increment {
        let Some(first) = outcome.last_insert_id else {
            return Ok(None);
        };
        let last = first + outcome.affected_rows.saturating_sub(1);
        let sql = format!(
            "SELECT * FROM {} WHERE {} BETWEEN ? AND ?",
            quote_ident(&table.name),
            quote_ident(&pk_columns[0].name)
        );
        let params = vec![
            BindValue::Int(i64::try_from(first).unwrap_or(i64::MAX)),
            BindValue::Int(i64::try_from(last).unwrap_or(i64::MAX)),
        ];
        return Ok(Some(state.executor.fetch(&sql, params, claims).await?));
    }

    if pk_columns.is_empty() {
        return Ok(None);
    }

    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for row in input_rows {
        let Some(object) = row.as_object() else {
            return Ok(None);
        };
        let mut parts = Vec::new();
        for column in &pk_columns {
            match object.get(&column.name) {
                Some(value) if !value.is_null() => {
                    parts.push(format!("{} = ?", quote_ident(&column.name)));
                    params.push(json_bind(value, column)?);
                }
                _ => return Ok(None),
            }
        }
        clauses.push(format!("({})", parts.join(" AND ")));
    }

    let sql = format!(
        "SELECT * FROM {} WHERE {}",
        quote_ident(&table.name),
        clauses.join(" OR ")
    );
    Ok(Some(state.executor.fetch(&sql, params, claims).await?))
}

/// PUT /api/{table}/{id}
pub async fn update(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<JsonValue>,
    req: HttpRequest,
) -> ApiResult {
    let (table_name, id) = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let object = body
        .as_object()
        .ok_or_else(|| Error::Validation("update body must be an object".into()))?;
    let Some((set_sql, set_params)) = set_clause(table, object)? else {
        return Err(Error::Validation("update body has no recognized columns".into()).into());
    };

    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Update);
    let scope = scope_single(predicate.as_deref(), pk_clause(table, &id)?);

    let sql = statement(&[
        "UPDATE",
        &quote_ident(&table_name),
        "SET",
        &set_sql,
        &scope.sql,
    ]);
    let mut params = set_params;
    params.extend(scope.params);

    let outcome = state.executor.execute(&sql, params, claims.as_ref()).await?;
    Ok(HttpResponse::Ok().json(respond::exec_metadata(outcome)))
}

/// PATCH /api/{table}
pub async fn patch(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<JsonValue>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let object = body
        .as_object()
        .ok_or_else(|| Error::Validation("patch body must be an object".into()))?;
    let Some((set_sql, set_params)) = set_clause(table, object)? else {
        // Nothing to change is not an error
        return Ok(HttpResponse::NoContent().finish());
    };

    let parsed = parse_query(&query_pairs(&req))?;
    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Update);
    let scope = inject(where_clause(&parsed.predicates), predicate.as_deref());

    let representation = respond::wants_representation(&req);
    let keys = if representation {
        pre_select_keys(&state, table, &scope, claims.as_ref()).await?
    } else {
        None
    };

    let sql = statement(&[
        "UPDATE",
        &quote_ident(&table_name),
        "SET",
        &set_sql,
        &scope.sql,
    ]);
    let mut params = set_params;
    params.extend(scope.params);

    let outcome = state.executor.execute(&sql, params, claims.as_ref()).await?;

    if let Some(keys) = keys {
        let rows = select_by_keys(&state, table, &keys, claims.as_ref()).await?;
        return Ok(HttpResponse::Ok().json(rows));
    }

    Ok(HttpResponse::Ok().json(respond::exec_metadata(outcome)))
}

/// Capture the primary keys of the rows a filter-driven mutation will touch
async fn pre_select_keys(
    state: &AppState,
    table: &Table,
    scope: &SqlFragment,
    claims: Option<&Claims>,
) -> Result<Option<Vec<JsonValue>>, Error> {
    let pk_columns = table.primary_key_columns();
    if pk_columns.is_empty() {
        return Ok(None);
    }

    let list = pk_columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = statement(&["SELECT", &list, "FROM", &quote_ident(&table.name), &scope.sql]);
    let rows = state
        .executor
        .fetch(&sql, scope.params.clone(), claims)
        .await?;
    Ok(Some(rows))
}

/// Re-select full rows by previously captured primary keys
async fn select_by_keys(
    state: &AppState,
    table: &Table,
    keys: &[JsonValue],
    claims: Option<&Claims>,
) -> Result<Vec<JsonValue>, Error> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let pk_columns = table.primary_key_columns();
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for key in keys {
        let Some(object) = key.as_object() else {
            continue;
        };
        let mut parts = Vec::new();
        for column in &pk_columns {
            parts.push(format!("{} = ?", quote_ident(&column.name)));
            params.push(json_bind_plain(object.get(&column.name).unwrap_or(&JsonValue::Null)));
        }
        clauses.push(format!("({})", parts.join(" AND ")));
    }

    let sql = format!(
        "SELECT * FROM {} WHERE {}",
        quote_ident(&table.name),
        clauses.join(" OR ")
    );
    state.executor.fetch(&sql, params, claims).await
}

/// DELETE /api/{table}/{id}
pub async fn delete_by_id(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> ApiResult {
    let (table_name, id) = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Delete);
    let scope = scope_single(predicate.as_deref(), pk_clause(table, &id)?);

    delete_scoped(&state, &table_name, scope, &req, claims.as_ref()).await
}

/// DELETE /api/{table}
///
/// An empty filter with no policy removes every row, matching the upstream
/// PostgREST default.
pub async fn delete_bulk(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    lookup_table(&catalog, &table_name)?;

    let parsed = parse_query(&query_pairs(&req))?;
    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Delete);
    let scope = inject(where_clause(&parsed.predicates), predicate.as_deref());

    delete_scoped(&state, &table_name, scope, &req, claims.as_ref()).await
}

async fn delete_scoped(
    state: &AppState,
    table_name: &str,
    scope: SqlFragment,
    req: &HttpRequest,
    claims: Option<&Claims>,
) -> ApiResult {
    let captured = if respond::wants_representation(req) {
        let sql = statement(&["SELECT * FROM", &quote_ident(table_name), &scope.sql]);
        Some(
            state
                .executor
                .fetch(&sql, scope.params.clone(), claims)
                .await?,
        )
    } else {
        None
    };

    let sql = statement(&["DELETE FROM", &quote_ident(table_name), &scope.sql]);
    let outcome = state.executor.execute(&sql, scope.params, claims).await?;

    match captured {
        Some(rows) => Ok(HttpResponse::Ok().json(rows)),
        None => Ok(HttpResponse::Ok().json(respond::exec_metadata(outcome))),
    }
}

// ============================================================================
// Table-level reads
// ============================================================================

/// GET /api/{table}/count
pub async fn count(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    lookup_table(&catalog, &table_name)?;

    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Select);
    let scope = inject(SqlFragment::empty(), predicate.as_deref());

    let sql = statement(&[
        "SELECT COUNT(1) AS no_of_rows FROM",
        &quote_ident(&table_name),
        &scope.sql,
    ]);
    let rows = state
        .executor
        .fetch(&sql, scope.params, claims.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// GET /api/{table}/describe
pub async fn describe(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    Ok(HttpResponse::Ok().json(table))
}

/// GET /api/{table}/groupby
pub async fn groupby(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let parsed = parse_query(&query_pairs(&req))?;
    let fields_raw = parsed
        .fields
        .as_deref()
        .ok_or_else(|| Error::Validation("groupby requires _fields".into()))?;
    let fields = grouped_fields(table, fields_raw)?;

    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Select);
    let scope = inject(where_clause(&parsed.predicates), predicate.as_deref());

    let order = if parsed.order.is_empty() {
        "ORDER BY `count` DESC".to_string()
    } else {
        order_clause(&parsed.order)
    };

    let sql = statement(&[
        "SELECT",
        &format!("{fields}, COUNT(*) AS `count`"),
        "FROM",
        &quote_ident(&table_name),
        &scope.sql,
        &format!("GROUP BY {fields}"),
        &order,
    ]);
    let rows = state
        .executor
        .fetch(&sql, scope.params, claims.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// GET /api/{table}/aggregate
pub async fn aggregate(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> ApiResult {
    let table_name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let table = lookup_table(&catalog, &table_name)?;

    let parsed = parse_query(&query_pairs(&req))?;
    let fields_raw = parsed
        .fields
        .as_deref()
        .ok_or_else(|| Error::Validation("aggregate requires _fields".into()))?;
    let list = aggregate_list(table, fields_raw)?;

    let predicate = state
        .policies
        .snapshot()
        .predicate(&table_name, PolicyOp::Select);
    let scope = inject(where_clause(&parsed.predicates), predicate.as_deref());

    let sql = statement(&[
        "SELECT",
        &list,
        "FROM",
        &quote_ident(&table_name),
        &scope.sql,
    ]);
    let rows = state
        .executor
        .fetch(&sql, scope.params, claims.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

// ============================================================================
// Routines
// ============================================================================

/// POST /api/rpc/{name}
pub async fn rpc(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<JsonValue>>,
    req: HttpRequest,
) -> ApiResult {
    let name = path.into_inner();
    let claims = authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let routine = catalog
        .routine(&name)
        .ok_or_else(|| Error::RoutineNotFound(name.clone()))?;

    let args = body
        .map(web::Json::into_inner)
        .unwrap_or_else(|| json!({}));
    let args = args.as_object().cloned().unwrap_or_default();

    // Parameters bind in declared order; anything absent binds as NULL
    let params: Vec<BindValue> = routine
        .params
        .iter()
        .map(|p| args.get(&p.name).map_or(BindValue::Null, json_bind_plain))
        .collect();
    let placeholders = vec!["?"; params.len()].join(", ");

    let sql = match routine.kind {
        mygate_catalog::RoutineKind::Procedure => {
            format!("CALL {}({placeholders})", quote_ident(&name))
        }
        mygate_catalog::RoutineKind::Function => {
            format!("SELECT {}({placeholders}) AS result", quote_ident(&name))
        }
    };

    // Multi-set procedure output collapses to the first result set
    let rows = state.executor.fetch(&sql, params, claims.as_ref()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

// ============================================================================
// Introspection and administration
// ============================================================================

/// GET /api/tables
pub async fn tables(state: web::Data<AppState>, req: HttpRequest) -> ApiResult {
    authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    let names: Vec<&str> = catalog
        .table_names()
        .into_iter()
        .filter(|name| *name != POLICY_TABLE)
        .collect();
    Ok(HttpResponse::Ok().json(names))
}

/// GET /api/health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let catalog = state.catalog.snapshot();
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "mygate",
        "version": env!("CARGO_PKG_VERSION"),
        "tables": catalog.table_count(),
    }))
}

/// GET /api/openapi.json
pub async fn openapi_doc(state: web::Data<AppState>, req: HttpRequest) -> ApiResult {
    authenticate(&state, &req)?;
    let catalog = state.catalog.snapshot();
    Ok(HttpResponse::Ok().json(openapi::document(&catalog)))
}

/// POST /api/_policies/reload
pub async fn reload_policies(state: web::Data<AppState>, req: HttpRequest) -> ApiResult {
    authenticate(&state, &req)?;
    let loaded = state.policies.reload(state.executor.pool()).await?;
    Ok(HttpResponse::Ok().json(json!({ "policies": loaded })))
}

/// POST /api/_catalog/reload
pub async fn reload_catalog(state: web::Data<AppState>, req: HttpRequest) -> ApiResult {
    authenticate(&state, &req)?;
    match load_catalog(state.executor.pool(), &state.database).await {
        Ok(catalog) => {
            let tables = catalog.table_count();
            state.catalog.replace(catalog);
            Ok(HttpResponse::Ok().json(json!({ "tables": tables })))
        }
        Err(e) => {
            warn!("catalog reload failed: {e}");
            Err(e.into())
        }
    }
}
