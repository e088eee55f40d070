//! Connection checkout and per-request session context
//!
//! Session-scoped `@request_jwt_claim_*` variables are only reliable when
//! the SET and the consuming statement share a connection, so every
//! claim-bearing request pins one pooled connection for its whole statement.
//! The checkout guard returns the connection to the pool on every path,
//! including errors and cancellation.

use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Row, SslOpts, TxOpts, Value};
use serde_json::Value as JsonValue;
use tracing::debug;

use mygate_common::config::DatabaseConfig;
use mygate_common::error::{Error, Result};
use mygate_common::types::{ClaimValue, Claims};
use mygate_query::BindValue;

/// Outcome of a mutating statement
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
}

/// Statement-level database access over a bounded pool
pub struct Executor {
    pool: Pool,
}

impl Executor {
    /// Build the pool from dial parameters. Connections are established
    /// lazily on first checkout.
    pub fn connect(config: &DatabaseConfig) -> Self {
        let constraints = PoolConstraints::new(1, config.connection_limit.max(1))
            .unwrap_or_default();

        let mut opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        if config.wants_ssl() {
            opts = opts.ssl_opts(SslOpts::default());
        }

        Self {
            pool: Pool::new(Opts::from(opts)),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run a query and decode the first result set into JSON rows
    pub async fn fetch(
        &self,
        sql: &str,
        params: Vec<BindValue>,
        claims: Option<&Claims>,
    ) -> Result<Vec<JsonValue>> {
        debug!(sql, "fetch");
        let mut conn = self.pool.get_conn().await.map_err(map_driver_error)?;
        bind_claims(&mut conn, claims).await?;

        let rows: Vec<Row> = conn
            .exec_iter(sql, to_params(params))
            .await
            .map_err(map_driver_error)?
            .collect_and_drop()
            .await
            .map_err(map_driver_error)?;

        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Run a mutating statement and report its outcome
    pub async fn execute(
        &self,
        sql: &str,
        params: Vec<BindValue>,
        claims: Option<&Claims>,
    ) -> Result<ExecOutcome> {
        debug!(sql, "execute");
        let mut conn = self.pool.get_conn().await.map_err(map_driver_error)?;
        bind_claims(&mut conn, claims).await?;

        let result = conn
            .exec_iter(sql, to_params(params))
            .await
            .map_err(map_driver_error)?;
        let outcome = ExecOutcome {
            affected_rows: result.affected_rows(),
            last_insert_id: result.last_insert_id(),
        };
        result.drop_result().await.map_err(map_driver_error)?;

        Ok(outcome)
    }

    /// Run several statements inside one transaction under the same claim
    /// context. Commits when every statement succeeds; rolls back on the
    /// first error.
    pub async fn execute_in_transaction(
        &self,
        statements: Vec<(String, Vec<BindValue>)>,
        claims: Option<&Claims>,
    ) -> Result<Vec<ExecOutcome>> {
        let mut conn = self.pool.get_conn().await.map_err(map_driver_error)?;
        bind_claims(&mut conn, claims).await?;

        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(map_driver_error)?;

        let mut outcomes = Vec::with_capacity(statements.len());
        for (sql, params) in statements {
            match tx.exec_iter(sql.as_str(), to_params(params)).await {
                Ok(result) => {
                    let outcome = ExecOutcome {
                        affected_rows: result.affected_rows(),
                        last_insert_id: result.last_insert_id(),
                    };
                    if let Err(e) = result.drop_result().await {
                        tx.rollback().await.ok();
                        return Err(map_driver_error(e));
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(map_driver_error(e));
                }
            }
        }

        tx.commit().await.map_err(map_driver_error)?;
        Ok(outcomes)
    }

    /// Tear the pool down gracefully
    pub async fn disconnect(self) -> Result<()> {
        self.pool.disconnect().await.map_err(map_driver_error)
    }
}

/// Bind the request's claims as session variables on the checked-out
/// connection: one `SET` statement, one assignment and one positional
/// parameter per claim. Anonymous requests bind nothing.
async fn bind_claims<Q: Queryable>(conn: &mut Q, claims: Option<&Claims>) -> Result<()> {
    let Some((sql, params)) = claims.and_then(claim_set_statement) else {
        return Ok(());
    };

    conn.exec_drop(sql.as_str(), Params::Positional(params))
        .await
        .map_err(map_driver_error)
}

/// Build the `SET @request_jwt_claim_<name> = ?, ...` statement
pub fn claim_set_statement(claims: &Claims) -> Option<(String, Vec<Value>)> {
    if claims.is_empty() {
        return None;
    }

    let mut assignments = Vec::with_capacity(claims.len());
    let mut params = Vec::with_capacity(claims.len());

    for (name, value) in claims.iter() {
        assignments.push(format!(
            "@request_jwt_claim_{} = ?",
            sanitize_claim_name(name)
        ));
        params.push(claim_to_value(value));
    }

    Some((format!("SET {}", assignments.join(", ")), params))
}

/// Claim names become identifier fragments; everything outside
/// `[A-Za-z0-9_]` collapses to `_`.
pub fn sanitize_claim_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn claim_to_value(value: &ClaimValue) -> Value {
    match value {
        ClaimValue::Str(s) => Value::from(s.clone()),
        ClaimValue::Num(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        ClaimValue::Bool(b) => Value::Int(i64::from(*b)),
        ClaimValue::Null => Value::NULL,
        ClaimValue::Json(text) => Value::from(text.clone()),
    }
}

fn bind_param(value: BindValue) -> Value {
    match value {
        BindValue::Null => Value::NULL,
        BindValue::Bool(b) => Value::Int(i64::from(b)),
        BindValue::Int(i) => Value::Int(i),
        BindValue::Float(f) => Value::Double(f),
        BindValue::Text(s) => Value::from(s),
    }
}

fn to_params(values: Vec<BindValue>) -> Params {
    if values.is_empty() {
        Params::Empty
    } else {
        Params::Positional(values.into_iter().map(bind_param).collect())
    }
}

fn map_driver_error(e: mysql_async::Error) -> Error {
    match e {
        mysql_async::Error::Server(ref server) => Error::Driver {
            code: server.code,
            message: server.message.clone(),
        },
        other => Error::Database(other.to_string()),
    }
}

// ============================================================================
// Row decoding
// ============================================================================

/// Decode a driver row into a JSON object keyed by column name
pub fn row_to_json(row: &Row) -> JsonValue {
    let mut object = serde_json::Map::new();

    for (index, column) in row.columns_ref().iter().enumerate() {
        let value = row
            .as_ref(index)
            .map_or(JsonValue::Null, |v| cell_to_json(v, column.column_type()));
        object.insert(column.name_str().into_owned(), value);
    }

    JsonValue::Object(object)
}

fn cell_to_json(value: &Value, column_type: ColumnType) -> JsonValue {
    match value {
        Value::NULL => JsonValue::Null,
        Value::Int(i) => JsonValue::from(*i),
        Value::UInt(u) => JsonValue::from(*u),
        Value::Float(f) => JsonValue::from(f64::from(*f)),
        Value::Double(d) => JsonValue::from(*d),
        Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if column_type == ColumnType::MYSQL_TYPE_JSON {
                serde_json::from_str(&text).unwrap_or(JsonValue::String(text.into_owned()))
            } else {
                JsonValue::String(text.into_owned())
            }
        }
        Value::Date(year, month, day, 0, 0, 0, 0)
            if column_type == ColumnType::MYSQL_TYPE_DATE =>
        {
            JsonValue::String(format!("{year:04}-{month:02}-{day:02}"))
        }
        Value::Date(year, month, day, hour, minute, second, _) => JsonValue::String(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
        )),
        Value::Time(negative, days, hours, minutes, seconds, _) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + u32::from(*days) * 24;
            JsonValue::String(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}
