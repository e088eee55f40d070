//! Parameterized SQL emission
//!
//! Every fragment keeps user data in positional parameters. Identifiers are
//! backtick-quoted after catalog validation wherever the catalog can vouch
//! for them; embedded backticks are stripped rather than escaped.

use mygate_catalog::{Catalog, Table, TypeClass};
use mygate_common::error::{Error, Result};

use crate::params::{FilterOp, FilterValue, OrderTerm, Page, Predicate};
use crate::select::{resolve_embed, Embed, RelationNode, SelectItem};

/// A value bound to a positional `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A piece of SQL plus the values bound to its placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<BindValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Backtick-quote an identifier, stripping any embedded backticks
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', ""))
}

/// Single-quote a JSON object key
fn quote_json_key(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Coerce a raw literal according to the column's type class
pub fn typed_literal(class: TypeClass, raw: &str) -> Result<BindValue> {
    match class {
        TypeClass::Int => raw
            .parse::<i64>()
            .map(BindValue::Int)
            .map_err(|_| Error::Validation(format!("invalid integer literal: {raw}"))),
        TypeClass::Float => raw
            .parse::<f64>()
            .map(BindValue::Float)
            .map_err(|_| Error::Validation(format!("invalid numeric literal: {raw}"))),
        TypeClass::Bool => match raw {
            "1" | "true" => Ok(BindValue::Int(1)),
            "0" | "false" => Ok(BindValue::Int(0)),
            _ => Err(Error::Validation(format!("invalid boolean literal: {raw}"))),
        },
        // Dates ride as text and are coerced by the server
        TypeClass::Date | TypeClass::Json | TypeClass::Text => Ok(BindValue::Text(raw.to_string())),
    }
}

// ============================================================================
// WHERE
// ============================================================================

/// Compile the flat conjunction into a `WHERE ...` fragment.
///
/// A null value short-circuits to `IS NULL` (`IS NOT NULL` for `neq`);
/// predicates the compiler cannot express are dropped.
pub fn where_clause(predicates: &[Predicate]) -> SqlFragment {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    for predicate in predicates {
        if let Some((sql, mut values)) = predicate_sql(predicate) {
            conditions.push(sql);
            params.append(&mut values);
        }
    }

    if conditions.is_empty() {
        SqlFragment::empty()
    } else {
        SqlFragment::new(format!("WHERE {}", conditions.join(" AND ")), params)
    }
}

fn predicate_sql(predicate: &Predicate) -> Option<(String, Vec<BindValue>)> {
    let column = quote_ident(&predicate.column);

    match (&predicate.op, &predicate.value) {
        (FilterOp::Is, FilterValue::Null) => Some((format!("{column} IS NULL"), vec![])),
        (FilterOp::Is, FilterValue::Scalar(v)) => match v.as_str() {
            "true" => Some((format!("{column} IS TRUE"), vec![])),
            "false" => Some((format!("{column} IS FALSE"), vec![])),
            "unknown" => Some((format!("{column} IS UNKNOWN"), vec![])),
            _ => None,
        },
        (FilterOp::Neq, FilterValue::Null) => Some((format!("{column} IS NOT NULL"), vec![])),
        (_, FilterValue::Null) => Some((format!("{column} IS NULL"), vec![])),
        (FilterOp::In, FilterValue::List(values)) => {
            let placeholders = vec!["?"; values.len()].join(", ");
            let params = values.iter().map(|v| BindValue::Text(v.clone())).collect();
            Some((format!("{column} IN ({placeholders})"), params))
        }
        (FilterOp::In, FilterValue::Scalar(v)) => Some((
            format!("{column} IN (?)"),
            vec![BindValue::Text(v.clone())],
        )),
        (op, FilterValue::Scalar(v)) => {
            let operator = match op {
                FilterOp::Eq => "=",
                FilterOp::Neq => "<>",
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::Lt => "<",
                FilterOp::Lte => "<=",
                FilterOp::Like | FilterOp::Ilike => "LIKE",
                FilterOp::Is | FilterOp::In => return None,
            };
            Some((
                format!("{column} {operator} ?"),
                vec![BindValue::Text(v.clone())],
            ))
        }
        _ => None,
    }
}

// ============================================================================
// Key predicates
// ============================================================================

/// Compile a route id into a primary-key clause (no `WHERE` keyword).
///
/// Composite ids carry one `___`-separated component per key column, each
/// coerced to the column's type class.
pub fn pk_clause(table: &Table, id: &str) -> Result<SqlFragment> {
    let pk_columns = table.primary_key_columns();
    let parts: Vec<&str> = id.split("___").collect();

    if parts.len() != pk_columns.len() || pk_columns.is_empty() {
        return Err(Error::CompositeKey {
            expected: pk_columns.len(),
            got: parts.len(),
        });
    }

    let mut conditions = Vec::new();
    let mut params = Vec::new();

    for (column, part) in pk_columns.iter().zip(parts) {
        conditions.push(format!("{} = ?", quote_ident(&column.name)));
        params.push(typed_literal(column.type_class(), part)?);
    }

    Ok(SqlFragment::new(conditions.join(" AND "), params))
}

/// Compile the parent-id predicate for a nested list over the single foreign
/// key from `child` to `parent` (no `WHERE` keyword).
pub fn fk_clause(parent: &Table, child: &Table, parent_id: &str) -> Result<SqlFragment> {
    let fk = child
        .foreign_keys
        .iter()
        .find(|fk| fk.referenced_table == parent.name)
        .ok_or_else(|| {
            Error::Validation(format!(
                "{} has no relation to {}",
                child.name, parent.name
            ))
        })?;

    let class = child
        .column(&fk.column)
        .map_or(TypeClass::Text, |c| c.type_class());

    Ok(SqlFragment::new(
        format!("{} = ?", quote_ident(&fk.column)),
        vec![typed_literal(class, parent_id)?],
    ))
}

// ============================================================================
// Column lists and embeddings
// ============================================================================

/// Resolve the select tree into a SQL column list.
///
/// Star (or an empty tree) expands to every catalog column minus exclusions;
/// explicit columns append after that; each relation becomes a correlated
/// subquery aliased to its target name. Unknown columns are ignored. When
/// nothing at all matches, the literal star keeps the statement valid.
pub fn column_list(catalog: &Catalog, table: &Table, items: &[SelectItem]) -> Result<String> {
    let mut parts = Vec::new();

    let concrete = |item: &SelectItem| {
        matches!(item, SelectItem::Column(_) | SelectItem::Relation(_))
    };
    let expand_all = items.iter().any(|i| matches!(i, SelectItem::Star))
        || !items.iter().any(concrete);

    if expand_all {
        let excluded: Vec<&str> = items
            .iter()
            .filter_map(|i| match i {
                SelectItem::Exclude(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        for column in &table.columns {
            if !excluded.contains(&column.name.as_str()) {
                parts.push(quote_ident(&column.name));
            }
        }
    }

    for item in items {
        match item {
            SelectItem::Column(name) => {
                if table.has_column(name) {
                    parts.push(quote_ident(name));
                }
            }
            SelectItem::Relation(node) => {
                let expr = embed_expr(catalog, table, node)?;
                parts.push(format!("{expr} AS {}", quote_ident(&node.target)));
            }
            SelectItem::Star | SelectItem::Exclude(_) => {}
        }
    }

    if parts.is_empty() {
        return Ok(" * ".to_string());
    }

    Ok(parts.join(", "))
}

/// Correlated subquery expression for one embedded relation (no alias).
///
/// 1:N aggregates child rows into a JSON array (empty array when there are
/// none); N:1 yields a single JSON object or NULL. An unresolvable relation
/// degrades to a literal NULL subquery.
fn embed_expr(catalog: &Catalog, parent: &Table, node: &RelationNode) -> Result<String> {
    match resolve_embed(catalog, &parent.name, node) {
        Embed::Unrelated => Ok("(SELECT NULL)".to_string()),
        Embed::HasMany(fk) => {
            let child = catalog
                .table(&node.target)
                .ok_or_else(|| Error::TableNotFound(node.target.clone()))?;
            let pairs = json_pairs(catalog, child, &node.items)?;
            Ok(format!(
                "(SELECT CAST(COALESCE(JSON_ARRAYAGG(JSON_OBJECT({pairs})), '[]') AS JSON) \
                 FROM {child_ident} WHERE {child_ident}.{fk_col} = {parent_ident}.{ref_col})",
                child_ident = quote_ident(&child.name),
                fk_col = quote_ident(&fk.column),
                parent_ident = quote_ident(&parent.name),
                ref_col = quote_ident(&fk.referenced_column),
            ))
        }
        Embed::BelongsTo(fk) => {
            let child = catalog
                .table(&node.target)
                .ok_or_else(|| Error::TableNotFound(node.target.clone()))?;
            let pairs = json_pairs(catalog, child, &node.items)?;
            Ok(format!(
                "(SELECT JSON_OBJECT({pairs}) \
                 FROM {child_ident} WHERE {child_ident}.{ref_col} = {parent_ident}.{fk_col})",
                child_ident = quote_ident(&child.name),
                ref_col = quote_ident(&fk.referenced_column),
                parent_ident = quote_ident(&parent.name),
                fk_col = quote_ident(&fk.column),
            ))
        }
    }
}

/// `'name', qualified-expr` pairs for a JSON_OBJECT over the child's tree
fn json_pairs(catalog: &Catalog, table: &Table, items: &[SelectItem]) -> Result<String> {
    let mut pairs = Vec::new();

    let concrete = |item: &SelectItem| {
        matches!(item, SelectItem::Column(_) | SelectItem::Relation(_))
    };
    let expand_all = items.iter().any(|i| matches!(i, SelectItem::Star))
        || !items.iter().any(concrete);

    if expand_all {
        let excluded: Vec<&str> = items
            .iter()
            .filter_map(|i| match i {
                SelectItem::Exclude(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        for column in &table.columns {
            if !excluded.contains(&column.name.as_str()) {
                pairs.push(format!(
                    "{}, {}.{}",
                    quote_json_key(&column.name),
                    quote_ident(&table.name),
                    quote_ident(&column.name)
                ));
            }
        }
    }

    for item in items {
        match item {
            SelectItem::Column(name) => {
                if table.has_column(name) {
                    pairs.push(format!(
                        "{}, {}.{}",
                        quote_json_key(name),
                        quote_ident(&table.name),
                        quote_ident(name)
                    ));
                }
            }
            SelectItem::Relation(node) => {
                let expr = embed_expr(catalog, table, node)?;
                pairs.push(format!("{}, {expr}", quote_json_key(&node.target)));
            }
            SelectItem::Star | SelectItem::Exclude(_) => {}
        }
    }

    if pairs.is_empty() {
        // Shape-preserving fallback: an object with no keys
        return Ok(String::new());
    }

    Ok(pairs.join(", "))
}

// ============================================================================
// Ordering and pagination
// ============================================================================

/// `ORDER BY ...` or the empty string
pub fn order_clause(order: &[OrderTerm]) -> String {
    if order.is_empty() {
        return String::new();
    }

    let terms: Vec<String> = order
        .iter()
        .map(|t| {
            format!(
                "{} {}",
                quote_ident(&t.column),
                if t.descending { "DESC" } else { "ASC" }
            )
        })
        .collect();

    format!("ORDER BY {}", terms.join(", "))
}

/// `LIMIT ? OFFSET ?` with both bounds bound positionally
pub fn limit_clause(page: Page) -> SqlFragment {
    SqlFragment::new(
        "LIMIT ? OFFSET ?",
        vec![
            BindValue::Int(i64::try_from(page.limit).unwrap_or(i64::MAX)),
            BindValue::Int(i64::try_from(page.offset).unwrap_or(i64::MAX)),
        ],
    )
}

// ============================================================================
// Grouping and aggregation lists
// ============================================================================

/// Validate a `_fields` list against the catalog and return the quoted list
pub fn grouped_fields(table: &Table, fields_raw: &str) -> Result<String> {
    let mut quoted = Vec::new();

    for field in fields_raw.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        if !table.has_column(field) {
            return Err(Error::Validation(format!(
                "unknown column in _fields: {field}"
            )));
        }
        quoted.push(quote_ident(field));
    }

    if quoted.is_empty() {
        return Err(Error::Validation("_fields must name at least one column".into()));
    }

    Ok(quoted.join(", "))
}

const AGGREGATE_FUNCTIONS: [&str; 6] = ["min", "max", "avg", "sum", "stddev", "variance"];

/// Aggregate select list: `<fn>(`f`) AS <fn>_of_<f>` for every function
pub fn aggregate_list(table: &Table, fields_raw: &str) -> Result<String> {
    let mut parts = Vec::new();

    for field in fields_raw.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        if !table.has_column(field) {
            return Err(Error::Validation(format!(
                "unknown column in _fields: {field}"
            )));
        }
        for function in AGGREGATE_FUNCTIONS {
            parts.push(format!(
                "{}({}) AS {}",
                function.to_uppercase(),
                quote_ident(field),
                quote_ident(&format!("{function}_of_{field}"))
            ));
        }
    }

    if parts.is_empty() {
        return Err(Error::Validation("_fields must name at least one column".into()));
    }

    Ok(parts.join(", "))
}
