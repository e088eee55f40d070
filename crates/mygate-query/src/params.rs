//! Query string parsing for PostgREST-compatible filters

use mygate_common::error::{Error, Result};

/// Keys that never become filter predicates
const RESERVED_KEYS: [&str; 6] = ["select", "order", "limit", "offset", "on_conflict", "columns"];

/// Maximum value `_size` may request; `limit` is not capped
const LEGACY_SIZE_CAP: u64 = 100;

const DEFAULT_LIMIT: u64 = 20;

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    /// Compiled to LIKE; case behavior is collation-dependent
    Ilike,
    Is,
    In,
}

/// Filter value
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(String),
    Null,
    List(Vec<String>),
}

/// One predicate of the flat conjunction
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: String,
    pub descending: bool,
}

/// Resolved pagination bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Everything the parameter parser extracts from a request
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub predicates: Vec<Predicate>,
    /// Raw `select` expression, parsed separately by the select planner
    pub select: Option<String>,
    pub order: Vec<OrderTerm>,
    pub page: Page,
    /// Raw `_fields` list, consumed by groupby/aggregate
    pub fields: Option<String>,
}

/// Parse a decoded query-parameter multimap.
///
/// Repeated keys yield multiple predicates on the same column, all combined
/// with AND. Unknown operators yield no predicate at all.
pub fn parse_query(pairs: &[(String, String)]) -> Result<ParsedQuery> {
    let mut parsed = ParsedQuery::default();

    let mut limit: Option<u64> = None;
    let mut offset: Option<u64> = None;
    let mut legacy_size: Option<u64> = None;
    let mut legacy_page: Option<u64> = None;

    for (key, value) in pairs {
        match key.as_str() {
            "select" => parsed.select = Some(value.clone()),
            "order" => parsed.order.extend(parse_order(value)),
            "limit" => limit = Some(parse_bound("limit", value)?),
            "offset" => offset = Some(parse_bound("offset", value)?),
            "_sort" => parsed.order.extend(parse_legacy_sort(value)),
            "_size" => legacy_size = Some(parse_bound("_size", value)?),
            "_p" => legacy_page = Some(parse_bound("_p", value)?),
            "_fields" => parsed.fields = Some(value.clone()),
            "_where" => parsed.predicates.extend(parse_legacy_where(value)?),
            key if RESERVED_KEYS.contains(&key) || key.starts_with('_') => {}
            key => {
                if let Some(predicate) = parse_filter(key, value) {
                    parsed.predicates.push(predicate);
                }
            }
        }
    }

    parsed.page = resolve_page(limit, offset, legacy_size, legacy_page);

    Ok(parsed)
}

fn parse_bound(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("{name} must be a non-negative integer")))
}

/// `limit` overrides `_size` (capped); `offset` overrides the 1-based `_p`
fn resolve_page(
    limit: Option<u64>,
    offset: Option<u64>,
    legacy_size: Option<u64>,
    legacy_page: Option<u64>,
) -> Page {
    let limit = limit
        .or_else(|| legacy_size.map(|s| s.min(LEGACY_SIZE_CAP)))
        .unwrap_or(DEFAULT_LIMIT);

    let offset = offset
        .or_else(|| legacy_page.map(|p| p.saturating_sub(1) * limit + 1))
        .unwrap_or(0);

    Page { limit, offset }
}

/// Parse a single `<col>=<op>.<value>` filter; `None` when the operator is
/// not recognized (the predicate is dropped rather than widened).
fn parse_filter(column: &str, value: &str) -> Option<Predicate> {
    let (op_token, raw) = value.split_once('.')?;

    let op = match op_token {
        "eq" => FilterOp::Eq,
        "neq" => FilterOp::Neq,
        "gt" => FilterOp::Gt,
        "gte" => FilterOp::Gte,
        "lt" => FilterOp::Lt,
        "lte" => FilterOp::Lte,
        "like" => FilterOp::Like,
        "ilike" => FilterOp::Ilike,
        "is" => FilterOp::Is,
        "in" => FilterOp::In,
        _ => return None,
    };

    let value = parse_value(op, raw)?;

    Some(Predicate {
        column: column.to_string(),
        op,
        value,
    })
}

fn parse_value(op: FilterOp, raw: &str) -> Option<FilterValue> {
    match op {
        FilterOp::Is => match raw.to_ascii_lowercase().as_str() {
            "null" => Some(FilterValue::Null),
            "true" | "false" | "unknown" => Some(FilterValue::Scalar(raw.to_ascii_lowercase())),
            _ => None,
        },
        FilterOp::In => {
            let inner = raw.strip_prefix('(')?.strip_suffix(')')?;
            let values = inner.split(',').map(|v| coerce_scalar(v.trim())).collect();
            Some(FilterValue::List(values))
        }
        _ => {
            if raw == "null" {
                Some(FilterValue::Null)
            } else {
                Some(FilterValue::Scalar(coerce_scalar(raw)))
            }
        }
    }
}

/// Boolean literals bind as 1/0
fn coerce_scalar(raw: &str) -> String {
    match raw {
        "true" => "1".to_string(),
        "false" => "0".to_string(),
        other => other.to_string(),
    }
}

/// PostgREST `order=a.asc,b.desc`
fn parse_order(value: &str) -> Vec<OrderTerm> {
    value
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (column, descending) = match part.split_once('.') {
                Some((column, "desc")) => (column, true),
                Some((column, _)) => (column, false),
                None => (part, false),
            };
            Some(OrderTerm {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

/// Legacy `_sort=a,-b`
fn parse_legacy_sort(value: &str) -> Vec<OrderTerm> {
    value
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (column, descending) = match part.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (part, false),
            };
            Some(OrderTerm {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

/// Legacy `_where=(col,op,val)~and(col,op,val)`.
///
/// The filter AST is a flat conjunction, so `~or` grouping is rejected
/// rather than silently misread as AND.
fn parse_legacy_where(value: &str) -> Result<Vec<Predicate>> {
    if value.contains("~or") {
        return Err(Error::Validation(
            "_where supports conjunctions only; use repeated filter parameters for OR-free queries"
                .into(),
        ));
    }

    let mut predicates = Vec::new();

    for group in value.split("~and") {
        let group = group.trim();
        let inner = group
            .strip_prefix('(')
            .and_then(|g| g.strip_suffix(')'))
            .ok_or_else(|| Error::Validation(format!("malformed _where group: {group}")))?;

        let mut parts = inner.splitn(3, ',');
        let (column, op, raw) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(o), Some(v)) => (c.trim(), o.trim(), v.trim()),
            _ => {
                return Err(Error::Validation(format!(
                    "malformed _where group: {group}"
                )))
            }
        };

        let op = match op {
            "eq" => FilterOp::Eq,
            "ne" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "ge" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "le" => FilterOp::Lte,
            "like" => FilterOp::Like,
            "is" => FilterOp::Is,
            "in" => FilterOp::In,
            // Unknown legacy operator: drop the group, as with query filters
            _ => continue,
        };

        let value = match op {
            FilterOp::In => FilterValue::List(raw.split(',').map(|v| coerce_scalar(v.trim())).collect()),
            FilterOp::Is if raw.eq_ignore_ascii_case("null") => FilterValue::Null,
            _ if raw == "null" => FilterValue::Null,
            _ => FilterValue::Scalar(coerce_scalar(raw)),
        };

        predicates.push(Predicate {
            column: column.to_string(),
            op,
            value,
        });
    }

    Ok(predicates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_eq_filter() {
        let parsed = parse_query(&pairs(&[("customerNumber", "eq.103")])).unwrap();
        assert_eq!(
            parsed.predicates,
            [Predicate {
                column: "customerNumber".into(),
                op: FilterOp::Eq,
                value: FilterValue::Scalar("103".into()),
            }]
        );
    }

    #[test]
    fn test_all_comparison_ops() {
        let parsed = parse_query(&pairs(&[
            ("a", "neq.1"),
            ("b", "gt.2"),
            ("c", "gte.3"),
            ("d", "lt.4"),
            ("e", "lte.5"),
            ("f", "like.x%"),
            ("g", "ilike.y%"),
        ]))
        .unwrap();
        let ops: Vec<FilterOp> = parsed.predicates.iter().map(|p| p.op).collect();
        assert_eq!(
            ops,
            [
                FilterOp::Neq,
                FilterOp::Gt,
                FilterOp::Gte,
                FilterOp::Lt,
                FilterOp::Lte,
                FilterOp::Like,
                FilterOp::Ilike,
            ]
        );
    }

    #[test]
    fn test_value_keeps_dots_past_operator() {
        let parsed = parse_query(&pairs(&[("version", "eq.1.2.3")])).unwrap();
        assert_eq!(
            parsed.predicates[0].value,
            FilterValue::Scalar("1.2.3".into())
        );
    }

    #[test]
    fn test_boolean_literals_map_to_bits() {
        let parsed = parse_query(&pairs(&[("active", "eq.true"), ("hidden", "eq.false")])).unwrap();
        assert_eq!(parsed.predicates[0].value, FilterValue::Scalar("1".into()));
        assert_eq!(parsed.predicates[1].value, FilterValue::Scalar("0".into()));
    }

    #[test]
    fn test_is_null_and_is_bool() {
        let parsed = parse_query(&pairs(&[("a", "is.null"), ("b", "is.true")])).unwrap();
        assert_eq!(parsed.predicates[0].value, FilterValue::Null);
        assert_eq!(parsed.predicates[1].value, FilterValue::Scalar("true".into()));
    }

    #[test]
    fn test_is_arbitrary_value_dropped() {
        let parsed = parse_query(&pairs(&[("a", "is.whatever")])).unwrap();
        assert!(parsed.predicates.is_empty());
    }

    #[test]
    fn test_in_list() {
        let parsed = parse_query(&pairs(&[("status", "in.(Shipped,Cancelled)")])).unwrap();
        assert_eq!(
            parsed.predicates[0].value,
            FilterValue::List(vec!["Shipped".into(), "Cancelled".into()])
        );
    }

    #[test]
    fn test_in_without_parens_dropped() {
        let parsed = parse_query(&pairs(&[("status", "in.Shipped")])).unwrap();
        assert!(parsed.predicates.is_empty());
    }

    #[test]
    fn test_unknown_operator_dropped() {
        let parsed = parse_query(&pairs(&[("a", "regex.^x$"), ("b", "just-a-value")])).unwrap();
        assert!(parsed.predicates.is_empty());
    }

    #[test]
    fn test_repeated_keys_conjoin() {
        let parsed = parse_query(&pairs(&[("amount", "gte.10"), ("amount", "lt.100")])).unwrap();
        assert_eq!(parsed.predicates.len(), 2);
        assert_eq!(parsed.predicates[0].column, "amount");
        assert_eq!(parsed.predicates[1].column, "amount");
    }

    #[test]
    fn test_reserved_keys_skipped() {
        let parsed = parse_query(&pairs(&[
            ("select", "a,b"),
            ("order", "a.desc"),
            ("limit", "5"),
            ("offset", "10"),
            ("on_conflict", "id"),
            ("columns", "a,b"),
            ("_anything", "eq.1"),
        ]))
        .unwrap();
        assert!(parsed.predicates.is_empty());
        assert_eq!(parsed.select.as_deref(), Some("a,b"));
    }

    #[test]
    fn test_default_page() {
        let parsed = parse_query(&[]).unwrap();
        assert_eq!(parsed.page, Page { limit: 20, offset: 0 });
    }

    #[test]
    fn test_limit_overrides_size_and_size_cap() {
        let parsed = parse_query(&pairs(&[("_size", "50"), ("limit", "5")])).unwrap();
        assert_eq!(parsed.page.limit, 5);

        let parsed = parse_query(&pairs(&[("_size", "5000")])).unwrap();
        assert_eq!(parsed.page.limit, 100);
    }

    #[test]
    fn test_offset_overrides_page() {
        let parsed = parse_query(&pairs(&[("_p", "3"), ("offset", "7"), ("limit", "10")])).unwrap();
        assert_eq!(parsed.page.offset, 7);

        let parsed = parse_query(&pairs(&[("_p", "3"), ("limit", "10")])).unwrap();
        assert_eq!(parsed.page.offset, 21);
    }

    #[test]
    fn test_bad_limit_rejected() {
        assert!(parse_query(&pairs(&[("limit", "lots")])).is_err());
    }

    #[test]
    fn test_order_both_forms() {
        let parsed = parse_query(&pairs(&[("order", "a.asc,b.desc")])).unwrap();
        assert_eq!(
            parsed.order,
            [
                OrderTerm { column: "a".into(), descending: false },
                OrderTerm { column: "b".into(), descending: true },
            ]
        );

        let parsed = parse_query(&pairs(&[("_sort", "a,-b")])).unwrap();
        assert_eq!(
            parsed.order,
            [
                OrderTerm { column: "a".into(), descending: false },
                OrderTerm { column: "b".into(), descending: true },
            ]
        );
    }

    #[test]
    fn test_legacy_where_conjunction() {
        let parsed = parse_query(&pairs(&[("_where", "(status,eq,Shipped)~and(amount,gt,100)")]))
            .unwrap();
        assert_eq!(parsed.predicates.len(), 2);
        assert_eq!(parsed.predicates[0].op, FilterOp::Eq);
        assert_eq!(parsed.predicates[1].op, FilterOp::Gt);
    }

    #[test]
    fn test_legacy_where_or_rejected() {
        assert!(parse_query(&pairs(&[("_where", "(a,eq,1)~or(b,eq,2)")])).is_err());
    }

    #[test]
    fn test_fields_extracted() {
        let parsed = parse_query(&pairs(&[("_fields", "country,city")])).unwrap();
        assert_eq!(parsed.fields.as_deref(), Some("country,city"));
    }
}
