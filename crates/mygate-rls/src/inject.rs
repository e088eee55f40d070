//! Predicate injection into WHERE fragments

use mygate_query::SqlFragment;

/// Inject a composed policy predicate into a WHERE fragment.
///
/// No predicate leaves the fragment untouched. A fragment that already
/// carries a `WHERE` is rewritten to `WHERE (policy) AND (existing)`;
/// an empty fragment becomes `WHERE (policy)`.
pub fn inject(fragment: SqlFragment, predicate: Option<&str>) -> SqlFragment {
    let Some(predicate) = predicate else {
        return fragment;
    };

    if fragment.is_empty() {
        return SqlFragment::new(format!("WHERE ({predicate})"), fragment.params);
    }

    match fragment.sql.strip_prefix("WHERE ") {
        Some(existing) => SqlFragment::new(
            format!("WHERE ({predicate}) AND ({existing})"),
            fragment.params,
        ),
        None => SqlFragment::new(
            format!("WHERE ({predicate}) AND ({})", fragment.sql),
            fragment.params,
        ),
    }
}

/// Compose the single-record scope: `WHERE [(policy) AND] <pk clause>`
pub fn scope_single(predicate: Option<&str>, pk: SqlFragment) -> SqlFragment {
    match predicate {
        Some(predicate) => SqlFragment::new(
            format!("WHERE ({predicate}) AND {}", pk.sql),
            pk.params,
        ),
        None => SqlFragment::new(format!("WHERE {}", pk.sql), pk.params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mygate_query::BindValue;

    #[test]
    fn test_inject_nothing() {
        let fragment = SqlFragment::new("WHERE `a` = ?", vec![BindValue::Int(1)]);
        let result = inject(fragment.clone(), None);
        assert_eq!(result, fragment);
    }

    #[test]
    fn test_inject_into_empty() {
        let result = inject(SqlFragment::empty(), Some("owner = @request_jwt_claim_sub"));
        assert_eq!(result.sql, "WHERE (owner = @request_jwt_claim_sub)");
        assert!(result.params.is_empty());
    }

    #[test]
    fn test_inject_into_existing_where() {
        let fragment = SqlFragment::new("WHERE `a` = ?", vec![BindValue::Int(1)]);
        let result = inject(fragment, Some("owner = @request_jwt_claim_sub"));
        assert_eq!(
            result.sql,
            "WHERE (owner = @request_jwt_claim_sub) AND (`a` = ?)"
        );
        assert_eq!(result.params, [BindValue::Int(1)]);
    }

    #[test]
    fn test_scope_single() {
        let pk = SqlFragment::new("`id` = ?", vec![BindValue::Int(2)]);
        let result = scope_single(Some("owner_role = @request_jwt_claim_role"), pk.clone());
        assert_eq!(
            result.sql,
            "WHERE (owner_role = @request_jwt_claim_role) AND `id` = ?"
        );

        let bare = scope_single(None, pk);
        assert_eq!(bare.sql, "WHERE `id` = ?");
    }
}
