//! DB-backed policy store and the published index

use std::sync::Arc;

use mysql_async::prelude::Queryable;
use mysql_async::Pool;
use parking_lot::RwLock;
use tracing::info;

use mygate_common::error::{Error, Result};

use crate::policy::{Policy, PolicyIndex};

/// Name of the policy store table; excluded from the exposed table list
pub const POLICY_TABLE: &str = "rls_policies";

const ENSURE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS rls_policies (\
id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, \
table_name VARCHAR(128) NOT NULL, \
policy_name VARCHAR(128) NOT NULL, \
operation ENUM('SELECT','INSERT','UPDATE','DELETE','ALL') NOT NULL DEFAULT 'ALL', \
using_expression TEXT NOT NULL, \
check_expression TEXT NULL, \
enabled TINYINT(1) NOT NULL DEFAULT 1, \
created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP, \
PRIMARY KEY (id), \
UNIQUE KEY uq_table_policy (table_name, policy_name), \
KEY idx_table_op_enabled (table_name, operation, enabled))";

const LOAD_SQL: &str = "\
SELECT id, table_name, policy_name, operation, using_expression, check_expression, enabled \
FROM rls_policies WHERE enabled = 1 ORDER BY id";

type PolicyRow = (u64, String, String, String, String, Option<String>, bool);

/// Published policy index with atomic replace-on-reload semantics
pub struct PolicyCache {
    inner: RwLock<Arc<PolicyIndex>>,
}

impl PolicyCache {
    /// An empty cache; the gateway serves traffic unrestricted until the
    /// first successful load.
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(Arc::new(PolicyIndex::default())),
        }
    }

    /// Current index snapshot
    pub fn snapshot(&self) -> Arc<PolicyIndex> {
        self.inner.read().clone()
    }

    /// Ensure the store table exists, read every enabled policy, and replace
    /// the published index. Returns the number of indexed entries.
    pub async fn reload(&self, pool: &Pool) -> Result<usize> {
        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| Error::PolicyLoad(e.to_string()))?;

        conn.query_drop(ENSURE_SQL)
            .await
            .map_err(|e| Error::PolicyLoad(format!("ensuring policy table: {e}")))?;

        let rows: Vec<PolicyRow> = conn
            .query(LOAD_SQL)
            .await
            .map_err(|e| Error::PolicyLoad(format!("reading policies: {e}")))?;

        let index = PolicyIndex::build(
            rows.into_iter()
                .map(|(id, table_name, policy_name, operation, using_expression, check_expression, enabled)| {
                    (
                        operation,
                        Policy {
                            id,
                            table_name,
                            policy_name,
                            using_expression,
                            check_expression,
                            enabled,
                        },
                    )
                })
                .collect(),
        );

        let loaded = index.len();
        *self.inner.write() = Arc::new(index);

        info!(entries = loaded, "policy index replaced");
        Ok(loaded)
    }
}
