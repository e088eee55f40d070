//! Policy model and the in-memory index

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Concrete statement kinds a policy can guard.
///
/// `ALL` exists only in the store; it fans out to the four concrete
/// operations when the index is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyOp {
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyOp {
    pub const ALL: [PolicyOp; 4] = [
        PolicyOp::Select,
        PolicyOp::Insert,
        PolicyOp::Update,
        PolicyOp::Delete,
    ];

    /// Parse a stored operation label; `ALL` yields every concrete operation
    pub fn expand(label: &str) -> Vec<PolicyOp> {
        match label.to_ascii_uppercase().as_str() {
            "SELECT" => vec![PolicyOp::Select],
            "INSERT" => vec![PolicyOp::Insert],
            "UPDATE" => vec![PolicyOp::Update],
            "DELETE" => vec![PolicyOp::Delete],
            _ => Self::ALL.to_vec(),
        }
    }
}

/// One row-level rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: u64,
    pub table_name: String,
    pub policy_name: String,
    /// Boolean SQL expression every visible row must satisfy
    pub using_expression: String,
    /// Stored for INSERT/UPDATE validation; not yet enforced
    pub check_expression: Option<String>,
    pub enabled: bool,
}

/// Read-only index of active policies, keyed by (table, operation).
///
/// Built once per load and replaced wholesale on reload.
#[derive(Debug, Default)]
pub struct PolicyIndex {
    entries: HashMap<(String, PolicyOp), Vec<Policy>>,
}

impl PolicyIndex {
    /// Build the index from stored rows, fanning `ALL` out to the four
    /// concrete operations.
    pub fn build(rows: Vec<(String, Policy)>) -> Self {
        let mut entries: HashMap<(String, PolicyOp), Vec<Policy>> = HashMap::new();

        for (operation_label, policy) in rows {
            for op in PolicyOp::expand(&operation_label) {
                entries
                    .entry((policy.table_name.clone(), op))
                    .or_default()
                    .push(policy.clone());
            }
        }

        Self { entries }
    }

    /// Active policies for (table, operation), in load order
    pub fn policies(&self, table: &str, op: PolicyOp) -> &[Policy] {
        self.entries
            .get(&(table.to_string(), op))
            .map_or(&[], Vec::as_slice)
    }

    /// The composed predicate for (table, operation): every policy's
    /// `using_expression` wrapped in parentheses and AND-joined. `None` means
    /// the table is unrestricted for this operation.
    pub fn predicate(&self, table: &str, op: PolicyOp) -> Option<String> {
        let policies = self.policies(table, op);
        if policies.is_empty() {
            return None;
        }

        let composed: Vec<String> = policies
            .iter()
            .map(|p| format!("({})", p.using_expression))
            .collect();

        Some(composed.join(" AND "))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
