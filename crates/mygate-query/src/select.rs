//! Select-expression parsing and relation resolution

use mygate_catalog::{Catalog, ForeignKey};
use mygate_common::error::{Error, Result};

/// Hard bound on embedding depth; deeper selects are rejected outright
pub const MAX_EMBED_DEPTH: usize = 8;

/// One item of a select expression
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Star,
    Column(String),
    Exclude(String),
    Relation(RelationNode),
}

/// An embedded relation `[hint:]target(inner)`
#[derive(Debug, Clone, PartialEq)]
pub struct RelationNode {
    pub target: String,
    pub hint: Option<String>,
    pub items: Vec<SelectItem>,
}

/// How a relation node connects to its parent table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Embed<'a> {
    /// The child table owns the foreign key: many child rows per parent
    HasMany(&'a ForeignKey),
    /// The parent table owns the foreign key: one child row per parent
    BelongsTo(&'a ForeignKey),
    /// No foreign key connects the tables
    Unrelated,
}

/// Parse a select expression into a tree.
///
/// Splitting on `,` happens only at parenthesis depth 0, so nested relation
/// lists pass through intact. Unbalanced parentheses and nesting beyond
/// [`MAX_EMBED_DEPTH`] are validation errors.
pub fn parse_select_tree(input: &str) -> Result<Vec<SelectItem>> {
    if !parens_balanced(input) {
        return Err(Error::Validation(
            "select expression has unbalanced parentheses".into(),
        ));
    }
    parse_items(input, 0)
}

fn parse_items(input: &str, depth: usize) -> Result<Vec<SelectItem>> {
    if depth > MAX_EMBED_DEPTH {
        return Err(Error::Validation(format!(
            "select nesting exceeds the maximum depth of {MAX_EMBED_DEPTH}"
        )));
    }

    let mut items = Vec::new();

    for part in split_at_depth_zero(input, ',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part == "*" {
            items.push(SelectItem::Star);
        } else if let Some(excluded) = part.strip_prefix('-') {
            items.push(SelectItem::Exclude(excluded.to_string()));
        } else if let Some(open) = part.find('(') {
            if !part.ends_with(')') {
                return Err(Error::Validation(format!("malformed relation item: {part}")));
            }
            let head = &part[..open];
            let inner = &part[open + 1..part.len() - 1];

            let (hint, target) = match head.split_once(':') {
                Some((hint, target)) => (Some(hint.to_string()), target),
                None => (None, head),
            };

            items.push(SelectItem::Relation(RelationNode {
                target: target.to_string(),
                hint,
                items: parse_items(inner, depth + 1)?,
            }));
        } else {
            items.push(SelectItem::Column(part.to_string()));
        }
    }

    Ok(items)
}

/// Split on a delimiter at parenthesis depth 0 only
pub fn split_at_depth_zero(s: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == delimiter && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn parens_balanced(s: &str) -> bool {
    let mut depth = 0i64;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Resolve a relation node against the catalog.
///
/// The hint, when present, must match the foreign-key column on either end;
/// it disambiguates between multiple foreign keys connecting the same pair
/// of tables. Resolution is strictly structural — the hint never shows up in
/// the emitted alias.
pub fn resolve_embed<'a>(catalog: &'a Catalog, parent: &str, node: &RelationNode) -> Embed<'a> {
    if !catalog.has_table(&node.target) {
        return Embed::Unrelated;
    }

    let candidates = catalog.foreign_keys_between(parent, &node.target);

    let fk = candidates.into_iter().find(|fk| match &node.hint {
        Some(hint) => *hint == fk.column || *hint == fk.referenced_column,
        None => true,
    });

    match fk {
        Some(fk) if fk.table == node.target => Embed::HasMany(fk),
        Some(fk) if fk.table == parent => Embed::BelongsTo(fk),
        _ => Embed::Unrelated,
    }
}
