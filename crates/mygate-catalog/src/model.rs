//! In-memory catalog model

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Role a column plays in its table's keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnKey {
    Primary,
    None,
}

/// Coarse type classification driving literal coercion and JSON handling.
///
/// Derived once from the declared type so the compiler and the handlers never
/// string-match on type names at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeClass {
    Int,
    Float,
    Text,
    Date,
    Json,
    Bool,
}

/// Column metadata
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub ordinal: u32,
    pub data_type: String,
    pub key: ColumnKey,
    pub nullable: bool,
    pub default: Option<String>,
    /// Raw type text, e.g. `varchar(50)` or `tinyint(1)`
    pub column_type: String,
    pub auto_increment: bool,
}

impl Column {
    /// Classify the declared type
    pub fn type_class(&self) -> TypeClass {
        match self.data_type.as_str() {
            "tinyint" if self.column_type.starts_with("tinyint(1)") => TypeClass::Bool,
            "tinyint" | "smallint" | "mediumint" | "int" | "bigint" | "year" => TypeClass::Int,
            "decimal" | "float" | "double" => TypeClass::Float,
            "date" | "datetime" | "timestamp" | "time" => TypeClass::Date,
            "json" => TypeClass::Json,
            _ => TypeClass::Text,
        }
    }
}

/// Foreign key relationship (one owning column referencing one column)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub data_type: String,
}

/// Table (or view) metadata
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// Primary-key column names in key order
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary-key columns in key order
    pub fn primary_key_columns(&self) -> Vec<&Column> {
        self.primary_key
            .iter()
            .filter_map(|name| self.column(name))
            .collect()
    }

    /// The auto-increment column, when the table has one
    pub fn auto_increment_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.auto_increment)
    }
}

/// Stored routine kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutineKind {
    Procedure,
    Function,
}

/// Routine parameter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

/// Stored routine parameter
#[derive(Debug, Clone, Serialize)]
pub struct RoutineParam {
    pub name: String,
    pub data_type: String,
    pub mode: ParamMode,
    pub position: u32,
}

/// Stored routine metadata
#[derive(Debug, Clone, Serialize)]
pub struct Routine {
    pub name: String,
    pub kind: RoutineKind,
    /// Parameters in declared order
    pub params: Vec<RoutineParam>,
}

/// The authoritative read-only picture of the database after introspection.
///
/// Immutable once built; a rebuild produces a fresh value that replaces the
/// published `Arc` wholesale.
#[derive(Debug, Default)]
pub struct Catalog {
    pub database: String,
    tables: BTreeMap<String, Table>,
    routines: HashMap<String, Routine>,
}

impl Catalog {
    pub fn new(
        database: String,
        tables: BTreeMap<String, Table>,
        routines: HashMap<String, Routine>,
    ) -> Self {
        Self {
            database,
            tables,
            routines,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in lexical order
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.get(name)
    }

    /// Foreign keys connecting two tables, regardless of which side owns them
    pub fn foreign_keys_between(&self, a: &str, b: &str) -> Vec<&ForeignKey> {
        let mut found = Vec::new();
        if let Some(table) = self.tables.get(a) {
            found.extend(table.foreign_keys.iter().filter(|fk| fk.referenced_table == b));
        }
        if let Some(table) = self.tables.get(b) {
            found.extend(table.foreign_keys.iter().filter(|fk| fk.referenced_table == a));
        }
        found
    }
}
