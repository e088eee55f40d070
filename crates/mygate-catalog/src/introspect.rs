//! Startup introspection against `INFORMATION_SCHEMA`

use std::collections::{BTreeMap, HashMap};

use mysql_async::prelude::Queryable;
use mysql_async::Pool;
use tracing::{info, warn};

use mygate_common::error::{Error, Result};

use crate::model::{
    Catalog, Column, ColumnKey, ForeignKey, ParamMode, Routine, RoutineKind, RoutineParam, Table,
};

const COLUMNS_SQL: &str = "\
SELECT c.TABLE_NAME, c.COLUMN_NAME, c.ORDINAL_POSITION, c.DATA_TYPE, c.COLUMN_KEY, \
c.IS_NULLABLE, c.COLUMN_DEFAULT, c.COLUMN_TYPE, c.EXTRA, \
k.REFERENCED_TABLE_NAME, k.REFERENCED_COLUMN_NAME \
FROM INFORMATION_SCHEMA.COLUMNS c \
LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
ON k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME \
AND k.COLUMN_NAME = c.COLUMN_NAME AND k.REFERENCED_TABLE_NAME IS NOT NULL \
WHERE c.TABLE_SCHEMA = ? \
ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

const ROUTINES_SQL: &str = "\
SELECT r.ROUTINE_NAME, r.ROUTINE_TYPE, p.PARAMETER_NAME, p.DATA_TYPE, \
p.PARAMETER_MODE, p.ORDINAL_POSITION \
FROM INFORMATION_SCHEMA.ROUTINES r \
LEFT JOIN INFORMATION_SCHEMA.PARAMETERS p \
ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA AND p.SPECIFIC_NAME = r.SPECIFIC_NAME \
AND p.ORDINAL_POSITION > 0 \
WHERE r.ROUTINE_SCHEMA = ? \
ORDER BY r.ROUTINE_NAME, p.ORDINAL_POSITION";

type ColumnRow = (
    String,         // table name
    String,         // column name
    u32,            // ordinal position
    String,         // data type
    String,         // column key
    String,         // is nullable
    Option<String>, // column default
    String,         // column type
    String,         // extra
    Option<String>, // referenced table
    Option<String>, // referenced column
);

type RoutineRow = (
    String,         // routine name
    String,         // routine type
    Option<String>, // parameter name
    Option<String>, // parameter data type
    Option<String>, // parameter mode
    Option<u32>,    // parameter position
);

/// Introspect the target schema and build the catalog.
///
/// Tables, columns, and keys are mandatory; an unreachable database or an
/// empty schema is fatal. Routine introspection failure degrades to an empty
/// routine set.
pub async fn load_catalog(pool: &Pool, database: &str) -> Result<Catalog> {
    let mut conn = pool
        .get_conn()
        .await
        .map_err(|e| Error::Catalog(format!("cannot connect to {database}: {e}")))?;

    let column_rows: Vec<ColumnRow> = conn
        .exec(COLUMNS_SQL, (database,))
        .await
        .map_err(|e| Error::Catalog(format!("column introspection failed: {e}")))?;

    if column_rows.is_empty() {
        return Err(Error::Catalog(format!(
            "schema {database} has no tables to expose"
        )));
    }

    let tables = build_tables(column_rows);

    let routines = match conn.exec::<RoutineRow, _, _>(ROUTINES_SQL, (database,)).await {
        Ok(rows) => build_routines(rows),
        Err(e) => {
            warn!("routine introspection failed, continuing without routines: {e}");
            HashMap::new()
        }
    };

    info!(
        tables = tables.len(),
        routines = routines.len(),
        "catalog loaded for schema {database}"
    );

    Ok(Catalog::new(database.to_string(), tables, routines))
}

fn build_tables(rows: Vec<ColumnRow>) -> BTreeMap<String, Table> {
    let mut tables: BTreeMap<String, Table> = BTreeMap::new();

    for (table_name, column_name, ordinal, data_type, column_key, is_nullable, default, column_type, extra, ref_table, ref_column) in rows {
        let table = tables.entry(table_name.clone()).or_insert_with(|| Table {
            name: table_name.clone(),
            ..Table::default()
        });

        // The FK join can repeat a column; keep the first occurrence only
        if table.has_column(&column_name) {
            continue;
        }

        let key = if column_key == "PRI" {
            ColumnKey::Primary
        } else {
            ColumnKey::None
        };

        if key == ColumnKey::Primary {
            table.primary_key.push(column_name.clone());
        }

        if let (Some(referenced_table), Some(referenced_column)) = (ref_table, ref_column) {
            table.foreign_keys.push(ForeignKey {
                table: table_name.clone(),
                column: column_name.clone(),
                referenced_table,
                referenced_column,
                data_type: data_type.clone(),
            });
        }

        table.columns.push(Column {
            name: column_name,
            ordinal,
            data_type,
            key,
            nullable: is_nullable == "YES",
            default,
            column_type,
            auto_increment: extra.contains("auto_increment"),
        });
    }

    tables
}

fn build_routines(rows: Vec<RoutineRow>) -> HashMap<String, Routine> {
    let mut routines: HashMap<String, Routine> = HashMap::new();

    for (name, routine_type, param_name, param_type, param_mode, position) in rows {
        let kind = if routine_type.eq_ignore_ascii_case("FUNCTION") {
            RoutineKind::Function
        } else {
            RoutineKind::Procedure
        };

        let routine = routines.entry(name.clone()).or_insert_with(|| Routine {
            name: name.clone(),
            kind,
            params: Vec::new(),
        });

        if let (Some(param_name), Some(position)) = (param_name, position) {
            let mode = match param_mode.as_deref() {
                Some("OUT") => ParamMode::Out,
                Some("INOUT") => ParamMode::InOut,
                _ => ParamMode::In,
            };
            routine.params.push(RoutineParam {
                name: param_name,
                data_type: param_type.unwrap_or_default(),
                mode,
                position,
            });
        }
    }

    routines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_row(table: &str, column: &str, ordinal: u32, key: &str) -> ColumnRow {
        (
            table.to_string(),
            column.to_string(),
            ordinal,
            "int".to_string(),
            key.to_string(),
            "NO".to_string(),
            None,
            "int".to_string(),
            String::new(),
            None,
            None,
        )
    }

    #[test]
    fn test_build_tables_groups_and_orders() {
        let rows = vec![
            column_row("orders", "orderNumber", 1, "PRI"),
            column_row("orders", "status", 2, ""),
            column_row("payments", "customerNumber", 1, "PRI"),
            column_row("payments", "checkNumber", 2, "PRI"),
        ];

        let tables = build_tables(rows);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables["orders"].primary_key, ["orderNumber"]);
        assert_eq!(tables["payments"].primary_key, ["customerNumber", "checkNumber"]);
    }

    #[test]
    fn test_build_tables_foreign_keys() {
        let mut fk_row = column_row("orders", "customerNumber", 3, "MUL");
        fk_row.9 = Some("customers".to_string());
        fk_row.10 = Some("customerNumber".to_string());

        let tables = build_tables(vec![column_row("orders", "orderNumber", 1, "PRI"), fk_row]);
        let fks = &tables["orders"].foreign_keys;
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].referenced_table, "customers");
        assert_eq!(fks[0].referenced_column, "customerNumber");
    }

    #[test]
    fn test_build_tables_dedupes_repeated_join_rows() {
        let rows = vec![
            column_row("orders", "orderNumber", 1, "PRI"),
            column_row("orders", "orderNumber", 1, "PRI"),
        ];
        let tables = build_tables(rows);
        assert_eq!(tables["orders"].columns.len(), 1);
    }

    #[test]
    fn test_build_tables_auto_increment() {
        let mut row = column_row("items", "id", 1, "PRI");
        row.8 = "auto_increment".to_string();
        let tables = build_tables(vec![row]);
        assert!(tables["items"].columns[0].auto_increment);
        assert_eq!(tables["items"].auto_increment_column().unwrap().name, "id");
    }

    #[test]
    fn test_build_routines() {
        let rows = vec![
            (
                "order_total".to_string(),
                "FUNCTION".to_string(),
                Some("order_no".to_string()),
                Some("int".to_string()),
                Some("IN".to_string()),
                Some(1),
            ),
            (
                "close_order".to_string(),
                "PROCEDURE".to_string(),
                Some("order_no".to_string()),
                Some("int".to_string()),
                Some("IN".to_string()),
                Some(1),
            ),
            (
                "close_order".to_string(),
                "PROCEDURE".to_string(),
                Some("closed".to_string()),
                Some("tinyint".to_string()),
                Some("OUT".to_string()),
                Some(2),
            ),
        ];

        let routines = build_routines(rows);
        assert_eq!(routines["order_total"].kind, RoutineKind::Function);
        assert_eq!(routines["close_order"].kind, RoutineKind::Procedure);
        assert_eq!(routines["close_order"].params.len(), 2);
        assert_eq!(routines["close_order"].params[1].mode, ParamMode::Out);
    }

    #[test]
    fn test_build_routines_no_params() {
        let rows = vec![(
            "heartbeat".to_string(),
            "PROCEDURE".to_string(),
            None,
            None,
            None,
            None,
        )];
        let routines = build_routines(rows);
        assert!(routines["heartbeat"].params.is_empty());
    }
}
