//! Database introspection
//!
//! Schema facts are fetched by independent catalog queries, one per
//! [`IntrospectionStage`], and then joined into a single [`Metadata`] graph.
//! Backends only implement the fetches; the join lives here so it stays a
//! pure function of the fetched rows.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::error::DtoGenError;
use crate::schema::{AutoIncrementKind, Column, ForeignKeyTarget, Metadata, Table};

/// Catalog query stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrospectionStage {
    Tables,
    Columns,
    Constraints,
    ForeignKeys,
    AutoIncrement,
}

impl fmt::Display for IntrospectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntrospectionStage::Tables => "table list",
            IntrospectionStage::Columns => "column list",
            IntrospectionStage::Constraints => "key constraints",
            IntrospectionStage::ForeignKeys => "foreign key links",
            IntrospectionStage::AutoIncrement => "auto increment columns",
        };
        write!(f, "{}", name)
    }
}

/// A base table or view
#[derive(Debug, Clone)]
pub struct TableRow {
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub ordinal: i32,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
}

/// Column membership in a key constraint
#[derive(Debug, Clone)]
pub struct ConstraintRow {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub constraint_name: String,
    /// `PRIMARY KEY`, `FOREIGN KEY`, `UNIQUE`, ...
    pub constraint_type: String,
}

/// Referencing column of a foreign key constraint and the column it targets
#[derive(Debug, Clone)]
pub struct ForeignKeyRow {
    pub constraint_name: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone)]
pub struct AutoIncrementRow {
    pub schema: String,
    pub table: String,
    pub column: String,
    /// `None` when the column is not auto increment
    pub kind: Option<AutoIncrementKind>,
}

/// Classification label used by the auto increment catalog query
pub const NOT_AUTO_INCREMENT: &str = "not auto increment";

/// Parse an auto increment classification label
///
/// Anything other than [`NOT_AUTO_INCREMENT`] marks the column auto
/// increment; `identity` is kept apart from sequence-backed columns.
pub fn parse_classification(label: &str) -> Option<AutoIncrementKind> {
    match label {
        NOT_AUTO_INCREMENT => None,
        "identity" => Some(AutoIncrementKind::Identity),
        _ => Some(AutoIncrementKind::Serial),
    }
}

/// Everything fetched from the catalog for one run
#[derive(Debug, Clone, Default)]
pub struct CatalogRows {
    pub tables: Vec<TableRow>,
    pub columns: Vec<ColumnRow>,
    pub constraints: Vec<ConstraintRow>,
    pub foreign_keys: Vec<ForeignKeyRow>,
    pub auto_increment: Vec<AutoIncrementRow>,
}

/// Trait for database introspection backends
pub trait Introspector {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_tables(&mut self, schemas: &[String]) -> Result<Vec<TableRow>, Self::Error>;

    /// Columns ordered by ordinal position within each table
    fn fetch_columns(&mut self, schemas: &[String]) -> Result<Vec<ColumnRow>, Self::Error>;

    fn fetch_constraints(&mut self, schemas: &[String])
        -> Result<Vec<ConstraintRow>, Self::Error>;

    fn fetch_foreign_keys(&mut self, schemas: &[String])
        -> Result<Vec<ForeignKeyRow>, Self::Error>;

    fn fetch_auto_increment(
        &mut self,
        schemas: &[String],
    ) -> Result<Vec<AutoIncrementRow>, Self::Error>;

    /// Run every catalog query in order and join the results
    ///
    /// The first failing query aborts the run; no partial metadata is
    /// returned.
    fn introspect(&mut self, database: &str, schemas: &[String]) -> Result<Metadata, DtoGenError> {
        if schemas.is_empty() {
            return Err(DtoGenError::Config(
                "at least one schema must be configured".to_string(),
            ));
        }

        info!(database = ?database, schemas = ?schemas, "Starting schema introspection");

        let tables = self
            .fetch_tables(schemas)
            .map_err(in_stage(IntrospectionStage::Tables))?;
        debug!(count = ?tables.len(), "Found tables");

        let columns = self
            .fetch_columns(schemas)
            .map_err(in_stage(IntrospectionStage::Columns))?;
        debug!(count = ?columns.len(), "Found columns");

        let constraints = self
            .fetch_constraints(schemas)
            .map_err(in_stage(IntrospectionStage::Constraints))?;
        debug!(count = ?constraints.len(), "Found constraint columns");

        let foreign_keys = self
            .fetch_foreign_keys(schemas)
            .map_err(in_stage(IntrospectionStage::ForeignKeys))?;
        debug!(count = ?foreign_keys.len(), "Found foreign key links");

        let auto_increment = self
            .fetch_auto_increment(schemas)
            .map_err(in_stage(IntrospectionStage::AutoIncrement))?;
        debug!(count = ?auto_increment.len(), "Found auto increment classifications");

        let rows = CatalogRows {
            tables,
            columns,
            constraints,
            foreign_keys,
            auto_increment,
        };
        let metadata = resolve(database, &rows);

        info!(
            database = ?database,
            tables = ?metadata.tables.len(),
            "Schema introspection complete"
        );

        Ok(metadata)
    }
}

fn in_stage<E>(stage: IntrospectionStage) -> impl FnOnce(E) -> DtoGenError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| DtoGenError::Introspection {
        stage,
        source: Box::new(e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey<'a> {
    schema: &'a str,
    table: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ColumnKey<'a> {
    schema: &'a str,
    table: &'a str,
    column: &'a str,
}

/// Join the fetched catalog rows into one metadata graph
///
/// Tables keep fetch order, columns are sorted by ordinal and renumbered
/// from 1 so ordinals stay contiguous even when the catalog has gaps left by
/// dropped columns. A table without any matching column is kept with an
/// empty column list.
pub fn resolve(database: &str, rows: &CatalogRows) -> Metadata {
    let mut columns_by_table: HashMap<TableKey, Vec<&ColumnRow>> = HashMap::new();
    for row in &rows.columns {
        let key = TableKey {
            schema: &row.schema,
            table: &row.table,
        };
        columns_by_table.entry(key).or_default().push(row);
    }

    let mut constraints_by_column: HashMap<ColumnKey, Vec<&ConstraintRow>> = HashMap::new();
    for row in &rows.constraints {
        let key = ColumnKey {
            schema: &row.schema,
            table: &row.table,
            column: &row.column,
        };
        constraints_by_column.entry(key).or_default().push(row);
    }

    let mut links_by_column: HashMap<ColumnKey, Vec<&ForeignKeyRow>> = HashMap::new();
    for row in &rows.foreign_keys {
        let key = ColumnKey {
            schema: &row.schema,
            table: &row.table,
            column: &row.column,
        };
        links_by_column.entry(key).or_default().push(row);
    }

    let mut auto_by_column: HashMap<ColumnKey, AutoIncrementKind> = HashMap::new();
    for row in &rows.auto_increment {
        if let Some(kind) = row.kind {
            let key = ColumnKey {
                schema: &row.schema,
                table: &row.table,
                column: &row.column,
            };
            auto_by_column.entry(key).or_insert(kind);
        }
    }

    let mut tables: Vec<Table> = Vec::with_capacity(rows.tables.len());
    for table_row in &rows.tables {
        if tables
            .iter()
            .any(|t| t.schema == table_row.schema && t.name == table_row.name)
        {
            warn!(schema = ?table_row.schema, table = ?table_row.name, "Duplicate table row ignored");
            continue;
        }

        let key = TableKey {
            schema: &table_row.schema,
            table: &table_row.name,
        };
        let mut column_rows = columns_by_table.remove(&key).unwrap_or_default();
        column_rows.sort_by_key(|row| row.ordinal);

        if column_rows.is_empty() {
            debug!(schema = ?table_row.schema, table = ?table_row.name, "Table has no columns");
        }

        let columns = column_rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let key = ColumnKey {
                    schema: &row.schema,
                    table: &row.table,
                    column: &row.name,
                };
                resolve_column(
                    index as u32 + 1,
                    row,
                    constraints_by_column.get(&key).map(Vec::as_slice).unwrap_or(&[]),
                    links_by_column.get(&key).map(Vec::as_slice).unwrap_or(&[]),
                    auto_by_column.get(&key).copied(),
                )
            })
            .collect();

        tables.push(Table {
            schema: table_row.schema.clone(),
            name: table_row.name.clone(),
            columns,
        });
    }

    Metadata {
        database: database.to_string(),
        tables,
    }
}

fn resolve_column(
    ordinal: u32,
    row: &ColumnRow,
    constraints: &[&ConstraintRow],
    links: &[&ForeignKeyRow],
    auto_increment: Option<AutoIncrementKind>,
) -> Column {
    let mut is_primary_key = false;
    let mut foreign_key = None;

    for constraint in constraints {
        match constraint.constraint_type.as_str() {
            "PRIMARY KEY" => is_primary_key = true,
            "FOREIGN KEY" => {
                let link = links
                    .iter()
                    .find(|link| link.constraint_name == constraint.constraint_name)
                    .or_else(|| links.first());
                if let Some(link) = link {
                    foreign_key.get_or_insert_with(|| ForeignKeyTarget {
                        schema: link.referenced_schema.clone(),
                        table: link.referenced_table.clone(),
                        column: link.referenced_column.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    let column = Column {
        ordinal,
        name: row.name.clone(),
        data_type: row.data_type.clone(),
        is_nullable: row.is_nullable,
        default_value: row.default_value.clone(),
        is_primary_key,
        auto_increment,
        foreign_key,
    };
    trace!(table = ?row.table, column = %column, "Resolved column");
    column
}

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresIntrospector;
