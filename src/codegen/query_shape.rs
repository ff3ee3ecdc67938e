//! Result shape inference for custom queries
//!
//! Resolves a query's projection against the metadata and decides what the
//! generated function returns. Shared by every emitter.

use tracing::trace;

use crate::error::DtoGenError;
use crate::queries::{Cardinality, ColumnSelector, CustomQuery, ProjectionColumn};
use crate::schema::{Metadata, Table};

/// Database type assumed for queries that declare no projection but read
/// rows; these are aggregates such as `count(*)`.
pub const DEFAULT_SCALAR_TYPE: &str = "bigint";

/// One resolved column of a query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    /// Unique within the result, snake_case
    pub name: String,
    pub db_type: String,
    pub nullable: bool,
}

/// What a generated custom-query function hands back per row
#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape<'m> {
    /// Cardinality `0`: only success or failure
    Nothing,
    /// A single primitive value
    Scalar(ResultColumn),
    /// The entity type of one table (`table.*`)
    Entity(&'m Table),
    /// A synthesized record type with one field per column
    Record(Vec<ResultColumn>),
}

/// Infer the result shape of a custom query
///
/// Every table and column reference must exist in the metadata, whatever the
/// cardinality.
pub fn infer_shape<'m>(
    query: &CustomQuery,
    metadata: &'m Metadata,
) -> Result<ResultShape<'m>, DtoGenError> {
    let mut columns = resolve_projection(query, metadata)?;
    trace!(query = ?query.name, columns = ?columns.len(), "Resolved projection");

    if query.cardinality == Cardinality::None {
        return Ok(ResultShape::Nothing);
    }

    if let [ProjectionColumn::Reference {
        table,
        column: ColumnSelector::All,
        nullable: false,
    }] = query.projection.as_slice()
    {
        if let Some(table) = metadata.table(table) {
            return Ok(ResultShape::Entity(table));
        }
    }

    let shape = match columns.len() {
        0 => ResultShape::Scalar(ResultColumn {
            name: "result".to_string(),
            db_type: DEFAULT_SCALAR_TYPE.to_string(),
            nullable: false,
        }),
        1 => ResultShape::Scalar(columns.remove(0)),
        _ => ResultShape::Record(columns),
    };
    Ok(shape)
}

/// Expand the projection into result columns, in declaration order
fn resolve_projection(
    query: &CustomQuery,
    metadata: &Metadata,
) -> Result<Vec<ResultColumn>, DtoGenError> {
    let fail = |message: String| DtoGenError::CodeGen {
        target: query.name.clone(),
        message,
    };

    // (owning table, column)
    let mut resolved: Vec<(Option<&str>, ResultColumn)> = Vec::new();
    for projection in &query.projection {
        match projection {
            ProjectionColumn::Reference {
                table,
                column,
                nullable,
            } => {
                let found = metadata
                    .table(table)
                    .ok_or_else(|| fail(format!("unknown table in projection: {}", table)))?;
                let columns = match column {
                    ColumnSelector::All => found.columns.iter().collect::<Vec<_>>(),
                    ColumnSelector::Named(name) => {
                        let col = found.column(name).ok_or_else(|| {
                            fail(format!("unknown column in projection: {}.{}", table, name))
                        })?;
                        vec![col]
                    }
                };
                for col in columns {
                    resolved.push((
                        Some(found.name.as_str()),
                        ResultColumn {
                            name: col.name.clone(),
                            db_type: col.data_type.clone(),
                            nullable: *nullable || col.is_nullable,
                        },
                    ));
                }
            }
            ProjectionColumn::Computed {
                name,
                sql_type,
                nullable,
            } => resolved.push((
                None,
                ResultColumn {
                    name: name.clone(),
                    db_type: sql_type.clone(),
                    nullable: *nullable,
                },
            )),
        }
    }

    // Same column name from two tables: qualify with the table name
    let names: Vec<String> = resolved.iter().map(|(_, col)| col.name.clone()).collect();
    let mut columns: Vec<ResultColumn> = Vec::with_capacity(resolved.len());
    for (table, mut col) in resolved {
        let clashes = names.iter().filter(|name| **name == col.name).count() > 1;
        if let (true, Some(table)) = (clashes, table) {
            col.name = format!("{}_{}", table, col.name);
        }
        if columns.iter().any(|existing| existing.name == col.name) {
            return Err(fail(format!("duplicate result column: {}", col.name)));
        }
        columns.push(col);
    }

    Ok(columns)
}
