use postgres::{Client, Row};
use tracing::{error, trace};

use super::{
    parse_classification, AutoIncrementRow, ColumnRow, ConstraintRow, ForeignKeyRow,
    Introspector, TableRow, NOT_AUTO_INCREMENT,
};

/// PostgreSQL introspector backed by `information_schema`
pub struct PostgresIntrospector<'a> {
    client: &'a mut Client,
}

impl<'a> PostgresIntrospector<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    fn query(&mut self, what: &str, sql: &str, schemas: &[String]) -> Result<Vec<Row>, postgres::Error> {
        trace!(schemas = ?schemas, "Querying {}", what);
        self.client.query(sql, &[&schemas]).map_err(|e| {
            error!(schemas = ?schemas, error = ?e, "Failed to query {}", what);
            e
        })
    }
}

impl Introspector for PostgresIntrospector<'_> {
    type Error = postgres::Error;

    fn fetch_tables(&mut self, schemas: &[String]) -> Result<Vec<TableRow>, Self::Error> {
        let sql = r#"
            SELECT
                table_schema::text AS table_schema,
                table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema::text = ANY($1)
                AND table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY table_schema, table_name
        "#;

        let rows = self.query("tables", sql, schemas)?;
        rows.iter()
            .map(|row| -> Result<_, postgres::Error> {
                Ok(TableRow {
                    schema: row.try_get("table_schema")?,
                    name: row.try_get("table_name")?,
                })
            })
            .collect()
    }

    fn fetch_columns(&mut self, schemas: &[String]) -> Result<Vec<ColumnRow>, Self::Error> {
        let sql = r#"
            SELECT
                table_schema::text AS table_schema,
                table_name::text AS table_name,
                column_name::text AS column_name,
                ordinal_position::int4 AS ordinal_position,
                data_type::text AS data_type,
                is_nullable::text = 'YES' AS is_nullable,
                column_default::text AS column_default
            FROM information_schema.columns
            WHERE table_schema::text = ANY($1)
            ORDER BY table_schema, table_name, ordinal_position
        "#;

        let rows = self.query("columns", sql, schemas)?;
        rows.iter()
            .map(|row| -> Result<_, postgres::Error> {
                Ok(ColumnRow {
                    schema: row.try_get("table_schema")?,
                    table: row.try_get("table_name")?,
                    name: row.try_get("column_name")?,
                    ordinal: row.try_get("ordinal_position")?,
                    data_type: row.try_get("data_type")?,
                    is_nullable: row.try_get("is_nullable")?,
                    default_value: row.try_get("column_default")?,
                })
            })
            .collect()
    }

    fn fetch_constraints(&mut self, schemas: &[String]) -> Result<Vec<ConstraintRow>, Self::Error> {
        let sql = r#"
            SELECT
                kcu.table_schema::text AS table_schema,
                kcu.table_name::text AS table_name,
                kcu.column_name::text AS column_name,
                kcu.constraint_name::text AS constraint_name,
                tc.constraint_type::text AS constraint_type
            FROM information_schema.key_column_usage kcu
            JOIN information_schema.table_constraints tc
                ON tc.constraint_name = kcu.constraint_name
                AND tc.constraint_schema = kcu.constraint_schema
            WHERE kcu.table_schema::text = ANY($1)
            ORDER BY kcu.table_schema, kcu.table_name, kcu.ordinal_position
        "#;

        let rows = self.query("constraints", sql, schemas)?;
        rows.iter()
            .map(|row| -> Result<_, postgres::Error> {
                Ok(ConstraintRow {
                    schema: row.try_get("table_schema")?,
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    constraint_name: row.try_get("constraint_name")?,
                    constraint_type: row.try_get("constraint_type")?,
                })
            })
            .collect()
    }

    fn fetch_foreign_keys(&mut self, schemas: &[String]) -> Result<Vec<ForeignKeyRow>, Self::Error> {
        let sql = r#"
            SELECT
                tc.constraint_name::text AS constraint_name,
                tc.table_schema::text AS fk_schema,
                tc.table_name::text AS fk_table,
                kcu.column_name::text AS fk_column,
                ccu.table_schema::text AS referenced_schema,
                ccu.table_name::text AS referenced_table,
                ccu.column_name::text AS referenced_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON kcu.constraint_name = tc.constraint_name
                AND kcu.constraint_schema = tc.constraint_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.constraint_schema = tc.constraint_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND tc.table_schema::text = ANY($1)
        "#;

        let rows = self.query("foreign keys", sql, schemas)?;
        rows.iter()
            .map(|row| -> Result<_, postgres::Error> {
                Ok(ForeignKeyRow {
                    constraint_name: row.try_get("constraint_name")?,
                    schema: row.try_get("fk_schema")?,
                    table: row.try_get("fk_table")?,
                    column: row.try_get("fk_column")?,
                    referenced_schema: row.try_get("referenced_schema")?,
                    referenced_table: row.try_get("referenced_table")?,
                    referenced_column: row.try_get("referenced_column")?,
                })
            })
            .collect()
    }

    fn fetch_auto_increment(
        &mut self,
        schemas: &[String],
    ) -> Result<Vec<AutoIncrementRow>, Self::Error> {
        // SERIAL columns own a sequence, IDENTITY columns are flagged directly
        let sql = format!(
            r#"
            SELECT
                table_schema::text AS table_schema,
                table_name::text AS table_name,
                column_name::text AS column_name,
                CASE
                    WHEN is_identity::text = 'YES' THEN 'identity'
                    WHEN pg_get_serial_sequence(
                        quote_ident(table_schema::text) || '.' || quote_ident(table_name::text),
                        column_name::text
                    ) IS NOT NULL THEN 'serial'
                    ELSE '{}'
                END AS classification
            FROM information_schema.columns
            WHERE table_schema::text = ANY($1)
        "#,
            NOT_AUTO_INCREMENT
        );

        let rows = self.query("auto increment columns", &sql, schemas)?;
        rows.iter()
            .map(|row| -> Result<_, postgres::Error> {
                let label: String = row.try_get("classification")?;
                Ok(AutoIncrementRow {
                    schema: row.try_get("table_schema")?,
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    kind: parse_classification(&label),
                })
            })
            .collect()
    }
}
