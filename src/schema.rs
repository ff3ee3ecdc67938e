//! Schema metadata structures
//!
//! These types represent the resolved database schema and form the contract
//! between introspection (produces) and code generation (consumes). A
//! `Metadata` value is built once per run and never mutated afterwards.

use std::fmt;

/// The resolved schema of one database, restricted to the configured schemas
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub database: String,
    /// Tables in fetch order
    pub tables: Vec<Table>,
}

impl Metadata {
    /// Find a table by name (first match across schemas)
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Database table or view
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: String,
    pub name: String,
    /// Columns in ordinal order
    pub columns: Vec<Column>,
}

impl Table {
    /// Returns PascalCase entity name from snake_case table name
    pub fn entity_name(&self) -> String {
        to_pascal_case(&self.name)
    }

    /// `schema.table`, as used in generated SQL
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Primary key columns in ordinal order
    pub fn primary_key_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|col| col.is_primary_key).collect()
    }

    /// Columns outside the primary key (update SET clause, `SelectBy<Column>`)
    pub fn non_primary_key_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|col| !col.is_primary_key).collect()
    }

    /// Columns listed in a generated INSERT (auto-increment columns excluded)
    pub fn insert_columns(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|col| !col.is_auto_increment())
            .collect()
    }

    pub fn auto_increment_columns(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|col| col.is_auto_increment())
            .collect()
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|col| col.is_primary_key)
    }

    /// Upsert (and the Exists helper it relies on) only makes sense for
    /// natural keys, so tables with any database-assigned column are excluded.
    pub fn supports_upsert(&self) -> bool {
        self.has_primary_key() && self.auto_increment_columns().is_empty()
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// 1-based, contiguous within a table
    pub ordinal: u32,
    pub name: String,
    /// Raw database type name (`information_schema.columns.data_type`)
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub auto_increment: Option<AutoIncrementKind>,
    pub foreign_key: Option<ForeignKeyTarget>,
}

impl Column {
    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment.is_some()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.ordinal, self.name, self.data_type)?;
        if self.is_nullable {
            write!(f, " NULL")?;
        } else {
            write!(f, " NOT NULL")?;
        }
        if self.is_primary_key {
            write!(f, " PRIMARY KEY")?;
        }
        if let Some(kind) = self.auto_increment {
            write!(f, " AUTOINCREMENT ({})", kind)?;
        }
        if let Some(fk) = &self.foreign_key {
            write!(f, " FOREIGN KEY ({}.{}->{})", fk.schema, fk.table, fk.column)?;
        }
        if let Some(default) = &self.default_value {
            write!(f, " DEFAULT {}", default)?;
        }
        Ok(())
    }
}

/// How the database assigns values to an auto-increment column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoIncrementKind {
    /// Backed by an owned sequence (SERIAL, BIGSERIAL, nextval default)
    Serial,
    /// `GENERATED ... AS IDENTITY`
    Identity,
}

impl fmt::Display for AutoIncrementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoIncrementKind::Serial => write!(f, "serial"),
            AutoIncrementKind::Identity => write!(f, "identity"),
        }
    }
}

/// The column a foreign key points at. Descriptive only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyTarget {
    pub schema: String,
    pub table: String,
    pub column: String,
}

/// Convert snake_case to PascalCase
///
/// Empty segments (leading, trailing or doubled underscores) are skipped.
pub fn to_pascal_case(s: &str) -> String {
    s.split('_').map(capitalize).collect()
}

/// Convert snake_case to camelCase
///
/// The first segment keeps its original casing. Any later segment is
/// capitalized, including one that follows a skipped empty segment, so
/// `_id` becomes `Id`.
pub fn to_camel_case(s: &str) -> String {
    s.split('_')
        .enumerate()
        .map(|(i, word)| {
            if i > 0 {
                capitalize(word)
            } else {
                word.to_string()
            }
        })
        .collect()
}

/// Local variable / parameter name for a column or declared parameter
///
/// A name that camel-cases to `type` becomes `type1`. Generated code depends
/// on this exact spelling.
pub fn local_name(s: &str) -> String {
    let name = to_camel_case(s);
    if name == "type" {
        "type1".to_string()
    } else {
        name
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().to_string() + chars.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(ordinal: u32, name: &str, pk: bool, auto: bool) -> Column {
        Column {
            ordinal,
            name: name.to_string(),
            data_type: "integer".to_string(),
            is_nullable: false,
            default_value: None,
            is_primary_key: pk,
            auto_increment: auto.then_some(AutoIncrementKind::Serial),
            foreign_key: None,
        }
    }

    fn table(name: &str, columns: Vec<Column>) -> Table {
        Table {
            schema: "public".to_string(),
            name: name.to_string(),
            columns,
        }
    }

    #[test]
    fn test_entity_name_snake_case() {
        assert_eq!(table("user_accounts", vec![]).entity_name(), "UserAccounts");
        assert_eq!(table("users", vec![]).entity_name(), "Users");
    }

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("user"), "User");
        assert_eq!(to_pascal_case("order_line_items"), "OrderLineItems");
        assert_eq!(to_pascal_case("double__underscore_"), "DoubleUnderscore");
        assert_eq!(to_pascal_case("createdAt"), "CreatedAt");
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case("id"), "id");
        assert_eq!(to_camel_case("_id"), "Id");
        assert_eq!(to_camel_case("a__b"), "aB");
    }

    #[test]
    fn test_local_name_type_collision() {
        assert_eq!(local_name("type"), "type1");
        assert_eq!(local_name("user_type"), "userType");
        assert_eq!(local_name("email"), "email");
    }

    #[test]
    fn test_key_column_helpers() {
        let t = table(
            "users",
            vec![
                column(1, "id", true, true),
                column(2, "email", false, false),
                column(3, "tenant", true, false),
            ],
        );

        let pk: Vec<_> = t.primary_key_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(pk, vec!["id", "tenant"]);

        let non_pk: Vec<_> = t.non_primary_key_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(non_pk, vec!["email"]);

        let insert: Vec<_> = t.insert_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(insert, vec!["email", "tenant"]);

        assert!(!t.supports_upsert());
    }

    #[test]
    fn test_supports_upsert_requires_natural_key() {
        let tags = table("tags", vec![column(1, "name", true, false)]);
        assert!(tags.supports_upsert());

        let log = table("log", vec![column(1, "line", false, false)]);
        assert!(!log.supports_upsert());
    }

    #[test]
    fn test_lookup_helpers() {
        let metadata = Metadata {
            database: "app".to_string(),
            tables: vec![table("users", vec![column(1, "id", true, true)])],
        };

        let users = metadata.table("users").unwrap();
        assert_eq!(users.column("id").unwrap().ordinal, 1);
        assert!(users.column("missing").is_none());
        assert!(metadata.table("orders").is_none());
        assert_eq!(users.qualified_name(), "public.users");
    }

    #[test]
    fn test_column_display() {
        let mut col = column(1, "id", true, true);
        col.default_value = Some("nextval('users_id_seq'::regclass)".to_string());
        assert_eq!(
            col.to_string(),
            "[1] id integer NOT NULL PRIMARY KEY AUTOINCREMENT (serial) DEFAULT nextval('users_id_seq'::regclass)"
        );
    }
}
