//! Type mapping table
//!
//! Maps PostgreSQL type names, as reported by
//! `information_schema.columns.data_type`, to target-language types.
//! Unknown names pass through unchanged.

const GO_TYPES: &[(&str, &str)] = &[
    ("smallint", "int16"),
    ("integer", "int32"),
    ("bigint", "int64"),
    ("smallserial", "int16"),
    ("serial", "int32"),
    ("bigserial", "int64"),
    ("boolean", "bool"),
    ("real", "float32"),
    ("double precision", "float64"),
    ("numeric", "float64"),
    ("money", "string"),
    ("text", "string"),
    ("character varying", "string"),
    ("character", "string"),
    ("citext", "string"),
    ("uuid", "string"),
    ("inet", "string"),
    ("json", "[]byte"),
    ("jsonb", "[]byte"),
    ("bytea", "[]byte"),
    ("date", "time.Time"),
    ("timestamp without time zone", "time.Time"),
    ("timestamp with time zone", "time.Time"),
    ("time without time zone", "time.Time"),
    ("time with time zone", "time.Time"),
    ("interval", "time.Duration"),
];

const PYTHON_TYPES: &[(&str, &str)] = &[
    ("smallint", "int"),
    ("integer", "int"),
    ("bigint", "int"),
    ("smallserial", "int"),
    ("serial", "int"),
    ("bigserial", "int"),
    ("boolean", "bool"),
    ("real", "float"),
    ("double precision", "float"),
    ("numeric", "Decimal"),
    ("money", "str"),
    ("text", "str"),
    ("character varying", "str"),
    ("character", "str"),
    ("citext", "str"),
    ("uuid", "str"),
    ("inet", "str"),
    ("json", "dict"),
    ("jsonb", "dict"),
    ("bytea", "bytes"),
    ("date", "datetime.date"),
    ("timestamp without time zone", "datetime.datetime"),
    ("timestamp with time zone", "datetime.datetime"),
    ("time without time zone", "datetime.time"),
    ("time with time zone", "datetime.time"),
    ("interval", "datetime.timedelta"),
];

/// Go type for a database type name
pub fn go_type(db_type: &str) -> String {
    lookup(GO_TYPES, db_type)
}

/// Python type for a database type name
pub fn python_type(db_type: &str) -> String {
    lookup(PYTHON_TYPES, db_type)
}

fn lookup(table: &[(&str, &str)], db_type: &str) -> String {
    table
        .iter()
        .find(|(name, _)| *name == db_type)
        .map(|(_, mapped)| mapped.to_string())
        .unwrap_or_else(|| db_type.to_string())
}
