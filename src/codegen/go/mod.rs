//! Go code generator
//!
//! Generates one file per table (entity struct plus CRUD functions), a
//! connector file and a custom query file, all using pgx v5.

use std::collections::HashSet;

use minijinja::Environment;
use tracing::{debug, info};

use crate::codegen::ir::{Field, Function, Param, SourceFile, Struct};
use crate::codegen::query_shape::{infer_shape, ResultColumn, ResultShape};
use crate::codegen::{
    quote_literal, CodeGenerator, GenerationInput, CONNECTOR_FILE, CUSTOM_QUERIES_FILE,
};
use crate::config::ConnectionInfo;
use crate::error::DtoGenError;
use crate::queries::{Cardinality, CustomQuery};
use crate::schema::{local_name, to_pascal_case, Column, Table};
use crate::types::go_type;

const PGX_IMPORT: &str = "github.com/jackc/pgx/v5";
const CONN: &str = "conn";
const CONN_TYPE: &str = "*pgx.Conn";
const CTX: &str = "context.Background()";

/// Go code generator
pub struct GoGenerator {
    env: Environment<'static>,
}

impl GoGenerator {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        env.add_template("go_source", include_str!("templates/source.go.jinja"))
            .expect("Failed to load go source template");

        Self { env }
    }
}

impl Default for GoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for GoGenerator {
    fn extension(&self) -> &'static str {
        "go"
    }

    fn build_sources(&self, input: &GenerationInput) -> Result<Vec<SourceFile>, DtoGenError> {
        info!(
            package = ?input.package,
            tables = ?input.metadata.tables.len(),
            queries = ?input.queries.len(),
            "Building Go sources"
        );

        let mut sources = vec![connector_source(input.connection)];

        for table in &input.metadata.tables {
            debug!(schema = ?table.schema, table = ?table.name, "Building Go table file");
            sources.push(table_source(table));
        }

        if !input.queries.is_empty() {
            let mut taken = package_identifiers(&sources);
            sources.push(custom_queries_source(input, &mut taken)?);
        }

        Ok(sources)
    }

    fn render(&self, package: &str, source: &SourceFile) -> Result<String, DtoGenError> {
        let template = self
            .env
            .get_template("go_source")
            .map_err(|e| DtoGenError::CodeGen {
                target: source.name.clone(),
                message: format!("Template error: {}", e),
            })?;

        let ctx = minijinja::context! {
            package => package,
            imports => &source.imports,
            structs => source.structs.iter().map(|s| {
                minijinja::context! {
                    name => &s.name,
                    fields => s.fields.iter().map(field_line).collect::<Vec<_>>(),
                }
            }).collect::<Vec<_>>(),
            functions => source.functions.iter().map(|f| {
                minijinja::context! {
                    signature => signature(f),
                    body => &f.body,
                }
            }).collect::<Vec<_>>(),
        };

        template.render(ctx).map_err(|e| DtoGenError::CodeGen {
            target: source.name.clone(),
            message: format!("Render error: {}", e),
        })
    }
}

/// `Name *Type `json:"key"``
fn field_line(field: &Field) -> String {
    let pointer = if field.optional { "*" } else { "" };
    match &field.key {
        Some(key) => format!("{} {}{} `json:\"{}\"`", field.name, pointer, field.type_name, key),
        None => format!("{} {}{}", field.name, pointer, field.type_name),
    }
}

/// `Name(a T, b U) (R, error)`
fn signature(function: &Function) -> String {
    let params = function
        .params
        .iter()
        .map(|p| format!("{} {}", p.name, p.type_name))
        .collect::<Vec<_>>()
        .join(", ");
    let returns: Vec<&str> = function.returns.iter().map(|r| r.type_name.as_str()).collect();

    match returns.as_slice() {
        [] => format!("{}({})", function.name, params),
        [single] => format!("{}({}) {}", function.name, params, single),
        many => format!("{}({}) ({})", function.name, params, many.join(", ")),
    }
}

fn file_imports(source: SourceFile) -> SourceFile {
    let needs_time = source.referenced_types().any(|t| t.contains("time."));
    let imports = ["context"]
        .into_iter()
        .chain(needs_time.then_some("time"))
        .chain([PGX_IMPORT]);
    source.with_imports(imports)
}

/// Column type, as a pointer when nullable
fn column_type(column: &Column) -> String {
    let base = go_type(&column.data_type);
    if column.is_nullable {
        format!("*{}", base)
    } else {
        base
    }
}

fn column_list(columns: &[&Column]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `a = $1 AND b = $2`, numbering from `first`
fn conditions(columns: &[&Column], first: usize, separator: &str) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", c.name, first + i))
        .collect::<Vec<_>>()
        .join(separator)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `, a, b` call arguments appended after the SQL literal
fn args(names: impl IntoIterator<Item = String>) -> String {
    names.into_iter().map(|n| format!(", {}", n)).collect()
}

fn key_params(columns: &[&Column]) -> Vec<Param> {
    columns
        .iter()
        .map(|c| Param::new(local_name(&c.name), column_type(c)))
        .collect()
}

fn key_args(columns: &[&Column]) -> String {
    args(columns.iter().map(|c| local_name(&c.name)))
}

fn entity_args(columns: &[&Column], var: &str) -> String {
    args(columns.iter().map(|c| format!("{}.{}", var, to_pascal_case(&c.name))))
}

/// `&var.A, &var.B` in ordinal order
fn scan_targets(table: &Table, var: &str) -> String {
    table
        .columns
        .iter()
        .map(|c| format!("&{}.{}", var, to_pascal_case(&c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn conn_param() -> Param {
    Param::new(CONN, CONN_TYPE)
}

/// Lines that drain `rows` into `result`, scanning each row into `item`
fn collect_rows(item_type: &str, targets: &str) -> Vec<String> {
    vec![
        "defer rows.Close()".to_string(),
        format!("result := make([]{}, 0)", item_type),
        "for rows.Next() {".to_string(),
        format!("    var item {}", item_type),
        format!("    err := rows.Scan({})", targets),
        "    if err != nil {".to_string(),
        "        return nil, err".to_string(),
        "    }".to_string(),
        "    result = append(result, item)".to_string(),
        "}".to_string(),
        "if err := rows.Err(); err != nil {".to_string(),
        "    return nil, err".to_string(),
        "}".to_string(),
        "return result, nil".to_string(),
    ]
}

fn connector_source(connection: &ConnectionInfo) -> SourceFile {
    let connect = Function::new("Connect")
        .with_param(Param::new("connectionUrl", "*string"))
        .with_return("*pgx.Conn")
        .with_return("error")
        .with_lines([
            "if connectionUrl == nil {".to_string(),
            format!(
                "    defaultUrl := {}",
                quote_literal(&connection.connection_string())
            ),
            "    connectionUrl = &defaultUrl".to_string(),
            "}".to_string(),
            format!("conn, err := pgx.Connect({}, *connectionUrl)", CTX),
            "if err != nil {".to_string(),
            "    return nil, fmt.Errorf(\"error connecting to postgres: %w\", err)".to_string(),
            "}".to_string(),
            "return conn, nil".to_string(),
        ]);

    let disconnect = Function::new("Disconnect")
        .with_param(Param::new("connection", CONN_TYPE))
        .with_line(format!("connection.Close({})", CTX));

    SourceFile::new(CONNECTOR_FILE)
        .with_imports(["context", "fmt", PGX_IMPORT])
        .with_function(connect)
        .with_function(disconnect)
}

fn entity_struct(table: &Table) -> Struct {
    table
        .columns
        .iter()
        .fold(Struct::new(table.entity_name()), |entity, column| {
            entity.with_field(
                Field::new(to_pascal_case(&column.name), go_type(&column.data_type))
                    .optional(column.is_nullable)
                    .with_key(&column.name),
            )
        })
}

/// Entity struct plus scan helpers and CRUD functions for one table
fn table_source(table: &Table) -> SourceFile {
    let source = SourceFile::new(&table.name).with_struct(entity_struct(table));
    if table.columns.is_empty() {
        return source;
    }

    let mut functions = vec![scan_row(table), scan_rows(table), select_all(table)];

    if table.has_primary_key() {
        functions.push(select_by_pk(table));
    }
    for column in table.non_primary_key_columns() {
        functions.push(select_by_column(table, column));
    }
    functions.push(insert(table));
    if table.has_primary_key() {
        functions.push(update(table));
        functions.push(delete(table));
    }
    if table.supports_upsert() {
        functions.push(exists(table));
        functions.push(upsert(table));
    }

    file_imports(source.with_functions(functions))
}

fn scan_row(table: &Table) -> Function {
    let entity = table.entity_name();
    Function::new(format!("scan{}", entity))
        .with_param(Param::new("row", "pgx.Row"))
        .with_return(format!("*{}", entity))
        .with_return("error")
        .with_lines([
            format!("var entity {}", entity),
            format!("err := row.Scan({})", scan_targets(table, "entity")),
            "if err != nil {".to_string(),
            "    return nil, err".to_string(),
            "}".to_string(),
            "return &entity, nil".to_string(),
        ])
}

fn scan_rows(table: &Table) -> Function {
    let entity = table.entity_name();
    Function::new(format!("scan{}Rows", entity))
        .with_param(Param::new("rows", "pgx.Rows"))
        .with_return(format!("[]{}", entity))
        .with_return("error")
        .with_lines(collect_rows(&entity, &scan_targets(table, "item")))
}

fn select_sql(table: &Table) -> String {
    let columns: Vec<&Column> = table.columns.iter().collect();
    format!(
        "SELECT {} FROM {}",
        column_list(&columns),
        table.qualified_name()
    )
}

/// Query returning many entities through the rows scanner
fn query_entities(table: &Table, sql: &str, call_args: &str) -> Vec<String> {
    vec![
        format!(
            "rows, err := {}.Query({}, {}{})",
            CONN,
            CTX,
            quote_literal(sql),
            call_args
        ),
        "if err != nil {".to_string(),
        "    return nil, err".to_string(),
        "}".to_string(),
        format!("return scan{}Rows(rows)", table.entity_name()),
    ]
}

fn select_all(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let order = if pk.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", column_list(&pk))
    };
    let sql = format!("{}{} LIMIT $1 OFFSET $2", select_sql(table), order);

    Function::new(format!("{}SelectAll", table.entity_name()))
        .with_param(conn_param())
        .with_param(Param::new("limit", "int"))
        .with_param(Param::new("offset", "int"))
        .with_return(format!("[]{}", table.entity_name()))
        .with_return("error")
        .with_lines(query_entities(table, &sql, ", limit, offset"))
}

fn select_by_pk(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let sql = format!("{} WHERE {}", select_sql(table), conditions(&pk, 1, " AND "));

    Function::new(format!("{}SelectByPK", table.entity_name()))
        .with_param(conn_param())
        .with_params(key_params(&pk))
        .with_return(format!("*{}", table.entity_name()))
        .with_return("error")
        .with_lines([
            format!(
                "row := {}.QueryRow({}, {}{})",
                CONN,
                CTX,
                quote_literal(&sql),
                key_args(&pk)
            ),
            format!("return scan{}(row)", table.entity_name()),
        ])
}

fn select_by_column(table: &Table, column: &Column) -> Function {
    let sql = format!("{} WHERE {} = $1", select_sql(table), column.name);

    Function::new(format!(
        "{}SelectBy{}",
        table.entity_name(),
        to_pascal_case(&column.name)
    ))
    .with_param(conn_param())
    .with_params(key_params(&[column]))
    .with_return(format!("[]{}", table.entity_name()))
    .with_return("error")
    .with_lines(query_entities(table, &sql, &key_args(&[column])))
}

fn insert(table: &Table) -> Function {
    let columns = table.insert_columns();
    let auto = table.auto_increment_columns();

    let values = if columns.is_empty() {
        "DEFAULT VALUES".to_string()
    } else {
        format!(
            "({}) VALUES ({})",
            column_list(&columns),
            placeholders(columns.len())
        )
    };
    let mut sql = format!("INSERT INTO {} {}", table.qualified_name(), values);

    let function = Function::new(format!("{}Insert", table.entity_name()))
        .with_param(conn_param())
        .with_param(Param::new("entity", format!("*{}", table.entity_name())))
        .with_return("error");

    match auto.as_slice() {
        [generated] => {
            sql.push_str(&format!(" RETURNING {}", generated.name));
            function.with_lines([
                format!(
                    "err := {}.QueryRow({}, {}{}).Scan(&entity.{})",
                    CONN,
                    CTX,
                    quote_literal(&sql),
                    entity_args(&columns, "entity"),
                    to_pascal_case(&generated.name)
                ),
                "return err".to_string(),
            ])
        }
        _ => function.with_lines([
            format!(
                "_, err := {}.Exec({}, {}{})",
                CONN,
                CTX,
                quote_literal(&sql),
                entity_args(&columns, "entity")
            ),
            "return err".to_string(),
        ]),
    }
}

fn update(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let columns = table.non_primary_key_columns();

    let function = Function::new(format!("{}Update", table.entity_name()))
        .with_param(conn_param())
        .with_param(Param::new("entity", format!("*{}", table.entity_name())))
        .with_return("error");

    if columns.is_empty() {
        // every column is part of the key
        return function.with_line("return nil");
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table.qualified_name(),
        conditions(&columns, 1, ", "),
        conditions(&pk, columns.len() + 1, " AND ")
    );
    let call_args = format!(
        "{}{}",
        entity_args(&columns, "entity"),
        entity_args(&pk, "entity")
    );

    function.with_lines([
        format!(
            "_, err := {}.Exec({}, {}{})",
            CONN,
            CTX,
            quote_literal(&sql),
            call_args
        ),
        "return err".to_string(),
    ])
}

fn delete(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let sql = format!(
        "DELETE FROM {} WHERE {}",
        table.qualified_name(),
        conditions(&pk, 1, " AND ")
    );

    Function::new(format!("{}Delete", table.entity_name()))
        .with_param(conn_param())
        .with_params(key_params(&pk))
        .with_return("error")
        .with_lines([
            format!(
                "_, err := {}.Exec({}, {}{})",
                CONN,
                CTX,
                quote_literal(&sql),
                key_args(&pk)
            ),
            "return err".to_string(),
        ])
}

fn exists(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {})",
        table.qualified_name(),
        conditions(&pk, 1, " AND ")
    );

    Function::new(format!("{}Exists", table.entity_name()))
        .with_param(conn_param())
        .with_params(key_params(&pk))
        .with_return("bool")
        .with_return("error")
        .with_lines([
            "var exists bool".to_string(),
            format!(
                "err := {}.QueryRow({}, {}{}).Scan(&exists)",
                CONN,
                CTX,
                quote_literal(&sql),
                key_args(&pk)
            ),
            "return exists, err".to_string(),
        ])
}

fn upsert(table: &Table) -> Function {
    let entity = table.entity_name();
    let pk = table.primary_key_columns();

    Function::new(format!("{}Upsert", entity))
        .with_param(conn_param())
        .with_param(Param::new("entity", format!("*{}", entity)))
        .with_return("error")
        .with_lines([
            format!(
                "exists, err := {}Exists({}{})",
                entity,
                CONN,
                entity_args(&pk, "entity")
            ),
            "if err != nil {".to_string(),
            "    return err".to_string(),
            "}".to_string(),
            "if exists {".to_string(),
            format!("    return {}Update({}, entity)", entity, CONN),
            "}".to_string(),
            format!("return {}Insert({}, entity)", entity, CONN),
        ])
}

fn result_struct_name(query: &CustomQuery) -> String {
    format!("{}Result", to_pascal_case(&query.name))
}

fn result_column_type(column: &ResultColumn) -> String {
    let base = go_type(&column.db_type);
    if column.nullable {
        format!("*{}", base)
    } else {
        base
    }
}

fn result_struct(name: String, columns: &[ResultColumn]) -> Struct {
    columns.iter().fold(Struct::new(name), |record, column| {
        record.with_field(
            Field::new(to_pascal_case(&column.name), go_type(&column.db_type))
                .optional(column.nullable)
                .with_key(&column.name),
        )
    })
}

/// Go type of one result value and the fields a row is scanned into
struct ValueScan {
    type_name: String,
    /// Empty when the row is scanned into the variable itself
    fields: Vec<String>,
}

impl ValueScan {
    fn scalar(column: &ResultColumn) -> Self {
        Self {
            type_name: result_column_type(column),
            fields: Vec::new(),
        }
    }

    fn entity(table: &Table) -> Self {
        Self {
            type_name: table.entity_name(),
            fields: table.columns.iter().map(|c| to_pascal_case(&c.name)).collect(),
        }
    }

    fn record(name: String, columns: &[ResultColumn]) -> Self {
        Self {
            type_name: name,
            fields: columns.iter().map(|c| to_pascal_case(&c.name)).collect(),
        }
    }

    /// `&var` or `&var.A, &var.B`
    fn targets(&self, var: &str) -> String {
        if self.fields.is_empty() {
            return format!("&{}", var);
        }
        self.fields
            .iter()
            .map(|f| format!("&{}.{}", var, f))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Struct and function names already declared by the other files of the
/// package
fn package_identifiers(sources: &[SourceFile]) -> HashSet<String> {
    sources
        .iter()
        .flat_map(|source| {
            let structs = source.structs.iter().map(|s| s.name.clone());
            structs.chain(source.functions.iter().map(|f| f.name.clone()))
        })
        .collect()
}

fn claim(
    taken: &mut HashSet<String>,
    query: &CustomQuery,
    identifier: &str,
) -> Result<(), DtoGenError> {
    if taken.insert(identifier.to_string()) {
        return Ok(());
    }
    Err(DtoGenError::CodeGen {
        target: query.name.clone(),
        message: format!("{} is already declared in the package", identifier),
    })
}

/// Every generated identifier is checked against `taken`, since all files
/// share one Go package
fn custom_queries_source(
    input: &GenerationInput,
    taken: &mut HashSet<String>,
) -> Result<SourceFile, DtoGenError> {
    let mut source = SourceFile::new(CUSTOM_QUERIES_FILE);

    for query in input.queries {
        let shape = infer_shape(query, input.metadata)?;
        debug!(query = ?query.name, cardinality = %query.cardinality, "Building Go custom query");

        if let ResultShape::Record(columns) = &shape {
            let name = result_struct_name(query);
            claim(taken, query, &name)?;
            source = source.with_struct(result_struct(name, columns));
        }
        let function = custom_query_function(query, &shape);
        claim(taken, query, &function.name)?;
        source = source.with_function(function);
    }

    Ok(file_imports(source))
}

/// The Go function takes the Pascal-cased query name (`count_users` becomes
/// `CountUsers`); the Python generator keeps the name as declared.
fn custom_query_function(query: &CustomQuery, shape: &ResultShape) -> Function {
    let sql = quote_literal(&query.sql.join("\n"));
    let call_args = args(query.parameters.iter().map(|p| local_name(&p.name)));

    let function = Function::new(to_pascal_case(&query.name))
        .with_param(conn_param())
        .with_params(
            query
                .parameters
                .iter()
                .map(|p| Param::new(local_name(&p.name), &p.type_name)),
        );

    let scan = match shape {
        ResultShape::Nothing => {
            return function.with_return("error").with_lines([
                format!("_, err := {}.Exec({}, {}{})", CONN, CTX, sql, call_args),
                "return err".to_string(),
            ]);
        }
        ResultShape::Scalar(column) => ValueScan::scalar(column),
        ResultShape::Entity(table) => ValueScan::entity(table),
        ResultShape::Record(columns) => ValueScan::record(result_struct_name(query), columns),
    };
    let value_type = scan.type_name.clone();

    match query.cardinality {
        Cardinality::Many => function
            .with_return(format!("[]{}", value_type))
            .with_return("error")
            .with_lines(
                [
                    format!("rows, err := {}.Query({}, {}{})", CONN, CTX, sql, call_args),
                    "if err != nil {".to_string(),
                    "    return nil, err".to_string(),
                    "}".to_string(),
                ]
                .into_iter()
                .chain(collect_rows(&value_type, &scan.targets("item"))),
            ),
        _ => function
            .with_return(value_type.clone())
            .with_return("error")
            .with_lines([
                format!("var result {}", value_type),
                format!(
                    "err := {}.QueryRow({}, {}{}).Scan({})",
                    CONN,
                    CTX,
                    sql,
                    call_args,
                    scan.targets("result")
                ),
                "return result, err".to_string(),
            ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::fixtures;
    use crate::queries::parse_descriptor;

    fn find<'a>(source: &'a SourceFile, name: &str) -> &'a Function {
        source
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("missing function {}", name))
    }

    fn names(source: &SourceFile) -> Vec<&str> {
        source.functions.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_serial_table_functions() {
        let source = table_source(&fixtures::users());

        let entity = &source.structs[0];
        assert_eq!(entity.name, "Users");
        let fields: Vec<_> = entity.fields.iter().map(field_line).collect();
        assert_eq!(
            fields,
            vec![
                "Id int32 `json:\"id\"`",
                "Email string `json:\"email\"`",
                "CreatedAt *time.Time `json:\"created_at\"`",
            ]
        );

        assert_eq!(
            names(&source),
            vec![
                "scanUsers",
                "scanUsersRows",
                "UsersSelectAll",
                "UsersSelectByPK",
                "UsersSelectByEmail",
                "UsersSelectByCreatedAt",
                "UsersInsert",
                "UsersUpdate",
                "UsersDelete",
            ]
        );

        let insert = find(&source, "UsersInsert");
        assert_eq!(
            insert.body[0],
            "err := conn.QueryRow(context.Background(), \"INSERT INTO public.users (email, created_at) VALUES ($1, $2) RETURNING id\", entity.Email, entity.CreatedAt).Scan(&entity.Id)"
        );
        assert_eq!(
            signature(insert),
            "UsersInsert(conn *pgx.Conn, entity *Users) error"
        );

        assert_eq!(source.imports, vec!["context", "time", PGX_IMPORT]);
    }

    #[test]
    fn test_natural_key_table_gets_upsert() {
        let source = table_source(&fixtures::tags());

        assert_eq!(
            names(&source),
            vec![
                "scanTags",
                "scanTagsRows",
                "TagsSelectAll",
                "TagsSelectByPK",
                "TagsInsert",
                "TagsUpdate",
                "TagsDelete",
                "TagsExists",
                "TagsUpsert",
            ]
        );

        // only key columns: nothing to update
        assert_eq!(find(&source, "TagsUpdate").body, vec!["return nil"]);
        assert_eq!(
            signature(find(&source, "TagsExists")),
            "TagsExists(conn *pgx.Conn, name string) (bool, error)"
        );
        assert!(find(&source, "TagsInsert").body[0].contains("conn.Exec("));
        assert_eq!(source.imports, vec!["context", PGX_IMPORT]);
    }

    #[test]
    fn test_table_without_key_has_no_key_functions() {
        let mut table = fixtures::users();
        for column in &mut table.columns {
            column.is_primary_key = false;
        }
        let source = table_source(&table);

        let functions = names(&source);
        assert!(!functions.contains(&"UsersSelectByPK"));
        assert!(!functions.contains(&"UsersUpdate"));
        assert!(!functions.contains(&"UsersDelete"));
        assert!(functions.contains(&"UsersSelectById"));
        assert!(!find(&source, "UsersSelectAll").body[0].contains("ORDER BY"));
    }

    #[test]
    fn test_table_without_columns_is_entity_only() {
        let mut table = fixtures::tags();
        table.columns.clear();
        let source = table_source(&table);

        assert_eq!(source.structs.len(), 1);
        assert!(source.functions.is_empty());
        assert!(source.imports.is_empty());
    }

    #[test]
    fn test_count_query_without_projection() {
        let metadata = fixtures::metadata();
        let connection = fixtures::connection();
        let queries = parse_descriptor(
            "[query]\nname=count_users\ncardinality=1\nsql=\nSELECT count(*) FROM users\nEND\n",
        )
        .unwrap();
        let input = GenerationInput {
            package: "shop",
            connection: &connection,
            metadata: &metadata,
            queries: &queries,
        };

        let source = custom_queries_source(&input, &mut HashSet::new()).unwrap();
        let function = find(&source, "CountUsers");
        assert_eq!(
            signature(function),
            "CountUsers(conn *pgx.Conn) (int64, error)"
        );
        assert_eq!(
            function.body,
            vec![
                "var result int64",
                "err := conn.QueryRow(context.Background(), \"SELECT count(*) FROM users\").Scan(&result)",
                "return result, err",
            ]
        );
    }

    #[test]
    fn test_record_query_with_parameters() {
        let metadata = fixtures::metadata();
        let connection = fixtures::connection();
        let queries = parse_descriptor(
            "[query]\nname=recent_users\ncardinality=N\nprojection=\nusers.email\nlast_seen timestamp with time zone NULL\nEND\nparameters=\nsince time.Time\nEND\nsql=\nSELECT email, max(seen) AS last_seen\nFROM users WHERE created_at > $1\nGROUP BY email\nEND\n",
        )
        .unwrap();
        let input = GenerationInput {
            package: "shop",
            connection: &connection,
            metadata: &metadata,
            queries: &queries,
        };

        let source = custom_queries_source(&input, &mut HashSet::new()).unwrap();
        assert_eq!(source.structs[0].name, "RecentUsersResult");
        assert_eq!(
            source.structs[0].fields.iter().map(field_line).collect::<Vec<_>>(),
            vec![
                "Email string `json:\"email\"`",
                "LastSeen *time.Time `json:\"last_seen\"`",
            ]
        );

        let function = find(&source, "RecentUsers");
        assert_eq!(
            signature(function),
            "RecentUsers(conn *pgx.Conn, since time.Time) ([]RecentUsersResult, error)"
        );
        assert!(function.body[0].contains("\\nFROM users WHERE created_at > $1\\n"));
        assert!(function.body[0].ends_with(", since)"));
        assert!(function
            .body
            .contains(&"    err := rows.Scan(&item.Email, &item.LastSeen)".to_string()));
        assert_eq!(source.imports, vec!["context", "time", PGX_IMPORT]);
    }

    #[test]
    fn test_exec_query_returns_error_only() {
        let metadata = fixtures::metadata();
        let connection = fixtures::connection();
        let queries = parse_descriptor(
            "[query]\nname=purge_tags\ncardinality=0\nsql=\nDELETE FROM tags\nEND\n",
        )
        .unwrap();
        let input = GenerationInput {
            package: "shop",
            connection: &connection,
            metadata: &metadata,
            queries: &queries,
        };

        let source = custom_queries_source(&input, &mut HashSet::new()).unwrap();
        let function = find(&source, "PurgeTags");
        assert_eq!(signature(function), "PurgeTags(conn *pgx.Conn) error");
        assert_eq!(function.body[1], "return err");
    }

    #[test]
    fn test_render_table_file() {
        let generator = GoGenerator::new();
        let text = generator.render("shop", &table_source(&fixtures::tags())).unwrap();

        assert!(text.starts_with("package shop\n\nimport (\n    \"context\"\n    \"github.com/jackc/pgx/v5\"\n)\n"));
        assert!(text.contains("\ntype Tags struct {\n    Name string `json:\"name\"`\n}\n"));
        assert!(text.contains("\nfunc TagsDelete(conn *pgx.Conn, name string) error {\n"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_render_keeps_column_order() {
        let text = GoGenerator::new()
            .render("shop", &table_source(&fixtures::users()))
            .unwrap();

        let start = text.find("type Users struct {\n").unwrap();
        let body = &text[start..];
        let end = body.find("\n}\n").unwrap();
        let tags: Vec<&str> = body[..end]
            .lines()
            .skip(1)
            .filter_map(|line| line.split("`json:\"").nth(1))
            .map(|tag| tag.trim_end_matches("\"`"))
            .collect();

        assert_eq!(tags, vec!["id", "email", "created_at"]);
    }

    #[test]
    fn test_query_name_clashing_with_table_function_fails() {
        let metadata = fixtures::metadata();
        let connection = fixtures::connection();
        let queries = parse_descriptor(
            "[query]\nname=users_select_all\ncardinality=N\nprojection=\nusers.*\nEND\nsql=\nSELECT * FROM users\nEND\n",
        )
        .unwrap();
        let input = GenerationInput {
            package: "shop",
            connection: &connection,
            metadata: &metadata,
            queries: &queries,
        };

        let err = GoGenerator::new().build_sources(&input).unwrap_err();
        match err {
            DtoGenError::CodeGen { target, message } => {
                assert_eq!(target, "users_select_all");
                assert!(message.contains("UsersSelectAll"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_query_names_clashing_after_pascal_case_fail() {
        let metadata = fixtures::metadata();
        let connection = fixtures::connection();
        let queries = parse_descriptor(
            "[query]\nname=purge_tags\ncardinality=0\nsql=\nDELETE FROM tags\nEND\n[query]\nname=purgeTags\ncardinality=0\nsql=\nDELETE FROM tags\nEND\n",
        )
        .unwrap();
        let input = GenerationInput {
            package: "shop",
            connection: &connection,
            metadata: &metadata,
            queries: &queries,
        };

        let mut taken = HashSet::new();
        let err = custom_queries_source(&input, &mut taken).unwrap_err();
        assert!(err.to_string().contains("PurgeTags"), "{}", err);
    }

    #[test]
    fn test_connector_embeds_configured_connection() {
        let source = connector_source(&fixtures::connection());
        assert_eq!(source.imports, vec!["context", "fmt", PGX_IMPORT]);

        let connect = find(&source, "Connect");
        assert_eq!(
            signature(connect),
            "Connect(connectionUrl *string) (*pgx.Conn, error)"
        );
        assert!(connect.body[1].contains("host=localhost port=5432"));
        assert_eq!(
            signature(find(&source, "Disconnect")),
            "Disconnect(connection *pgx.Conn)"
        );
    }
}
