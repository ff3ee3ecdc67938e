//! Python code generator
//!
//! Generates `@dataclass` entities and psycopg2 data access functions. Write
//! functions leave transaction control to the caller.

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
use crate::schema::{to_pascal_case, Column, Table};
use crate::types::python_type;

const INIT_FILE: &str = "__init__";
const CONN: &str = "conn";
const CONN_TYPE: &str = "connection";
const DEFAULT_PAGE_SIZE: &str = "100";

/// Python code generator
pub struct PythonGenerator {
    env: Environment<'static>,
}

impl PythonGenerator {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        env.add_template("python_source", include_str!("templates/source.py.jinja"))
            .expect("Failed to load python source template");

        Self { env }
    }
}

impl Default for PythonGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for PythonGenerator {
    fn extension(&self) -> &'static str {
        "py"
    }

    fn build_sources(&self, input: &GenerationInput) -> Result<Vec<SourceFile>, DtoGenError> {
        info!(
            package = ?input.package,
            tables = ?input.metadata.tables.len(),
            queries = ?input.queries.len(),
            "Building Python sources"
        );

        let mut sources = vec![
            SourceFile::new(INIT_FILE),
            connector_source(input.connection),
        ];

        for table in &input.metadata.tables {
            debug!(schema = ?table.schema, table = ?table.name, "Building Python table module");
            sources.push(table_source(table));
        }

        if !input.queries.is_empty() {
            sources.push(custom_queries_source(input)?);
        }

        Ok(sources)
    }

    fn render(&self, _package: &str, source: &SourceFile) -> Result<String, DtoGenError> {
        let template = self
            .env
            .get_template("python_source")
            .map_err(|e| DtoGenError::CodeGen {
                target: source.name.clone(),
                message: format!("Template error: {}", e),
            })?;

        let ctx = minijinja::context! {
            imports => &source.imports,
            classes => source.structs.iter().map(|s| {
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

/// `name: Optional[T]`
fn field_line(field: &Field) -> String {
    if field.optional {
        format!("{}: Optional[{}]", field.name, field.type_name)
    } else {
        format!("{}: {}", field.name, field.type_name)
    }
}

/// `name(a: T, b: U = d) -> R`
fn signature(function: &Function) -> String {
    let params = function
        .params
        .iter()
        .map(|p| match &p.default {
            Some(default) => format!("{}: {} = {}", p.name, p.type_name, default),
            None => format!("{}: {}", p.name, p.type_name),
        })
        .collect::<Vec<_>>()
        .join(", ");

    // Python functions hand back at most one value
    let returns = function
        .returns
        .first()
        .map_or("None", |r| r.type_name.as_str());

    format!("{}({}) -> {}", function.name, params, returns)
}

/// Standard imports of a data access module, ahead of any local imports
fn module_imports(mut source: SourceFile) -> SourceFile {
    let needs_datetime = source.referenced_types().any(|t| t.contains("datetime."));
    let needs_decimal = source.referenced_types().any(|t| t.contains("Decimal"));

    let imports = needs_datetime
        .then_some("import datetime")
        .into_iter()
        .chain(["from dataclasses import dataclass"])
        .chain(needs_decimal.then_some("from decimal import Decimal"))
        .chain([
            "from typing import List, Optional",
            "from psycopg2.extensions import connection",
        ]);

    let local = std::mem::take(&mut source.imports);
    source.with_imports(imports).with_imports(local)
}

/// Parameter name for a column or declared parameter
fn local(name: &str) -> String {
    if name == "type" {
        "type1".to_string()
    } else {
        name.to_string()
    }
}

fn column_type(column: &Column) -> String {
    let base = python_type(&column.data_type);
    if column.is_nullable {
        format!("Optional[{}]", base)
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

/// `a = %s AND b = %s`
fn conditions(columns: &[&Column], separator: &str) -> String {
    columns
        .iter()
        .map(|c| format!("{} = %s", c.name))
        .collect::<Vec<_>>()
        .join(separator)
}

fn placeholders(count: usize) -> String {
    vec!["%s"; count].join(", ")
}

/// `cursor.execute(sql, (a, b))`; the argument tuple is omitted when empty
fn execute(sql: &str, args: &[String]) -> String {
    match args {
        [] => format!("cursor.execute({})", sql),
        [single] => format!("cursor.execute({}, ({},))", sql, single),
        many => format!("cursor.execute({}, ({}))", sql, many.join(", ")),
    }
}

/// Body wrapped in a cursor context
fn with_cursor(lines: impl IntoIterator<Item = String>) -> Vec<String> {
    std::iter::once("with conn.cursor() as cursor:".to_string())
        .chain(lines.into_iter().map(|line| format!("    {}", line)))
        .collect()
}

fn key_params(columns: &[&Column]) -> Vec<Param> {
    columns
        .iter()
        .map(|c| Param::new(local(&c.name), column_type(c)))
        .collect()
}

fn key_args(columns: &[&Column]) -> Vec<String> {
    columns.iter().map(|c| local(&c.name)).collect()
}

fn entity_args(columns: &[&Column]) -> Vec<String> {
    columns.iter().map(|c| format!("entity.{}", c.name)).collect()
}

fn conn_param() -> Param {
    Param::new(CONN, CONN_TYPE)
}

fn from_row_name(table: &Table) -> String {
    format!("_{}_from_row", table.name)
}

fn from_rows_name(table: &Table) -> String {
    format!("_{}_from_rows", table.name)
}

/// `Name(a=row[0], b=row[1])`
fn construct(type_name: &str, fields: &[&str]) -> String {
    let args = fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}=row[{}]", f, i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}({})", type_name, args)
}

fn connector_source(connection: &ConnectionInfo) -> SourceFile {
    let connect = Function::new("connect")
        .with_param(
            Param::new("db_config", "Optional[Dict[str, Union[str, int]]]").with_default("None"),
        )
        .with_return(CONN_TYPE)
        .with_lines([
            "if db_config is None:".to_string(),
            "    db_config = {".to_string(),
            format!("        \"dbname\": {},", quote_literal(&connection.database)),
            format!("        \"user\": {},", quote_literal(&connection.username)),
            format!("        \"password\": {},", quote_literal(&connection.password)),
            format!("        \"host\": {},", quote_literal(&connection.host)),
            format!("        \"port\": {},", connection.port),
            "    }".to_string(),
            "return psycopg2.connect(**db_config)".to_string(),
        ]);

    let disconnect = Function::new("disconnect")
        .with_param(conn_param())
        .with_line("conn.close()");

    SourceFile::new(CONNECTOR_FILE)
        .with_imports([
            "from typing import Dict, Optional, Union",
            "import psycopg2",
            "from psycopg2.extensions import connection",
        ])
        .with_function(connect)
        .with_function(disconnect)
}

fn entity_struct(table: &Table) -> Struct {
    table
        .columns
        .iter()
        .fold(Struct::new(table.entity_name()), |entity, column| {
            entity.with_field(
                Field::new(&column.name, python_type(&column.data_type))
                    .optional(column.is_nullable),
            )
        })
}

/// Dataclass plus row converters and CRUD functions for one table
fn table_source(table: &Table) -> SourceFile {
    let source = SourceFile::new(&table.name).with_struct(entity_struct(table));
    if table.columns.is_empty() {
        return source.with_import("from dataclasses import dataclass");
    }

    let mut functions = vec![from_row(table), from_rows(table), select_all(table)];

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

    module_imports(source.with_functions(functions))
}

fn from_row(table: &Table) -> Function {
    let fields: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    Function::new(from_row_name(table))
        .with_param(Param::new("row", "tuple"))
        .with_return(table.entity_name())
        .with_line(format!("return {}", construct(&table.entity_name(), &fields)))
}

fn from_rows(table: &Table) -> Function {
    Function::new(from_rows_name(table))
        .with_param(Param::new("rows", "List[tuple]"))
        .with_return(format!("List[{}]", table.entity_name()))
        .with_line(format!("return [{}(row) for row in rows]", from_row_name(table)))
}

fn select_sql(table: &Table) -> String {
    let columns: Vec<&Column> = table.columns.iter().collect();
    format!(
        "SELECT {} FROM {}",
        column_list(&columns),
        table.qualified_name()
    )
}

fn fetch_all(table: &Table, sql: &str, args: &[String]) -> Vec<String> {
    with_cursor([
        execute(&quote_literal(sql), args),
        format!("return {}(cursor.fetchall())", from_rows_name(table)),
    ])
}

fn select_all(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let order = if pk.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", column_list(&pk))
    };
    let sql = format!("{}{} LIMIT %s OFFSET %s", select_sql(table), order);

    Function::new(format!("{}_select_all", table.name))
        .with_param(conn_param())
        .with_param(Param::new("limit", "int").with_default(DEFAULT_PAGE_SIZE))
        .with_param(Param::new("offset", "int").with_default("0"))
        .with_return(format!("List[{}]", table.entity_name()))
        .with_lines(fetch_all(
            table,
            &sql,
            &["limit".to_string(), "offset".to_string()],
        ))
}

fn select_by_pk(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let sql = format!("{} WHERE {}", select_sql(table), conditions(&pk, " AND "));

    Function::new(format!("{}_select_by_pk", table.name))
        .with_param(conn_param())
        .with_params(key_params(&pk))
        .with_return(format!("Optional[{}]", table.entity_name()))
        .with_lines(with_cursor([
            execute(&quote_literal(&sql), &key_args(&pk)),
            "row = cursor.fetchone()".to_string(),
            format!(
                "return {}(row) if row is not None else None",
                from_row_name(table)
            ),
        ]))
}

fn select_by_column(table: &Table, column: &Column) -> Function {
    let sql = format!("{} WHERE {} = %s", select_sql(table), column.name);

    Function::new(format!("{}_select_by_{}", table.name, column.name))
        .with_param(conn_param())
        .with_params(key_params(&[column]))
        .with_return(format!("List[{}]", table.entity_name()))
        .with_lines(fetch_all(table, &sql, &key_args(&[column])))
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

    let function = Function::new(format!("{}_insert", table.name))
        .with_param(conn_param())
        .with_param(Param::new("entity", table.entity_name()));

    match auto.as_slice() {
        [generated] => {
            sql.push_str(&format!(" RETURNING {}", generated.name));
            function.with_lines(with_cursor([
                execute(&quote_literal(&sql), &entity_args(&columns)),
                format!("entity.{} = cursor.fetchone()[0]", generated.name),
            ]))
        }
        _ => function.with_lines(with_cursor([execute(
            &quote_literal(&sql),
            &entity_args(&columns),
        )])),
    }
}

fn update(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let columns = table.non_primary_key_columns();

    let function = Function::new(format!("{}_update", table.name))
        .with_param(conn_param())
        .with_param(Param::new("entity", table.entity_name()));

    if columns.is_empty() {
        // every column is part of the key
        return function;
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table.qualified_name(),
        conditions(&columns, ", "),
        conditions(&pk, " AND ")
    );
    let args: Vec<String> = entity_args(&columns)
        .into_iter()
        .chain(entity_args(&pk))
        .collect();

    function.with_lines(with_cursor([execute(&quote_literal(&sql), &args)]))
}

fn delete(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let sql = format!(
        "DELETE FROM {} WHERE {}",
        table.qualified_name(),
        conditions(&pk, " AND ")
    );

    Function::new(format!("{}_delete", table.name))
        .with_param(conn_param())
        .with_params(key_params(&pk))
        .with_lines(with_cursor([execute(&quote_literal(&sql), &key_args(&pk))]))
}

fn exists(table: &Table) -> Function {
    let pk = table.primary_key_columns();
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {})",
        table.qualified_name(),
        conditions(&pk, " AND ")
    );

    Function::new(format!("{}_exists", table.name))
        .with_param(conn_param())
        .with_params(key_params(&pk))
        .with_return("bool")
        .with_lines(with_cursor([
            execute(&quote_literal(&sql), &key_args(&pk)),
            "return cursor.fetchone()[0]".to_string(),
        ]))
}

fn upsert(table: &Table) -> Function {
    let pk = table.primary_key_columns();

    Function::new(format!("{}_upsert", table.name))
        .with_param(conn_param())
        .with_param(Param::new("entity", table.entity_name()))
        .with_lines([
            format!(
                "if {}_exists({}, {}):",
                table.name,
                CONN,
                entity_args(&pk).join(", ")
            ),
            format!("    {}_update({}, entity)", table.name, CONN),
            "else:".to_string(),
            format!("    {}_insert({}, entity)", table.name, CONN),
        ])
}

fn result_class_name(query: &CustomQuery) -> String {
    format!("{}Result", to_pascal_case(&query.name))
}

fn result_class(name: String, columns: &[ResultColumn]) -> Struct {
    columns.iter().fold(Struct::new(name), |record, column| {
        record.with_field(
            Field::new(&column.name, python_type(&column.db_type)).optional(column.nullable),
        )
    })
}

/// Python type of one result value and the expression building it from `row`
struct RowValue {
    type_name: String,
    expression: String,
}

impl RowValue {
    fn of(query: &CustomQuery, shape: &ResultShape) -> Option<Self> {
        let value = match shape {
            ResultShape::Nothing => return None,
            ResultShape::Scalar(column) => {
                let base = python_type(&column.db_type);
                Self {
                    type_name: if column.nullable {
                        format!("Optional[{}]", base)
                    } else {
                        base
                    },
                    expression: "row[0]".to_string(),
                }
            }
            ResultShape::Entity(table) => Self {
                type_name: table.entity_name(),
                expression: format!("{}(row)", from_row_name(table)),
            },
            ResultShape::Record(columns) => {
                let name = result_class_name(query);
                let fields: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
                Self {
                    expression: construct(&name, &fields),
                    type_name: name,
                }
            }
        };
        Some(value)
    }
}

fn custom_queries_source(input: &GenerationInput) -> Result<SourceFile, DtoGenError> {
    let mut source = SourceFile::new(CUSTOM_QUERIES_FILE);

    for query in input.queries {
        let shape = infer_shape(query, input.metadata)?;
        debug!(query = ?query.name, cardinality = %query.cardinality, "Building Python custom query");

        match &shape {
            ResultShape::Record(columns) => {
                source = source.with_struct(result_class(result_class_name(query), columns));
            }
            ResultShape::Entity(table) => {
                source = source.with_import(format!(
                    "from .{} import {}, {}",
                    table.name,
                    table.entity_name(),
                    from_row_name(table)
                ));
            }
            _ => {}
        }
        source = source.with_function(custom_query_function(query, &shape));
    }

    Ok(module_imports(source))
}

fn custom_query_function(query: &CustomQuery, shape: &ResultShape) -> Function {
    let sql = quote_literal(&query.sql.join("\n"));
    let args: Vec<String> = query.parameters.iter().map(|p| local(&p.name)).collect();
    let call = execute(&sql, &args);

    let function = Function::new(&query.name).with_param(conn_param()).with_params(
        query
            .parameters
            .iter()
            .map(|p| Param::new(local(&p.name), &p.type_name)),
    );

    let Some(value) = RowValue::of(query, shape) else {
        return function.with_lines(with_cursor([call]));
    };

    match query.cardinality {
        Cardinality::Many => function
            .with_return(format!("List[{}]", value.type_name))
            .with_lines(with_cursor([
                call,
                format!(
                    "return [{} for row in cursor.fetchall()]",
                    value.expression
                ),
            ])),
        _ => function.with_return(value.type_name).with_lines(with_cursor([
            call,
            "row = cursor.fetchone()".to_string(),
            "if row is None:".to_string(),
            format!(
                "    raise LookupError({})",
                quote_literal(&format!("{} returned no row", query.name))
            ),
            format!("return {}", value.expression),
        ])),
    }
}
