//! Custom query descriptor
//!
//! Users hand-write parameterized queries in `custom_queries.conf`:
//!
//! ```text
//! [query]
//! name=active_users_by_role
//! cardinality=N
//! projection=
//! users.*
//! role_name text NULL
//! END
//! parameters=
//! role string
//! END
//! sql=
//! SELECT u.*, r.name FROM users u LEFT JOIN roles r ON r.id = u.role_id
//! WHERE r.name = $1
//! END
//! ```
//!
//! The parser is strict: any line it does not understand fails the whole
//! file.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, info, trace};

use crate::error::DtoGenError;

/// Descriptor file looked up inside the target directory
pub const DESCRIPTOR_FILE: &str = "custom_queries.conf";

const QUERY_HEADER: &str = "[query]";
const SECTION_END: &str = "END";
const NULL_MARKER: &str = "NULL";

/// Expected number of result rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// `0`: statement only, no rows read
    None,
    /// `1`: exactly one row
    One,
    /// `N`: zero or more rows
    Many,
}

impl Cardinality {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Cardinality::None),
            "1" => Some(Cardinality::One),
            "N" => Some(Cardinality::Many),
            _ => None,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::None => write!(f, "0"),
            Cardinality::One => write!(f, "1"),
            Cardinality::Many => write!(f, "N"),
        }
    }
}

/// Column selector of a table reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    /// `table.*`
    All,
    /// `table.column`
    Named(String),
}

/// One column of a custom query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionColumn {
    /// Column(s) of a table known to the metadata
    Reference {
        table: String,
        column: ColumnSelector,
        nullable: bool,
    },
    /// Column computed by the query itself
    Computed {
        name: String,
        sql_type: String,
        nullable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameter {
    pub name: String,
    /// Target-language type, used verbatim
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomQuery {
    pub name: String,
    pub cardinality: Cardinality,
    pub projection: Vec<ProjectionColumn>,
    pub parameters: Vec<QueryParameter>,
    /// Raw SQL lines, untouched
    pub sql: Vec<String>,
}

/// Read and parse the descriptor file of a target directory
///
/// A missing file is not an error and yields no queries.
pub fn load_custom_queries(dir: &Path) -> Result<Vec<CustomQuery>, DtoGenError> {
    let path = dir.join(DESCRIPTOR_FILE);
    if !path.exists() {
        info!(path = ?path, "No custom query descriptor found");
        return Ok(Vec::new());
    }

    debug!(path = ?path, "Reading custom query descriptor");
    let text = fs::read_to_string(&path)?;
    let queries = parse_descriptor(&text)?;

    info!(count = ?queries.len(), "Parsed custom queries");
    Ok(queries)
}

/// Parse the full text of a descriptor file
pub fn parse_descriptor(text: &str) -> Result<Vec<CustomQuery>, DtoGenError> {
    let mut queries: Vec<CustomQuery> = Vec::new();

    for (index, chunk) in split_chunks(text).iter().enumerate() {
        let chunk_number = index + 1;
        let query = parse_chunk(chunk_number, chunk)?;

        if queries.iter().any(|q| q.name == query.name) {
            return Err(DtoGenError::Descriptor {
                chunk: chunk_number,
                message: format!("duplicate query name: {}", query.name),
            });
        }

        trace!(query = ?query.name, cardinality = %query.cardinality, "Parsed custom query");
        queries.push(query);
    }

    Ok(queries)
}

/// Split a descriptor into per-query chunks
///
/// Blank lines are dropped first. Each `[query]` line starts a new chunk,
/// indented or not; chunks that hold nothing besides their header are
/// dropped.
fn split_chunks(text: &str) -> Vec<Vec<&str>> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        if is_header(line) {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(line);
    }
    chunks.push(current);

    chunks
        .into_iter()
        .filter(|chunk| chunk.iter().any(|line| !is_header(line)))
        .collect()
}

fn is_header(line: &str) -> bool {
    line.trim().starts_with(QUERY_HEADER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Top,
    Projection,
    Parameters,
    Sql,
}

impl ParserState {
    fn section(&self) -> &'static str {
        match self {
            ParserState::Top => "top level",
            ParserState::Projection => "projection",
            ParserState::Parameters => "parameters",
            ParserState::Sql => "sql",
        }
    }
}

fn parse_chunk(chunk: usize, lines: &[&str]) -> Result<CustomQuery, DtoGenError> {
    let fail = |message: String| DtoGenError::Descriptor { chunk, message };

    let mut name: Option<String> = None;
    let mut cardinality: Option<Cardinality> = None;
    let mut projection = Vec::new();
    let mut parameters = Vec::new();
    let mut sql = Vec::new();

    let mut seen: Vec<&str> = Vec::new();
    let mut first_use = |directive: &'static str| -> Result<(), DtoGenError> {
        if seen.contains(&directive) {
            return Err(fail(format!("duplicate directive: {}", directive)));
        }
        seen.push(directive);
        Ok(())
    };

    let mut state = ParserState::Top;
    for &line in lines {
        let trimmed = line.trim();

        if state != ParserState::Top && trimmed == SECTION_END {
            state = ParserState::Top;
            continue;
        }

        match state {
            ParserState::Top => {
                if trimmed.starts_with(QUERY_HEADER) {
                    continue;
                } else if let Some(value) = trimmed.strip_prefix("name=") {
                    first_use("name=")?;
                    name = Some(value.to_string());
                } else if let Some(value) = trimmed.strip_prefix("cardinality=") {
                    first_use("cardinality=")?;
                    let parsed = Cardinality::parse(value)
                        .ok_or_else(|| fail(format!("invalid cardinality value: {}", value)))?;
                    cardinality = Some(parsed);
                } else if trimmed.starts_with("projection=") {
                    first_use("projection=")?;
                    state = ParserState::Projection;
                } else if trimmed.starts_with("parameters=") {
                    first_use("parameters=")?;
                    state = ParserState::Parameters;
                } else if trimmed.starts_with("sql=") {
                    first_use("sql=")?;
                    state = ParserState::Sql;
                } else {
                    return Err(fail(format!("unexpected line: {}", line)));
                }
            }
            ParserState::Projection => {
                let column = parse_projection_column(trimmed)
                    .ok_or_else(|| fail(format!("invalid projection column: {}", line)))?;
                projection.push(column);
            }
            ParserState::Parameters => {
                let parameter = parse_parameter(trimmed)
                    .ok_or_else(|| fail(format!("invalid parameter value: {}", line)))?;
                parameters.push(parameter);
            }
            ParserState::Sql => sql.push(line.to_string()),
        }
    }

    if state != ParserState::Top {
        return Err(fail(format!(
            "{} section is missing its {} line",
            state.section(),
            SECTION_END
        )));
    }

    let name = match name {
        Some(name) if !name.is_empty() => name,
        _ => return Err(fail("query has no name".to_string())),
    };
    let cardinality = cardinality
        .ok_or_else(|| fail(format!("query {} has no cardinality", name)))?;

    Ok(CustomQuery {
        name,
        cardinality,
        projection,
        parameters,
        sql,
    })
}

/// `table.column`, `table.*` or `name type`, each with an optional
/// trailing `NULL`
fn parse_projection_column(line: &str) -> Option<ProjectionColumn> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();

    let nullable = tokens.len() > 1 && tokens.last() == Some(&NULL_MARKER);
    if nullable {
        tokens.pop();
    }

    match tokens.as_slice() {
        [] => None,
        [reference] => {
            let (table, column) = reference.split_once('.')?;
            if table.is_empty() || column.is_empty() {
                return None;
            }
            let column = match column {
                "*" => ColumnSelector::All,
                named => ColumnSelector::Named(named.to_string()),
            };
            Some(ProjectionColumn::Reference {
                table: table.to_string(),
                column,
                nullable,
            })
        }
        [name, sql_type @ ..] => Some(ProjectionColumn::Computed {
            name: name.to_string(),
            sql_type: sql_type.join(" "),
            nullable,
        }),
    }
}

fn parse_parameter(line: &str) -> Option<QueryParameter> {
    let (name, type_name) = line.split_once(char::is_whitespace)?;
    let type_name = type_name.trim();
    if type_name.is_empty() {
        return None;
    }
    Some(QueryParameter {
        name: name.to_string(),
        type_name: type_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNT_USERS: &str = "[query]\nname=count_users\ncardinality=1\nsql=\nSELECT count(*) FROM users\nEND\n";

    fn descriptor_error(text: &str) -> (usize, String) {
        match parse_descriptor(text).unwrap_err() {
            DtoGenError::Descriptor { chunk, message } => (chunk, message),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_count_users() {
        let queries = parse_descriptor(COUNT_USERS).unwrap();

        assert_eq!(queries.len(), 1);
        let query = &queries[0];
        assert_eq!(query.name, "count_users");
        assert_eq!(query.cardinality, Cardinality::One);
        assert!(query.projection.is_empty());
        assert!(query.parameters.is_empty());
        assert_eq!(query.sql, vec!["SELECT count(*) FROM users"]);
    }

    #[test]
    fn test_parse_full_query() {
        let text = "\
[query]
name=orders_for_user
cardinality=N
projection=
    orders.*
    users.email
    item_count bigint
    shipped_at timestamp with time zone NULL
    users.nickname NULL
END
parameters=
    user_id int32
    type string
END
sql=
SELECT o.*, u.email, count(i.id), max(s.at), u.nickname
  FROM orders o
  WHERE o.user_id = $1 AND o.kind = $2
END
";
        let queries = parse_descriptor(text).unwrap();
        let query = &queries[0];

        assert_eq!(query.cardinality, Cardinality::Many);
        assert_eq!(
            query.projection,
            vec![
                ProjectionColumn::Reference {
                    table: "orders".to_string(),
                    column: ColumnSelector::All,
                    nullable: false,
                },
                ProjectionColumn::Reference {
                    table: "users".to_string(),
                    column: ColumnSelector::Named("email".to_string()),
                    nullable: false,
                },
                ProjectionColumn::Computed {
                    name: "item_count".to_string(),
                    sql_type: "bigint".to_string(),
                    nullable: false,
                },
                ProjectionColumn::Computed {
                    name: "shipped_at".to_string(),
                    sql_type: "timestamp with time zone".to_string(),
                    nullable: true,
                },
                ProjectionColumn::Reference {
                    table: "users".to_string(),
                    column: ColumnSelector::Named("nickname".to_string()),
                    nullable: true,
                },
            ]
        );
        assert_eq!(
            query.parameters,
            vec![
                QueryParameter {
                    name: "user_id".to_string(),
                    type_name: "int32".to_string(),
                },
                QueryParameter {
                    name: "type".to_string(),
                    type_name: "string".to_string(),
                },
            ]
        );
        // sql lines keep their indentation
        assert_eq!(query.sql[1], "  FROM orders o");
    }

    #[test]
    fn test_invalid_cardinality_names_value() {
        let (chunk, message) = descriptor_error("[query]\nname=q\ncardinality=many\n");
        assert_eq!(chunk, 1);
        assert!(message.contains("many"), "{}", message);
    }

    #[test]
    fn test_stray_line_in_top_state_fails() {
        let text = format!("{}[query]\nname=other\ncardinality=0\nthis is not a directive\n", COUNT_USERS);
        let (chunk, message) = descriptor_error(&text);
        assert_eq!(chunk, 2);
        assert!(message.contains("this is not a directive"), "{}", message);
    }

    #[test]
    fn test_blank_lines_and_empty_chunks_are_dropped() {
        let text = format!("[query]\n\n   \n[query]\n\n{}\n\n[query]\n", COUNT_USERS);
        let queries = parse_descriptor(&text).unwrap();
        assert_eq!(queries.len(), 1);
    }

    #[test]
    fn test_end_is_trimmed_but_sql_is_not() {
        let text = "[query]\nname=q\ncardinality=0\nsql=\n\tDELETE FROM sessions   \n   END   \n";
        let queries = parse_descriptor(text).unwrap();
        assert_eq!(queries[0].sql, vec!["\tDELETE FROM sessions   "]);
    }

    #[test]
    fn test_indented_header_starts_a_new_query() {
        let text = "[query]\nname=a\ncardinality=0\nsql=\nDELETE FROM a\nEND\n  [query]\nname=b\ncardinality=0\nsql=\nDELETE FROM b\nEND\n";
        let queries = parse_descriptor(text).unwrap();

        let names: Vec<&str> = queries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_repeated_directive_fails() {
        let (chunk, message) = descriptor_error("[query]\nname=a\nname=b\ncardinality=0\n");
        assert_eq!(chunk, 1);
        assert!(message.contains("duplicate directive: name="), "{}", message);

        let (_, message) = descriptor_error("[query]\nname=a\ncardinality=0\ncardinality=1\n");
        assert!(message.contains("duplicate directive: cardinality="), "{}", message);
    }

    #[test]
    fn test_reopened_section_fails() {
        let text = "[query]\nname=q\ncardinality=0\nsql=\nDELETE FROM a\nEND\nsql=\nDELETE FROM b\nEND\n";
        let (_, message) = descriptor_error(text);
        assert!(message.contains("duplicate directive: sql="), "{}", message);

        let text = "[query]\nname=q\ncardinality=1\nprojection=\nusers.id\nEND\nprojection=\nusers.email\nEND\n";
        let (_, message) = descriptor_error(text);
        assert!(message.contains("duplicate directive: projection="), "{}", message);
    }

    #[test]
    fn test_unterminated_section_fails() {
        let (_, message) = descriptor_error("[query]\nname=q\ncardinality=0\nsql=\nDELETE FROM sessions\n");
        assert!(message.contains("sql"), "{}", message);
    }

    #[test]
    fn test_missing_name_or_cardinality_fails() {
        let (_, message) = descriptor_error("[query]\ncardinality=0\n");
        assert!(message.contains("no name"));

        let (_, message) = descriptor_error("[query]\nname=q\n");
        assert!(message.contains("cardinality"));
    }

    #[test]
    fn test_duplicate_names_fail() {
        let text = format!("{}{}", COUNT_USERS, COUNT_USERS);
        let (chunk, message) = descriptor_error(&text);
        assert_eq!(chunk, 2);
        assert!(message.contains("count_users"));
    }

    #[test]
    fn test_invalid_projection_and_parameter_lines() {
        let (_, message) = descriptor_error("[query]\nname=q\ncardinality=1\nprojection=\nusers\nEND\n");
        assert!(message.contains("invalid projection column: users"));

        let (_, message) = descriptor_error("[query]\nname=q\ncardinality=1\nparameters=\nuser_id\nEND\n");
        assert!(message.contains("invalid parameter value: user_id"));
    }

    #[test]
    fn test_null_marker_needs_its_own_token() {
        assert_eq!(
            parse_projection_column("NULLABLE_FLAG boolean"),
            Some(ProjectionColumn::Computed {
                name: "NULLABLE_FLAG".to_string(),
                sql_type: "boolean".to_string(),
                nullable: false,
            })
        );
        assert_eq!(parse_projection_column("NULL"), None);
    }

    #[test]
    fn test_missing_descriptor_yields_no_queries() {
        let dir = tempfile::tempdir().unwrap();
        let queries = load_custom_queries(dir.path()).unwrap();
        assert!(queries.is_empty());
    }
}
