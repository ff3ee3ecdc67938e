//! Code generation
//!
//! This module turns the resolved metadata and the parsed custom queries into
//! source files. Each target language is an emitter implementing
//! [`CodeGenerator`]: it builds [`ir::SourceFile`] values and renders them to
//! text. Writing the rendered files is shared.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::ConnectionInfo;
use crate::error::DtoGenError;
use crate::queries::CustomQuery;
use crate::schema::Metadata;

pub mod go;
pub mod ir;
pub mod output;
pub mod python;
pub mod query_shape;

pub use go::GoGenerator;
pub use python::PythonGenerator;

use ir::SourceFile;

/// Stem of the generated connection helper file
pub const CONNECTOR_FILE: &str = "db_connector";
/// Stem of the generated custom query file
pub const CUSTOM_QUERIES_FILE: &str = "custom_queries";

/// Supported output languages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLanguage {
    Go,
    Python,
}

impl TargetLanguage {
    /// The emitter for this language
    pub fn generator(&self) -> Box<dyn CodeGenerator> {
        match self {
            TargetLanguage::Go => Box::new(GoGenerator::new()),
            TargetLanguage::Python => Box::new(PythonGenerator::new()),
        }
    }
}

impl FromStr for TargetLanguage {
    type Err = DtoGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "go" => Ok(TargetLanguage::Go),
            "python" => Ok(TargetLanguage::Python),
            other => Err(DtoGenError::Config(format!("unsupported language: {}", other))),
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetLanguage::Go => write!(f, "go"),
            TargetLanguage::Python => write!(f, "python"),
        }
    }
}

/// Everything an emitter reads. Never mutated by generation.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    /// Package / module identifier (target directory name)
    pub package: &'a str,
    pub connection: &'a ConnectionInfo,
    pub metadata: &'a Metadata,
    pub queries: &'a [CustomQuery],
}

/// Generated files keyed by file name (with extension)
pub type GeneratedSources = BTreeMap<String, SourceFile>;

/// Trait for language-specific code generators
pub trait CodeGenerator {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    /// Build the IR of every output file
    fn build_sources(&self, input: &GenerationInput) -> Result<Vec<SourceFile>, DtoGenError>;

    /// Render one file to source text
    fn render(&self, package: &str, source: &SourceFile) -> Result<String, DtoGenError>;

    /// Build every output file, keyed by file name
    ///
    /// Two sources with the same file name (a table named like the connector,
    /// or the same table name in two schemas) are an error.
    fn generate(&self, input: &GenerationInput) -> Result<GeneratedSources, DtoGenError> {
        let mut sources = GeneratedSources::new();
        for source in self.build_sources(input)? {
            let file_name = format!("{}.{}", source.name, self.extension());
            if sources.contains_key(&file_name) {
                return Err(DtoGenError::CodeGen {
                    target: file_name,
                    message: "more than one generated file with this name".to_string(),
                });
            }
            debug!(file = ?file_name, structs = ?source.structs.len(), functions = ?source.functions.len(), "Built source");
            sources.insert(file_name, source);
        }
        Ok(sources)
    }
}

/// Generate, render and write every file for one run
///
/// All files are rendered before anything on disk is touched, so a
/// generation error leaves the output directory as it was.
pub fn generate_files(
    language: TargetLanguage,
    input: &GenerationInput,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, DtoGenError> {
    info!(language = %language, output = ?output_dir, "Generating code");

    let generator = language.generator();
    let sources = generator.generate(input)?;

    let mut rendered = Vec::with_capacity(sources.len());
    for (file_name, source) in &sources {
        let text = generator.render(input.package, source)?;
        rendered.push((file_name.clone(), text));
    }

    let written = output::replace_generated(output_dir, generator.extension(), &rendered)?;

    info!(files = ?written.len(), "Code generation complete");
    Ok(written)
}

/// Double-quoted string literal valid in both Go and Python
pub(crate) fn quote_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Metadata shared by emitter tests

    use crate::config::ConnectionInfo;
    use crate::schema::{AutoIncrementKind, Column, Metadata, Table};

    pub fn column(ordinal: u32, name: &str, data_type: &str) -> Column {
        Column {
            ordinal,
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: false,
            default_value: None,
            is_primary_key: false,
            auto_increment: None,
            foreign_key: None,
        }
    }

    /// `users (id serial pk, email text not null, created_at timestamp null)`
    pub fn users() -> Table {
        let mut id = column(1, "id", "integer");
        id.is_primary_key = true;
        id.auto_increment = Some(AutoIncrementKind::Serial);
        id.default_value = Some("nextval('users_id_seq'::regclass)".to_string());
        let email = column(2, "email", "text");
        let mut created_at = column(3, "created_at", "timestamp without time zone");
        created_at.is_nullable = true;

        Table {
            schema: "public".to_string(),
            name: "users".to_string(),
            columns: vec![id, email, created_at],
        }
    }

    /// `tags (name text pk)`
    pub fn tags() -> Table {
        let mut name = column(1, "name", "text");
        name.is_primary_key = true;

        Table {
            schema: "public".to_string(),
            name: "tags".to_string(),
            columns: vec![name],
        }
    }

    pub fn metadata() -> Metadata {
        Metadata {
            database: "shop".to_string(),
            tables: vec![users(), tags()],
        }
    }

    pub fn connection() -> ConnectionInfo {
        ConnectionInfo {
            dbms: "PostgreSQL".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            username: "shop".to_string(),
            password: "secret".to_string(),
            database: "shop".to_string(),
            schemas: vec!["public".to_string()],
        }
    }
}
