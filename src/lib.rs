//! # dtogen
//!
//! Generate data access code from database schemas
//!
//! This crate provides a CLI tool and library that introspects a database
//! schema, parses user-declared custom queries and generates entity types
//! plus CRUD and query functions for Go or Python.

pub mod codegen;
pub mod config;
pub mod error;
pub mod introspect;
pub mod queries;
pub mod schema;
pub mod types;

pub mod prelude {
    pub use crate::codegen::{generate_files, CodeGenerator, GenerationInput, TargetLanguage};
    pub use crate::config::{package_name, Config, ConnectionInfo, DbmsKind};
    pub use crate::error::DtoGenError;
    pub use crate::introspect::{Introspector, IntrospectionStage};
    pub use crate::queries::{load_custom_queries, Cardinality, CustomQuery};
    pub use crate::schema::{Column, Metadata, Table};
}

#[cfg(feature = "postgres")]
pub use introspect::PostgresIntrospector;
