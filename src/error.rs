use thiserror::Error;

use crate::introspect::IntrospectionStage;

/// dtogen errors
#[derive(Error, Debug)]
pub enum DtoGenError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to introspect {stage}: {source}")]
    Introspection {
        stage: IntrospectionStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid custom query descriptor (query #{chunk}): {message}")]
    Descriptor { chunk: usize, message: String },

    #[error("Code generation failed for '{target}': {message}")]
    CodeGen { target: String, message: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
