use thiserror::Error;

/// Top-level error type for shared configuration and parsing.
#[derive(Error, Debug)]
pub enum StructuresError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl From<config::ConfigError> for StructuresError {
    fn from(e: config::ConfigError) -> Self {
        StructuresError::Config(e.to_string())
    }
}
