/// Top-level Strata error type.
///
/// All fallible operations in `strata-core` return [`Result<T, StrataError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
///
/// Data-quality problems in an analysis result (missing ids, dangling
/// links, unknown cycle ids) are not errors. They are counted in
/// [`BuildStats`](crate::composer::BuildStats) and logged.
#[derive(thiserror::Error, Debug)]
pub enum StrataError {
    /// Error at the ingestion boundary (malformed analysis or cycle report).
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error while projecting a view of the forest.
    #[error("Projection error: {0}")]
    Project(#[from] ProjectError),
}

/// Errors raised while converting upstream records into typed entities.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// The analysis document is not valid JSON or has the wrong shape.
    #[error("Malformed analysis: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The analysis document is not a JSON object.
    #[error("Analysis root must be a JSON object")]
    NotAnObject,

    /// A top-level collection is present but is not an array.
    #[error("Expected an array under `{key}`")]
    NotAnArray {
        /// The offending top-level key.
        key: String,
    },

    /// Two records resolved to the same id under the `reject` duplicate policy.
    #[error("Duplicate entity id `{id}` ({first} and {second})")]
    DuplicateId {
        /// The colliding id.
        id: String,
        /// Kind of the first registered record.
        first: String,
        /// Kind of the record that collided with it.
        second: String,
    },
}

/// Errors in Strata configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from the level projector and the view state machine.
#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    /// A view level outside `0..=4` was requested.
    #[error("View level {0} out of range (expected 0-4)")]
    LevelOutOfRange(u8),

    /// A view level name that does not map to an entity kind.
    #[error("Unknown view level: {0}")]
    UnknownLevel(String),
}

/// Convenience alias for `Result<T, StrataError>`.
pub type Result<T> = std::result::Result<T, StrataError>;
