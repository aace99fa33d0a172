use thiserror::Error;

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Anything recoverable is reported as a [`crate::diagnostics::Warning`] instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed operation {route}: {reason}")]
    MalformedOperation { route: String, reason: String },

    #[error("postprocessing stage `{stage}` failed on component `{component}`: {message}")]
    Postprocess {
        stage: String,
        component: String,
        message: String,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
