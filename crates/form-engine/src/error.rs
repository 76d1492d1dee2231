use thiserror::Error;

/// Boxed error returned by caller-supplied callbacks, predicates and providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Programming mistakes detected while a form is being configured.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid accessor path '{path}': {reason}")]
    InvalidAccessorPath { path: String, reason: String },
    #[error("field '{0}' is defined more than once")]
    DuplicateField(String),
    #[error("field '{field}' depends on unknown field '{depends_on}'")]
    UnknownDependencySource { field: String, depends_on: String },
    #[error("field '{0}' is not defined")]
    UnknownField(String),
    #[error("invalid pattern for field '{field}'")]
    InvalidRegex {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid glob '{pattern}'")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("invalid message template '{name}'")]
    InvalidTemplate {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
    #[error("failed to parse engine settings")]
    SettingsParse(#[source] serde_json::Error),
    #[error("field '{0}' has no list of values of the requested item type")]
    LovTypeMismatch(String),
}

/// Failures raised while propagating a value change through the dependency graph.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("dependency '{source_field}' -> '{target}' failed")]
    Callback {
        source_field: String,
        target: String,
        #[source]
        cause: BoxError,
    },
    #[error("dependency chain starting at '{field}' exceeded depth {depth}")]
    DepthExceeded { field: String, depth: usize },
}

/// Failures of a list-of-values data request.
#[derive(Debug, Error)]
pub enum LovError {
    #[error("query was cancelled")]
    Cancelled,
    #[error("no data provider registered under '{0}'")]
    UnknownProvider(String),
    #[error("data provider failed: {0}")]
    Provider(#[source] BoxError),
    #[error("data provider returned {items} item(s) for a page of {count} with total {total}")]
    InconsistentPage {
        items: usize,
        count: usize,
        total: usize,
    },
}

/// Failures surfaced by a [`crate::session::FormSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("field '{0}' is not defined")]
    UnknownField(String),
    #[error("field '{0}' is read-only or disabled")]
    FieldLocked(String),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}
