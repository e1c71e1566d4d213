use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Pyrite operations.
#[derive(Debug, Error, Diagnostic)]
pub enum PyriteError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed constraint, marker, version, or requirement text.
    /// Always carries the offending input.
    #[error("Parse error: {message} (in `{input}`)")]
    #[diagnostic(help("Check the requirement syntax"))]
    Parse { message: String, input: String },

    /// No repository had the requested package name/version.
    #[error("Package not found: {name}{}", .version.as_deref().map(|v| format!(" ({v})")).unwrap_or_default())]
    PackageNotFound {
        name: String,
        version: Option<String>,
    },

    /// Network request or download failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Dependency resolution failed (unsatisfiable constraint set).
    /// The message carries the full conflicting requirement chains.
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// No distribution artifact is installable for the target environment.
    #[error("No compatible artifact: {message}")]
    ArtifactSelection { message: String },

    /// Invalid repository or pool configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check your repository configuration"))]
    Config { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl PyriteError {
    /// Shorthand for a [`PyriteError::Parse`] with the offending text.
    pub fn parse(message: impl Into<String>, input: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            input: input.into(),
        }
    }

    /// Shorthand for a [`PyriteError::PackageNotFound`] without a version.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::PackageNotFound {
            name: name.into(),
            version: None,
        }
    }

    /// Shorthand for a [`PyriteError::PackageNotFound`] with a version.
    pub fn not_found_at(name: impl Into<String>, version: impl ToString) -> Self {
        Self::PackageNotFound {
            name: name.into(),
            version: Some(version.to_string()),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type PyriteResult<T> = Result<T, PyriteError>;
