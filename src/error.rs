//! Error types for the weaving pass.

use std::path::PathBuf;

pub type WeaveResult<T> = Result<T, WeaveError>;

#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    /// A class reference could not be located in any source of the pool.
    #[error("Unresolvable class: {name}")]
    UnresolvableSymbol { name: String },

    /// A replacement accessor call does not fit the body it would be placed in.
    #[error("Cannot rewrite access to {field} in {class}.{method}: {reason}")]
    RewriteCompilationFailure {
        class: String,
        method: String,
        field: String,
        reason: String,
    },

    /// The class set contradicts the model conventions.
    #[error("Invariant violated by {class}: {reason}")]
    InvariantViolation { class: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A class file or archive entry exists but cannot be decoded.
    #[error("Malformed class data in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl WeaveError {
    pub fn unresolvable(name: impl Into<String>) -> Self {
        Self::UnresolvableSymbol { name: name.into() }
    }

    pub fn invariant(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            class: class.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
