//! Crate-wide error type.

use crate::backend::BackendError;

/// Errors raised while defining a schema or compiling and running a query.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The schema graph is inconsistent. Raised while types are registered.
    #[error("Invalid schema definition: {0}")]
    SchemaDefinition(String),

    /// The caller asked for something the schema or backend cannot answer.
    #[error("Invalid query parameters: {0}")]
    InvalidQueryParams(String),

    /// An operation the receiving type does not provide.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Error::SchemaDefinition(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidQueryParams(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
