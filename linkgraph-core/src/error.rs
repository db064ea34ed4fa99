use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("{op}: not found")]
    NotFound { op: &'static str },

    /// Returned when an edge references a source and/or destination link
    /// that the store has never seen.
    #[error("{op}: unknown source and/or destination for edge")]
    UnknownEdgeLinks { op: &'static str },

    #[error("{op}: no unused identifier after {attempts} attempts")]
    IdExhausted { op: &'static str, attempts: usize },

    #[error("{op}: database error: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{op}: invalid record: {reason}")]
    InvalidRecord { op: &'static str, reason: String },
}

impl GraphError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }

    pub fn is_unknown_edge_links(&self) -> bool {
        matches!(self, GraphError::UnknownEdgeLinks { .. })
    }

    /// Name of the store operation that produced the error, if any.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            GraphError::NotFound { op }
            | GraphError::UnknownEdgeLinks { op }
            | GraphError::IdExhausted { op, .. }
            | GraphError::Database { op, .. }
            | GraphError::InvalidRecord { op, .. } => Some(*op),
        }
    }

    pub(crate) fn database(op: &'static str) -> impl FnOnce(rusqlite::Error) -> GraphError {
        move |source| GraphError::Database { op, source }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
