//! Error types for the `ragline` crate.

use std::fmt;

use thiserror::Error;

/// A stage of the answer pipeline.
///
/// Stages run in declaration order and none is re-entered. A failure in any
/// stage is reported as [`RagError::StageFailed`] carrying the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Embedding the query.
    Embedding,
    /// Searching the vector store.
    Retrieving,
    /// Building the augmented prompt.
    Assembling,
    /// Calling the generation backend.
    Generating,
}

impl Stage {
    /// The terminal failure state this stage leads to.
    pub fn failure(self) -> Failure {
        match self {
            Stage::Embedding => Failure::EmbeddingFailed,
            Stage::Retrieving => Failure::RetrievalFailed,
            Stage::Assembling => Failure::AssemblyFailed,
            Stage::Generating => Failure::GenerationFailed,
        }
    }

    /// Lower-case stage name, as used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::Assembling => "assembling",
            Stage::Generating => "generating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `Failed(kind)` state an answer ends in when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    EmbeddingFailed,
    RetrievalFailed,
    AssemblyFailed,
    GenerationFailed,
}

/// Fieldless classification of a [`RagError`].
///
/// Callers branch on this to decide whether and how to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfiguration,
    UpstreamUnavailable,
    UpstreamError,
    UpstreamRefused,
    StorageUnavailable,
    StorageError,
    DeadlineExceeded,
}

impl ErrorKind {
    /// Whether a caller may retry the same request unchanged.
    ///
    /// `UpstreamError` and `StorageError` are reported retryable, though
    /// callers should back off more conservatively than for the
    /// `*Unavailable` kinds.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::UpstreamUnavailable
                | ErrorKind::UpstreamError
                | ErrorKind::StorageUnavailable
                | ErrorKind::StorageError
                | ErrorKind::DeadlineExceeded
        )
    }
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid parameters or configuration. A programming error, not retryable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The remote model service could not be reached or timed out.
    #[error("Upstream unavailable ({provider}): {message}")]
    UpstreamUnavailable {
        /// The backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The remote model service answered with an error or a malformed body.
    #[error("Upstream error ({provider}): {message}")]
    UpstreamError {
        /// The backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The remote model service explicitly declined the request.
    #[error("Upstream refused ({provider}): {message}")]
    UpstreamRefused {
        /// The backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store could not be reached.
    #[error("Storage unavailable ({backend}): {message}")]
    StorageUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store rejected the operation.
    #[error("Storage error ({backend}): {message}")]
    StorageError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The caller's deadline expired before the operation completed.
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// The operation that was cut short.
        operation: String,
    },

    /// A stage of the answer pipeline failed.
    #[error("{stage} failed: {source}")]
    StageFailed {
        /// The stage that failed first.
        stage: Stage,
        /// The component error.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Classify this error, looking through any stage wrapper.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            RagError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            RagError::UpstreamError { .. } => ErrorKind::UpstreamError,
            RagError::UpstreamRefused { .. } => ErrorKind::UpstreamRefused,
            RagError::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            RagError::StorageError { .. } => ErrorKind::StorageError,
            RagError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            RagError::StageFailed { source, .. } => source.kind(),
        }
    }

    /// The pipeline stage that failed, if this error came from the orchestrator.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RagError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The `Failed(kind)` state, if this error came from the orchestrator.
    pub fn failure(&self) -> Option<Failure> {
        self.stage().map(Stage::failure)
    }

    /// Shorthand for [`ErrorKind::is_retryable`] on [`kind`](Self::kind).
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub(crate) fn at_stage(self, stage: Stage) -> Self {
        RagError::StageFailed { stage, source: Box::new(self) }
    }

    pub(crate) fn deadline(operation: impl Into<String>) -> Self {
        RagError::DeadlineExceeded { operation: operation.into() }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        RagError::InvalidConfiguration(message.into())
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_looks_through_stage_wrapper() {
        let err = RagError::UpstreamUnavailable {
            provider: "ollama".into(),
            message: "connection refused".into(),
        }
        .at_stage(Stage::Embedding);

        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(err.stage(), Some(Stage::Embedding));
        assert_eq!(err.failure(), Some(Failure::EmbeddingFailed));
        assert_eq!(
            err.to_string(),
            "embedding failed: Upstream unavailable (ollama): connection refused"
        );
    }

    #[test]
    fn refusal_and_configuration_are_not_retryable() {
        assert!(!ErrorKind::UpstreamRefused.is_retryable());
        assert!(!ErrorKind::InvalidConfiguration.is_retryable());
        assert!(ErrorKind::StorageUnavailable.is_retryable());
        assert!(ErrorKind::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn deadline_is_distinct_from_unavailable() {
        let err = RagError::deadline("generation").at_stage(Stage::Generating);
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert_ne!(err.kind(), ErrorKind::UpstreamUnavailable);
    }
}
