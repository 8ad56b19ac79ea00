use thiserror::Error;

/// Broad class of a [`MatrixError`].
///
/// Every error surfaced by the matrix core belongs to exactly one class.
/// None of them is retried by the core itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported or ambiguous source, or an impossible mode request
    Configuration,
    /// Fewer partitions or rows than requested workers
    Sufficiency,
    /// I/O failure or schema mismatch while materializing a rank
    Load,
    /// Payload failed consistency checks before handoff
    Validation,
}

/// Errors that can occur while planning or materializing a matrix.
#[derive(Error, Debug)]
pub enum MatrixError {
    /// Invalid option combination or impossible mode request
    #[error("Configuration error: {0}")]
    Config(String),

    /// No registered adapter claims the source
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// More than one registered adapter claims the source
    #[error("Ambiguous source {descriptor}: claimed by adapters {adapters:?}")]
    AmbiguousSource {
        descriptor: String,
        adapters: Vec<&'static str>,
    },

    /// Worker rank outside `0..num_actors`
    #[error("Rank {rank} out of range for {num_actors} actors")]
    InvalidRank { rank: usize, num_actors: usize },

    /// Not enough data units to give every actor a shard
    #[error(
        "Insufficient {unit} for {requested} actors: {descriptor} provides only {available} \
         (short by {})",
        .requested - .available
    )]
    Insufficient {
        unit: &'static str,
        available: usize,
        requested: usize,
        descriptor: String,
    },

    /// Referenced column absent from the loaded data
    #[error("Missing column '{column}' in {descriptor}")]
    MissingColumn { column: String, descriptor: String },

    /// Aligned array does not match the feature row count
    #[error("Row count mismatch for {field}: expected {expected}, got {got}")]
    RowCountMismatch {
        field: String,
        expected: usize,
        got: usize,
    },

    /// Partitions or files disagree on their columns
    #[error("Schema mismatch: {0}")]
    Schema(String),

    /// Load failure not covered by a more specific variant
    #[error("Load error: {0}")]
    Load(String),

    /// Payload failed a consistency check
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow decoding error (CSV reader, casts)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet decoding error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl MatrixError {
    /// Taxonomy class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatrixError::Config(_)
            | MatrixError::UnsupportedSource(_)
            | MatrixError::AmbiguousSource { .. }
            | MatrixError::InvalidRank { .. }
            | MatrixError::Serialization(_) => ErrorKind::Configuration,
            MatrixError::Insufficient { .. } => ErrorKind::Sufficiency,
            MatrixError::MissingColumn { .. }
            | MatrixError::RowCountMismatch { .. }
            | MatrixError::Schema(_)
            | MatrixError::Load(_)
            | MatrixError::Io(_)
            | MatrixError::Arrow(_)
            | MatrixError::Parquet(_) => ErrorKind::Load,
            MatrixError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// The core never retries; a retried rank reloads its same partition set.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Result type alias for matrix operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

impl From<toml::ser::Error> for MatrixError {
    fn from(e: toml::ser::Error) -> Self {
        MatrixError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for MatrixError {
    fn from(e: toml::de::Error) -> Self {
        MatrixError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MatrixError::Config("num_actors must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: num_actors must be at least 1"
        );
    }

    #[test]
    fn test_insufficient_names_shortfall() {
        let err = MatrixError::Insufficient {
            unit: "partitions",
            available: 1,
            requested: 4,
            descriptor: "paths[foo.csv]".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 actors"));
        assert!(msg.contains("only 1"));
        assert!(msg.contains("short by 3"));
        assert_eq!(err.kind(), ErrorKind::Sufficiency);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MatrixError = io_err.into();
        assert!(err.to_string().contains("IO error"));
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            MatrixError::UnsupportedSource("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            MatrixError::Validation("nan qid".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            MatrixError::RowCountMismatch {
                field: "weight".into(),
                expected: 3,
                got: 2
            }
            .kind(),
            ErrorKind::Load
        );
    }
}
