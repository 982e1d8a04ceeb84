#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("cannot index a zero vector (id={id})")]
    ZeroVector { id: String },

    #[error("bulk import rejected: {failed_id} had dimension {got}, expected {expected}")]
    BulkDimensionMismatch {
        failed_id: String,
        expected: usize,
        got: usize,
    },
}
