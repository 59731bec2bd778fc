use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid tracker config: {0}")]
    InvalidConfig(String),

    #[error("Detection box has non-finite coordinates or extent")]
    NonFiniteBox,

    #[error("Detection box has non-positive width or height")]
    DegenerateBox,

    #[error("Detection score is not finite")]
    NonFiniteScore,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("Embedding has zero norm or non-finite components")]
    ZeroEmbedding,

    #[error("Class id {class} is out of range (num_classes = {num_classes})")]
    ClassOutOfRange { class: usize, num_classes: usize },

    #[error("Projected covariance is not positive definite")]
    KalmanNotPositiveDefinite,

    #[error("Assignment Error: {0}")]
    Assignment(String),

    #[error("Gating is not supported for {0} degrees of freedom")]
    UnsupportedGatingDimension(usize),
}
