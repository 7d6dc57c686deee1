//! Typed errors for pre-tokenization, factorization, serialization, and training.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid annotation: {0}")]
    InvalidAnnotation(String),

    #[error("malformed wire token: {0}")]
    MalformedWire(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("piece oracle failure: {0}")]
    OracleFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
