use thiserror::Error;

/// Errors raised while decoding ids from their textual form.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid ulid: {0}")]
    InvalidUlid(#[from] ulid::DecodeError),

    #[error("empty entity id")]
    EmptyEntityId,
}
