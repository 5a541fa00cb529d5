//! Parse errors for the request-fatal header grammars
//!
//! Recoverable header problems never surface here; they degrade to `None`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("range unit is not `bytes`: {0}")]
    UnsupportedUnit(String),

    #[error("malformed byte range: {0}")]
    MalformedRange(String),

    #[error("expected exactly one byte range, found {0}")]
    MultipleRanges(usize),

    #[error("invalid Content-Range for a 206 response: {0}")]
    InvalidContentRange(String),

    #[error("invalid quoted string: {0}")]
    InvalidQuotedString(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
