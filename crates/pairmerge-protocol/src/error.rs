use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message {line:?}: {reason}")]
    Decode { line: String, reason: String },

    #[error("encoding error: {0}")]
    Encode(String),
}

impl ProtocolError {
    pub(crate) fn decode(line: &str, reason: impl Into<String>) -> Self {
        Self::Decode { line: line.to_string(), reason: reason.into() }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
