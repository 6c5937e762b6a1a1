//! Error types for relation payload decoding.

/// Errors produced when a peer-written payload cannot be decoded.
///
/// Decoding failures are never fatal to the protocol: callers log them and
/// treat the payload as unavailable.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("payload must be a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// An object member has a value that is not a string.
    #[error("payload value for {key:?} must be a string, found {found}")]
    NonStringValue {
        /// The offending member name.
        key: String,
        /// JSON type that was found instead.
        found: &'static str,
    },
}
