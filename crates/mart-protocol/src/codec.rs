//! JSON codec for mart response bodies.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Largest response body the decoder accepts (16 MiB).
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Errors raised while parsing requests or encoding responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// `/pub` without a channel.
    #[error("channel is required")]
    MissingChannel,

    /// A channel name failed validation.
    #[error("invalid channel {name:?}: {reason}")]
    InvalidChannel {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// `size` is not a non-negative integer.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// `size` exceeds the configured limit.
    #[error("size {size} exceeds maximum {max}")]
    SizeTooLarge {
        /// Requested capacity.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// `life` is not a nanosecond count.
    #[error("invalid life: {0}")]
    InvalidLife(String),

    /// The published body exceeds the configured limit.
    #[error("payload of {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Body length.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A `/sub` channel key came without a marker.
    #[error("{0} has no etag")]
    MissingEtag(String),

    /// A `/sub` marker is not a decimal integer.
    #[error("invalid etag: {0}")]
    InvalidEtag(String),

    /// `/sub` named no channel at all.
    #[error("no channels requested")]
    NoChannels,

    /// Body exceeds [`MAX_BODY_SIZE`].
    #[error("body size {0} exceeds maximum {MAX_BODY_SIZE}")]
    BodyTooLarge(usize),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a response body.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Decode a response body.
///
/// # Errors
///
/// Returns an error if the body is too large or not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() > MAX_BODY_SIZE {
        return Err(ProtocolError::BodyTooLarge(data.len()));
    }
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::{PubResponse, SubResponse};

    #[test]
    fn test_decode_rejects_garbage() {
        match decode::<PubResponse>(b"not json") {
            Err(ProtocolError::Json(_)) => {}
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_oversized_body() {
        let body = vec![b' '; MAX_BODY_SIZE + 1];
        match decode::<SubResponse>(&body) {
            Err(ProtocolError::BodyTooLarge(_)) => {}
            other => panic!("Expected BodyTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_messages_match_wire_text() {
        assert_eq!(ProtocolError::MissingChannel.to_string(), "channel is required");
        assert_eq!(ProtocolError::MissingEtag("news".into()).to_string(), "news has no etag");
    }
}
