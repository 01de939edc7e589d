//! Wire format.
//!
//! Outbound frames travel as a JSON envelope over text messages:
//! `{"dataURI":{"contentType":"image/jpeg","content":"<base64>"}}`.
//! Inbound messages are plain UTF-8 text; decoding is the identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::FramePayload;

/// Envelope wrapping a frame payload for transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "dataURI")]
    pub data_uri: DataUri,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataUri {
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("envelope serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("inbound message is not UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Serialize a frame payload into a wire message.
///
/// Consumes the payload; envelopes are one-shot. No size limit is enforced
/// here, transport-imposed limits surface as transmission errors.
pub fn encode_frame(payload: FramePayload) -> Result<String, EncodeError> {
    let envelope = Envelope {
        data_uri: DataUri {
            content_type: payload.content_type,
            content: payload.content,
        },
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Inbound messages are plain text, not structured envelopes.
pub fn decode_text(raw: &[u8]) -> Result<&str, DecodeError> {
    Ok(std::str::from_utf8(raw)?)
}
