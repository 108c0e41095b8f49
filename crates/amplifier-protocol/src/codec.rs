//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between Rust types and raw bytes. The rest of the
//! workspace only depends on the [`Codec`] trait, so the JSON text format
//! the backend speaks today is one implementation among possible others.

use serde::{de::DeserializeOwned, Serialize};

use crate::{Envelope, Payload, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec is shared between the
/// command path and the receive task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Malformed` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// Encodes a `(kind, payload)` pair as one wire envelope.
    fn encode_envelope(
        &self,
        kind: &str,
        payload: Payload,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.encode(&Envelope::new(kind, payload))
    }

    /// Decodes one wire envelope, rejecting an empty message type.
    ///
    /// Casing of the top-level keys is normalized here, once; callers only
    /// ever see [`Envelope::kind`] and [`Envelope::payload`].
    fn decode_envelope(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        let envelope: Envelope = self.decode(data)?;
        if envelope.kind.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "empty message type".into(),
            ));
        }
        Ok(envelope)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON text (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use amplifier_protocol::{Codec, Envelope, JsonCodec, Payload};
///
/// let codec = JsonCodec;
///
/// let mut payload = Payload::new();
/// payload.insert("level".into(), 70.into());
///
/// let bytes = codec.encode_envelope("volume", payload.clone()).unwrap();
/// assert_eq!(bytes, br#"{"type":"volume","data":{"level":70}}"#);
///
/// let decoded = codec.decode_envelope(&bytes).unwrap();
/// assert_eq!(decoded, Envelope::new("volume", payload));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        // `from_slice` also rejects invalid UTF-8.
        serde_json::from_slice(data).map_err(ProtocolError::Malformed)
    }
}
