//! Payload encoding seam
//!
//! Compensation and confirm/cancel arguments travel opaque to the
//! coordinator; the codec pair decides their byte representation. The
//! default is JSON, which matches what most interception layers hand over.

use bytes::Bytes;
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Serializer/deserializer capability pair for event payloads.
pub trait PayloadCodec: Send + Sync {
    /// Encode a payload value into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] when the value cannot be encoded.
    fn encode(&self, payload: &Value) -> ProtocolResult<Bytes>;

    /// Decode wire bytes back into a payload value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] when the bytes are not a valid
    /// encoding.
    fn decode(&self, bytes: &[u8]) -> ProtocolResult<Value>;
}

/// JSON payload codec, the default for every cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadCodec;

impl PayloadCodec for JsonPayloadCodec {
    fn encode(&self, payload: &Value) -> ProtocolResult<Bytes> {
        let buf = serde_json::to_vec(payload).map_err(ProtocolError::codec)?;
        Ok(Bytes::from(buf))
    }

    fn decode(&self, bytes: &[u8]) -> ProtocolResult<Value> {
        serde_json::from_slice(bytes).map_err(ProtocolError::codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_preserves_payload() {
        let codec = JsonPayloadCodec;
        let payload = json!({"order_id": 42, "amount": "19.90"});
        let bytes = codec.encode(&payload).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonPayloadCodec;
        let err = codec.decode(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Codec(_)));
    }
}
