//! Response decoding helpers.

use serde::de::DeserializeOwned;

use crate::error::{CourierError, Result};

/// Decode a JSON response body. The default decoder for descriptors.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| CourierError::decode(e.to_string()))
}

/// Decode a UTF-8 text body.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| CourierError::decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        ok: bool,
    }

    #[test]
    fn json_decoding_round_trips() {
        let ping: Ping = decode_json(b"{\"ok\":true}").unwrap();
        assert_eq!(ping, Ping { ok: true });
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let result: Result<Ping> = decode_json(b"{\"ok\":");
        assert!(matches!(result, Err(CourierError::Decode(_))));
    }

    #[test]
    fn text_decoding_rejects_invalid_utf8() {
        assert_eq!(decode_text(b"hello").unwrap(), "hello");
        assert!(decode_text(&[0xff, 0xfe]).is_err());
    }
}
