//! gRPC wire framing for unary calls
//!
//! Each message is prefixed by a compression flag byte and a big-endian
//! u32 length. Call status travels in the `grpc-status` / `grpc-message`
//! trailers, or in the headers for trailers-only responses.

use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderMap;
use protogate_core::{RpcCode, RpcError};

/// Length of the message prefix
pub const FRAME_HEADER_LEN: usize = 5;

/// Frame a single message
pub fn encode_frame(message: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + message.len());
    buf.put_u8(0);
    buf.put_u32(message.len() as u32);
    buf.put_slice(message);
    buf.freeze()
}

/// Extract the single message of a unary response body
pub fn decode_frame(body: Bytes) -> Result<Bytes, RpcError> {
    if body.len() < FRAME_HEADER_LEN {
        return Err(RpcError::Payload(format!(
            "gRPC frame too short: {} bytes",
            body.len()
        )));
    }

    if body[0] != 0 {
        return Err(RpcError::Payload(
            "compressed gRPC messages are not supported".to_string(),
        ));
    }

    let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    let end = FRAME_HEADER_LEN + len;
    if body.len() < end {
        return Err(RpcError::Payload(format!(
            "gRPC frame declares {} bytes but only {} are present",
            len,
            body.len() - FRAME_HEADER_LEN
        )));
    }

    Ok(body.slice(FRAME_HEADER_LEN..end))
}

/// Check the call status, preferring trailers over headers
pub fn check_status(headers: &HeaderMap, trailers: Option<&HeaderMap>) -> Result<(), RpcError> {
    let source = match trailers {
        Some(t) if t.contains_key("grpc-status") => t,
        _ => headers,
    };

    let code = match source.get("grpc-status").and_then(|v| v.to_str().ok()) {
        Some(raw) => raw
            .trim()
            .parse::<i32>()
            .map(RpcCode::from_i32)
            .unwrap_or(RpcCode::Unknown),
        None => {
            return Err(RpcError::Payload(
                "response carried no grpc-status".to_string(),
            ))
        }
    };

    if code == RpcCode::Ok {
        return Ok(());
    }

    let message = source
        .get("grpc-message")
        .and_then(|v| v.to_str().ok())
        .map(percent_decode)
        .unwrap_or_default();

    Err(RpcError::status(code, message))
}

/// `grpc-message` is percent-encoded; invalid escapes pass through
fn percent_decode(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_frame_layout() {
        let framed = encode_frame(b"\x08\x2a");
        assert_eq!(&framed[..], &[0, 0, 0, 0, 2, 0x08, 0x2a]);
        assert_eq!(&decode_frame(framed).unwrap()[..], b"\x08\x2a");
    }

    #[test]
    fn test_decode_rejects_short_and_truncated() {
        assert!(decode_frame(Bytes::from_static(&[0, 0])).is_err());
        assert!(decode_frame(Bytes::from_static(&[0, 0, 0, 0, 4, 1])).is_err());
        assert!(decode_frame(Bytes::from_static(&[1, 0, 0, 0, 0])).is_err());
    }

    #[test]
    fn test_empty_message_frame() {
        let framed = encode_frame(&[]);
        assert!(decode_frame(framed).unwrap().is_empty());
    }

    #[test]
    fn test_status_from_trailers() {
        let headers = HeaderMap::new();
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", HeaderValue::from_static("5"));
        trailers.insert("grpc-message", HeaderValue::from_static("order%2042%20missing"));

        match check_status(&headers, Some(&trailers)) {
            Err(RpcError::Status { code, message }) => {
                assert_eq!(code, RpcCode::NotFound);
                assert_eq!(message, "order 42 missing");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_status_trailers_only_response() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("0"));
        assert!(check_status(&headers, None).is_ok());
    }

    #[test]
    fn test_missing_status_is_an_error() {
        assert!(check_status(&HeaderMap::new(), None).is_err());
    }

    #[test]
    fn test_percent_decode_leaves_invalid_sequences() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
        assert_eq!(percent_decode("%41"), "A");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }
}
