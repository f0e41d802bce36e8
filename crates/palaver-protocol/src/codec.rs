//! Codec for encoding and decoding Palaver frames.
//!
//! Frames travel as JSON text, one frame per WebSocket text message, so
//! there is no length-prefix framing; the codec enforces a size ceiling
//! and surfaces serde errors.

use thiserror::Error;

use crate::frames::Frame;

/// Maximum encoded frame size (16 KiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// The frame is not valid JSON or not a known frame shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a frame to its JSON text representation.
///
/// # Errors
///
/// Returns an error if the frame is too large or serialization fails.
pub fn encode(frame: &Frame) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(frame)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a frame from JSON text.
///
/// # Errors
///
/// Returns an error if the text is too large, not valid JSON, or not a
/// known frame shape.
pub fn decode(text: &str) -> Result<Frame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::codes;

    #[test]
    fn test_encode_decode_roundtrip() {
        let frames = vec![
            Frame::join("alice"),
            Frame::chat("alice", "hello, world"),
            Frame::Leave,
            Frame::ping(Some(12345)),
            Frame::pong(None),
            Frame::welcome("conn-7", 1, 25_000),
            Frame::joined("alice"),
            Frame::error(codes::INVALID_NAME, "bad name"),
        ];

        for frame in frames {
            let encoded = encode(&frame).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(frame, decoded);
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"type":"launch_missiles"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        // Missing required field
        assert!(matches!(
            decode(r#"{"type":"chat","sender_name":"alice"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_too_large() {
        let oversized = format!(
            r#"{{"type":"chat","sender_name":"alice","body":"{}"}}"#,
            "x".repeat(MAX_FRAME_SIZE)
        );
        assert!(matches!(
            decode(&oversized),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_encode_too_large() {
        let frame = Frame::chat("alice", "x".repeat(MAX_FRAME_SIZE));
        assert!(matches!(
            encode(&frame),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }
}
