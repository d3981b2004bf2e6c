//! Length-prefixed message framing.
//!
//! Every frame is a 4-byte big-endian body length followed by the body:
//! a 4-byte big-endian message type and the payload, optionally sealed by
//! the session cipher. The decoder works incrementally against a
//! `BytesMut` read buffer so callers can feed it partial reads.

use crate::crypto::{SessionCipher, CRYPTO_OVERHEAD};
use crate::error::FrameError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Default and minimum payload bound in bytes
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;

/// Size of the body-length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the message-type prefix inside the body
pub const TYPE_PREFIX_SIZE: usize = 4;

/// Message type reserved for handshake/control frames
pub const CONTROL_MSG_TYPE: i32 = 0;

/// One decoded unit off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type; `0` is reserved for control frames
    pub msg_type: i32,
    /// Application payload
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(msg_type: i32, payload: Bytes) -> Self {
        Self { msg_type, payload }
    }
}

/// Encode one frame to a contiguous buffer, sealing it when a cipher is
/// present.
///
/// The payload is bound-checked against `max_message_size` before any
/// allocation.
pub fn encode_frame(
    msg_type: i32,
    payload: &[u8],
    cipher: Option<&SessionCipher>,
    max_message_size: usize,
) -> Result<Bytes, FrameError> {
    if payload.len() > max_message_size {
        return Err(FrameError::TooLarge(payload.len()));
    }

    let mut body = BytesMut::with_capacity(TYPE_PREFIX_SIZE + payload.len());
    body.put_i32(msg_type);
    body.put_slice(payload);

    let body = match cipher {
        Some(cipher) => cipher.seal(&body)?,
        None => body.freeze(),
    };

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);

    Ok(buf.freeze())
}

/// Incremental frame decoder for one stream.
///
/// The body bound is fixed at construction from the negotiated message
/// size; a declared length above it is treated as a fatal stream error by
/// the caller.
#[derive(Debug)]
pub struct FrameDecoder {
    max_body_size: usize,
}

impl FrameDecoder {
    /// Create a decoder for a stream with the given payload bound
    pub fn new(max_message_size: usize, encrypted: bool) -> Self {
        let mut max_body_size = TYPE_PREFIX_SIZE + max_message_size;
        if encrypted {
            max_body_size += CRYPTO_OVERHEAD;
        }
        Self { max_body_size }
    }

    /// Decode one frame from the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. The length prefix is
    /// validated before the body is consumed, so an oversized declaration
    /// fails without buffering the body.
    pub fn decode(
        &mut self,
        buf: &mut BytesMut,
        cipher: Option<&SessionCipher>,
    ) -> Result<Option<Frame>, FrameError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        // Peek at the body length
        let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if body_len > self.max_body_size {
            return Err(FrameError::TooLarge(body_len));
        }

        if buf.len() < LENGTH_PREFIX_SIZE + body_len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let body = buf.split_to(body_len).freeze();

        let mut body = match cipher {
            Some(cipher) => cipher.open(&body)?,
            None => body,
        };

        if body.len() < TYPE_PREFIX_SIZE {
            return Err(FrameError::Malformed);
        }

        let msg_type = body.get_i32();
        Ok(Some(Frame::new(msg_type, body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyExchange;

    fn paired_ciphers() -> (SessionCipher, SessionCipher) {
        let ours = KeyExchange::generate();
        let theirs = KeyExchange::generate();
        let our_public = ours.public_key();
        let their_public = theirs.public_key();
        (ours.into_cipher(&their_public), theirs.into_cipher(&our_public))
    }

    #[test]
    fn test_plaintext_roundtrip() {
        let encoded = encode_frame(20, b"move forward", None, DEFAULT_MAX_MESSAGE_SIZE).unwrap();

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, false);
        let mut buf = BytesMut::from(encoded.as_ref());
        let frame = decoder.decode(&mut buf, None).unwrap().unwrap();

        assert_eq!(frame.msg_type, 20);
        assert_eq!(frame.payload.as_ref(), b"move forward");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let (sealer, opener) = paired_ciphers();
        let encoded =
            encode_frame(18, b"observation please", Some(&sealer), DEFAULT_MAX_MESSAGE_SIZE)
                .unwrap();

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, true);
        let mut buf = BytesMut::from(encoded.as_ref());
        let frame = decoder.decode(&mut buf, Some(&opener)).unwrap().unwrap();

        assert_eq!(frame.msg_type, 18);
        assert_eq!(frame.payload.as_ref(), b"observation please");
    }

    #[test]
    fn test_control_and_negative_types_roundtrip() {
        for msg_type in [CONTROL_MSG_TYPE, -1, -2, i32::MAX] {
            let encoded = encode_frame(msg_type, b"x", None, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
            let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, false);
            let mut buf = BytesMut::from(encoded.as_ref());
            let frame = decoder.decode(&mut buf, None).unwrap().unwrap();
            assert_eq!(frame.msg_type, msg_type);
        }
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; DEFAULT_MAX_MESSAGE_SIZE + 1];
        let err = encode_frame(20, &payload, None, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(len) if len == payload.len()));
    }

    #[test]
    fn test_decode_rejects_oversized_declaration() {
        let mut buf = BytesMut::new();
        buf.put_u32(64 * 1024);
        // Body never arrives; the declaration alone must fail.
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, false);
        let err = decoder.decode(&mut buf, None).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(_)));
    }

    #[test]
    fn test_decode_partial_input_needs_more() {
        let encoded = encode_frame(11, b"ping", None, DEFAULT_MAX_MESSAGE_SIZE).unwrap();

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, false);
        let mut buf = BytesMut::new();

        // Feed one byte at a time; only the final byte completes the frame.
        for (i, byte) in encoded.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = decoder.decode(&mut buf, None).unwrap();
            if i + 1 < encoded.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded.unwrap().msg_type, 11);
            }
        }
    }

    #[test]
    fn test_decode_empty_body_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_slice(&[0, 0]);

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, false);
        let err = decoder.decode(&mut buf, None).unwrap_err();
        assert!(matches!(err, FrameError::Malformed));
    }

    #[test]
    fn test_decode_tampered_ciphertext_fails() {
        let (sealer, opener) = paired_ciphers();
        let encoded = encode_frame(20, b"payload", Some(&sealer), DEFAULT_MAX_MESSAGE_SIZE).unwrap();

        let mut bytes = encoded.to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, true);
        let mut buf = BytesMut::from(bytes.as_slice());
        let err = decoder.decode(&mut buf, Some(&opener)).unwrap_err();
        assert!(matches!(err, FrameError::Crypto));
    }

    #[test]
    fn test_back_to_back_frames_decode_in_order() {
        let mut buf = BytesMut::new();
        for tag in 0..8 {
            let encoded =
                encode_frame(20, &[tag], None, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
            buf.put_slice(&encoded);
        }

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_MESSAGE_SIZE, false);
        for tag in 0..8 {
            let frame = decoder.decode(&mut buf, None).unwrap().unwrap();
            assert_eq!(frame.payload.as_ref(), &[tag]);
        }
        assert!(decoder.decode(&mut buf, None).unwrap().is_none());
    }
}
