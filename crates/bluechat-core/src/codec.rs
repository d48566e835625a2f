//! Chat payload codec
//!
//! A payload is `sender_name + DELIMITER + text` in UTF-8. The codec knows
//! nothing about framing; [`crate::channel`] puts one payload in each
//! length-prefixed frame.
//!
//! Decoding splits at the last delimiter, so a sender name may contain the
//! delimiter but a text containing it comes back truncated to whatever follows
//! its last occurrence. A payload without a delimiter decodes to a sender name
//! holding the whole payload and empty text.

use bytes::Bytes;

use crate::types::Message;

/// Separator between sender name and text
pub const DELIMITER: &str = "-##+";

/// Encode a message into payload bytes
pub fn encode(message: &Message) -> Bytes {
    let mut payload =
        String::with_capacity(message.sender_name.len() + DELIMITER.len() + message.text.len());
    payload.push_str(&message.sender_name);
    payload.push_str(DELIMITER);
    payload.push_str(&message.text);
    Bytes::from(payload)
}

/// Decode payload bytes; invalid UTF-8 is replaced rather than rejected
pub fn decode(payload: &[u8], originated_locally: bool) -> Message {
    let payload = String::from_utf8_lossy(payload);
    let (sender_name, text) = match payload.rsplit_once(DELIMITER) {
        Some((sender_name, text)) => (sender_name, text),
        None => (payload.as_ref(), ""),
    };

    Message {
        text: text.to_string(),
        sender_name: sender_name.to_string(),
        originated_locally,
    }
}
