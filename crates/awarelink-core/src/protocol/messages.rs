//! Handshake messages and their UTF-8 wire encoding.
//!
//! Wire format: the raw UTF-8 bytes of the message text, no header, no
//! length prefix.  The discovery transport already delivers each message as
//! one datagram.
//!
//! | Text               | Sender                  | Meaning                                  |
//! |--------------------|-------------------------|------------------------------------------|
//! | `INIT_CONNECT`     | subscriber → publisher  | open a listening port and negotiate      |
//! | `COMPLETE_CONNECT` | publisher → subscriber  | port is ready; start client negotiation  |
//! | anything else      | either side             | application payload, forwarded as-is     |

use std::fmt;

use thiserror::Error;

const INIT_CONNECT: &str = "INIT_CONNECT";
const COMPLETE_CONNECT: &str = "COMPLETE_CONNECT";

/// Errors that can occur while decoding a handshake message.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The payload is not valid UTF-8.
    #[error("message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Identifier attached to each message handed to the transport.
///
/// The transport echoes it back in send-failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u32);

impl MessageId {
    pub const INIT_CONNECT: MessageId = MessageId(0);
    pub const COMPLETE_CONNECT: MessageId = MessageId(2345);
    pub const PAYLOAD: MessageId = MessageId(1553);
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

/// A message exchanged over the discovery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    InitConnect,
    CompleteConnect,
    /// Application text, forwarded verbatim once the data path exists.
    Payload(String),
}

impl HandshakeMessage {
    /// Encodes the message as UTF-8 bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.as_text().as_bytes().to_vec()
    }

    /// Decodes a message received from the transport.
    ///
    /// Control keywords must match exactly; any other text, including a
    /// keyword with surrounding whitespace, is a payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidUtf8`] if `bytes` is not UTF-8.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use awarelink_core::HandshakeMessage;
    ///
    /// let msg = HandshakeMessage::decode(b"INIT_CONNECT").unwrap();
    /// assert_eq!(msg, HandshakeMessage::InitConnect);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)?;
        Ok(match text {
            INIT_CONNECT => HandshakeMessage::InitConnect,
            COMPLETE_CONNECT => HandshakeMessage::CompleteConnect,
            other => HandshakeMessage::Payload(other.to_string()),
        })
    }

    pub fn as_text(&self) -> &str {
        match self {
            HandshakeMessage::InitConnect => INIT_CONNECT,
            HandshakeMessage::CompleteConnect => COMPLETE_CONNECT,
            HandshakeMessage::Payload(text) => text,
        }
    }

    /// The transport message id used when sending this message.
    pub fn message_id(&self) -> MessageId {
        match self {
            HandshakeMessage::InitConnect => MessageId::INIT_CONNECT,
            HandshakeMessage::CompleteConnect => MessageId::COMPLETE_CONNECT,
            HandshakeMessage::Payload(_) => MessageId::PAYLOAD,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_recognises_control_keywords() {
        assert_eq!(
            HandshakeMessage::decode(b"INIT_CONNECT"),
            Ok(HandshakeMessage::InitConnect)
        );
        assert_eq!(
            HandshakeMessage::decode(b"COMPLETE_CONNECT"),
            Ok(HandshakeMessage::CompleteConnect)
        );
    }

    #[test]
    fn test_decode_treats_other_text_as_payload() {
        // Arrange
        let bytes = "turn left ←".as_bytes();

        // Act
        let msg = HandshakeMessage::decode(bytes).unwrap();

        // Assert
        assert_eq!(msg, HandshakeMessage::Payload("turn left ←".to_string()));
        assert_eq!(msg.message_id(), MessageId::PAYLOAD);
    }

    #[test]
    fn test_decode_keyword_with_whitespace_is_payload() {
        let msg = HandshakeMessage::decode(b"INIT_CONNECT\n").unwrap();
        assert_eq!(msg, HandshakeMessage::Payload("INIT_CONNECT\n".to_string()));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let result = HandshakeMessage::decode(&[0xFF, 0xFE, 0x00]);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8(_))));
    }

    #[test]
    fn test_encode_produces_exact_keyword_bytes() {
        assert_eq!(HandshakeMessage::InitConnect.encode(), b"INIT_CONNECT".to_vec());
        assert_eq!(
            HandshakeMessage::CompleteConnect.encode(),
            b"COMPLETE_CONNECT".to_vec()
        );
    }

    #[test]
    fn test_message_ids_match_transport_conventions() {
        assert_eq!(HandshakeMessage::InitConnect.message_id(), MessageId(0));
        assert_eq!(HandshakeMessage::CompleteConnect.message_id(), MessageId(2345));
        assert_eq!(
            HandshakeMessage::Payload("x".into()).message_id(),
            MessageId(1553)
        );
    }
}
