//! JSON wire messages exchanged over the relay WebSocket.
//!
//! Clients send [`SignalMessage`]s; the relay reads only the routing
//! envelope (`type`, `to`, `from`) and carries every other field through
//! untouched. The relay's own notifications are [`ServerMessage`]s.

use crate::types::{message_type, ConnectionId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

const FIELD_TYPE: &str = "type";
const FIELD_TO: &str = "to";
const FIELD_FROM: &str = "from";

/// Errors from decoding or encoding wire messages.
#[derive(Error, Debug)]
pub enum MessageError {
    /// The frame is not a JSON object.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The `type` tag of a client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Session description offer.
    Offer,
    /// Session description answer.
    Answer,
    /// Trickled ICE candidate.
    IceCandidate,
    /// Call termination.
    Hangup,
    /// Any tag the relay does not route. Kept so newer clients can coexist.
    Other(String),
}

impl MessageKind {
    /// Classify a `type` value.
    #[must_use]
    pub fn from_type(tag: &str) -> Self {
        match tag {
            message_type::OFFER => Self::Offer,
            message_type::ANSWER => Self::Answer,
            message_type::ICE_CANDIDATE => Self::IceCandidate,
            message_type::HANGUP => Self::Hangup,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire value of this tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Offer => message_type::OFFER,
            Self::Answer => message_type::ANSWER,
            Self::IceCandidate => message_type::ICE_CANDIDATE,
            Self::Hangup => message_type::HANGUP,
            Self::Other(tag) => tag,
        }
    }

    /// Whether messages of this kind are forwarded to the peer named in `to`.
    #[must_use]
    pub fn is_relayed(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// A client-originated signaling message: routing envelope plus opaque payload.
///
/// Envelope fields that are absent, empty, or not JSON strings read as
/// `None`. All remaining fields live in `payload` and are written back out
/// verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMessage {
    /// The `type` tag.
    pub kind: Option<MessageKind>,
    /// Destination connection identifier, as sent by the client.
    pub to: Option<String>,
    /// Sender identifier. Only trusted after [`SignalMessage::stamp_from`].
    pub from: Option<String>,
    /// Every field other than the envelope.
    pub payload: Map<String, Value>,
}

impl SignalMessage {
    /// Decode a frame's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Malformed`] if the bytes are not a JSON object.
    pub fn parse(data: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Overwrite `from` with the relay-assigned sender identifier.
    pub fn stamp_from(&mut self, sender: &ConnectionId) {
        self.from = Some(sender.to_string());
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn take_str(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for SignalMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut payload = Map::deserialize(deserializer)?;
        let kind = take_str(&mut payload, FIELD_TYPE).map(|tag| MessageKind::from_type(&tag));
        let to = take_str(&mut payload, FIELD_TO);
        let from = take_str(&mut payload, FIELD_FROM);
        Ok(Self {
            kind,
            to,
            from,
            payload,
        })
    }
}

#[derive(Serialize)]
struct WireSignal<'a> {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(flatten)]
    payload: &'a Map<String, Value>,
}

impl Serialize for SignalMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireSignal {
            kind: self.kind.as_ref().map(MessageKind::as_str),
            to: self.to.as_deref(),
            from: self.from.as_deref(),
            payload: &self.payload,
        }
        .serialize(serializer)
    }
}

/// Notifications the relay itself sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Tells a freshly registered client its own identifier.
    #[serde(rename = "myId")]
    MyId {
        /// The identifier assigned to the receiving client.
        id: ConnectionId,
    },
    /// Number of connections currently registered.
    #[serde(rename = "peerCount")]
    PeerCount {
        /// Registered connection count.
        count: usize,
    },
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }
}
