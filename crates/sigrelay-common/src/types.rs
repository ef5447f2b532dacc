//! Core type definitions and protocol constants for the signaling relay.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Path the WebSocket relay endpoint is mounted at.
pub const WS_PATH: &str = "/ws";

/// Port the relay listens on when none is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// Values carried in the `type` field of every wire message.
pub mod message_type {
    /// Server → client: assigns the client's own identifier.
    pub const MY_ID: &str = "myId";
    /// Server → client: current number of registered connections.
    pub const PEER_COUNT: &str = "peerCount";
    /// Relayed: session description offer.
    pub const OFFER: &str = "offer";
    /// Relayed: session description answer.
    pub const ANSWER: &str = "answer";
    /// Relayed: trickled ICE candidate.
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    /// Relayed: call termination.
    pub const HANGUP: &str = "hangup";
}

const ID_LEN: usize = 16;

/// Error returned when a string is not a well-formed [`ConnectionId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid connection id: expected {} lowercase hex characters", ID_LEN * 2)]
pub struct InvalidConnectionId;

/// Opaque identifier assigned to a client when it registers with the relay.
///
/// 128 bits from the OS CSPRNG, rendered as 32 lowercase hex characters.
/// Only the exact rendering parses back, so an identifier that differs in
/// case or length never addresses a live connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId([u8; ID_LEN]);

impl ConnectionId {
    /// Identifier width in bytes.
    pub const LEN: usize = ID_LEN;

    /// Draw a fresh identifier from the OS random source.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; Self::LEN];
        OsRng.fill(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw identifier bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({self})")
    }
}

impl FromStr for ConnectionId {
    type Err = InvalidConnectionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN * 2 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(InvalidConnectionId);
        }
        let mut bytes = [0u8; Self::LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidConnectionId)?;
        Ok(Self(bytes))
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_id_renders_as_32_lowercase_hex_chars() {
        let id = ConnectionId::random().to_string();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn random_ids_do_not_repeat() {
        let ids: HashSet<ConnectionId> = (0..1000).map(|_| ConnectionId::random()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn display_parses_back_to_same_id() {
        let id = ConnectionId::from_bytes([0xAB; 16]);
        assert_eq!(id.to_string(), "ab".repeat(16));
        assert_eq!(id.to_string().parse::<ConnectionId>().unwrap(), id);
    }

    #[test]
    fn parse_rejects_uppercase() {
        let upper = "AB".repeat(16);
        assert_eq!(upper.parse::<ConnectionId>(), Err(InvalidConnectionId));
    }

    #[test]
    fn parse_rejects_wrong_length_and_non_hex() {
        assert!("".parse::<ConnectionId>().is_err());
        assert!("abc".parse::<ConnectionId>().is_err());
        assert!("ab".repeat(17).parse::<ConnectionId>().is_err());
        assert!("zz".repeat(16).parse::<ConnectionId>().is_err());
    }

    #[test]
    fn serializes_as_json_string() {
        let id = ConnectionId::from_bytes([0x01; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(16)));
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
