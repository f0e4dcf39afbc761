//! Frame envelope and typed messages.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::stats::Stats;

/// Message type carried in the first slot of the `emit` array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `hello`: node login.
    Hello,
    /// `ready`: login accepted.
    Ready,
    /// `un-authorization`: login rejected.
    Unauthorized,
    /// `node-ping`: keepalive probe from the node.
    NodePing,
    /// `node-pong`: keepalive answer from the relay.
    NodePong,
    /// `latency`: measured round trip.
    Latency,
    /// `stats`: status report.
    Stats,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Ready => "ready",
            Self::Unauthorized => "un-authorization",
            Self::NodePing => "node-ping",
            Self::NodePong => "node-pong",
            Self::Latency => "latency",
            Self::Stats => "stats",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hello" => Ok(Self::Hello),
            "ready" => Ok(Self::Ready),
            "un-authorization" => Ok(Self::Unauthorized),
            "node-ping" => Ok(Self::NodePing),
            "node-pong" => Ok(Self::NodePong),
            "latency" => Ok(Self::Latency),
            "stats" => Ok(Self::Stats),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Login payload of a `hello` frame.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Node identity, unique among authenticated sessions.
    pub id: String,
    /// Shared secret.
    pub secret: String,
}

impl fmt::Debug for Hello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hello")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Health of the node process as reported by the node itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// The chain client is running.
    #[default]
    Running,
    /// The chain client process is down.
    Stopped,
}

/// Payload of a `node-ping` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePing {
    /// Node identity.
    pub id: String,
    /// Node-local send time, informational only.
    #[serde(rename = "clientTime")]
    pub client_time: String,
    /// Absent in reporters that do not probe the node process.
    #[serde(rename = "nodeStatus", default)]
    pub node_status: NodeStatus,
}

/// Payload of a `latency` frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latency {
    /// Node identity.
    pub id: String,
    /// Round trip in milliseconds, as a decimal string.
    pub latency: String,
}

/// A decoded protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Node login.
    Hello(Hello),
    /// Login accepted.
    Ready,
    /// Login rejected, with a human-readable reason.
    Unauthorized(String),
    /// Keepalive probe.
    NodePing(NodePing),
    /// Keepalive answer, echoing the node id.
    NodePong(String),
    /// Measured round trip.
    Latency(Latency),
    /// Status report.
    Stats(Box<Stats>),
}

impl Message {
    /// Type tag of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::Ready => MessageType::Ready,
            Self::Unauthorized(_) => MessageType::Unauthorized,
            Self::NodePing(_) => MessageType::NodePing,
            Self::NodePong(_) => MessageType::NodePong,
            Self::Latency(_) => MessageType::Latency,
            Self::Stats(_) => MessageType::Stats,
        }
    }

    /// Serialise into a `{"emit": [type, payload?]}` frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the payload cannot be serialised.
    pub fn encode(&self) -> Result<Bytes> {
        let message_type = self.message_type();
        match self {
            Self::Ready => encode_bare(message_type),
            Self::Hello(hello) => encode_with(message_type, hello),
            Self::Unauthorized(reason) => encode_with(message_type, reason),
            Self::NodePing(ping) => encode_with(message_type, ping),
            Self::NodePong(id) => encode_with(message_type, id),
            Self::Latency(latency) => encode_with(message_type, latency),
            Self::Stats(stats) => encode_with(message_type, stats),
        }
    }
}

fn encode_bare(message_type: MessageType) -> Result<Bytes> {
    #[derive(Serialize)]
    struct Envelope {
        emit: (&'static str,),
    }

    serde_json::to_vec(&Envelope {
        emit: (message_type.as_str(),),
    })
    .map(Bytes::from)
    .map_err(ProtocolError::Encode)
}

fn encode_with<P: Serialize>(message_type: MessageType, payload: &P) -> Result<Bytes> {
    #[derive(Serialize)]
    struct Envelope<'a, P> {
        emit: (&'static str, &'a P),
    }

    serde_json::to_vec(&Envelope {
        emit: (message_type.as_str(), payload),
    })
    .map(Bytes::from)
    .map_err(ProtocolError::Encode)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IncomingEnvelope {
    emit: Vec<Value>,
}

/// A frame whose envelope and type have been decoded but whose payload has not.
///
/// Splitting the two steps lets the relay tell an undecodable envelope apart
/// from a malformed payload of a known type.
#[derive(Clone, Debug)]
pub struct Frame {
    message_type: MessageType,
    payload: Option<Value>,
}

impl Frame {
    /// Decode the envelope of a raw frame.
    ///
    /// # Errors
    ///
    /// Fails if the frame is not a JSON object with exactly one `emit` key,
    /// if `emit` does not start with a string, or if that string is not a
    /// known message type.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let envelope: IncomingEnvelope =
            serde_json::from_slice(data).map_err(ProtocolError::InvalidEnvelope)?;

        let mut emit = envelope.emit.into_iter();
        let message_type = match emit.next() {
            Some(Value::String(name)) => name.parse()?,
            _ => return Err(ProtocolError::MissingType),
        };

        Ok(Self {
            message_type,
            payload: emit.next(),
        })
    }

    /// Type of the frame.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Decode the payload as `T`.
    ///
    /// # Errors
    ///
    /// Fails if the payload is absent or does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self
            .payload
            .as_ref()
            .ok_or(ProtocolError::MissingPayload(self.message_type))?;

        T::deserialize(payload).map_err(|source| ProtocolError::InvalidPayload {
            message_type: self.message_type,
            source,
        })
    }

    /// Decode the full message.
    ///
    /// # Errors
    ///
    /// Fails if the payload does not match the frame's type.
    pub fn message(&self) -> Result<Message> {
        Ok(match self.message_type {
            MessageType::Hello => Message::Hello(self.payload()?),
            MessageType::Ready => Message::Ready,
            MessageType::Unauthorized => Message::Unauthorized(match self.payload {
                Some(Value::String(ref reason)) => reason.clone(),
                _ => String::new(),
            }),
            MessageType::NodePing => Message::NodePing(self.payload()?),
            MessageType::NodePong => Message::NodePong(self.payload()?),
            MessageType::Latency => Message::Latency(self.payload()?),
            MessageType::Stats => Message::Stats(Box::new(self.payload()?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{Block, NodeInfo};

    #[test]
    fn test_ready_has_no_payload_slot() {
        let encoded = Message::Ready.encode().unwrap();
        assert_eq!(&encoded[..], br#"{"emit":["ready"]}"#);
    }

    #[test]
    fn test_hello_wire_shape() {
        let hello = Message::Hello(Hello {
            id: "n1".to_string(),
            secret: "S".to_string(),
        });

        let encoded = hello.encode().unwrap();
        assert_eq!(
            &encoded[..],
            br#"{"emit":["hello",{"id":"n1","secret":"S"}]}"#
        );

        let decoded = Frame::decode(&encoded).unwrap().message().unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn test_node_ping_defaults_to_running() {
        let frame =
            Frame::decode(br#"{"emit":["node-ping",{"id":"n1","clientTime":"t0"}]}"#).unwrap();

        let ping: NodePing = frame.payload().unwrap();
        assert_eq!(ping.node_status, NodeStatus::Running);

        let stopped = Frame::decode(
            br#"{"emit":["node-ping",{"id":"n1","clientTime":"t0","nodeStatus":"stopped"}]}"#,
        )
        .unwrap();
        let ping: NodePing = stopped.payload().unwrap();
        assert_eq!(ping.node_status, NodeStatus::Stopped);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = Frame::decode(br#"{"emit":["history",{}]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(name) if name == "history"));
    }

    #[test]
    fn test_envelope_must_have_only_emit() {
        assert!(matches!(
            Frame::decode(br#"{"emit":["ready"],"extra":1}"#),
            Err(ProtocolError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            Frame::decode(b"not json"),
            Err(ProtocolError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            Frame::decode(br#"{"emit":[]}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            Frame::decode(br#"{"emit":[7,"x"]}"#),
            Err(ProtocolError::MissingType)
        ));
    }

    #[test]
    fn test_malformed_payload_keeps_type() {
        let frame = Frame::decode(br#"{"emit":["hello","not-an-object"]}"#).unwrap();
        assert_eq!(frame.message_type(), MessageType::Hello);

        let err = frame.message().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                message_type: MessageType::Hello,
                ..
            }
        ));

        let frame = Frame::decode(br#"{"emit":["latency"]}"#).unwrap();
        assert!(matches!(
            frame.message(),
            Err(ProtocolError::MissingPayload(MessageType::Latency))
        ));
    }

    #[test]
    fn test_unauthorized_reason_is_optional() {
        let frame = Frame::decode(br#"{"emit":["un-authorization","bad secret"]}"#).unwrap();
        assert_eq!(
            frame.message().unwrap(),
            Message::Unauthorized("bad secret".to_string())
        );

        let frame = Frame::decode(br#"{"emit":["un-authorization"]}"#).unwrap();
        assert_eq!(frame.message().unwrap(), Message::Unauthorized(String::new()));
    }

    #[test]
    fn test_stats_field_names() {
        let stats = Stats {
            active: true,
            peer_count: 25,
            pending: 3,
            gas_price: 1_000_000_000,
            syncing: false,
            node_info: NodeInfo {
                id: "n1".to_string(),
                os_platform: "x86_64".to_string(),
                os: "linux".to_string(),
                ..NodeInfo::default()
            },
            block: Block {
                number: 484_645,
                hash: "0xabc".to_string(),
                difficulty: 0,
                time: 1_690_774_181,
            },
        };

        let encoded = Message::Stats(Box::new(stats.clone())).encode().unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        let payload = &value["emit"][1];

        assert_eq!(payload["PeerCount"], 25);
        assert_eq!(payload["NodeInfo"]["Id"], "n1");
        assert_eq!(payload["NodeInfo"]["OSPlatform"], "x86_64");
        assert_eq!(payload["NodeInfo"]["OS"], "linux");
        assert_eq!(payload["Block"]["Number"], 484_645);

        let decoded = Frame::decode(&encoded).unwrap().message().unwrap();
        assert_eq!(decoded, Message::Stats(Box::new(stats)));
    }

    #[test]
    fn test_hello_debug_redacts_secret() {
        let hello = Hello {
            id: "n1".to_string(),
            secret: "hunter2".to_string(),
        };
        assert!(!format!("{hello:?}").contains("hunter2"));
    }
}
