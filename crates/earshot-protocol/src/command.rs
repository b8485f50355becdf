//! Signaling commands exchanged between clients and the relay.
//!
//! Every message on the wire is a JSON object of the form
//!
//! ```json
//! {"op": "set_ice", "subject": "65f1c0de0a1b2c3d4e5f6071", "payload": {...}}
//! ```
//!
//! The meaning of `subject` depends on direction. Inbound, it names the
//! peer the sender wants to reach (or is absent, for `connect`). Outbound,
//! the relay rewrites it to name the peer the message is *about*.
//!
//! The shape of `payload` depends on `op`, so decoding goes through an
//! untyped [`WireCommand`] first and is then validated into a [`Payload`]
//! variant. A command that decodes successfully is always well formed.
//!
//! `set_ice` and `set_session` payloads are never parsed: they are kept as
//! the exact JSON text the sender wrote and written back out unchanged.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::{PeerId, ProtocolError};

// ---------------------------------------------------------------------------
// Op
// ---------------------------------------------------------------------------

/// The operation a command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Client → relay: claim a player. Relay → client: claim accepted.
    Connect,
    /// Relay → client: start negotiating with `subject`.
    Join,
    /// Relay → client: `subject` has gone away.
    Part,
    /// Either direction: opaque ICE candidate data.
    SetIce,
    /// Either direction: opaque session description data.
    SetSession,
    /// Relay → client: play `subject` at this volume.
    SetVolume,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Connect => "connect",
            Op::Join => "join",
            Op::Part => "part",
            Op::SetIce => "set_ice",
            Op::SetSession => "set_session",
            Op::SetVolume => "set_volume",
        }
    }

    fn parse(s: &str) -> Result<Self, ProtocolError> {
        Ok(match s {
            "connect" => Op::Connect,
            "join" => Op::Join,
            "part" => Op::Part,
            "set_ice" => Op::SetIce,
            "set_session" => Op::SetSession,
            "set_volume" => Op::SetVolume,
            other => return Err(ProtocolError::UnknownOp(other.to_owned())),
        })
    }

    /// Whether clients are allowed to send this op. `join`, `part` and
    /// `set_volume` are only ever produced by the relay.
    pub fn is_client_op(self) -> bool {
        matches!(self, Op::Connect | Op::SetIce | Op::SetSession)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `connect` payload: the in-game name being claimed (client → relay) or
/// the name that was claimed (relay → client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub player: String,
}

/// `join` payload. Exactly one side of each pair gets `initiate: true`
/// and is expected to create the WebRTC offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub initiate: bool,
}

/// `set_volume` payload, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePayload {
    pub volume: f64,
}

/// A business-rule rejection sent back to the client that caused it.
///
/// Serializes as a bare `{"error": "..."}` with no `op`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Opaque JSON carried by `set_ice` and `set_session`.
///
/// Holds the sender's text as-is, so key order, whitespace inside the
/// value, and number literals such as `1.10` survive the relay.
#[derive(Debug, Clone)]
pub struct RawPayload(Box<RawValue>);

impl RawPayload {
    /// Wraps `text`, which must be exactly one JSON value.
    pub fn from_json(text: impl Into<String>) -> Result<Self, ProtocolError> {
        RawValue::from_string(text.into())
            .map(Self)
            .map_err(ProtocolError::Decode)
    }

    /// JSON `null`, used when the sender omitted the payload.
    pub fn null() -> Self {
        Self(RawValue::NULL.to_owned())
    }

    /// The JSON text exactly as received.
    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for RawPayload {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Serialize for RawPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl fmt::Display for RawPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get())
    }
}

/// The payload of a command, tagged by its op.
///
/// `SetIce` and `SetSession` carry arbitrary JSON that the relay forwards
/// without looking inside.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Connect(ConnectPayload),
    Join(JoinPayload),
    Part,
    SetIce(RawPayload),
    SetSession(RawPayload),
    SetVolume(VolumePayload),
}

impl Payload {
    pub fn op(&self) -> Op {
        match self {
            Payload::Connect(_) => Op::Connect,
            Payload::Join(_) => Op::Join,
            Payload::Part => Op::Part,
            Payload::SetIce(_) => Op::SetIce,
            Payload::SetSession(_) => Op::SetSession,
            Payload::SetVolume(_) => Op::SetVolume,
        }
    }

    fn from_wire(op: Op, payload: Option<Box<RawValue>>) -> Result<Self, ProtocolError> {
        fn typed<T: serde::de::DeserializeOwned>(
            op: Op,
            payload: Option<Box<RawValue>>,
        ) -> Result<T, ProtocolError> {
            let raw = payload.ok_or_else(|| ProtocolError::InvalidPayload {
                op,
                reason: "missing payload".into(),
            })?;
            serde_json::from_str(raw.get()).map_err(|e| ProtocolError::InvalidPayload {
                op,
                reason: e.to_string(),
            })
        }

        Ok(match op {
            Op::Connect => Payload::Connect(typed(op, payload)?),
            Op::Join => Payload::Join(typed(op, payload)?),
            Op::Part => Payload::Part,
            Op::SetIce => Payload::SetIce(payload.map_or_else(RawPayload::null, RawPayload)),
            Op::SetSession => {
                Payload::SetSession(payload.map_or_else(RawPayload::null, RawPayload))
            }
            Op::SetVolume => Payload::SetVolume(typed(op, payload)?),
        })
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One signaling message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireCommand")]
pub struct Command {
    pub subject: Option<PeerId>,
    pub payload: Payload,
}

/// Untyped envelope used only as an intermediate step while decoding.
#[derive(Deserialize)]
struct WireCommand {
    op: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
}

impl TryFrom<WireCommand> for Command {
    type Error = ProtocolError;

    fn try_from(wire: WireCommand) -> Result<Self, Self::Error> {
        let op = Op::parse(&wire.op)?;
        let subject = wire.subject.map(|s| s.parse()).transpose()?;
        let payload = Payload::from_wire(op, wire.payload)?;
        Ok(Self { subject, payload })
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut len = 1;
        if self.subject.is_some() {
            len += 1;
        }
        if !matches!(self.payload, Payload::Part) {
            len += 1;
        }

        let mut state = serializer.serialize_struct("Command", len)?;
        state.serialize_field("op", &self.op())?;
        if let Some(subject) = &self.subject {
            state.serialize_field("subject", subject)?;
        }
        match &self.payload {
            Payload::Connect(p) => state.serialize_field("payload", p)?,
            Payload::Join(p) => state.serialize_field("payload", p)?,
            Payload::Part => {}
            Payload::SetIce(v) | Payload::SetSession(v) => {
                state.serialize_field("payload", v)?
            }
            Payload::SetVolume(p) => state.serialize_field("payload", p)?,
        }
        state.end()
    }
}

impl Command {
    pub fn op(&self) -> Op {
        self.payload.op()
    }

    /// `connect` confirming that `subject` now holds `player`.
    pub fn connect(subject: PeerId, player: impl Into<String>) -> Self {
        Self {
            subject: Some(subject),
            payload: Payload::Connect(ConnectPayload { player: player.into() }),
        }
    }

    /// `join` introducing `subject` to the recipient.
    pub fn join(subject: PeerId, initiate: bool) -> Self {
        Self {
            subject: Some(subject),
            payload: Payload::Join(JoinPayload { initiate }),
        }
    }

    /// `part` announcing that `subject` disconnected.
    pub fn part(subject: PeerId) -> Self {
        Self { subject: Some(subject), payload: Payload::Part }
    }

    /// `set_volume` telling the recipient how loud `subject` should be.
    pub fn set_volume(subject: PeerId, volume: f64) -> Self {
        Self {
            subject: Some(subject),
            payload: Payload::SetVolume(VolumePayload { volume }),
        }
    }
}
