//! Wire protocol for Earshot.
//!
//! This crate defines what clients and the relay say to each other:
//!
//! - **Identity** ([`PeerId`]): the 12-byte identifier minted for every
//!   accepted connection, rendered as 24 hex characters on the wire.
//! - **Commands** ([`Command`], [`Payload`], [`Op`]): the signaling
//!   envelope `{"op", "subject", "payload"}` with the payload shape
//!   validated per op at decode time.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw text frames) and the
//! session registry. It knows nothing about connections or players being
//! online; it only turns bytes into well-formed commands and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Command) → Session registry
//! ```

mod codec;
mod command;
mod error;
mod peer;

pub use codec::{Codec, JsonCodec};
pub use command::{
    Command, ConnectPayload, ErrorPayload, JoinPayload, Op, Payload, RawPayload,
    VolumePayload,
};
pub use error::ProtocolError;
pub use peer::PeerId;
