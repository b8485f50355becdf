//! Source RCON client.
//!
//! Wire format, all integers little-endian:
//!
//! ```text
//! | i32 length | i32 request id | i32 type | body bytes | 0x00 0x00 |
//! ```
//!
//! `length` counts everything after itself. Authentication sends type 3
//! and expects a type 2 reply carrying the same id, or id -1 on a bad
//! password. Commands are sent as type 2 and answered with type 0.
//!
//! Replies are read into a buffer owned by the connection and only cut
//! into packets once complete. A command abandoned at its timeout
//! leaves any partial reply in that buffer, and the next command picks
//! up at the right frame boundary.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::{GameChannel, TelemetryError};

const TYPE_RESPONSE: i32 = 0;
const TYPE_EXEC: i32 = 2;
const TYPE_AUTH_RESPONSE: i32 = 2;
const TYPE_AUTH: i32 = 3;

/// id + type + two terminating nulls.
const HEADER_LEN: usize = 10;

/// Largest packet accepted in either direction.
const MAX_PACKET: usize = 64 * 1024;

struct Packet {
    id: i32,
    kind: i32,
    body: String,
}

struct Stream {
    socket: TcpStream,
    /// Bytes received but not yet returned as a packet.
    inbound: Vec<u8>,
    next_id: i32,
}

impl Stream {
    fn new(socket: TcpStream) -> Self {
        Self { socket, inbound: Vec::with_capacity(4096), next_id: 1 }
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if id == i32::MAX { 1 } else { id + 1 };
        id
    }

    async fn write_packet(&mut self, id: i32, kind: i32, body: &str) -> Result<(), TelemetryError> {
        let length = HEADER_LEN + body.len();
        if length > MAX_PACKET {
            return Err(TelemetryError::PacketTooLarge(length));
        }

        let mut buf = Vec::with_capacity(4 + length);
        buf.extend_from_slice(&(length as i32).to_le_bytes());
        buf.extend_from_slice(&id.to_le_bytes());
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        self.socket.write_all(&buf).await?;
        Ok(())
    }

    /// Reads until one whole packet is buffered.
    ///
    /// Cancel-safe: bytes are only ever appended to `inbound` after a
    /// completed read, and removed from it once a full frame is present.
    async fn read_packet(&mut self) -> Result<Packet, TelemetryError> {
        loop {
            if let Some(packet) = self.buffered_packet()? {
                return Ok(packet);
            }
            if self.socket.read_buf(&mut self.inbound).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "RCON connection closed mid-packet",
                )
                .into());
            }
        }
    }

    /// Cuts the next packet off the front of `inbound`, if it is all there.
    fn buffered_packet(&mut self) -> Result<Option<Packet>, TelemetryError> {
        let Some(prefix) = self.inbound.get(..4) else {
            return Ok(None);
        };
        let length = i32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let length = usize::try_from(length)
            .map_err(|_| TelemetryError::Parse(format!("negative RCON length {length}")))?;
        if length > MAX_PACKET {
            return Err(TelemetryError::PacketTooLarge(length));
        }
        if length < HEADER_LEN {
            return Err(TelemetryError::Parse(format!("short RCON packet ({length} bytes)")));
        }
        if self.inbound.len() < 4 + length {
            return Ok(None);
        }

        let frame: Vec<u8> = self.inbound.drain(..4 + length).skip(4).collect();
        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let kind = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let body = String::from_utf8_lossy(&frame[8..length - 2]).into_owned();
        Ok(Some(Packet { id, kind, body }))
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), TelemetryError> {
        let id = self.allocate_id();
        self.write_packet(id, TYPE_AUTH, password).await?;
        loop {
            let packet = self.read_packet().await?;
            match packet.kind {
                TYPE_AUTH_RESPONSE if packet.id == -1 => return Err(TelemetryError::AuthRejected),
                TYPE_AUTH_RESPONSE if packet.id == id => return Ok(()),
                // Some servers send an empty response value before the auth result.
                _ => trace!(id = packet.id, kind = packet.kind, "skipping packet during auth"),
            }
        }
    }

    async fn round_trip(&mut self, command: &str) -> Result<String, TelemetryError> {
        let id = self.allocate_id();
        self.write_packet(id, TYPE_EXEC, command).await?;
        loop {
            let packet = self.read_packet().await?;
            if packet.kind == TYPE_RESPONSE && packet.id == id {
                return Ok(packet.body);
            }
            // Left over from a command that timed out earlier.
            trace!(id = packet.id, expected = id, "discarding stale RCON response");
        }
    }
}

/// A [`GameChannel`] over one authenticated RCON connection.
///
/// Commands are serialised: one is outstanding at a time. Every round
/// trip, including connecting, is bounded by the timeout given to
/// [`connect`](Self::connect).
pub struct RconChannel {
    stream: Mutex<Stream>,
    timeout: Duration,
}

impl RconChannel {
    /// Dials `addr` and authenticates with `password`.
    pub async fn connect(
        addr: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        let stream = bounded(timeout, async {
            let socket = TcpStream::connect(addr).await?;
            socket.set_nodelay(true)?;
            let mut stream = Stream::new(socket);
            stream.authenticate(password).await?;
            Ok::<_, TelemetryError>(stream)
        })
        .await?;

        debug!(addr, "RCON channel authenticated");
        Ok(Self { stream: Mutex::new(stream), timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl GameChannel for RconChannel {
    async fn execute(&self, command: &str) -> Result<String, TelemetryError> {
        let mut stream = self.stream.lock().await;
        let reply = bounded(self.timeout, stream.round_trip(command)).await?;
        trace!(command, reply = %reply, "RCON command");
        Ok(reply)
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, TelemetryError>>,
) -> Result<T, TelemetryError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TelemetryError::Timeout(limit))?
}
