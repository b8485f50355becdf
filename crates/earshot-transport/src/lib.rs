//! Transport abstraction layer for Earshot.
//!
//! Provides the [`Transport`] and [`Connection`] traits that the signaling
//! layer is written against, plus a WebSocket implementation.
//!
//! The signaling registry holds connections behind a generic `C:
//! Connection` and calls them from spawned tasks, so every method on
//! [`Connection`] returns a `Send` future.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::future::Future;
use std::net::SocketAddr;

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// A single duplex connection that carries whole text messages.
///
/// Sending and receiving are independent: a task blocked in
/// [`recv`](Connection::recv) never delays another task's
/// [`send`](Connection::send) or [`close`](Connection::close).
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one message to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection. The remote side's pending `recv` observes
    /// the close shortly after.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The remote address, for logging.
    fn peer_addr(&self) -> Option<SocketAddr>;
}
