//! The session registry: who is connected, who they claim to be, and
//! the signaling that flows between them.
//!
//! # Locking
//!
//! All tables sit behind one `tokio::sync::Mutex`. Every operation that
//! sends to several peers (introductions, `part`, volume) does so while
//! holding it, so no client ever sees a `join` for a peer whose `part`
//! was already broadcast, or the other way round.
//!
//! Because of that, each write is bounded by the registry's write timeout.
//! A peer whose socket stops draining costs at most that long per message
//! and never stalls the tables for everyone else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use earshot_protocol::{Codec, Command, ErrorPayload, JsonCodec, Payload, PeerId};
use earshot_telemetry::{TelemetryEvent, WorldView};
use earshot_transport::Connection;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::session::Session;
use crate::{Rejection, SessionError, SessionState, proximity_volume};

/// Upper bound on one outbound write unless configured otherwise.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

struct Tables<C> {
    peers: HashMap<PeerId, Session<C>>,
    /// player name → the session holding it. Mirrors `Claimed` states.
    claims: HashMap<String, PeerId>,
}

/// Binds connections to players and brokers signaling between them.
///
/// Generic over the transport's [`Connection`] and the telemetry
/// [`WorldView`] so both can be faked in tests.
pub struct Registry<C, W> {
    world: W,
    codec: JsonCodec,
    write_timeout: Duration,
    tables: Mutex<Tables<C>>,
}

impl<C: Connection, W: WorldView> Registry<C, W> {
    pub fn new(world: W) -> Self {
        Self {
            world,
            codec: JsonCodec,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            tables: Mutex::new(Tables { peers: HashMap::new(), claims: HashMap::new() }),
        }
    }

    /// Bounds every outbound write by `timeout`. A write that does not
    /// finish in time is abandoned and logged like any other write failure.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// The world view volume and roster checks are made against.
    pub fn world(&self) -> &W {
        &self.world
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Registers a freshly accepted connection as an unclaimed session.
    pub async fn register(&self, conn: Arc<C>) -> PeerId {
        let peer = PeerId::generate();
        let addr = conn.peer_addr();
        self.tables.lock().await.peers.insert(peer, Session::new(peer, conn));
        info!(%peer, ?addr, "session registered");
        peer
    }

    /// Claims `player` for `peer` and introduces it to every other
    /// claimed session.
    ///
    /// On a rejection the client is sent `{"error": ...}` and nothing else
    /// changes.
    pub async fn claim(&self, peer: PeerId, player: &str) -> Result<(), SessionError> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.peers.get(&peer) else {
            return Err(SessionError::UnknownPeer(peer));
        };
        let conn = Arc::clone(&session.conn);

        let rejection = if session.state.is_claimed() {
            Some(Rejection::SessionAlreadyClaimed)
        } else if !self.world.is_online(player) {
            Some(Rejection::NoSuchPlayer)
        } else if tables.claims.contains_key(player) {
            Some(Rejection::PlayerAlreadyClaimed)
        } else {
            None
        };
        if let Some(rejection) = rejection {
            debug!(%peer, player, %rejection, "claim rejected");
            self.send(&conn, &ErrorPayload::new(rejection.message())).await;
            return Err(SessionError::Rejected(rejection));
        }

        let others: Vec<(PeerId, Arc<C>)> = tables
            .peers
            .values()
            .filter(|s| s.state.is_claimed())
            .map(|s| (s.peer, Arc::clone(&s.conn)))
            .collect();
        for (other, other_conn) in &others {
            self.send(&conn, &Command::join(*other, true)).await;
            self.send(other_conn, &Command::join(peer, false)).await;
        }

        tables.claims.insert(player.to_owned(), peer);
        if let Some(session) = tables.peers.get_mut(&peer) {
            session.state = SessionState::Claimed { player: player.to_owned() };
        }
        self.send(&conn, &Command::connect(peer, player)).await;

        info!(%peer, player, introduced = others.len(), "player claimed");
        Ok(())
    }

    /// Forwards a `set_ice`/`set_session` from `peer` to the session named
    /// by its subject, rewriting the subject to `peer`.
    pub async fn relay(&self, peer: PeerId, mut command: Command) -> Result<(), SessionError> {
        let op = command.op();
        if !matches!(command.payload, Payload::SetIce(_) | Payload::SetSession(_)) {
            return Err(SessionError::ServerOnlyOp(op));
        }

        let tables = self.tables.lock().await;
        let sender = tables.peers.get(&peer).ok_or(SessionError::UnknownPeer(peer))?;
        if !sender.state.is_claimed() {
            return Err(SessionError::NotClaimed(peer));
        }
        let target = command.subject.ok_or(SessionError::MissingSubject(op))?;
        let recipient = tables
            .peers
            .get(&target)
            .filter(|s| s.state.is_claimed())
            .ok_or(SessionError::UnknownSubject(target))?;

        command.subject = Some(peer);
        self.send(&recipient.conn, &command).await;
        debug!(from = %peer, to = %target, %op, "relayed");
        Ok(())
    }

    /// Removes `peer`, releases its claim, and tells every remaining
    /// claimed session it is gone.
    ///
    /// Returns `false` (and does nothing) if `peer` was not registered.
    pub async fn disconnect(&self, peer: PeerId) -> bool {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.peers.remove(&peer) else {
            return false;
        };
        if let Some(player) = session.state.player() {
            if tables.claims.get(player) == Some(&peer) {
                tables.claims.remove(player);
            }
        }

        let part = Command::part(peer);
        let mut notified = 0;
        for other in tables.peers.values().filter(|s| s.state.is_claimed()) {
            self.send(&other.conn, &part).await;
            notified += 1;
        }

        info!(%peer, player = session.state.player(), notified, "session disconnected");
        true
    }

    /// Drops whoever holds `player`: closes their transport, then
    /// disconnects their session. Returns `false` if nobody held it.
    pub async fn evict(&self, player: &str) -> bool {
        let (peer, conn) = {
            let tables = self.tables.lock().await;
            let Some(&peer) = tables.claims.get(player) else {
                return false;
            };
            let Some(session) = tables.peers.get(&peer) else {
                return false;
            };
            (peer, Arc::clone(&session.conn))
        };

        if let Err(e) = conn.close().await {
            debug!(%peer, error = %e, "close failed during eviction");
        }
        info!(%peer, player, "evicting session: player left the game");
        self.disconnect(peer).await
    }

    /// Tells every other claimed session how loud `player` should be now.
    ///
    /// Nothing is sent if `player` is not claimed.
    pub async fn volume_changed(&self, player: &str) {
        let tables = self.tables.lock().await;
        let Some(&mover) = tables.claims.get(player) else {
            return;
        };

        for (listener_player, listener) in &tables.claims {
            if *listener == mover {
                continue;
            }
            let Some(session) = tables.peers.get(listener) else {
                continue;
            };
            let volume = proximity_volume(self.world.distance(player, listener_player));
            self.send(&session.conn, &Command::set_volume(mover, volume)).await;
        }
    }

    // -----------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------

    /// Decodes one inbound message from `peer` and acts on it.
    ///
    /// Protocol errors are returned for the caller to log; the connection
    /// should stay open.
    pub async fn handle_message(&self, peer: PeerId, bytes: &[u8]) -> Result<(), SessionError> {
        let command: Command = self.codec.decode(bytes)?;
        match command.payload {
            Payload::Connect(ref connect) => self.claim(peer, &connect.player).await,
            Payload::SetIce(_) | Payload::SetSession(_) => self.relay(peer, command).await,
            Payload::Join(_) | Payload::Part | Payload::SetVolume(_) => {
                Err(SessionError::ServerOnlyOp(command.op()))
            }
        }
    }

    /// Reacts to a change observed by the telemetry poller.
    pub async fn handle_event(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Left(player) => {
                self.evict(&player).await;
            }
            TelemetryEvent::Moved { player, .. } => self.volume_changed(&player).await,
            TelemetryEvent::Joined(player) => debug!(%player, "player joined the game"),
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// State of `peer`, or `None` if it is not registered.
    pub async fn state_of(&self, peer: PeerId) -> Option<SessionState> {
        self.tables.lock().await.peers.get(&peer).map(|s| s.state.clone())
    }

    /// The session holding `player`, if any.
    pub async fn claimant(&self, player: &str) -> Option<PeerId> {
        self.tables.lock().await.claims.get(player).copied()
    }

    /// Registered sessions, claimed or not.
    pub async fn len(&self) -> usize {
        self.tables.lock().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn claimed_count(&self) -> usize {
        self.tables.lock().await.claims.len()
    }

    async fn send<T: Serialize>(&self, conn: &C, message: &T) {
        let bytes = match self.codec.encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "failed to encode outbound message");
                return;
            }
        };
        match tokio::time::timeout(self.write_timeout, conn.send(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(addr = ?conn.peer_addr(), error = %e, "write to peer failed"),
            Err(_) => warn!(
                addr = ?conn.peer_addr(),
                timeout_ms = self.write_timeout.as_millis() as u64,
                "write to peer timed out"
            ),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `Registry`.
    //!
    //! Connections are recorded in memory and the world is a fixed map,
    //! so every test can look at exactly what each client was sent.

    use std::collections::{BTreeSet, HashMap};
    use std::net::SocketAddr;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use earshot_telemetry::Position;
    use serde_json::{Value, json};

    use super::*;

    // -- Fakes ------------------------------------------------------------

    #[derive(Default)]
    struct MockConn {
        /// Frames exactly as written.
        sent: StdMutex<Vec<String>>,
        closed: AtomicBool,
        broken: AtomicBool,
        stalled: AtomicBool,
    }

    impl MockConn {
        fn broken() -> Arc<Self> {
            let conn = Self::default();
            conn.broken.store(true, Ordering::SeqCst);
            Arc::new(conn)
        }

        /// A connection whose writes never complete.
        fn stalled() -> Arc<Self> {
            let conn = Self::default();
            conn.stalled.store(true, Ordering::SeqCst);
            Arc::new(conn)
        }

        /// Everything sent so far as JSON, clearing the record.
        fn take(&self) -> Vec<Value> {
            self.take_text()
                .iter()
                .map(|text| serde_json::from_str(text).expect("registry sends JSON"))
                .collect()
        }

        /// Everything sent so far as raw text, clearing the record.
        fn take_text(&self) -> Vec<String> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Connection for MockConn {
        type Error = std::io::Error;

        async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
            }
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let text = String::from_utf8(data.to_vec()).expect("registry sends text");
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), Self::Error> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            None
        }
    }

    #[derive(Default)]
    struct FixedWorld {
        online: BTreeSet<String>,
        positions: HashMap<String, Position>,
    }

    impl FixedWorld {
        fn with(players: &[(&str, f64)]) -> Self {
            let mut world = Self::default();
            for &(name, x) in players {
                world.online.insert(name.to_string());
                world.positions.insert(name.to_string(), Position::new(x, 64.0, 0.0));
            }
            world
        }
    }

    impl WorldView for FixedWorld {
        fn is_online(&self, player: &str) -> bool {
            self.online.contains(player)
        }

        fn distance(&self, a: &str, b: &str) -> f64 {
            match (self.positions.get(a), self.positions.get(b)) {
                (Some(pa), Some(pb)) => pa.distance(pb),
                _ => 0.0,
            }
        }
    }

    type TestRegistry = Registry<MockConn, FixedWorld>;

    // -- Helpers ----------------------------------------------------------

    fn registry() -> TestRegistry {
        Registry::new(FixedWorld::with(&[("alice", 0.0), ("bob", 10.0), ("carol", 40.0)]))
    }

    async fn connect(reg: &TestRegistry) -> (PeerId, Arc<MockConn>) {
        let conn = Arc::new(MockConn::default());
        let peer = reg.register(Arc::clone(&conn)).await;
        (peer, conn)
    }

    async fn claimed(reg: &TestRegistry, player: &str) -> (PeerId, Arc<MockConn>) {
        let (peer, conn) = connect(reg).await;
        reg.claim(peer, player).await.expect("claim should succeed");
        conn.take();
        (peer, conn)
    }

    fn msg(text: Value) -> Vec<u8> {
        serde_json::to_vec(&text).unwrap()
    }

    fn error(message: &str) -> Value {
        json!({ "error": message })
    }

    // =====================================================================
    // register()
    // =====================================================================

    #[tokio::test]
    async fn test_register_creates_unclaimed_session() {
        let reg = registry();
        let (peer, conn) = connect(&reg).await;

        assert_eq!(reg.state_of(peer).await, Some(SessionState::Unclaimed));
        assert_eq!(reg.len().await, 1);
        assert_eq!(reg.claimed_count().await, 0);
        assert!(conn.take().is_empty(), "register sends nothing");
    }

    #[tokio::test]
    async fn test_register_mints_distinct_ids() {
        let reg = registry();
        let (a, _) = connect(&reg).await;
        let (b, _) = connect(&reg).await;
        assert_ne!(a, b);
    }

    // =====================================================================
    // claim()
    // =====================================================================

    #[tokio::test]
    async fn test_claim_first_player_gets_connect_only() {
        let reg = registry();
        let (peer, conn) = connect(&reg).await;

        reg.claim(peer, "alice").await.unwrap();

        assert_eq!(
            conn.take(),
            vec![json!({"op": "connect", "subject": peer.to_string(), "payload": {"player": "alice"}})]
        );
        assert_eq!(
            reg.state_of(peer).await,
            Some(SessionState::Claimed { player: "alice".into() })
        );
        assert_eq!(reg.claimant("alice").await, Some(peer));
    }

    #[tokio::test]
    async fn test_claim_introduces_both_sides() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;
        let (bob, bob_conn) = connect(&reg).await;

        reg.claim(bob, "bob").await.unwrap();

        assert_eq!(
            bob_conn.take(),
            vec![
                json!({"op": "join", "subject": alice.to_string(), "payload": {"initiate": true}}),
                json!({"op": "connect", "subject": bob.to_string(), "payload": {"player": "bob"}}),
            ]
        );
        assert_eq!(
            alice_conn.take(),
            vec![json!({"op": "join", "subject": bob.to_string(), "payload": {"initiate": false}})]
        );
    }

    #[tokio::test]
    async fn test_claim_skips_unclaimed_sessions_when_introducing() {
        let reg = registry();
        let (_, lurker) = connect(&reg).await;
        let (bob, bob_conn) = connect(&reg).await;

        reg.claim(bob, "bob").await.unwrap();

        assert!(lurker.take().is_empty());
        assert_eq!(bob_conn.take().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_offline_player_is_rejected() {
        let reg = registry();
        let (peer, conn) = connect(&reg).await;

        let result = reg.claim(peer, "mallory").await;

        assert!(matches!(result, Err(SessionError::Rejected(Rejection::NoSuchPlayer))));
        assert_eq!(conn.take(), vec![error("No such in-game player.")]);
        assert_eq!(reg.state_of(peer).await, Some(SessionState::Unclaimed));
        assert_eq!(reg.claimed_count().await, 0);
    }

    #[tokio::test]
    async fn test_claim_taken_player_is_rejected_without_mutation() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;
        let (thief, thief_conn) = connect(&reg).await;

        let result = reg.claim(thief, "alice").await;

        assert!(matches!(result, Err(SessionError::Rejected(Rejection::PlayerAlreadyClaimed))));
        assert_eq!(thief_conn.take(), vec![error("Player session already claimed.")]);
        assert!(alice_conn.take().is_empty(), "holder is not disturbed");
        assert_eq!(reg.claimant("alice").await, Some(alice));
        assert_eq!(reg.state_of(thief).await, Some(SessionState::Unclaimed));
    }

    #[tokio::test]
    async fn test_claim_twice_from_same_session_is_rejected() {
        let reg = registry();
        let (peer, conn) = claimed(&reg, "alice").await;

        let result = reg.claim(peer, "bob").await;

        assert!(matches!(result, Err(SessionError::Rejected(Rejection::SessionAlreadyClaimed))));
        assert_eq!(conn.take(), vec![error("Session has already claimed a player.")]);
        assert_eq!(reg.claimant("bob").await, None);
        assert_eq!(reg.claimant("alice").await, Some(peer));
    }

    #[tokio::test]
    async fn test_claim_unknown_peer_is_error() {
        let reg = registry();
        let result = reg.claim(PeerId::generate(), "alice").await;
        assert!(matches!(result, Err(SessionError::UnknownPeer(_))));
    }

    // =====================================================================
    // relay()
    // =====================================================================

    #[tokio::test]
    async fn test_relay_rewrites_subject_and_forwards_payload() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;
        let (bob, bob_conn) = claimed(&reg, "bob").await;
        alice_conn.take();

        let inbound = json!({
            "op": "set_session",
            "subject": bob.to_string(),
            "payload": {"type": "offer", "sdp": "v=0"}
        });
        reg.handle_message(alice, &msg(inbound)).await.unwrap();

        assert_eq!(
            bob_conn.take(),
            vec![json!({
                "op": "set_session",
                "subject": alice.to_string(),
                "payload": {"type": "offer", "sdp": "v=0"}
            })]
        );
        assert!(alice_conn.take().is_empty());
    }

    #[tokio::test]
    async fn test_relay_payload_text_forwarded_byte_for_byte() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;
        let (bob, bob_conn) = claimed(&reg, "bob").await;
        alice_conn.take();

        let payload =
            r#"{"sdpMid":"0","candidate":"c","n":1.10,"big":123456789012345678901234567890}"#;
        let inbound = format!(r#"{{"op":"set_ice","subject":"{bob}","payload":{payload}}}"#);
        reg.handle_message(alice, inbound.as_bytes()).await.unwrap();

        assert_eq!(
            bob_conn.take_text(),
            vec![format!(r#"{{"op":"set_ice","subject":"{alice}","payload":{payload}}}"#)]
        );
    }

    #[tokio::test]
    async fn test_relay_from_unclaimed_is_dropped() {
        let reg = registry();
        let (bob, bob_conn) = claimed(&reg, "bob").await;
        let (lurker, lurker_conn) = connect(&reg).await;

        let inbound = json!({"op": "set_ice", "subject": bob.to_string(), "payload": {}});
        let result = reg.handle_message(lurker, &msg(inbound)).await;

        assert!(matches!(result, Err(SessionError::NotClaimed(p)) if p == lurker));
        assert!(bob_conn.take().is_empty());
        assert!(lurker_conn.take().is_empty(), "no client-visible error");
    }

    #[tokio::test]
    async fn test_relay_to_unknown_subject_is_dropped() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;
        let ghost = PeerId::generate();

        let inbound = json!({"op": "set_ice", "subject": ghost.to_string(), "payload": {}});
        let result = reg.handle_message(alice, &msg(inbound)).await;

        assert!(matches!(result, Err(SessionError::UnknownSubject(p)) if p == ghost));
        assert!(alice_conn.take().is_empty());
    }

    #[tokio::test]
    async fn test_relay_to_unclaimed_subject_is_dropped() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;
        let (lurker, lurker_conn) = connect(&reg).await;

        let inbound = json!({"op": "set_ice", "subject": lurker.to_string(), "payload": {}});
        let result = reg.handle_message(alice, &msg(inbound)).await;

        assert!(matches!(result, Err(SessionError::UnknownSubject(_))));
        assert!(lurker_conn.take().is_empty());
    }

    #[tokio::test]
    async fn test_relay_without_subject_is_dropped() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;

        let result = reg
            .handle_message(alice, &msg(json!({"op": "set_ice", "payload": {"c": 1}})))
            .await;

        assert!(matches!(result, Err(SessionError::MissingSubject(_))));
    }

    // =====================================================================
    // disconnect()
    // =====================================================================

    #[tokio::test]
    async fn test_disconnect_broadcasts_part_to_claimed_sessions() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;
        let (_, bob_conn) = claimed(&reg, "bob").await;
        let (_, lurker_conn) = connect(&reg).await;

        assert!(reg.disconnect(alice).await);

        assert_eq!(bob_conn.take(), vec![json!({"op": "part", "subject": alice.to_string()})]);
        assert!(lurker_conn.take().is_empty());
        assert_eq!(reg.state_of(alice).await, None);
        assert_eq!(reg.claimant("alice").await, None);
    }

    #[tokio::test]
    async fn test_disconnect_unclaimed_still_broadcasts_part() {
        let reg = registry();
        let (_, bob_conn) = claimed(&reg, "bob").await;
        let (lurker, _) = connect(&reg).await;

        assert!(reg.disconnect(lurker).await);

        assert_eq!(bob_conn.take(), vec![json!({"op": "part", "subject": lurker.to_string()})]);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;
        let (_, bob_conn) = claimed(&reg, "bob").await;

        assert!(reg.disconnect(alice).await);
        bob_conn.take();
        assert!(!reg.disconnect(alice).await);

        assert!(bob_conn.take().is_empty(), "second disconnect sends nothing");
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_releases_claim_for_next_session() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;
        reg.disconnect(alice).await;

        let (again, _) = connect(&reg).await;
        reg.claim(again, "alice").await.unwrap();

        assert_eq!(reg.claimant("alice").await, Some(again));
    }

    #[tokio::test]
    async fn test_disconnect_write_failure_does_not_stop_broadcast() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;
        let broken = MockConn::broken();
        let broken_peer = reg.register(Arc::clone(&broken)).await;
        // Claiming sends to the broken connection too; those writes fail quietly.
        reg.claim(broken_peer, "carol").await.unwrap();
        let (_, bob_conn) = claimed(&reg, "bob").await;

        assert!(reg.disconnect(alice).await);

        assert_eq!(bob_conn.take(), vec![json!({"op": "part", "subject": alice.to_string()})]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stalled_peer_write_times_out_and_broadcast_continues() {
        let reg = registry().with_write_timeout(Duration::from_millis(200));
        let (alice, _) = claimed(&reg, "alice").await;
        let stalled = MockConn::stalled();
        let stalled_peer = reg.register(Arc::clone(&stalled)).await;
        let (_, bob_conn) = claimed(&reg, "bob").await;

        let outcome = tokio::time::timeout(Duration::from_secs(60), async {
            reg.claim(stalled_peer, "carol").await.unwrap();
            bob_conn.take();
            reg.disconnect(alice).await
        })
        .await;

        assert!(matches!(outcome, Ok(true)), "stalled writes must not hold the registry");
        assert_eq!(bob_conn.take(), vec![json!({"op": "part", "subject": alice.to_string()})]);
        assert!(stalled.take_text().is_empty());
        // The tables are free for the next caller.
        assert_eq!(reg.claimed_count().await, 2);
    }

    #[test]
    fn test_with_write_timeout_overrides_default() {
        let reg = registry();
        assert_eq!(reg.write_timeout(), DEFAULT_WRITE_TIMEOUT);
        let reg = reg.with_write_timeout(Duration::from_millis(50));
        assert_eq!(reg.write_timeout(), Duration::from_millis(50));
    }

    // =====================================================================
    // evict()
    // =====================================================================

    #[tokio::test]
    async fn test_evict_closes_transport_and_disconnects() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;
        let (_, bob_conn) = claimed(&reg, "bob").await;

        assert!(reg.evict("alice").await);

        assert!(alice_conn.closed.load(Ordering::SeqCst));
        assert_eq!(reg.state_of(alice).await, None);
        assert_eq!(bob_conn.take(), vec![json!({"op": "part", "subject": alice.to_string()})]);
        // The handler's own cleanup afterwards is a no-op.
        assert!(!reg.disconnect(alice).await);
    }

    #[tokio::test]
    async fn test_evict_unclaimed_player_does_nothing() {
        let reg = registry();
        let (_, bob_conn) = claimed(&reg, "bob").await;

        assert!(!reg.evict("alice").await);
        assert!(bob_conn.take().is_empty());
    }

    // =====================================================================
    // volume_changed()
    // =====================================================================

    #[tokio::test]
    async fn test_volume_changed_notifies_listeners_only() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;
        let (_, bob_conn) = claimed(&reg, "bob").await;
        alice_conn.take();

        reg.volume_changed("alice").await;

        // alice at x=0, bob at x=10 → (30 - 10) / 100.
        assert_eq!(
            bob_conn.take(),
            vec![json!({"op": "set_volume", "subject": alice.to_string(), "payload": {"volume": 0.2}})]
        );
        assert!(alice_conn.take().is_empty(), "never sent to the mover");
    }

    #[tokio::test]
    async fn test_volume_changed_far_listener_gets_zero() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;
        let (_, carol_conn) = claimed(&reg, "carol").await;

        reg.volume_changed("alice").await;

        assert_eq!(
            carol_conn.take(),
            vec![json!({"op": "set_volume", "subject": alice.to_string(), "payload": {"volume": 0.0}})]
        );
    }

    #[tokio::test]
    async fn test_volume_changed_unclaimed_mover_sends_nothing() {
        let reg = registry();
        let (_, bob_conn) = claimed(&reg, "bob").await;

        reg.volume_changed("alice").await;

        assert!(bob_conn.take().is_empty());
    }

    // =====================================================================
    // handle_message() / handle_event()
    // =====================================================================

    #[tokio::test]
    async fn test_handle_message_connect_claims() {
        let reg = registry();
        let (peer, conn) = connect(&reg).await;

        reg.handle_message(peer, br#"{"op":"connect","payload":{"player":"bob"}}"#)
            .await
            .unwrap();

        assert_eq!(reg.claimant("bob").await, Some(peer));
        assert_eq!(conn.take().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_message_malformed_json_changes_nothing() {
        let reg = registry();
        let (peer, conn) = connect(&reg).await;

        let result = reg.handle_message(peer, b"{\"op\": connect").await;

        assert!(matches!(result, Err(SessionError::Protocol(_))));
        assert!(conn.take().is_empty());
        assert_eq!(reg.state_of(peer).await, Some(SessionState::Unclaimed));
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_handle_message_unknown_op_is_protocol_error() {
        let reg = registry();
        let (peer, _) = connect(&reg).await;

        let result = reg.handle_message(peer, br#"{"op":"teleport"}"#).await;

        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_handle_message_server_only_op_is_rejected() {
        let reg = registry();
        let (alice, _) = claimed(&reg, "alice").await;
        let (bob, bob_conn) = claimed(&reg, "bob").await;

        let inbound = json!({"op": "set_volume", "subject": bob.to_string(), "payload": {"volume": 1.0}});
        let result = reg.handle_message(alice, &msg(inbound)).await;

        assert!(matches!(result, Err(SessionError::ServerOnlyOp(_))));
        assert!(bob_conn.take().is_empty());
    }

    #[tokio::test]
    async fn test_handle_event_left_evicts_claimant() {
        let reg = registry();
        let (alice, alice_conn) = claimed(&reg, "alice").await;

        reg.handle_event(TelemetryEvent::Left("alice".into())).await;

        assert!(alice_conn.closed.load(Ordering::SeqCst));
        assert_eq!(reg.state_of(alice).await, None);
    }

    #[tokio::test]
    async fn test_handle_event_moved_pushes_volume() {
        let reg = registry();
        let (_, bob_conn) = claimed(&reg, "bob").await;
        let (alice, _) = claimed(&reg, "alice").await;
        bob_conn.take();

        reg.handle_event(TelemetryEvent::Moved {
            player: "alice".into(),
            position: Position::new(0.0, 64.0, 0.0),
        })
        .await;

        let sent = bob_conn.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["op"], "set_volume");
        assert_eq!(sent[0]["subject"], alice.to_string());
    }

    #[tokio::test]
    async fn test_handle_event_joined_sends_nothing() {
        let reg = registry();
        let (_, bob_conn) = claimed(&reg, "bob").await;

        reg.handle_event(TelemetryEvent::Joined("alice".into())).await;

        assert!(bob_conn.take().is_empty());
    }
}
