//! Per-connection handler: registration, message loop, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the connection → unclaimed session with a fresh PeerId
//!   2. Loop: receive messages → hand each to the registry
//!   3. On close, error, or panic → disconnect the session

use std::sync::Arc;

use earshot_protocol::PeerId;
use earshot_session::Registry;
use earshot_telemetry::WorldView;
use earshot_transport::Connection;
use tracing::{debug, info};

use crate::{EarshotError, ErrorKind};

/// Inbound messages larger than this are dropped unread.
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// Drop guard that disconnects a session when the handler exits.
///
/// Since `Drop` is synchronous, the disconnect runs on a spawned task.
struct SessionGuard<C: Connection, W: WorldView> {
    peer: PeerId,
    registry: Arc<Registry<C, W>>,
}

impl<C: Connection, W: WorldView> Drop for SessionGuard<C, W> {
    fn drop(&mut self) {
        let peer = self.peer;
        let registry = Arc::clone(&self.registry);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            registry.disconnect(peer).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, W>(conn: C, registry: Arc<Registry<C, W>>)
where
    C: Connection,
    W: WorldView,
{
    let conn = Arc::new(conn);
    let peer = registry.register(Arc::clone(&conn)).await;
    let _guard = SessionGuard { peer, registry: Arc::clone(&registry) };

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                info!(%peer, "connection closed");
                break;
            }
            Err(e) => {
                debug!(%peer, error = %e, "recv error");
                break;
            }
        };

        if data.len() > MAX_MESSAGE_BYTES {
            debug!(%peer, bytes = data.len(), "dropping oversized message");
            continue;
        }

        if let Err(e) = registry.handle_message(peer, &data).await {
            let e = EarshotError::from(e);
            match e.kind() {
                ErrorKind::BusinessRule => debug!(%peer, reason = %e, "request refused"),
                _ => debug!(%peer, error = %e, "message dropped"),
            }
        }
    }

    // _guard drops here → session disconnect fires.
}
