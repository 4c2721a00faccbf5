use std::time::Duration;

use loupe_core::kinds::DisconnectReason;
use loupe_core::wire::OutboundFrame;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::HEARTBEAT_INTERVAL_SECS;
use crate::dispatch::{now_ms, IngestContext};

/// Server-initiated liveness sweep (spec.md §4.5/§5): every
/// `HEARTBEAT_INTERVAL_SECS` pings every open connection, then force-closes
/// whichever have gone silent past the grace window, unbinding their
/// session and rejecting any capture still pending on them.
pub fn spawn_heartbeat_task(ctx: IngestContext, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => sweep(&ctx),
            }
        }
    })
}

fn sweep(ctx: &IngestContext) {
    for id in ctx.connections.ids() {
        ctx.connections.send_to(&id, OutboundFrame::Pong);
    }

    let now = now_ms();
    for id in ctx.connections.stale_connections(now) {
        if let Some(session_id) = ctx.connections.bound_session(&id) {
            debug!(connection = %id, session = %session_id, "closing stale connection");
            ctx.sessions.unbind_connection(&session_id, DisconnectReason::StaleTimeout, now);
        }
        ctx.connections.unregister(&id);
    }
}
