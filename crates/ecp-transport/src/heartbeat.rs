//! The heartbeat subsystem: a single periodic task that pings authenticated
//! connections and closes ones that have gone stale.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::ConnectionTable;

/// How many heartbeat intervals of silence before a connection is declared
/// stale. Kept as a named constant rather than a second CLI flag — the
/// spec only asks that the multiplier be revisited someday, not that it be
/// configurable today.
const STALE_MULTIPLIER: u32 = 5;

/// Spawn the heartbeat task. Returns immediately; the task runs until the
/// process exits or `interval_ms == 0` (in which case nothing is spawned
/// and heartbeat is a no-op, matching "0 disables").
pub fn spawn(table: Arc<ConnectionTable>, interval_ms: u64) -> Option<tokio::task::JoinHandle<()>> {
    if interval_ms == 0 {
        debug!("heartbeat disabled (interval = 0)");
        return None;
    }

    let interval = Duration::from_millis(interval_ms);
    let stale_after = interval * STALE_MULTIPLIER;

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so we don't declare
        // freshly-opened connections stale on tick zero.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tick(&table, stale_after);
        }
    }))
}

fn tick(table: &ConnectionTable, stale_after: Duration) {
    // Snapshot under the table's own internal sharding, then act on the
    // snapshot — adapter calls backing a connection's dispatch may be
    // long-lived and we must not hold anything that would block them.
    for conn in table.snapshot() {
        if !conn.is_authenticated() {
            // Pending connections have their own handshake timer.
            continue;
        }
        let idle = conn.last_activity().elapsed();
        if idle >= stale_after {
            warn!(connection_id = conn.id, idle_ms = idle.as_millis() as u64, "closing stale connection");
            conn.force_close(1001, "Connection stale");
        } else {
            conn.send_ping();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;

    #[test]
    fn fresh_connections_are_pinged_not_closed() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = Arc::new(ConnectionHandle::new_authenticated(
            table.next_id(),
            tx,
            "a".repeat(32),
        ));
        table.insert(conn);

        tick(&table, Duration::from_secs(60));

        assert!(matches!(
            rx.try_recv(),
            Ok(crate::connection::OutboundMessage::Ping)
        ));
    }

    #[test]
    fn pending_connections_are_skipped() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = Arc::new(ConnectionHandle::new(table.next_id(), tx));
        table.insert(conn);

        tick(&table, Duration::from_millis(0));

        assert!(rx.try_recv().is_err());
    }
}
