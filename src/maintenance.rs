use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, every: Duration, min_appends: u64) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let appends = match engine.wal_appends_since_compact().await {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("compactor skip: {e}");
                continue;
            }
        };
        if appends < min_appends {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(appends, "wal compacted"),
            Err(e) => {
                // The gate can be contended; the next tick retries
                tracing::debug!("compactor skip: {e}");
            }
        }
    }
}
