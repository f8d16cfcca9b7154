use std::net::SocketAddr;
use std::time::Instant;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, outcome.
pub const COMMANDS_TOTAL: &str = "innkeep_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "innkeep_command_duration_seconds";

/// Counter: assignments rejected because a room was held by another
/// active booking. Labels: command.
pub const ROOM_CONFLICTS_TOTAL: &str = "innkeep_room_conflicts_total";

/// Counter: transactions abandoned because a row lock stayed contended
/// past the timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "innkeep_lock_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the fmt tracing subscriber (RUST_LOG-aware).
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Record one command's outcome and latency.
pub fn record_command(command: &'static str, outcome: &'static str, started: Instant) {
    metrics::counter!(COMMANDS_TOTAL, "command" => command, "outcome" => outcome).increment(1);
    metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => command)
        .record(started.elapsed().as_secs_f64());
}
