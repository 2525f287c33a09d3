use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "staybook_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "staybook_http_request_duration_seconds";

// ── Booking lifecycle ───────────────────────────────────────────

/// Counter: booking requests persisted.
pub const BOOKINGS_CREATED_TOTAL: &str = "staybook_bookings_created_total";

/// Counter: booking status transitions. Labels: status.
pub const BOOKING_TRANSITIONS_TOTAL: &str = "staybook_booking_transitions_total";

/// Counter: engine operations rejected. Labels: kind.
pub const ENGINE_REJECTIONS_TOTAL: &str = "staybook_engine_rejections_total";

// ── Notifications ───────────────────────────────────────────────

/// Counter: booking events that could not be published.
pub const NOTIFY_FAILURES_TOTAL: &str = "staybook_notify_failures_total";

/// Counter: booking events consumed by the logging consumer.
pub const EVENTS_CONSUMED_TOTAL: &str = "staybook_events_consumed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: listings currently in the store.
pub const LISTINGS_ACTIVE: &str = "staybook_listings_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "staybook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "staybook_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "staybook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
