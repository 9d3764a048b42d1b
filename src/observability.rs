use std::net::SocketAddr;

// ── Refresh path ────────────────────────────────────────────────

/// Counter: calendar refreshes. Labels: outcome (updated, superseded, error).
pub const CALENDAR_REFRESH_TOTAL: &str = "rentcal_calendar_refresh_total";

/// Histogram: refresh latency in seconds, fetch plus assembly.
pub const CALENDAR_REFRESH_DURATION_SECONDS: &str = "rentcal_calendar_refresh_duration_seconds";

/// Counter: failed source calls. Labels: resource.
pub const FETCH_FAILURES_TOTAL: &str = "rentcal_fetch_failures_total";

// ── State ───────────────────────────────────────────────────────

/// Gauge: conflict entries in the last published view.
pub const CONFLICTS_ACTIVE: &str = "rentcal_conflicts_active";

/// Counter: filter drafts applied.
pub const FILTER_APPLY_TOTAL: &str = "rentcal_filter_apply_total";

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
