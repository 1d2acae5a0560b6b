//! Prometheus metrics for the lifecycle engine.
//!
//! Counters and histograms are recorded unconditionally through the `metrics`
//! facade and are free until a recorder is installed. [`MetricsServer`]
//! installs a Prometheus recorder and renders the text exposition format.
//!
//! | metric | labels |
//! |--------|--------|
//! | `hookline_requests_issued_total` | |
//! | `hookline_requests_finished_total` | `status` |
//! | `hookline_request_duration_seconds` | `status` |
//! | `hookline_request_retries_total` | |
//! | `hookline_adapter_faults_total` | |
//! | `hookline_hook_invocations_total` | `chain` |
//! | `hookline_hook_redirects_total` | `from`, `to` |
//! | `hookline_hook_stalls_total` | `chain` |
//! | `hookline_protocol_violations_total` | `chain` |
//!
//! # Example
//!
//! ```rust,no_run
//! use hookline_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Hand `server.render()` to whatever serves `/metrics`
//! let exposition = server.render().unwrap_or_default();
//! # drop(exposition);
//! # Ok(())
//! # }
//! ```

use hookline_core::{ChainId, RequestStatus};
use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

const REQUESTS_ISSUED: &str = "hookline_requests_issued_total";
const REQUESTS_FINISHED: &str = "hookline_requests_finished_total";
const REQUEST_DURATION: &str = "hookline_request_duration_seconds";
const REQUEST_RETRIES: &str = "hookline_request_retries_total";
const ADAPTER_FAULTS: &str = "hookline_adapter_faults_total";
const HOOK_INVOCATIONS: &str = "hookline_hook_invocations_total";
const HOOK_REDIRECTS: &str = "hookline_hook_redirects_total";
const HOOK_STALLS: &str = "hookline_hook_stalls_total";
const PROTOCOL_VIOLATIONS: &str = "hookline_protocol_violations_total";

/// Request latencies are dominated by the adapter; hooks add microseconds.
const DURATION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

const COUNTERS: &[(&str, &str)] = &[
    (REQUESTS_ISSUED, "Requests started"),
    (REQUESTS_FINISHED, "Requests that reached a terminal state"),
    (REQUEST_RETRIES, "Retry redirects into the before chain"),
    (ADAPTER_FAULTS, "Adapter faults and hook panics"),
    (HOOK_INVOCATIONS, "Hook invocations"),
    (HOOK_REDIRECTS, "Flow redirects between chains"),
    (HOOK_STALLS, "Hooks that dropped their context without settling"),
    (PROTOCOL_VIOLATIONS, "Steps settled more than once"),
];

/// Errors from installing the Prometheus recorder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The exporter configuration was rejected.
    #[error("Invalid metrics exporter configuration: {0}")]
    Build(#[from] BuildError),
    /// Another recorder could not be replaced.
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address the host application serves it on.
///
/// Serving `/metrics` over HTTP is left to the host; this type only owns the
/// recorder and renders its exposition text.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an exporter that is not yet installed.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe every metric and install the global recorder.
    ///
    /// A recorder that is already installed (another server, or a test
    /// harness) is not an error: recording keeps working, but this server
    /// has nothing to render.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        describe();

        match install()? {
            Some(handle) => {
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                self.handle = Some(handle);
            }
            None => tracing::warn!("Metrics recorder already installed, rendering disabled"),
        }
        Ok(())
    }

    /// The address metrics are meant to be exposed on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The recorder handle, if this server installed it.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn install() -> Result<Option<PrometheusHandle>, MetricsError> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)?;

    match builder.install_recorder() {
        Ok(handle) => Ok(Some(handle)),
        Err(error) => {
            let message = error.to_string();
            if message.contains("already initialized") {
                Ok(None)
            } else {
                Err(MetricsError::Install(message))
            }
        }
    }
}

fn describe() {
    for &(name, help) in COUNTERS {
        describe_counter!(name, Unit::Count, help);
    }
    describe_histogram!(
        REQUEST_DURATION,
        Unit::Seconds,
        "Time from start to terminal state"
    );
}

const fn status_label(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::Success => "success",
        RequestStatus::Failed => "failed",
        RequestStatus::Cancelled => "cancelled",
    }
}

/// Request-level metrics.
pub struct RequestMetrics;

impl RequestMetrics {
    /// A request was started.
    pub fn record_issued() {
        counter!(REQUESTS_ISSUED).increment(1);
    }

    /// A request reached `status` after `duration`.
    pub fn record_outcome(status: RequestStatus, duration: Duration) {
        let status = status_label(status);
        counter!(REQUESTS_FINISHED, "status" => status).increment(1);
        histogram!(REQUEST_DURATION, "status" => status).record(duration.as_secs_f64());
    }

    /// A fail hook redirected back into the before chain.
    pub fn record_retry() {
        counter!(REQUEST_RETRIES).increment(1);
    }

    /// The adapter faulted before settling, or a hook panicked.
    pub fn record_fault() {
        counter!(ADAPTER_FAULTS).increment(1);
    }
}

/// Hook-level metrics, labelled by chain.
pub struct HookMetrics;

impl HookMetrics {
    /// A hook was invoked.
    pub fn record_invocation(chain: ChainId) {
        counter!(HOOK_INVOCATIONS, "chain" => chain.as_str()).increment(1);
    }

    /// A hook redirected the flow from one chain to another.
    pub fn record_redirect(from: ChainId, to: ChainId) {
        counter!(HOOK_REDIRECTS, "from" => from.as_str(), "to" => to.as_str()).increment(1);
    }

    /// A hook dropped its context without settling.
    pub fn record_stall(chain: ChainId) {
        counter!(HOOK_STALLS, "chain" => chain.as_str()).increment(1);
    }

    /// A step was settled more than once.
    pub fn record_protocol_violation(chain: ChainId) {
        counter!(PROTOCOL_VIOLATIONS, "chain" => chain.as_str()).increment(1);
    }
}
