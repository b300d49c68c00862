//! Health server for Kubernetes probes and Prometheus metrics
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the process alive?)
//! - `/readyz` - Readiness probe (is the operator ready to serve?)
//! - `/metrics` - Prometheus metrics

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::crd::{BudgetStatus, VolumePhase};

/// Port the health server listens on
pub const HEALTH_PORT: u16 = 8080;

/// Labels for reconciliation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    pub namespace: String,
    pub name: String,
}

impl prometheus_client::encoding::EncodeLabelSet for ReconcileLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for cluster-level volume metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct VolumeLabels {
    pub namespace: String,
    pub cluster: String,
    pub kind: String,
}

impl prometheus_client::encoding::EncodeLabelSet for VolumeLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("cluster", self.cluster.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-instance volume metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct InstanceVolumeLabels {
    pub namespace: String,
    pub cluster: String,
    pub instance: String,
    pub kind: String,
}

impl prometheus_client::encoding::EncodeLabelSet for InstanceVolumeLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("cluster", self.cluster.as_str()).encode(encoder.encode_label())?;
        ("instance", self.instance.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for the one-hot volume state gauge
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StateLabels {
    pub namespace: String,
    pub cluster: String,
    pub kind: String,
    pub state: String,
}

impl prometheus_client::encoding::EncodeLabelSet for StateLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("cluster", self.cluster.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("state", self.state.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics state
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<ReconcileLabels, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<ReconcileLabels, Histogram>,

    // Volume gauges
    /// Used bytes per instance volume
    pub volume_used_bytes: Family<InstanceVolumeLabels, Gauge>,
    /// Available bytes per instance volume
    pub volume_available_bytes: Family<InstanceVolumeLabels, Gauge>,
    /// Usage percentage per instance volume
    pub volume_percent_used: Family<InstanceVolumeLabels, Gauge<f64, AtomicU64>>,
    /// Actual provisioned bytes per instance volume
    pub volume_actual_bytes: Family<InstanceVolumeLabels, Gauge>,
    /// Engine target bytes per cluster volume
    pub volume_target_bytes: Family<VolumeLabels, Gauge>,
    /// Effective (new-replica) bytes per cluster volume
    pub volume_effective_bytes: Family<VolumeLabels, Gauge>,
    /// One-hot state gauge per cluster volume
    pub volume_state: Family<StateLabels, Gauge>,

    // Budget gauges
    /// Actions consumed in the rolling window
    pub budget_actions_last24h: Family<VolumeLabels, Gauge>,
    /// Actions available to scheduled growth
    pub budget_available_planned: Family<VolumeLabels, Gauge>,
    /// Actions available to emergency growth
    pub budget_available_emergency: Family<VolumeLabels, Gauge>,

    /// Seconds until the next maintenance window opens
    pub seconds_until_next_window: Family<VolumeLabels, Gauge>,

    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "pgvolume_reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "pgvolume_reconciliation_errors",
            "Total number of reconciliation errors",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ReconcileLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "pgvolume_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
            reconcile_duration_seconds.clone(),
        );

        let volume_used_bytes = Family::<InstanceVolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_volume_used_bytes",
            "Bytes in use on the volume",
            volume_used_bytes.clone(),
        );

        let volume_available_bytes = Family::<InstanceVolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_volume_available_bytes",
            "Bytes available on the volume",
            volume_available_bytes.clone(),
        );

        let volume_percent_used = Family::<InstanceVolumeLabels, Gauge<f64, AtomicU64>>::default();
        registry.register(
            "pgvolume_volume_percent_used",
            "Usage percentage against the usable total",
            volume_percent_used.clone(),
        );

        let volume_actual_bytes = Family::<InstanceVolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_volume_actual_bytes",
            "Actually provisioned bytes per instance",
            volume_actual_bytes.clone(),
        );

        let volume_target_bytes = Family::<VolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_volume_target_bytes",
            "Size the sizing engine currently wants",
            volume_target_bytes.clone(),
        );

        let volume_effective_bytes = Family::<VolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_volume_effective_bytes",
            "Size new replicas are provisioned at",
            volume_effective_bytes.clone(),
        );

        let volume_state = Family::<StateLabels, Gauge>::default();
        registry.register(
            "pgvolume_volume_state",
            "One-hot volume sizing state",
            volume_state.clone(),
        );

        let budget_actions_last24h = Family::<VolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_budget_actions_last24h",
            "Resize actions consumed in the rolling 24h window",
            budget_actions_last24h.clone(),
        );

        let budget_available_planned = Family::<VolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_budget_available_planned",
            "Resize actions available to scheduled growth",
            budget_available_planned.clone(),
        );

        let budget_available_emergency = Family::<VolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_budget_available_emergency",
            "Resize actions available to emergency growth",
            budget_available_emergency.clone(),
        );

        let seconds_until_next_window = Family::<VolumeLabels, Gauge>::default();
        registry.register(
            "pgvolume_seconds_until_next_window",
            "Seconds until the next maintenance window opens",
            seconds_until_next_window.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            volume_used_bytes,
            volume_available_bytes,
            volume_percent_used,
            volume_actual_bytes,
            volume_target_bytes,
            volume_effective_bytes,
            volume_state,
            budget_actions_last24h,
            budget_available_planned,
            budget_available_emergency,
            seconds_until_next_window,
            registry,
        }
    }

    /// Record a successful reconciliation
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = ReconcileLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconciliation
    pub fn record_reconcile_error(&self, namespace: &str, name: &str) {
        let labels = ReconcileLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.reconciliation_errors_total.get_or_create(&labels).inc();
    }

    /// Set the one-hot state gauge for a volume
    pub fn record_state(&self, labels: &VolumeLabels, state: &VolumePhase) {
        for phase in VolumePhase::all() {
            let value = i64::from(phase == *state);
            self.volume_state
                .get_or_create(&StateLabels {
                    namespace: labels.namespace.clone(),
                    cluster: labels.cluster.clone(),
                    kind: labels.kind.clone(),
                    state: phase.to_string(),
                })
                .set(value);
        }
    }

    /// Publish a budget snapshot
    pub fn record_budget(&self, labels: &VolumeLabels, budget: &BudgetStatus) {
        self.budget_actions_last24h
            .get_or_create(labels)
            .set(budget.actions_last24h as i64);
        self.budget_available_planned
            .get_or_create(labels)
            .set(budget.available_for_planned as i64);
        self.budget_available_emergency
            .get_or_create(labels)
            .set(budget.available_for_emergency as i64);
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

/// Shared health state for probes
pub struct HealthState {
    ready: RwLock<bool>,
    /// Metrics registry shared with the controller
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Run the health server until the process exits.
pub async fn run_health_server(state: Arc<HealthState>) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", HEALTH_PORT)).await?;
    tracing::info!("Health server listening on :{}", HEALTH_PORT);
    axum::serve(listener, app).await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([("content-type", "text/plain; charset=utf-8")], body).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
