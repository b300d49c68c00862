use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PostgresCluster is the Schema for the postgresclusters API
///
/// The spec carries one storage sizing policy per logical volume role (data,
/// optional dedicated WAL, tablespaces). The status subresource persists the
/// per-volume sizing state the operator converges towards.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "postgres.example.com",
    version = "v1alpha1",
    kind = "PostgresCluster",
    plural = "postgresclusters",
    shortname = "pgc",
    namespaced,
    status = "PostgresClusterStatus",
    printcolumn = r#"{"name":"Instances", "type":"integer", "jsonPath":".spec.instances"}"#,
    printcolumn = r#"{"name":"Data", "type":"string", "jsonPath":".status.volumes.data.effectiveSize"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.volumes.data.state"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterSpec {
    /// Number of instances (primary + replicas)
    #[serde(default = "default_instances")]
    pub instances: i32,

    /// Sizing policy for the data volume
    pub storage: StorageSizingPolicy,

    /// Sizing policy for a dedicated WAL volume.
    /// When absent, WAL lives on the data volume and WAL-safety gating
    /// applies to the data volume instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_storage: Option<StorageSizingPolicy>,

    /// Tablespace volumes, each with its own sizing policy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tablespaces: Vec<TablespaceSpec>,
}

fn default_instances() -> i32 {
    1
}

/// A named tablespace with its own volume
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TablespaceSpec {
    /// Tablespace name (also used in the PVC name)
    pub name: String,

    /// Sizing policy for the tablespace volume
    pub storage: StorageSizingPolicy,
}

/// Declarative sizing policy for one logical volume
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSizingPolicy {
    /// Storage class name (uses the cluster default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Floor for the provisioned size (e.g. "10Gi"); volumes are never
    /// provisioned below this
    pub request: String,

    /// Ceiling for the provisioned size (e.g. "100Gi"); only an emergency
    /// grow with exceedLimitOnEmergency may go past it
    pub limit: String,

    /// Desired minimum free-space percentage kept on the volume (5-50)
    #[serde(default = "default_target_buffer_percent")]
    pub target_buffer_percent: u8,

    /// Window during which non-urgent growth is permitted.
    /// No window configured means growth is always permitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window: Option<MaintenanceWindowSpec>,

    /// Emergency growth configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_grow: Option<EmergencyGrowSpec>,

    /// WAL-safety gating configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_check: Option<WalCheckSpec>,
}

fn default_target_buffer_percent() -> u8 {
    20
}

/// Cron-scheduled window during which scheduled growth may run
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindowSpec {
    /// Cron expression for window opening times (e.g. "0 0 2 * * Sun")
    pub schedule: String,

    /// Window duration (e.g. "2h", "90m", "1h30m")
    pub duration: String,

    /// IANA timezone name the schedule is evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Emergency growth thresholds and budget split
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyGrowSpec {
    /// Enable emergency growth outside the maintenance window
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Usage percentage at which the volume is considered critical
    #[serde(default = "default_critical_threshold_percent")]
    pub critical_threshold_percent: u8,

    /// Absolute free-space floor (e.g. "1Gi") below which the volume is
    /// considered critical regardless of percentage
    #[serde(default = "default_critical_minimum_free")]
    pub critical_minimum_free: String,

    /// Allow an emergency grow to exceed the policy limit as a last resort
    #[serde(default)]
    pub exceed_limit_on_emergency: bool,

    /// Rolling 24h cap on resize actions per logical volume
    #[serde(default = "default_max_actions_per_day")]
    pub max_actions_per_day: u32,

    /// Slice of maxActionsPerDay held back for emergencies
    #[serde(default = "default_reserved_actions_for_emergency")]
    pub reserved_actions_for_emergency: u32,
}

fn default_true() -> bool {
    true
}

fn default_critical_threshold_percent() -> u8 {
    90
}

fn default_critical_minimum_free() -> String {
    "1Gi".to_string()
}

fn default_max_actions_per_day() -> u32 {
    6
}

fn default_reserved_actions_for_emergency() -> u32 {
    2
}

/// WAL-safety gating configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalCheckSpec {
    /// Pending-archive ceiling above which the archiver is unhealthy
    #[serde(default = "default_max_pending_archive_files")]
    pub max_pending_archive_files: u64,

    /// Behavior when WAL health cannot be determined
    #[serde(default)]
    pub on_unknown_health: OnUnknownWalHealth,
}

fn default_max_pending_archive_files() -> u64 {
    32
}

/// Behavior when the WAL health query fails
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum OnUnknownWalHealth {
    /// Treat unknown health as unsafe and block growth (safe default)
    #[default]
    FailClosed,
    /// Treat unknown health as safe, with a surfaced warning event
    FailOpen,
}

/// Role of a logical volume within an instance
///
/// Identity is stable across PVC replacement: a volume keeps its budget
/// history even if its underlying storage object is recreated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VolumeKind {
    /// The main data volume
    Data,
    /// A dedicated WAL volume
    Wal,
    /// A tablespace volume
    Tablespace(String),
}

impl VolumeKind {
    /// Rendering safe for Kubernetes label values and PVC name suffixes
    /// (no colon allowed there)
    pub fn label_value(&self) -> String {
        match self {
            VolumeKind::Data => "data".to_string(),
            VolumeKind::Wal => "wal".to_string(),
            VolumeKind::Tablespace(name) => format!("tbs-{}", name),
        }
    }

    /// Inverse of [`VolumeKind::label_value`]
    pub fn from_label_value(value: &str) -> Option<Self> {
        match value {
            "data" => Some(VolumeKind::Data),
            "wal" => Some(VolumeKind::Wal),
            other => other
                .strip_prefix("tbs-")
                .filter(|name| !name.is_empty())
                .map(|name| VolumeKind::Tablespace(name.to_string())),
        }
    }
}

impl fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeKind::Data => write!(f, "data"),
            VolumeKind::Wal => write!(f, "wal"),
            VolumeKind::Tablespace(name) => write!(f, "tablespace:{}", name),
        }
    }
}

impl FromStr for VolumeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(VolumeKind::Data),
            "wal" => Ok(VolumeKind::Wal),
            other => match other.strip_prefix("tablespace:") {
                Some(name) if !name.is_empty() => Ok(VolumeKind::Tablespace(name.to_string())),
                _ => Err(format!("unknown volume kind: {}", other)),
            },
        }
    }
}

/// Stable identity of a logical volume: one volume role of one instance.
/// Keys the budget history.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VolumeKey {
    /// UID of the owning cluster
    pub cluster_uid: String,
    /// Instance name (e.g. "mycluster-2")
    pub instance: String,
    /// Volume role
    pub kind: VolumeKind,
}

impl fmt::Display for VolumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster_uid, self.instance, self.kind)
    }
}

/// Status of the PostgresCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterStatus {
    /// Per-volume sizing status, keyed by the volume kind rendering
    /// ("data", "wal", "tablespace:\<name\>")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeSizingStatus>,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Persisted sizing state of one volume role across the cluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSizingStatus {
    /// Authoritative size new replicas of this volume are provisioned at.
    /// Monotonically non-decreasing.
    #[serde(default)]
    pub effective_size: String,

    /// Size the engine currently wants this volume to be
    #[serde(default)]
    pub target_size: String,

    /// Actual provisioned size per instance
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actual_sizes: BTreeMap<String, String>,

    /// Observability state label
    #[serde(default)]
    pub state: VolumePhase,

    /// Rate-limit budget snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetStatus>,

    /// Most recent sizing action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<SizingAction>,

    /// Bounded action history; covers at least the rolling 24h budget
    /// window so remaining budget is reconstructible after a restart
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_actions: Vec<SizingAction>,

    /// Start of the next maintenance window (RFC 3339), when one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_maintenance_window: Option<String>,

    /// Why a wanted grow is not happening, when state is PendingGrowth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Observability state of a volume, derived from the sizing decision
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum VolumePhase {
    /// Usage is within the target buffer; nothing to do
    #[default]
    Balanced,
    /// A scheduled grow has been decided
    NeedsGrow,
    /// A critical threshold was crossed; emergency growth decided
    Emergency,
    /// Growth is wanted but blocked by a gate (window, budget, WAL safety)
    PendingGrowth,
    /// A grow request was issued and has not yet been observed as complete
    Resizing,
}

impl fmt::Display for VolumePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumePhase::Balanced => write!(f, "Balanced"),
            VolumePhase::NeedsGrow => write!(f, "NeedsGrow"),
            VolumePhase::Emergency => write!(f, "Emergency"),
            VolumePhase::PendingGrowth => write!(f, "PendingGrowth"),
            VolumePhase::Resizing => write!(f, "Resizing"),
        }
    }
}

impl VolumePhase {
    /// Severity ordering used to aggregate per-instance phases into the
    /// cluster-level volume status (highest wins)
    pub fn severity(&self) -> u8 {
        match self {
            VolumePhase::Balanced => 0,
            VolumePhase::NeedsGrow => 1,
            VolumePhase::PendingGrowth => 2,
            VolumePhase::Resizing => 3,
            VolumePhase::Emergency => 4,
        }
    }

    /// All phases, for one-hot state metrics
    pub fn all() -> [VolumePhase; 5] {
        [
            VolumePhase::Balanced,
            VolumePhase::NeedsGrow,
            VolumePhase::Emergency,
            VolumePhase::PendingGrowth,
            VolumePhase::Resizing,
        ]
    }
}

/// One entry of the sizing action history
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SizingAction {
    /// What kind of grow this was
    pub kind: SizingActionKind,

    /// Size before the action (quantity string)
    pub from: String,

    /// Size requested by the action (quantity string)
    pub to: String,

    /// When the action was issued (RFC 3339)
    pub timestamp: String,

    /// Instance whose volume was resized
    pub instance: String,

    /// Outcome of the issuance ("Issued", "Completed")
    pub result: String,
}

/// Kind of a sizing action
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub enum SizingActionKind {
    /// Immediate growth triggered by a critical threshold
    EmergencyGrow,
    /// Growth performed inside the maintenance window
    ScheduledGrow,
}

impl fmt::Display for SizingActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingActionKind::EmergencyGrow => write!(f, "EmergencyGrow"),
            SizingActionKind::ScheduledGrow => write!(f, "ScheduledGrow"),
        }
    }
}

/// Rolling 24h budget snapshot for one volume
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    /// Actions consumed in the rolling 24h window
    #[serde(default)]
    pub actions_last24h: u32,

    /// Actions still available to scheduled growth
    #[serde(default)]
    pub available_for_planned: u32,

    /// Actions still available to emergency growth
    #[serde(default)]
    pub available_for_emergency: u32,

    /// When the oldest consumed action falls out of the window (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_resets_at: Option<String>,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
