//! PVC lifecycle collaborator: inventory reads and resize requests
//!
//! The engine decides target sizes; this module is the only place that
//! touches PersistentVolumeClaims. Inventory distinguishes the requested
//! size (spec) from the actual size (status capacity) so an in-flight
//! expansion is observable, and resize requests are plain merge patches of
//! `spec.resources.requests.storage`. A 409 from a concurrent writer maps
//! to `PatchConflict` and is retried next cycle without consuming budget.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::controller::error::{Error, Result};
use crate::controller::instance_status::CLUSTER_LABEL;
use crate::crd::VolumeKind;
use crate::resources::quantity::{format_quantity, parse_quantity, round_up, PVC_GRANULARITY};

/// Label carrying the volume role of a PVC
pub const VOLUME_KIND_LABEL: &str = "postgres.example.com/volume-kind";

/// Label carrying the owning instance of a PVC
pub const INSTANCE_LABEL: &str = "postgres.example.com/instance";

/// Field manager for our patches
pub const FIELD_MANAGER: &str = "postgres-volume-operator";

/// Name of the PVC backing one volume role of one instance
pub fn pvc_name(instance: &str, kind: &VolumeKind) -> String {
    format!("{}-{}", instance, kind.label_value())
}

/// Requested vs actual size of one PVC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PvcSizes {
    /// Size in the PVC spec (what was last asked for)
    pub requested: u64,
    /// Size in the PVC status capacity (what is actually provisioned);
    /// absent until the claim is bound
    pub actual: Option<u64>,
}

/// Sizes of every labeled PVC of a cluster
#[derive(Debug, Default)]
pub struct PvcInventory {
    sizes: BTreeMap<(String, VolumeKind), PvcSizes>,
}

impl PvcInventory {
    /// Sizes for one instance's volume, if its PVC exists
    pub fn get(&self, instance: &str, kind: &VolumeKind) -> Option<PvcSizes> {
        self.sizes.get(&(instance.to_string(), kind.clone())).copied()
    }

    /// Instances that have a PVC for the given volume kind
    pub fn instances_with(&self, kind: &VolumeKind) -> Vec<String> {
        self.sizes
            .keys()
            .filter(|(_, k)| k == kind)
            .map(|(instance, _)| instance.clone())
            .collect()
    }
}

/// Load the PVC inventory for a cluster.
pub async fn load_inventory(
    api: &Api<PersistentVolumeClaim>,
    cluster_name: &str,
) -> Result<PvcInventory> {
    let label_selector = format!("{}={}", CLUSTER_LABEL, cluster_name);
    let pvcs = api
        .list(&ListParams::default().labels(&label_selector))
        .await?;

    let mut inventory = PvcInventory::default();
    for pvc in pvcs.items {
        match extract_entry(&pvc) {
            Some((instance, kind, sizes)) => {
                inventory.sizes.insert((instance, kind), sizes);
            }
            None => {
                warn!(pvc = %pvc.name_any(), "PVC missing sizing labels or sizes, ignoring");
            }
        }
    }
    Ok(inventory)
}

/// Pull (instance, kind, sizes) out of one PVC.
///
/// Standalone so inventory parsing is testable without an API server.
fn extract_entry(pvc: &PersistentVolumeClaim) -> Option<(String, VolumeKind, PvcSizes)> {
    let labels = pvc.metadata.labels.as_ref()?;
    let instance = labels.get(INSTANCE_LABEL)?.clone();
    let kind = VolumeKind::from_label_value(labels.get(VOLUME_KIND_LABEL)?)?;

    let requested = pvc
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .and_then(|q| parse_quantity(&q.0).ok())?;

    let actual = pvc
        .status
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get("storage"))
        .and_then(|q| parse_quantity(&q.0).ok());

    Some((instance, kind, PvcSizes { requested, actual }))
}

/// Issue a resize request for one PVC.
///
/// The target is rounded up to 1Mi so sub-megabyte deltas never reach the
/// API server. A concurrent modification surfaces as `PatchConflict`.
pub async fn request_resize(
    api: &Api<PersistentVolumeClaim>,
    name: &str,
    target_bytes: u64,
) -> Result<()> {
    let size = format_quantity(round_up(target_bytes, PVC_GRANULARITY));
    let patch = serde_json::json!({
        "spec": {
            "resources": {
                "requests": {
                    "storage": size
                }
            }
        }
    });

    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
        .map_err(|e| match &e {
            kube::Error::Api(api_err) if api_err.code == 409 => {
                Error::PatchConflict(format!("{}: {}", name, api_err.message))
            }
            _ => Error::KubeError(e),
        })?;

    debug!(pvc = %name, size = %size, "issued resize request");
    Ok(())
}
