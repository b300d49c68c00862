//! Status and conditions management for PostgresCluster resources
//!
//! The persisted `VolumeSizingStatus` map is the system of record for
//! sizing: effective sizes, targets, states, and the bounded action history
//! the budget is reconstructible from. This module owns writing it, plus
//! Kubernetes-style conditions.

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

use crate::controller::error::Result;
use crate::crd::{Condition, PostgresCluster, PostgresClusterStatus};
use crate::resources::pvc::FIELD_MANAGER;

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// All sizing policies parse and evaluate
    pub const CONFIG_VALID: &str = "ConfigurationValid";
    /// No volume is in an emergency state
    pub const STORAGE_HEALTHY: &str = "StorageHealthy";
    /// WAL archiving is healthy on every WAL-gated volume
    pub const WAL_SAFE: &str = "WalSafe";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    /// Create from existing conditions so transition times survive
    /// unchanged statuses
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            // Only bump the transition time if the status actually changed
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the ConfigurationValid condition
    pub fn config_valid(self, valid: bool, reason: &str, message: &str) -> Self {
        let status = if valid {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::CONFIG_VALID, status, reason, message)
    }

    /// Set the StorageHealthy condition
    pub fn storage_healthy(self, healthy: bool, reason: &str, message: &str) -> Self {
        let status = if healthy {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::STORAGE_HEALTHY, status, reason, message)
    }

    /// Set the WalSafe condition; `None` renders as Unknown
    pub fn wal_safe(self, safe: Option<bool>, reason: &str, message: &str) -> Self {
        let status = match safe {
            Some(true) => condition_status::TRUE,
            Some(false) => condition_status::FALSE,
            None => condition_status::UNKNOWN,
        };
        self.set_condition(condition_types::WAL_SAFE, status, reason, message)
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Status manager for PostgresCluster resources
pub struct StatusManager<'a> {
    cluster: &'a PostgresCluster,
    client: Client,
    ns: &'a str,
}

impl<'a> StatusManager<'a> {
    /// Create a new status manager
    pub fn new(cluster: &'a PostgresCluster, client: Client, ns: &'a str) -> Self {
        Self {
            cluster,
            client,
            ns,
        }
    }

    /// Existing conditions, for the builder
    pub fn existing_conditions(&self) -> Vec<Condition> {
        self.cluster
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }

    /// Builder seeded from the current conditions and generation
    pub fn conditions(&self) -> ConditionBuilder {
        ConditionBuilder::from_existing(self.existing_conditions(), self.cluster.metadata.generation)
    }

    /// Patch the status subresource with a full status object
    pub async fn update(&self, status: PostgresClusterStatus) -> Result<()> {
        let api: Api<PostgresCluster> = Api::namespaced(self.client.clone(), self.ns);
        let name = self.cluster.name_any();

        let patch = serde_json::json!({ "status": status });

        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }

    /// Record a blocking configuration problem without touching the
    /// volume map
    pub async fn set_config_invalid(&self, message: &str) -> Result<()> {
        let conditions = self
            .conditions()
            .config_valid(false, "InvalidSizingPolicy", message)
            .build();

        let status = PostgresClusterStatus {
            volumes: self
                .cluster
                .status
                .as_ref()
                .map(|s| s.volumes.clone())
                .unwrap_or_default(),
            observed_generation: self.cluster.metadata.generation,
            conditions,
        };
        self.update(status).await
    }
}
