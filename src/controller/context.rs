use std::sync::Arc;

use kube::Client;
use kube::runtime::events::Reporter;

use crate::controller::budget::BudgetTracker;
use crate::health::HealthState;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Rolling 24h action budget, owned here so tests are isolated and a
    /// restart replays history from status instead of trusting a singleton
    pub budget: Arc<BudgetTracker>,
    /// Health / metrics state, when the health server is running
    pub health: Option<Arc<HealthState>>,
    /// Event reporter identity
    pub reporter: Reporter,
}

impl Context {
    pub fn new(client: Client, health: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            budget: Arc::new(BudgetTracker::new()),
            health,
            reporter: Reporter {
                controller: "postgres-volume-operator".into(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}
