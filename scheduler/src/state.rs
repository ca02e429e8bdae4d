use std::sync::Arc;

use common::config::Settings;
use common::management::SchedulerAdmin;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub admin: SchedulerAdmin,
    pub config: Arc<Settings>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(admin: SchedulerAdmin, config: Settings, metrics: PrometheusHandle) -> Self {
        Self {
            admin,
            config: Arc::new(config),
            metrics,
        }
    }
}
