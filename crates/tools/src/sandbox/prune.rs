//! One-shot sweep of idle and aged-out sandboxes. Scheduling sweeps is left
//! to the caller.

use {berth_config::PruneConfig, serde::Serialize, tracing::info};

use crate::sandbox::{
    context::SandboxOrchestrator,
    error::Result,
    registry::RegistryRecord,
};

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Container names removed by a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub containers: Vec<String>,
    pub browsers: Vec<String>,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.browsers.is_empty()
    }
}

/// Whether a row is past either threshold at `now_ms`. A zero threshold
/// never fires.
pub fn should_prune<E: RegistryRecord>(entry: &E, config: &PruneConfig, now_ms: u64) -> bool {
    let idle_ms = now_ms.saturating_sub(entry.last_used_at_ms());
    let age_ms = now_ms.saturating_sub(entry.created_at_ms());
    (config.idle_hours > 0 && idle_ms >= config.idle_hours.saturating_mul(HOUR_MS))
        || (config.max_age_days > 0 && age_ms >= config.max_age_days.saturating_mul(DAY_MS))
}

impl SandboxOrchestrator {
    pub async fn prune(&self, config: &PruneConfig, now_ms: u64) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        for entry in self.containers().registry().list().await? {
            if should_prune(&entry, config, now_ms) {
                self.remove_container(&entry.container_name).await?;
                report.containers.push(entry.container_name);
            }
        }
        for entry in self.browsers().registry().list().await? {
            if should_prune(&entry, config, now_ms) {
                self.remove_browser_container(&entry.container_name).await?;
                report.browsers.push(entry.container_name);
            }
        }
        if !report.is_empty() {
            info!(
                containers = report.containers.len(),
                browsers = report.browsers.len(),
                "pruned sandbox containers"
            );
        }
        Ok(report)
    }
}
