//! Listing, removal and targeted recreation of sandbox containers.

use {
    berth_config::SandboxConfig,
    serde::Serialize,
    tracing::info,
};

use crate::sandbox::{
    context::SandboxOrchestrator,
    engine::{container_state, remove_container},
    error::Result,
    registry::{BrowserEntry, ContainerEntry, RegistryRecord},
};

/// A registry row joined with what the engine reports now.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxContainerInfo {
    #[serde(flatten)]
    pub entry: ContainerEntry,
    pub running: bool,
    /// Whether the container was created from the currently configured image.
    pub image_match: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxBrowserInfo {
    #[serde(flatten)]
    pub entry: BrowserEntry,
    pub running: bool,
    pub image_match: bool,
}

/// Which sandboxes `recreate` tears down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecreateTarget {
    /// Sandboxes whose scope key is this session key.
    Session(String),
    /// Sandboxes scoped to this agent, or to any of its sessions.
    Agent(String),
    All,
}

impl RecreateTarget {
    pub fn matches(&self, scope_key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Session(key) => scope_key == key.trim(),
            Self::Agent(id) => {
                let agent_scope = format!("agent:{}", id.trim());
                scope_key == agent_scope || scope_key.starts_with(&format!("{agent_scope}:"))
            },
        }
    }
}

/// Container names removed by a recreate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecreateReport {
    pub containers: Vec<String>,
    pub browsers: Vec<String>,
}

impl SandboxOrchestrator {
    pub async fn list_containers(&self, config: &SandboxConfig) -> Result<Vec<SandboxContainerInfo>> {
        let mut infos = Vec::new();
        for entry in self.containers().registry().list().await? {
            let state = container_state(self.engine(), &entry.container_name).await?;
            infos.push(SandboxContainerInfo {
                image_match: entry.image == config.docker.image,
                running: state.running,
                entry,
            });
        }
        Ok(infos)
    }

    pub async fn list_browsers(&self, config: &SandboxConfig) -> Result<Vec<SandboxBrowserInfo>> {
        let mut infos = Vec::new();
        for entry in self.browsers().registry().list().await? {
            let state = container_state(self.engine(), &entry.container_name).await?;
            infos.push(SandboxBrowserInfo {
                image_match: entry.image == config.browser.image,
                running: state.running,
                entry,
            });
        }
        Ok(infos)
    }

    /// Force-remove a primary container and forget it.
    pub async fn remove_container(&self, container_name: &str) -> Result<()> {
        remove_container(self.engine(), container_name).await?;
        self.containers().registry().remove(container_name).await?;
        info!(container = container_name, "removed sandbox container");
        Ok(())
    }

    /// Force-remove a browser container, forget it and drop its bridge.
    pub async fn remove_browser_container(&self, container_name: &str) -> Result<()> {
        if let Some(entry) = self.browsers().registry().get(container_name).await? {
            self.browsers().stop_bridge(entry.scope_key()).await;
        }
        remove_container(self.engine(), container_name).await?;
        self.browsers().registry().remove(container_name).await?;
        info!(container = container_name, "removed sandbox browser");
        Ok(())
    }

    /// Remove every sandbox matching `target`; the next ensure recreates
    /// them from the current config.
    pub async fn recreate(&self, target: &RecreateTarget) -> Result<RecreateReport> {
        let mut report = RecreateReport::default();
        for entry in self.containers().registry().list().await? {
            if target.matches(&entry.scope_key) {
                self.remove_container(&entry.container_name).await?;
                report.containers.push(entry.container_name);
            }
        }
        for entry in self.browsers().registry().list().await? {
            if target.matches(&entry.scope_key) {
                self.remove_browser_container(&entry.container_name).await?;
                report.browsers.push(entry.container_name);
            }
        }
        Ok(report)
    }
}
