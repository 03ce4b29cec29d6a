//! Sandbox provisioning: a primary execution container and an optional
//! browser container per scope.
//!
//! Everything that touches the container engine goes through
//! [`engine::ContainerEngine`]; everything that persists goes through a
//! [`registry::Registry`]. [`context::SandboxOrchestrator`] owns both and is
//! the entry point for callers.

pub mod browser;
pub mod config_hash;
pub mod context;
pub mod docker;
pub mod engine;
pub mod error;
pub mod manage;
pub mod naming;
pub mod prune;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use {
    browser::{BrowserManager, SandboxBrowser},
    config_hash::{ConfigHashInput, compute_config_hash},
    context::{SandboxContext, SandboxOrchestrator, is_sandboxed},
    docker::ContainerManager,
    engine::{CliEngine, ContainerEngine, ContainerState, EngineOutput},
    error::{Error, Result},
    manage::{RecreateReport, RecreateTarget, SandboxBrowserInfo, SandboxContainerInfo},
    prune::PruneReport,
    registry::{BrowserEntry, BrowserRegistry, ContainerEntry, ContainerRegistry, Registry},
};

/// A running container used this recently is never recreated on drift.
pub const HOT_CONTAINER_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Mount point of the agent workspace when it is exposed next to the
/// sandbox workspace.
pub const SANDBOX_AGENT_WORKSPACE_MOUNT: &str = "/agent";

/// Base image pulled and re-tagged when the default sandbox image is missing.
pub const SANDBOX_FALLBACK_BASE_IMAGE: &str = "debian:bookworm-slim";

pub const LABEL_SANDBOX: &str = "berth.sandbox";
pub const LABEL_SANDBOX_BROWSER: &str = "berth.sandboxBrowser";
pub const LABEL_SCOPE_KEY: &str = "berth.scopeKey";
pub const LABEL_CREATED_AT_MS: &str = "berth.createdAtMs";
pub const LABEL_CONFIG_HASH: &str = "berth.configHash";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
