//! Per-turn sandbox resolution.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    berth_config::{SandboxConfig, SandboxMode, WorkspaceAccess, sandbox_state_dir},
    serde::Serialize,
    tracing::debug,
};

use crate::{
    policy::ToolPolicy,
    sandbox::{
        browser::{BrowserManager, SandboxBrowser},
        docker::ContainerManager,
        engine::{CliEngine, ContainerEngine},
        error::{Error, Result},
        naming::{resolve_scope_key, sandbox_workspace_dir},
        registry::{BrowserRegistry, ContainerRegistry},
    },
};

/// Everything a tool runtime needs to run a turn inside the sandbox.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxContext {
    pub session_key: String,
    pub scope_key: String,
    pub container_name: String,
    pub workspace_dir: PathBuf,
    pub container_workdir: String,
    pub workspace_access: WorkspaceAccess,
    pub tools: ToolPolicy,
    pub browser: Option<SandboxBrowser>,
}

/// Whether `session_key` runs sandboxed under `mode`.
pub fn is_sandboxed(mode: SandboxMode, session_key: &str, main_session_key: &str) -> bool {
    match mode {
        SandboxMode::Off => false,
        SandboxMode::NonMain => session_key.trim() != main_session_key.trim(),
        SandboxMode::All => true,
    }
}

/// Process-wide owner of the engine client, both registries, the managers
/// and, through the browser manager, the bridge pool.
pub struct SandboxOrchestrator {
    engine: Arc<dyn ContainerEngine>,
    containers: ContainerManager,
    browsers: BrowserManager,
}

impl SandboxOrchestrator {
    /// Registries live in `state_dir`.
    pub fn new(engine: Arc<dyn ContainerEngine>, state_dir: &Path) -> Self {
        let container_registry = Arc::new(ContainerRegistry::in_dir(state_dir));
        let browser_registry = Arc::new(BrowserRegistry::in_dir(state_dir));
        Self {
            containers: ContainerManager::new(Arc::clone(&engine), container_registry),
            browsers: BrowserManager::new(Arc::clone(&engine), browser_registry),
            engine,
        }
    }

    /// `docker` on `PATH`, registries under the data directory.
    pub fn from_defaults() -> Self {
        Self::new(Arc::new(CliEngine::default()), &sandbox_state_dir())
    }

    pub fn engine(&self) -> &dyn ContainerEngine {
        self.engine.as_ref()
    }

    pub fn containers(&self) -> &ContainerManager {
        &self.containers
    }

    pub fn browsers(&self) -> &BrowserManager {
        &self.browsers
    }

    /// Directory mounted as the container workdir for `scope_key`.
    pub fn workspace_dir_for(
        config: &SandboxConfig,
        scope_key: &str,
        agent_workspace_dir: &Path,
    ) -> PathBuf {
        match config.workspace_access {
            WorkspaceAccess::Rw => agent_workspace_dir.to_path_buf(),
            WorkspaceAccess::None | WorkspaceAccess::Ro => {
                sandbox_workspace_dir(&config.workspace_root, scope_key)
            },
        }
    }

    /// Provision (or reuse) the sandbox for one turn. `None` when the session
    /// is not sandboxed.
    pub async fn resolve(
        &self,
        session_key: &str,
        main_session_key: &str,
        agent_workspace_dir: &Path,
        config: &SandboxConfig,
        evaluate_enabled: bool,
    ) -> Result<Option<SandboxContext>> {
        if !is_sandboxed(config.mode, session_key, main_session_key) {
            debug!(session_key, mode = %config.mode, "session not sandboxed");
            return Ok(None);
        }

        let scope_key = resolve_scope_key(config.scope, session_key);
        let workspace_dir = Self::workspace_dir_for(config, &scope_key, agent_workspace_dir);
        tokio::fs::create_dir_all(&workspace_dir)
            .await
            .map_err(|source| Error::Workspace {
                path: workspace_dir.clone(),
                source,
            })?;

        let container_name = self
            .containers
            .ensure(session_key, &workspace_dir, agent_workspace_dir, config)
            .await?;
        let browser = self
            .browsers
            .ensure(
                &scope_key,
                &workspace_dir,
                agent_workspace_dir,
                config,
                evaluate_enabled,
            )
            .await?;

        Ok(Some(SandboxContext {
            session_key: session_key.trim().to_string(),
            scope_key,
            container_name,
            workspace_dir,
            container_workdir: config.docker.workdir.clone(),
            workspace_access: config.workspace_access,
            tools: ToolPolicy::from(&config.tools),
            browser,
        }))
    }
}
