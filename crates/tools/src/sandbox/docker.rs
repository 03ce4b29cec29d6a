//! Primary execution container: create, reuse, or recreate on drift.

use std::{path::Path, sync::Arc};

use {
    berth_config::{DEFAULT_SANDBOX_IMAGE, SandboxConfig, SandboxDockerConfig, WorkspaceAccess},
    tracing::{debug, info, warn},
};

use crate::sandbox::{
    HOT_CONTAINER_WINDOW, LABEL_CONFIG_HASH, LABEL_CREATED_AT_MS, LABEL_SANDBOX, LABEL_SCOPE_KEY,
    SANDBOX_AGENT_WORKSPACE_MOUNT, SANDBOX_FALLBACK_BASE_IMAGE,
    config_hash::{ConfigHashInput, compute_config_hash},
    engine::{
        ContainerEngine, CreateOutcome, argv, container_state, create_container, image_exists,
        read_config_hash_label, remove_container, start_container,
    },
    error::{Error, Result},
    naming::{container_name, recreate_hint, resolve_scope_key},
    now_ms,
    registry::{ContainerEntry, ContainerRegistry},
};

/// `create` arguments up to, but not including, the workspace mounts and the
/// image: name, labels and every security/resource knob in `docker`.
pub fn build_create_args(
    name: &str,
    docker: &SandboxDockerConfig,
    scope_key: &str,
    created_at_ms: u64,
    extra_labels: &[(&str, &str)],
) -> Vec<String> {
    let mut args = argv(&["create", "--name", name]);
    let labels = [
        (LABEL_SANDBOX, "1".to_string()),
        (LABEL_SCOPE_KEY, scope_key.to_string()),
        (LABEL_CREATED_AT_MS, created_at_ms.to_string()),
    ];
    for (key, value) in labels {
        args.extend(["--label".to_string(), format!("{key}={value}")]);
    }
    for (key, value) in extra_labels {
        args.extend(["--label".to_string(), format!("{key}={value}")]);
    }

    for (key, value) in &docker.env {
        args.extend(["--env".to_string(), format!("{key}={value}")]);
    }
    if docker.read_only_root {
        args.push("--read-only".into());
    }
    for entry in &docker.tmpfs {
        args.extend(["--tmpfs".to_string(), entry.clone()]);
    }
    if !docker.network.is_empty() {
        args.extend(["--network".to_string(), docker.network.clone()]);
    }
    if let Some(user) = &docker.user {
        args.extend(["--user".to_string(), user.clone()]);
    }
    for cap in &docker.cap_drop {
        args.extend(["--cap-drop".to_string(), cap.clone()]);
    }
    args.extend(argv(&["--security-opt", "no-new-privileges"]));
    if let Some(profile) = &docker.seccomp_profile {
        args.extend(["--security-opt".to_string(), format!("seccomp={profile}")]);
    }
    if let Some(profile) = &docker.apparmor_profile {
        args.extend(["--security-opt".to_string(), format!("apparmor={profile}")]);
    }
    for server in &docker.dns {
        args.extend(["--dns".to_string(), server.clone()]);
    }
    for host in &docker.extra_hosts {
        args.extend(["--add-host".to_string(), host.clone()]);
    }
    if let Some(pids) = docker.pids_limit.filter(|p| *p > 0) {
        args.extend(["--pids-limit".to_string(), pids.to_string()]);
    }
    if let Some(memory) = &docker.memory {
        args.extend(["--memory".to_string(), memory.clone()]);
    }
    if let Some(swap) = &docker.memory_swap {
        args.extend(["--memory-swap".to_string(), swap.clone()]);
    }
    if let Some(cpus) = docker.cpus.filter(|c| *c > 0.0) {
        args.extend(["--cpus".to_string(), cpus.to_string()]);
    }
    for (name, value) in &docker.ulimits {
        if let Some(rendered) = value.render() {
            args.extend(["--ulimit".to_string(), format!("{name}={rendered}")]);
        }
    }
    for bind in &docker.binds {
        args.extend(["-v".to_string(), bind.clone()]);
    }
    args
}

/// Workspace bind mounts.
///
/// The primary workspace is read-only only when it *is* the agent workspace
/// and access is `ro`. The agent workspace gets its own mount when it is a
/// separate directory and access is not `none`.
pub fn workspace_mount_args(
    workspace_dir: &Path,
    agent_workspace_dir: &Path,
    workdir: &str,
    access: WorkspaceAccess,
) -> Vec<String> {
    let same_dir = workspace_dir == agent_workspace_dir;
    let primary_suffix = if same_dir && access == WorkspaceAccess::Ro {
        ":ro"
    } else {
        ""
    };
    let mut args = vec![
        "-v".to_string(),
        format!("{}:{workdir}{primary_suffix}", workspace_dir.display()),
    ];
    if !same_dir && access != WorkspaceAccess::None {
        let suffix = if access == WorkspaceAccess::Ro {
            ":ro"
        } else {
            ""
        };
        args.extend([
            "-v".to_string(),
            format!(
                "{}:{SANDBOX_AGENT_WORKSPACE_MOUNT}{suffix}",
                agent_workspace_dir.display()
            ),
        ]);
    }
    args
}

/// Whether a container must not be torn down on drift: running and used
/// within [`HOT_CONTAINER_WINDOW`], or running with no recorded use at all.
pub fn is_hot(running: bool, last_used_at_ms: Option<u64>, now_ms: u64) -> bool {
    running
        && last_used_at_ms
            .is_none_or(|used| now_ms.saturating_sub(used) < HOT_CONTAINER_WINDOW.as_millis() as u64)
}

/// Owns the create/reuse/recreate decision for primary containers.
pub struct ContainerManager {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<ContainerRegistry>,
}

impl ContainerManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, registry: Arc<ContainerRegistry>) -> Self {
        Self { engine, registry }
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    /// Make sure the container for `session_key` exists, runs, and matches
    /// `config`, unless it is hot. Returns the container name.
    pub async fn ensure(
        &self,
        session_key: &str,
        workspace_dir: &Path,
        agent_workspace_dir: &Path,
        config: &SandboxConfig,
    ) -> Result<String> {
        let engine = self.engine.as_ref();
        let scope_key = resolve_scope_key(config.scope, session_key);
        let name = container_name(&config.docker.container_prefix, &scope_key);
        let expected_hash = compute_config_hash(&ConfigHashInput::new(
            &config.docker,
            config.workspace_access,
            workspace_dir,
            agent_workspace_dir,
        ));
        let now = now_ms();

        let state = container_state(engine, &name).await?;
        let (mut exists, running) = (state.exists, state.running);
        // Set when a mismatch was left in place. The running container's hash
        // and image are persisted so the drift stays visible.
        let mut suppressed: Option<(Option<String>, String)> = None;

        if exists {
            let entry = self.registry.get(&name).await?;
            let current_hash = match read_config_hash_label(engine, &name).await? {
                Some(hash) => Some(hash),
                None => entry.as_ref().and_then(|e| e.config_hash.clone()),
            };
            if current_hash.as_deref() != Some(expected_hash.as_str()) {
                let last_used = entry.as_ref().map(|e| e.last_used_at_ms);
                if is_hot(running, last_used, now) {
                    let hint = recreate_hint(config.scope, &scope_key);
                    info!(
                        container = %name,
                        hint = %hint,
                        "Sandbox config changed for {name} (recently used). Recreate to apply: {hint}"
                    );
                    let image = entry
                        .map(|e| e.image)
                        .unwrap_or_else(|| config.docker.image.clone());
                    suppressed = Some((current_hash, image));
                } else {
                    info!(container = %name, "sandbox config changed, recreating container");
                    remove_container(engine, &name).await?;
                    exists = false;
                }
            }
        }

        let mut outcome = None;
        if !exists {
            self.ensure_image(&config.docker.image).await?;
            outcome = Some(
                self.create(
                    &name,
                    &scope_key,
                    &expected_hash,
                    now,
                    workspace_dir,
                    agent_workspace_dir,
                    config,
                )
                .await?,
            );
        } else if !running {
            debug!(container = %name, "starting stopped sandbox container");
            start_container(engine, &name).await?;
        }

        let (config_hash, image) =
            suppressed.unwrap_or_else(|| (Some(expected_hash), config.docker.image.clone()));
        let entry = ContainerEntry {
            container_name: name.clone(),
            scope_key,
            created_at_ms: now,
            last_used_at_ms: now,
            image,
            config_hash,
        };
        if outcome == Some(CreateOutcome::Created) {
            self.registry.replace(entry).await?;
        } else {
            self.registry.upsert(entry).await?;
        }
        Ok(name)
    }

    /// The default image is bootstrapped from a public base; any other
    /// missing image is the operator's to build.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        let engine = self.engine.as_ref();
        if image_exists(engine, image).await? {
            return Ok(());
        }
        if image != DEFAULT_SANDBOX_IMAGE {
            return Err(Error::ImageNotFound {
                image: image.to_string(),
            });
        }
        info!(
            image,
            base = SANDBOX_FALLBACK_BASE_IMAGE,
            "default sandbox image missing, pulling base image"
        );
        engine
            .run(&argv(&["pull", SANDBOX_FALLBACK_BASE_IMAGE]))
            .await?;
        engine
            .run(&argv(&["tag", SANDBOX_FALLBACK_BASE_IMAGE, image]))
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        name: &str,
        scope_key: &str,
        config_hash: &str,
        created_at_ms: u64,
        workspace_dir: &Path,
        agent_workspace_dir: &Path,
        config: &SandboxConfig,
    ) -> Result<CreateOutcome> {
        let engine = self.engine.as_ref();
        let docker = &config.docker;
        let mut args = build_create_args(name, docker, scope_key, created_at_ms, &[(
            LABEL_CONFIG_HASH,
            config_hash,
        )]);
        args.extend(["--workdir".to_string(), docker.workdir.clone()]);
        args.extend(workspace_mount_args(
            workspace_dir,
            agent_workspace_dir,
            &docker.workdir,
            config.workspace_access,
        ));
        args.push(docker.image.clone());
        args.extend(argv(&["sleep", "infinity"]));

        let outcome = create_container(engine, &args).await?;
        match outcome {
            CreateOutcome::Created => {
                info!(container = name, image = %docker.image, "created sandbox container");
                start_container(engine, name).await?;
                if let Some(cmd) = docker.setup_command.as_deref().filter(|c| !c.trim().is_empty())
                {
                    info!(container = name, "running sandbox setup command");
                    engine
                        .run(&argv(&["exec", "-i", name, "sh", "-lc", cmd]))
                        .await?;
                }
            },
            CreateOutcome::AlreadyExists => {
                warn!(
                    container = name,
                    "sandbox container created concurrently, starting existing one"
                );
                start_container(engine, name).await?;
            },
        }
        Ok(outcome)
    }
}
