/// Config schema types for sandbox containers, the browser sandbox, tool
/// policy and pruning thresholds.
use std::{collections::BTreeMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Default image for the primary execution container.
pub const DEFAULT_SANDBOX_IMAGE: &str = "berth-sandbox:bookworm-slim";
/// Default image for the browser container.
pub const DEFAULT_SANDBOX_BROWSER_IMAGE: &str = "berth-sandbox-browser:bookworm-slim";
pub const DEFAULT_SANDBOX_CONTAINER_PREFIX: &str = "berth-sbx-";
pub const DEFAULT_SANDBOX_BROWSER_PREFIX: &str = "berth-sbx-browser-";
pub const DEFAULT_SANDBOX_WORKDIR: &str = "/workspace";

pub const DEFAULT_SANDBOX_BROWSER_CDP_PORT: u16 = 9222;
pub const DEFAULT_SANDBOX_BROWSER_VNC_PORT: u16 = 5900;
pub const DEFAULT_SANDBOX_BROWSER_NOVNC_PORT: u16 = 6080;
pub const DEFAULT_SANDBOX_BROWSER_NETWORK: &str = "bridge";
pub const DEFAULT_SANDBOX_BROWSER_AUTOSTART_TIMEOUT_MS: u64 = 12_000;

pub const DEFAULT_SANDBOX_IDLE_HOURS: u64 = 24;
pub const DEFAULT_SANDBOX_MAX_AGE_DAYS: u64 = 7;

/// Tools a sandboxed session may use unless configured otherwise.
pub const DEFAULT_TOOL_ALLOW: &[&str] = &[
    "exec",
    "process",
    "read",
    "write",
    "edit",
    "apply_patch",
    "image",
    "sessions_list",
    "sessions_history",
    "sessions_send",
    "sessions_spawn",
    "session_status",
];

/// Tools denied inside the sandbox unless configured otherwise.
pub const DEFAULT_TOOL_DENY: &[&str] = &["browser", "canvas", "nodes", "cron", "gateway"];

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BerthConfig {
    pub sandbox: SandboxConfig,
}

/// Sandbox mode controlling when sandboxing is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    Off,
    NonMain,
    #[default]
    All,
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::NonMain => f.write_str("non-main"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Scope determines container lifecycle boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxScope {
    #[default]
    Session,
    Agent,
    Shared,
}

impl fmt::Display for SandboxScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Agent => f.write_str("agent"),
            Self::Shared => f.write_str("shared"),
        }
    }
}

/// How the agent workspace is exposed inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceAccess {
    #[default]
    None,
    Ro,
    Rw,
}

impl fmt::Display for WorkspaceAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Ro => f.write_str("ro"),
            Self::Rw => f.write_str("rw"),
        }
    }
}

/// A single `--ulimit` value: a bare limit, a raw engine string, or a
/// soft/hard pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UlimitValue {
    Limit(u64),
    Raw(String),
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        soft: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hard: Option<u64>,
    },
}

impl UlimitValue {
    /// Render the value for `--ulimit <name>=<value>`. Returns `None` when
    /// there is nothing to pass.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Limit(n) => Some(n.to_string()),
            Self::Raw(raw) => {
                let raw = raw.trim();
                (!raw.is_empty()).then(|| raw.to_string())
            },
            Self::Range {
                soft: Some(soft),
                hard: Some(hard),
            } => Some(format!("{soft}:{hard}")),
            Self::Range {
                soft: Some(limit),
                hard: None,
            }
            | Self::Range {
                soft: None,
                hard: Some(limit),
            } => Some(limit.to_string()),
            Self::Range {
                soft: None,
                hard: None,
            } => None,
        }
    }
}

/// Container resource and security settings shared by both sandbox roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxDockerConfig {
    pub image: String,
    pub container_prefix: String,
    /// Working directory inside the container; the workspace is mounted here.
    pub workdir: String,
    pub read_only_root: bool,
    pub tmpfs: Vec<String>,
    pub network: String,
    pub user: Option<String>,
    pub cap_drop: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// One-shot command run after the container is first created.
    pub setup_command: Option<String>,
    pub pids_limit: Option<u32>,
    /// Memory limit (e.g. "512m", "1g").
    pub memory: Option<String>,
    pub memory_swap: Option<String>,
    /// CPU quota as a fraction of cores.
    pub cpus: Option<f64>,
    pub ulimits: BTreeMap<String, UlimitValue>,
    pub seccomp_profile: Option<String>,
    pub apparmor_profile: Option<String>,
    pub dns: Vec<String>,
    pub extra_hosts: Vec<String>,
    /// Extra bind mounts in engine syntax (`host:container[:mode]`).
    pub binds: Vec<String>,
}

impl Default for SandboxDockerConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_SANDBOX_IMAGE.into(),
            container_prefix: DEFAULT_SANDBOX_CONTAINER_PREFIX.into(),
            workdir: DEFAULT_SANDBOX_WORKDIR.into(),
            read_only_root: true,
            tmpfs: vec!["/tmp".into(), "/var/tmp".into(), "/run".into()],
            network: "none".into(),
            user: None,
            cap_drop: vec!["ALL".into()],
            env: BTreeMap::from([("LANG".to_string(), "C.UTF-8".to_string())]),
            setup_command: None,
            pids_limit: None,
            memory: None,
            memory_swap: None,
            cpus: None,
            ulimits: BTreeMap::new(),
            seccomp_profile: None,
            apparmor_profile: None,
            dns: Vec::new(),
            extra_hosts: Vec::new(),
            binds: Vec::new(),
        }
    }
}

/// Browser sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxBrowserConfig {
    pub enabled: bool,
    pub image: String,
    pub container_prefix: String,
    pub cdp_port: u16,
    pub vnc_port: u16,
    pub novnc_port: u16,
    /// Engine network for the browser container. Its CDP and noVNC ports are
    /// published to the host, which `none` would drop.
    pub network: String,
    pub headless: bool,
    pub enable_novnc: bool,
    /// Start the container and wait for CDP when a control call finds it
    /// unreachable.
    pub auto_start: bool,
    pub auto_start_timeout_ms: u64,
}

impl Default for SandboxBrowserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image: DEFAULT_SANDBOX_BROWSER_IMAGE.into(),
            container_prefix: DEFAULT_SANDBOX_BROWSER_PREFIX.into(),
            cdp_port: DEFAULT_SANDBOX_BROWSER_CDP_PORT,
            vnc_port: DEFAULT_SANDBOX_BROWSER_VNC_PORT,
            novnc_port: DEFAULT_SANDBOX_BROWSER_NOVNC_PORT,
            network: DEFAULT_SANDBOX_BROWSER_NETWORK.into(),
            headless: false,
            enable_novnc: true,
            auto_start: true,
            auto_start_timeout_ms: DEFAULT_SANDBOX_BROWSER_AUTOSTART_TIMEOUT_MS,
        }
    }
}

impl SandboxBrowserConfig {
    /// noVNC is only published for headed browsers.
    pub fn novnc_active(&self) -> bool {
        self.enable_novnc && !self.headless
    }
}

/// Allow/deny glob lists for tools inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicyConfig {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl Default for ToolPolicyConfig {
    fn default() -> Self {
        Self {
            allow: DEFAULT_TOOL_ALLOW.iter().map(|s| s.to_string()).collect(),
            deny: DEFAULT_TOOL_DENY.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Idle and age thresholds for pruning; zero disables a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    pub idle_hours: u64,
    pub max_age_days: u64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            idle_hours: DEFAULT_SANDBOX_IDLE_HOURS,
            max_age_days: DEFAULT_SANDBOX_MAX_AGE_DAYS,
        }
    }
}

/// Fully resolved sandbox configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub mode: SandboxMode,
    pub scope: SandboxScope,
    pub workspace_access: WorkspaceAccess,
    /// Root under which per-scope sandbox workspaces are created.
    pub workspace_root: PathBuf,
    pub docker: SandboxDockerConfig,
    pub browser: SandboxBrowserConfig,
    pub tools: ToolPolicyConfig,
    pub prune: PruneConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::default(),
            scope: SandboxScope::default(),
            workspace_access: WorkspaceAccess::default(),
            workspace_root: crate::loader::data_dir().join("sandboxes"),
            docker: SandboxDockerConfig::default(),
            browser: SandboxBrowserConfig::default(),
            tools: ToolPolicyConfig::default(),
            prune: PruneConfig::default(),
        }
    }
}
