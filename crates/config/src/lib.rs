//! Configuration loading and schema for berth sandboxes.
//!
//! Config files are discovered as `berth.{toml,yaml,yml,json}` in the
//! working directory, then in `~/.config/berth/`. `${ENV_VAR}` placeholders
//! are substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{data_dir, discover_and_load, load_config, sandbox_state_dir},
    schema::{
        BerthConfig, DEFAULT_SANDBOX_IMAGE, PruneConfig, SandboxBrowserConfig, SandboxConfig,
        SandboxDockerConfig, SandboxMode, SandboxScope, ToolPolicyConfig, UlimitValue,
        WorkspaceAccess,
    },
};
