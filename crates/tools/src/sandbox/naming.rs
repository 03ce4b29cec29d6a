//! Scope keys, slugs and container names.

use std::path::{Path, PathBuf};

use {
    berth_config::SandboxScope,
    berth_sessions::SessionKey,
    sha2::{Digest, Sha256},
};

/// Engine limit on container name length.
pub const MAX_CONTAINER_NAME_LEN: usize = 63;

const MAX_SLUG_BASE_LEN: usize = 32;
const SHARED_SCOPE_KEY: &str = "shared";

/// Key a sandbox is provisioned under. `shared` collapses everything to one
/// key; `agent` keeps only the agent id; `session` keeps the whole key.
pub fn resolve_scope_key(scope: SandboxScope, session_key: &str) -> String {
    let key = SessionKey::parse(session_key);
    match scope {
        SandboxScope::Shared => SHARED_SCOPE_KEY.to_string(),
        SandboxScope::Session => key.as_str().to_string(),
        SandboxScope::Agent => format!("agent:{}", key.agent_id()),
    }
}

/// Filesystem- and engine-safe rendering of a key: a readable prefix plus
/// eight hex chars of its SHA-256 so distinct keys never collide after
/// sanitizing.
pub fn slugify_session_key(value: &str) -> String {
    let trimmed = value.trim();
    let base = if trimmed.is_empty() {
        "session"
    } else {
        trimmed
    };
    let digest = Sha256::digest(base.as_bytes());
    let hash8: String = format!("{digest:x}").chars().take(8).collect();

    let mut safe = String::with_capacity(base.len());
    let mut pending_dash = false;
    for c in base.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
            if pending_dash {
                safe.push('-');
                pending_dash = false;
            }
            safe.push(c);
        } else {
            pending_dash = true;
        }
    }
    if pending_dash {
        safe.push('-');
    }
    let safe: String = safe
        .trim_matches('-')
        .chars()
        .take(MAX_SLUG_BASE_LEN)
        .collect();
    let safe = if safe.is_empty() {
        "session"
    } else {
        safe.as_str()
    };
    format!("{safe}-{hash8}")
}

fn truncate_name(name: String) -> String {
    if name.chars().count() <= MAX_CONTAINER_NAME_LEN {
        return name;
    }
    name.chars().take(MAX_CONTAINER_NAME_LEN).collect()
}

/// Name of the primary container for `scope_key`.
pub fn container_name(prefix: &str, scope_key: &str) -> String {
    truncate_name(format!("{prefix}{}", slugify_session_key(scope_key)))
}

/// Name of the browser container; the shared scope gets a readable name.
pub fn browser_container_name(prefix: &str, scope: SandboxScope, scope_key: &str) -> String {
    let slug = match scope {
        SandboxScope::Shared => SHARED_SCOPE_KEY.to_string(),
        _ => slugify_session_key(scope_key),
    };
    truncate_name(format!("{prefix}{slug}"))
}

/// Per-scope sandbox workspace under `root`.
pub fn sandbox_workspace_dir(root: &Path, scope_key: &str) -> PathBuf {
    root.join(slugify_session_key(scope_key))
}

/// CLI invocation that recreates the sandbox(es) backing `scope_key`.
pub fn recreate_hint(scope: SandboxScope, scope_key: &str) -> String {
    match scope {
        SandboxScope::Session => format!("berth sandbox recreate --session {scope_key}"),
        SandboxScope::Agent => {
            let agent_id = scope_key.strip_prefix("agent:").unwrap_or(scope_key);
            format!("berth sandbox recreate --agent {agent_id}")
        },
        SandboxScope::Shared => "berth sandbox recreate --all".to_string(),
    }
}
