//! Fingerprint of the configuration a primary container was created from.
//!
//! Only equality matters: the hash is stored on the container as a label and
//! in the registry, and a mismatch on the next ensure means drift.

use std::path::Path;

use {
    berth_config::{SandboxDockerConfig, WorkspaceAccess},
    serde::Serialize,
    serde_json::{Map, Value},
    sha2::{Digest, Sha256},
};

/// Inputs that affect what a container looks like once created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigHashInput<'a> {
    pub docker: &'a SandboxDockerConfig,
    pub workspace_access: WorkspaceAccess,
    pub workspace_dir: String,
    pub agent_workspace_dir: String,
}

impl<'a> ConfigHashInput<'a> {
    pub fn new(
        docker: &'a SandboxDockerConfig,
        workspace_access: WorkspaceAccess,
        workspace_dir: &Path,
        agent_workspace_dir: &Path,
    ) -> Self {
        Self {
            docker,
            workspace_access,
            workspace_dir: workspace_dir.to_string_lossy().into_owned(),
            agent_workspace_dir: agent_workspace_dir.to_string_lossy().into_owned(),
        }
    }
}

/// Hex SHA-256 of the normalized JSON rendering of `input`.
pub fn compute_config_hash(input: &ConfigHashInput<'_>) -> String {
    let value = serde_json::to_value(input).unwrap_or(Value::Null);
    let normalized = normalize(value).unwrap_or(Value::Null);
    let raw = normalized.to_string();
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Drop nulls, order object keys, and sort arrays made only of primitives so
/// list order in config files does not register as drift.
fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let mut items: Vec<Value> = items.into_iter().filter_map(normalize).collect();
            if items.iter().all(is_primitive) {
                items.sort_by_key(|item| item.to_string());
            }
            Some(Value::Array(items))
        },
        Value::Object(entries) => {
            let mut sorted: Vec<(String, Value)> = entries
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Some(Value::Object(sorted.into_iter().collect::<Map<_, _>>()))
        },
        other => Some(other),
    }
}
