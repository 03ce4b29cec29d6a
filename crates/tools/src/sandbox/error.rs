use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program} {command}` failed with exit code {exit_code}: {stderr}")]
    Engine {
        program: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Sandbox image not found: {image}. Build or pull it first.")]
    ImageNotFound { image: String },

    #[error(
        "Sandbox browser image not found: {image}. Build it with scripts/sandbox-browser-setup.sh."
    )]
    BrowserImageNotFound { image: String },

    #[error("Failed to resolve CDP port mapping for {container}.")]
    PortUnresolved { container: String },

    #[error("registry {}: {source}", path.display())]
    RegistryIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("registry {} could not be encoded: {source}", path.display())]
    RegistryEncode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("sandbox workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Browser(#[from] berth_browser::BrowserError),
}

/// Engine stderr reporting that a container name is already taken.
pub(crate) fn is_name_conflict(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("already in use") || lower.contains("already exists")
}
