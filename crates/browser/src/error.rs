use thiserror::Error;

/// Errors raised by the browser control plane.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to bind browser bridge on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("browser profile \"{0}\" is not configured")]
    UnknownProfile(String),

    #[error("Sandbox browser CDP did not become reachable on {host}:{port} within {timeout_ms}ms.")]
    CdpTimeout {
        host: String,
        port: u16,
        timeout_ms: u64,
    },

    #[error("browser attach failed: {0}")]
    Attach(String),

    #[error("CDP request to {url} failed: {source}")]
    Cdp {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
