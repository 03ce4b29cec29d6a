use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the single profile a sandboxed bridge exposes.
pub const DEFAULT_PROFILE_NAME: &str = "berth";

/// CDP timeouts for browsers reached over the network.
pub const DEFAULT_REMOTE_CDP_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REMOTE_CDP_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// CDP timeouts for a sandbox container published on loopback.
pub const SANDBOX_CDP_TIMEOUT_MS: u64 = 1_500;
pub const SANDBOX_CDP_HANDSHAKE_TIMEOUT_MS: u64 = 3_000;

/// A named CDP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub cdp_port: u16,
}

/// Browser control settings after merging defaults, as served by a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBrowserConfig {
    pub enabled: bool,
    pub evaluate_enabled: bool,
    /// Port of the control plane itself; 0 asks the OS for one.
    pub control_port: u16,
    pub cdp_protocol: String,
    pub cdp_host: String,
    pub remote_cdp_timeout_ms: u64,
    pub remote_cdp_handshake_timeout_ms: u64,
    pub headless: bool,
    /// Never launch a browser; only attach to the one already listening.
    pub attach_only: bool,
    pub default_profile: String,
    pub profiles: BTreeMap<String, BrowserProfile>,
}

impl Default for ResolvedBrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluate_enabled: false,
            control_port: 0,
            cdp_protocol: "http".into(),
            cdp_host: "127.0.0.1".into(),
            remote_cdp_timeout_ms: DEFAULT_REMOTE_CDP_TIMEOUT_MS,
            remote_cdp_handshake_timeout_ms: DEFAULT_REMOTE_CDP_HANDSHAKE_TIMEOUT_MS,
            headless: false,
            attach_only: false,
            default_profile: DEFAULT_PROFILE_NAME.into(),
            profiles: BTreeMap::new(),
        }
    }
}

impl ResolvedBrowserConfig {
    /// Attach-only config for a sandbox container whose CDP port is published
    /// on loopback at `cdp_port`.
    pub fn sandboxed(cdp_port: u16, headless: bool, evaluate_enabled: bool) -> Self {
        Self {
            evaluate_enabled,
            remote_cdp_timeout_ms: SANDBOX_CDP_TIMEOUT_MS,
            remote_cdp_handshake_timeout_ms: SANDBOX_CDP_HANDSHAKE_TIMEOUT_MS,
            headless,
            attach_only: true,
            profiles: BTreeMap::from([(DEFAULT_PROFILE_NAME.to_string(), BrowserProfile { cdp_port })]),
            ..Self::default()
        }
    }

    pub fn profile(&self, name: &str) -> Option<ResolvedProfile> {
        let profile = self.profiles.get(name)?;
        Some(ResolvedProfile {
            name: name.to_string(),
            cdp_port: profile.cdp_port,
            cdp_url: format!(
                "{}://{}:{}",
                self.cdp_protocol, self.cdp_host, profile.cdp_port
            ),
            cdp_host: self.cdp_host.clone(),
        })
    }

    pub fn default_profile(&self) -> Option<ResolvedProfile> {
        self.profile(&self.default_profile)
    }
}

/// A profile with its CDP endpoint spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProfile {
    pub name: String,
    pub cdp_port: u16,
    pub cdp_url: String,
    pub cdp_host: String,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandboxed_profile_is_attach_only_loopback() {
        let resolved = ResolvedBrowserConfig::sandboxed(49153, true, false);
        assert!(resolved.attach_only);
        assert!(resolved.headless);
        assert!(!resolved.evaluate_enabled);
        assert_eq!(resolved.control_port, 0);

        let profile = resolved.default_profile().unwrap();
        assert_eq!(profile.name, DEFAULT_PROFILE_NAME);
        assert_eq!(profile.cdp_port, 49153);
        assert_eq!(profile.cdp_url, "http://127.0.0.1:49153");
        assert_eq!(profile.cdp_host, "127.0.0.1");
    }

    #[test]
    fn test_sandbox_timeouts_tighter_than_remote() {
        let resolved = ResolvedBrowserConfig::sandboxed(1, false, true);
        assert!(resolved.remote_cdp_timeout_ms < DEFAULT_REMOTE_CDP_TIMEOUT_MS);
        assert!(
            resolved.remote_cdp_handshake_timeout_ms < DEFAULT_REMOTE_CDP_HANDSHAKE_TIMEOUT_MS
        );
    }

    #[test]
    fn test_unknown_profile() {
        let resolved = ResolvedBrowserConfig::default();
        assert!(resolved.default_profile().is_none());
        assert!(resolved.profile("other").is_none());
    }
}
