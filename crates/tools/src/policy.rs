use {
    berth_config::ToolPolicyConfig,
    serde::{Deserialize, Serialize},
    tracing::trace,
};

/// Glob-based allow/deny policy for tool access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Check if a tool name matches a glob pattern (supports `*` wildcard).
fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    pattern.eq_ignore_ascii_case(name)
}

impl ToolPolicy {
    /// Returns true if the given tool name is allowed by this policy.
    /// Deny always wins over allow.
    pub fn is_allowed(&self, tool_name: &str) -> bool {
        if let Some(pattern) = self.deny.iter().find(|p| pattern_matches(p, tool_name)) {
            trace!(tool = tool_name, pattern, "tool denied");
            return false;
        }
        // An empty allow list lets through everything not denied.
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|p| pattern_matches(p, tool_name))
    }
}

impl From<&ToolPolicyConfig> for ToolPolicy {
    fn from(config: &ToolPolicyConfig) -> Self {
        Self {
            allow: config.allow.clone(),
            deny: config.deny.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let policy = ToolPolicy {
            allow: vec!["*".into()],
            deny: Vec::new(),
        };
        assert!(policy.is_allowed("exec"));
        assert!(policy.is_allowed("browser"));
    }

    #[test]
    fn test_deny_wins() {
        let policy = ToolPolicy {
            allow: vec!["*".into(), "browser".into()],
            deny: vec!["browser".into()],
        };
        assert!(!policy.is_allowed("browser"));
        assert!(policy.is_allowed("exec"));
    }

    #[test]
    fn test_prefix_pattern() {
        let policy = ToolPolicy {
            allow: vec!["sessions_*".into()],
            deny: Vec::new(),
        };
        assert!(policy.is_allowed("sessions_list"));
        assert!(policy.is_allowed("sessions_send"));
        assert!(!policy.is_allowed("exec"));
    }

    #[test]
    fn test_empty_allow_permits_all() {
        let policy = ToolPolicy::default();
        assert!(policy.is_allowed("exec"));
    }

    #[test]
    fn test_name_match_ignores_case() {
        let policy = ToolPolicy {
            allow: Vec::new(),
            deny: vec![" Browser ".into()],
        };
        assert!(!policy.is_allowed("browser"));
    }

    #[test]
    fn test_default_sandbox_policy_denies_browser() {
        let policy = ToolPolicy::from(&ToolPolicyConfig::default());
        assert!(!policy.is_allowed("browser"));
        assert!(!policy.is_allowed("gateway"));
        assert!(policy.is_allowed("exec"));
        assert!(policy.is_allowed("sessions_spawn"));
        assert!(!policy.is_allowed("web_fetch"));
    }

    #[test]
    fn test_configured_policy_can_allow_browser() {
        let config = ToolPolicyConfig {
            allow: vec!["exec".into(), "browser".into()],
            deny: vec!["canvas".into()],
        };
        let policy = ToolPolicy::from(&config);
        assert!(policy.is_allowed("browser"));
        assert!(!policy.is_allowed("canvas"));
        assert!(!policy.is_allowed("read"));
    }
}
