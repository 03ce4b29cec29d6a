/// Agent id used when a session key carries none.
pub const DEFAULT_AGENT_ID: &str = "main";
/// Session key used when the caller passes a blank key.
pub const DEFAULT_MAIN_KEY: &str = "main";

/// Session key: agent:<id>:main or agent:<id>:channel:<ch>:account:<acct>:peer:<kind>:<id>
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(pub String);

impl SessionKey {
    /// Wrap a raw key, trimming whitespace. Blank keys become `main`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self(DEFAULT_MAIN_KEY.into())
        } else {
            Self(trimmed.into())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Agent id embedded in an `agent:<id>:...` key, normalized. Keys in any
    /// other shape belong to the default agent.
    pub fn agent_id(&self) -> String {
        let mut parts = self.0.split(':');
        match (parts.next(), parts.next()) {
            (Some(prefix), Some(id)) if prefix.eq_ignore_ascii_case("agent") => {
                normalize_agent_id(id)
            },
            _ => DEFAULT_AGENT_ID.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase an agent id and collapse anything outside `[a-z0-9_-]` to `-`.
pub fn normalize_agent_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_matches('-');
    if out.is_empty() {
        DEFAULT_AGENT_ID.into()
    } else {
        out.to_string()
    }
}
