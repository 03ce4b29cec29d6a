//! Session key parsing.
//!
//! Session keys look like `agent:<agentId>:main` or
//! `agent:<agentId>:channel:<ch>:account:<acct>:peer:<kind>:<id>`. Sandboxes
//! are keyed on the whole key or on the agent id extracted from it.

pub mod key;

pub use key::{DEFAULT_AGENT_ID, DEFAULT_MAIN_KEY, SessionKey, normalize_agent_id};
