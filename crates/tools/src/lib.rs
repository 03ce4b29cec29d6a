//! Sandbox provisioning and tool policy enforcement.
//!
//! Sandbox: a primary execution container and an optional browser container
//! per scope, reconciled against a config fingerprint and tracked in two
//! on-disk registries.
//!
//! Policy: glob-based allow/deny gate deciding which tools a sandboxed
//! session may use.

pub mod policy;
pub mod sandbox;
