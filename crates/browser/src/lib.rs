//! Control plane for sandboxed browsers.
//!
//! A [`BrowserBridge`] is a small loopback HTTP server that fronts the
//! remote-debugging (CDP) port published by a browser container. Browser
//! tool clients talk to the bridge; the bridge makes sure the browser is
//! attachable and proxies the call to CDP.
//!
//! # Example
//!
//! ```ignore
//! use berth_browser::{BridgeOptions, BrowserBridge, ResolvedBrowserConfig};
//!
//! let resolved = ResolvedBrowserConfig::sandboxed(49153, true, false);
//! let bridge = BrowserBridge::start(BridgeOptions::new(resolved)).await?;
//! println!("control plane at {}", bridge.base_url());
//! bridge.stop().await;
//! ```

pub mod bridge;
pub mod error;
pub mod probe;
pub mod types;

pub use {
    bridge::{AttachHook, BridgeOptions, BrowserBridge},
    error::BrowserError,
    probe::{is_cdp_reachable, wait_for_cdp},
    types::{BrowserProfile, DEFAULT_PROFILE_NAME, ResolvedBrowserConfig, ResolvedProfile},
};
