//! CDP readiness probing against `/json/version`.

use std::time::Duration;

use {
    tokio::time::{Instant, sleep},
    tracing::{debug, trace},
};

/// Delay between readiness probes.
pub const CDP_POLL_INTERVAL: Duration = Duration::from_millis(150);
/// Upper bound for a single readiness probe.
pub const CDP_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Returns true if `GET <cdp_url>/json/version` answers with a success status
/// within `timeout`.
pub async fn is_cdp_reachable(client: &reqwest::Client, cdp_url: &str, timeout: Duration) -> bool {
    let url = format!("{}/json/version", cdp_url.trim_end_matches('/'));
    match client.get(&url).timeout(timeout).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            trace!(url, error = %e, "cdp probe failed");
            false
        },
    }
}

/// Poll CDP until it answers or `deadline` elapses. Returns whether it became
/// reachable.
pub async fn wait_for_cdp(client: &reqwest::Client, cdp_url: &str, deadline: Duration) -> bool {
    let started = Instant::now();
    let until = started + deadline;
    while Instant::now() < until {
        let remaining = until.saturating_duration_since(Instant::now());
        if is_cdp_reachable(client, cdp_url, CDP_PROBE_TIMEOUT.min(remaining)).await {
            debug!(
                cdp_url,
                waited_ms = started.elapsed().as_millis() as u64,
                "cdp reachable"
            );
            return true;
        }
        sleep(CDP_POLL_INTERVAL).await;
    }
    false
}
