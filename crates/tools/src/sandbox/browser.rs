//! Browser container and its pooled control-plane bridges.

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    berth_browser::{
        AttachHook, BridgeOptions, BrowserBridge, BrowserError, ResolvedBrowserConfig,
        ResolvedProfile, is_cdp_reachable, wait_for_cdp,
    },
    berth_config::{SandboxBrowserConfig, SandboxConfig, SandboxDockerConfig},
    serde::Serialize,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    policy::ToolPolicy,
    sandbox::{
        LABEL_SANDBOX_BROWSER,
        docker::{build_create_args, workspace_mount_args},
        engine::{
            ContainerEngine, CreateOutcome, container_state, create_container, image_exists,
            read_mapped_port, start_container,
        },
        error::{Error, Result},
        naming::browser_container_name,
        now_ms,
        registry::{BrowserEntry, BrowserRegistry},
    },
};

/// Probe used by the attach hook to decide whether any work is needed.
const ATTACH_REACHABILITY_PROBE: Duration = Duration::from_millis(500);

/// What a caller needs to drive the sandboxed browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxBrowser {
    pub bridge_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub novnc_url: Option<String>,
    pub container_name: String,
}

struct BridgeEntry {
    bridge: Arc<BrowserBridge>,
    container_name: String,
}

pub fn novnc_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/vnc.html?autoconnect=1&resize=remote")
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Starts the browser container when a control call finds CDP unreachable,
/// then waits for it up to the configured deadline.
struct ContainerAttachHook {
    engine: Arc<dyn ContainerEngine>,
    client: reqwest::Client,
    container_name: String,
    timeout_ms: u64,
}

#[async_trait]
impl AttachHook for ContainerAttachHook {
    async fn ensure_attach(&self, profile: &ResolvedProfile) -> Result<(), BrowserError> {
        if is_cdp_reachable(&self.client, &profile.cdp_url, ATTACH_REACHABILITY_PROBE).await {
            return Ok(());
        }

        let engine = self.engine.as_ref();
        let state = container_state(engine, &self.container_name)
            .await
            .map_err(|e| BrowserError::Attach(e.to_string()))?;
        if state.exists && !state.running {
            info!(container = %self.container_name, "starting stopped sandbox browser");
            start_container(engine, &self.container_name)
                .await
                .map_err(|e| BrowserError::Attach(e.to_string()))?;
        }

        if wait_for_cdp(
            &self.client,
            &profile.cdp_url,
            Duration::from_millis(self.timeout_ms),
        )
        .await
        {
            return Ok(());
        }
        Err(BrowserError::CdpTimeout {
            host: profile.cdp_host.clone(),
            port: profile.cdp_port,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Owns browser containers and the bridge pool keyed by scope key.
pub struct BrowserManager {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<BrowserRegistry>,
    bridges: Mutex<HashMap<String, BridgeEntry>>,
    client: reqwest::Client,
}

impl BrowserManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, registry: Arc<BrowserRegistry>) -> Self {
        Self {
            engine,
            registry,
            bridges: Mutex::new(HashMap::new()),
            client: reqwest::Client::new(),
        }
    }

    pub fn registry(&self) -> &BrowserRegistry {
        &self.registry
    }

    /// Make sure the browser container for `scope_key` runs and a bridge
    /// fronts it. `None` when the browser is disabled or not allowed.
    pub async fn ensure(
        &self,
        scope_key: &str,
        workspace_dir: &Path,
        agent_workspace_dir: &Path,
        config: &SandboxConfig,
        evaluate_enabled: bool,
    ) -> Result<Option<SandboxBrowser>> {
        let browser = &config.browser;
        if !browser.enabled {
            return Ok(None);
        }
        if !ToolPolicy::from(&config.tools).is_allowed("browser") {
            debug!(scope_key, "browser tool denied by sandbox policy");
            return Ok(None);
        }

        let engine = self.engine.as_ref();
        let name = browser_container_name(&browser.container_prefix, config.scope, scope_key);
        let now = now_ms();

        let state = container_state(engine, &name).await?;
        let mut created = false;
        if !state.exists {
            if !image_exists(engine, &browser.image).await? {
                return Err(Error::BrowserImageNotFound {
                    image: browser.image.clone(),
                });
            }
            let args = browser_create_args(
                &name,
                scope_key,
                now,
                workspace_dir,
                agent_workspace_dir,
                config,
            );
            match create_container(engine, &args).await? {
                CreateOutcome::Created => {
                    info!(container = %name, image = %browser.image, "created sandbox browser");
                    created = true;
                },
                CreateOutcome::AlreadyExists => {
                    warn!(
                        container = %name,
                        "sandbox browser created concurrently, starting existing one"
                    );
                },
            }
            start_container(engine, &name).await?;
        } else if !state.running {
            debug!(container = %name, "starting stopped sandbox browser");
            start_container(engine, &name).await?;
        }

        let cdp_port = read_mapped_port(engine, &name, browser.cdp_port)
            .await?
            .ok_or_else(|| Error::PortUnresolved {
                container: name.clone(),
            })?;
        let novnc_port = if browser.novnc_active() {
            read_mapped_port(engine, &name, browser.novnc_port).await?
        } else {
            None
        };

        let bridge = self
            .bridge_for(scope_key, &name, cdp_port, browser, evaluate_enabled)
            .await?;

        let entry = BrowserEntry {
            container_name: name.clone(),
            scope_key: scope_key.to_string(),
            created_at_ms: now,
            last_used_at_ms: now,
            image: browser.image.clone(),
            cdp_port,
            novnc_port,
        };
        if created {
            self.registry.replace(entry).await?;
        } else {
            self.registry.upsert(entry).await?;
        }

        Ok(Some(SandboxBrowser {
            bridge_url: bridge.base_url().to_string(),
            novnc_url: novnc_port.map(novnc_url),
            container_name: name,
        }))
    }

    /// Reuse the pooled bridge when it still targets `container_name` on
    /// `cdp_port`; otherwise replace it.
    ///
    /// Stopping a bridge waits for its in-flight requests, so it never happens
    /// while the pool is locked.
    async fn bridge_for(
        &self,
        scope_key: &str,
        container_name: &str,
        cdp_port: u16,
        browser: &SandboxBrowserConfig,
        evaluate_enabled: bool,
    ) -> Result<Arc<BrowserBridge>> {
        let stale = {
            let mut bridges = self.bridges.lock().await;
            if let Some(entry) = bridges.get(scope_key)
                && entry.container_name == container_name
                && entry.bridge.cdp_port() == Some(cdp_port)
            {
                return Ok(Arc::clone(&entry.bridge));
            }
            bridges.remove(scope_key)
        };
        if let Some(stale) = stale {
            info!(
                scope_key,
                container = %stale.container_name,
                "replacing sandbox browser bridge"
            );
            stale.bridge.stop().await;
        }

        let resolved = ResolvedBrowserConfig::sandboxed(cdp_port, browser.headless, evaluate_enabled);
        let mut opts = BridgeOptions::new(resolved);
        if browser.auto_start {
            opts = opts.with_hook(Arc::new(ContainerAttachHook {
                engine: Arc::clone(&self.engine),
                client: self.client.clone(),
                container_name: container_name.to_string(),
                timeout_ms: browser.auto_start_timeout_ms,
            }));
        }
        let bridge = Arc::new(BrowserBridge::start(opts).await?);
        let displaced = self
            .bridges
            .lock()
            .await
            .insert(scope_key.to_string(), BridgeEntry {
                bridge: Arc::clone(&bridge),
                container_name: container_name.to_string(),
            });
        if let Some(displaced) = displaced {
            displaced.bridge.stop().await;
        }
        Ok(bridge)
    }

    /// The pooled bridge for `scope_key`, if any.
    pub async fn bridge(&self, scope_key: &str) -> Option<Arc<BrowserBridge>> {
        self.bridges
            .lock()
            .await
            .get(scope_key)
            .map(|e| Arc::clone(&e.bridge))
    }

    /// Tear down the bridge for `scope_key`. Returns whether one existed.
    pub async fn stop_bridge(&self, scope_key: &str) -> bool {
        let entry = self.bridges.lock().await.remove(scope_key);
        match entry {
            Some(entry) => {
                entry.bridge.stop().await;
                true
            },
            None => false,
        }
    }

    /// Tear down every pooled bridge.
    pub async fn stop_all(&self) {
        let drained: Vec<BridgeEntry> = self.bridges.lock().await.drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.bridge.stop().await;
        }
    }
}

fn browser_create_args(
    name: &str,
    scope_key: &str,
    created_at_ms: u64,
    workspace_dir: &Path,
    agent_workspace_dir: &Path,
    config: &SandboxConfig,
) -> Vec<String> {
    let browser = &config.browser;
    // Published ports need a real network even when the primary container
    // runs without one.
    let docker = SandboxDockerConfig {
        network: browser.network.clone(),
        ..config.docker.clone()
    };
    let mut args = build_create_args(name, &docker, scope_key, created_at_ms, &[(
        LABEL_SANDBOX_BROWSER,
        "1",
    )]);
    args.extend(workspace_mount_args(
        workspace_dir,
        agent_workspace_dir,
        &config.docker.workdir,
        config.workspace_access,
    ));
    args.extend(["-p".to_string(), format!("127.0.0.1::{}", browser.cdp_port)]);
    if browser.novnc_active() {
        args.extend(["-p".to_string(), format!("127.0.0.1::{}", browser.novnc_port)]);
    }
    let env = [
        ("BERTH_BROWSER_HEADLESS", flag(browser.headless).to_string()),
        (
            "BERTH_BROWSER_ENABLE_NOVNC",
            flag(browser.enable_novnc).to_string(),
        ),
        ("BERTH_BROWSER_CDP_PORT", browser.cdp_port.to_string()),
        ("BERTH_BROWSER_VNC_PORT", browser.vnc_port.to_string()),
        ("BERTH_BROWSER_NOVNC_PORT", browser.novnc_port.to_string()),
    ];
    for (key, value) in env {
        args.extend(["-e".to_string(), format!("{key}={value}")]);
    }
    args.push(browser.image.clone());
    args
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sandbox::testing::FakeEngine,
        berth_config::{SandboxScope, ToolPolicyConfig},
        std::path::PathBuf,
    };

    const IMAGE: &str = "browser:test";

    struct Harness {
        engine: Arc<FakeEngine>,
        manager: BrowserManager,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());
        engine.add_image(IMAGE);
        let registry = Arc::new(BrowserRegistry::in_dir(dir.path()));
        let manager = BrowserManager::new(engine.clone(), registry);
        Harness {
            engine,
            manager,
            _dir: dir,
        }
    }

    fn config() -> SandboxConfig {
        let mut config = SandboxConfig {
            scope: SandboxScope::Session,
            tools: ToolPolicyConfig {
                allow: vec!["*".into()],
                deny: Vec::new(),
            },
            ..SandboxConfig::default()
        };
        config.browser.enabled = true;
        config.browser.image = IMAGE.into();
        config
    }

    fn dirs() -> (PathBuf, PathBuf) {
        (PathBuf::from("/srv/sbx/ws"), PathBuf::from("/srv/agents/main"))
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_disabled_or_denied_does_no_work() {
        let h = harness();
        let (ws, agent) = dirs();

        let mut disabled = config();
        disabled.browser.enabled = false;
        assert!(
            h.manager
                .ensure("s", &ws, &agent, &disabled, false)
                .await
                .unwrap()
                .is_none()
        );

        let mut denied = config();
        denied.tools = ToolPolicyConfig::default();
        assert!(
            h.manager
                .ensure("s", &ws, &agent, &denied, false)
                .await
                .unwrap()
                .is_none()
        );
        assert!(h.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_ensure_creates_and_publishes() {
        let h = harness();
        let (ws, agent) = dirs();
        let cfg = config();

        let browser = h
            .manager
            .ensure("agent:main:main", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        let name = browser.container_name.clone();
        assert!(name.starts_with("berth-sbx-browser-agent-main-main-"));
        assert!(h.engine.is_running(&name));
        assert!(browser.bridge_url.starts_with("http://127.0.0.1:"));
        let novnc = browser.novnc_url.clone().unwrap();
        assert!(novnc.ends_with("/vnc.html?autoconnect=1&resize=remote"));

        let args = h.engine.create_args(&name);
        let pairs: Vec<_> = args.windows(2).map(|w| (w[0].as_str(), w[1].as_str())).collect();
        assert!(pairs.contains(&("--label", "berth.sandboxBrowser=1")));
        assert_eq!(cfg.docker.network, "none");
        assert!(pairs.contains(&("--network", "bridge")));
        assert!(!pairs.contains(&("--network", "none")));
        assert!(pairs.contains(&("-p", "127.0.0.1::9222")));
        assert!(pairs.contains(&("-p", "127.0.0.1::6080")));
        assert!(pairs.contains(&("-e", "BERTH_BROWSER_HEADLESS=0")));
        assert!(pairs.contains(&("-e", "BERTH_BROWSER_ENABLE_NOVNC=1")));
        assert!(pairs.contains(&("-e", "BERTH_BROWSER_CDP_PORT=9222")));
        assert!(pairs.contains(&("-e", "BERTH_BROWSER_VNC_PORT=5900")));
        assert!(pairs.contains(&("-e", "BERTH_BROWSER_NOVNC_PORT=6080")));
        assert_eq!(args.last().map(String::as_str), Some(IMAGE));

        let entry = h.manager.registry().get(&name).await.unwrap().unwrap();
        assert_eq!(entry.scope_key, "agent:main:main");
        assert!(entry.novnc_port.is_some());
        assert_eq!(
            h.manager.bridge("agent:main:main").await.unwrap().cdp_port(),
            Some(entry.cdp_port)
        );
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_headless_skips_novnc() {
        let h = harness();
        let (ws, agent) = dirs();
        let mut cfg = config();
        cfg.browser.headless = true;

        let browser = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        assert!(browser.novnc_url.is_none());
        let args = h.engine.create_args(&browser.container_name);
        assert!(!args.contains(&"127.0.0.1::6080".to_string()));
        assert!(args.contains(&"BERTH_BROWSER_HEADLESS=1".to_string()));
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_missing_image_has_build_hint() {
        let h = harness();
        let (ws, agent) = dirs();
        let mut cfg = config();
        cfg.browser.image = "missing:latest".into();

        let err = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("scripts/sandbox-browser-setup.sh"));
        assert_eq!(h.engine.count("create"), 0);
        assert_eq!(h.engine.count("pull"), 0);
    }

    #[tokio::test]
    async fn test_unresolved_cdp_port_is_fatal() {
        let h = harness();
        let (ws, agent) = dirs();
        let cfg = config();
        let name = browser_container_name(&cfg.browser.container_prefix, cfg.scope, "s");
        h.engine.insert_container(&name, true, None);

        let err = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PortUnresolved { .. }));
        assert!(h.manager.bridge("s").await.is_none());
    }

    #[tokio::test]
    async fn test_isolated_browser_network_cannot_publish() {
        let h = harness();
        let (ws, agent) = dirs();
        let mut cfg = config();
        cfg.browser.network = "none".into();

        let err = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PortUnresolved { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_create_reuses_existing_browser() {
        let h = harness();
        let (ws, agent) = dirs();
        let cfg = config();
        h.engine.race_next_create();

        let browser = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        let name = browser.container_name.clone();
        assert_eq!(h.engine.count("create"), 1);
        assert_eq!(h.engine.count("start"), 1);
        assert!(h.engine.is_running(&name));
        assert_eq!(
            h.manager.bridge("s").await.unwrap().cdp_port(),
            Some(h.manager.registry().get(&name).await.unwrap().unwrap().cdp_port)
        );
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_recreated_browser_gets_fresh_age() {
        let h = harness();
        let (ws, agent) = dirs();
        let cfg = config();
        let name = browser_container_name(&cfg.browser.container_prefix, cfg.scope, "s");
        h.manager
            .registry()
            .upsert(BrowserEntry {
                container_name: name.clone(),
                scope_key: "s".into(),
                created_at_ms: 1,
                last_used_at_ms: 1,
                image: IMAGE.into(),
                cdp_port: 40000,
                novnc_port: None,
            })
            .await
            .unwrap();

        h.manager.ensure("s", &ws, &agent, &cfg, false).await.unwrap();
        let entry = h.manager.registry().get(&name).await.unwrap().unwrap();
        assert_eq!(
            h.engine.label(&name, crate::sandbox::LABEL_CREATED_AT_MS),
            Some(entry.created_at_ms.to_string())
        );
        assert!(entry.created_at_ms > 1);
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_replacing_a_bridge_does_not_block_other_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new());
        engine.add_image(IMAGE);
        let manager = Arc::new(BrowserManager::new(
            engine.clone(),
            Arc::new(BrowserRegistry::in_dir(dir.path())),
        ));
        let (ws, agent) = dirs();
        let mut cfg = config();
        cfg.browser.auto_start_timeout_ms = 3000;

        let browser = manager
            .ensure("a", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        engine.set_port_mapping(&browser.container_name, 9222, closed_port());
        manager.ensure("a", &ws, &agent, &cfg, false).await.unwrap();
        let busy = manager.bridge("a").await.unwrap();

        // Keeps the old bridge busy in its readiness wait.
        let in_flight = tokio::spawn({
            let url = format!("{}/start", busy.base_url());
            async move { reqwest::Client::new().post(url).send().await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        engine.set_port_mapping(&browser.container_name, 9222, closed_port());
        let replacing = tokio::spawn({
            let manager = Arc::clone(&manager);
            let (ws, agent, cfg) = (ws.clone(), agent.clone(), cfg.clone());
            async move { manager.ensure("a", &ws, &agent, &cfg, false).await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let other = tokio::time::timeout(
            Duration::from_millis(1500),
            manager.ensure("b", &ws, &agent, &cfg, false),
        )
        .await;
        assert!(other.is_ok(), "scope b waited on scope a's bridge shutdown");
        other.unwrap().unwrap().unwrap();

        replacing.await.unwrap().unwrap();
        let resp = in_flight.await.unwrap().unwrap();
        assert_eq!(resp.status().as_u16(), 504);
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_bridge_reuse_and_replacement() {
        let h = harness();
        let (ws, agent) = dirs();
        let cfg = config();

        let first = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        let bridge_1 = h.manager.bridge("s").await.unwrap();
        let second = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        let bridge_2 = h.manager.bridge("s").await.unwrap();
        assert!(Arc::ptr_eq(&bridge_1, &bridge_2));
        assert_eq!(first.bridge_url, second.bridge_url);
        assert_eq!(h.engine.count("create"), 1);

        h.engine.set_port_mapping(&first.container_name, 9222, 61000);
        let third = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        let bridge_3 = h.manager.bridge("s").await.unwrap();
        assert!(!Arc::ptr_eq(&bridge_1, &bridge_3));
        assert_eq!(bridge_3.cdp_port(), Some(61000));
        assert_ne!(third.bridge_url, first.bridge_url);
        assert!(
            tokio::net::TcpStream::connect(bridge_1.addr())
                .await
                .is_err()
        );

        let entry = h
            .manager
            .registry()
            .get(&third.container_name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.cdp_port, 61000);
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_stopped_browser_is_started() {
        let h = harness();
        let (ws, agent) = dirs();
        let cfg = config();

        let browser = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        h.engine.set_running(&browser.container_name, false);
        h.engine.clear_calls();

        h.manager.ensure("s", &ws, &agent, &cfg, false).await.unwrap();
        assert_eq!(h.engine.count("start"), 1);
        assert_eq!(h.engine.count("create"), 0);
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_attach_times_out_after_deadline() {
        let h = harness();
        let (ws, agent) = dirs();
        let mut cfg = config();
        cfg.browser.auto_start_timeout_ms = 300;

        let browser = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        h.engine
            .set_port_mapping(&browser.container_name, 9222, closed_port());
        h.manager.ensure("s", &ws, &agent, &cfg, false).await.unwrap();
        h.engine.set_running(&browser.container_name, false);
        h.engine.clear_calls();

        let bridge = h.manager.bridge("s").await.unwrap();
        let started = std::time::Instant::now();
        let err = bridge.ensure_attach().await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(matches!(err, BrowserError::CdpTimeout {
            timeout_ms: 300,
            ..
        }));
        assert!(err.to_string().contains("300ms"));
        assert_eq!(h.engine.count("start"), 1);
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_attach_is_noop_when_cdp_answers() {
        let mut cdp = mockito::Server::new_async().await;
        cdp.mock("GET", "/json/version")
            .with_status(200)
            .with_body(r#"{"Browser":"Chrome/126.0"}"#)
            .create_async()
            .await;
        let port: u16 = cdp.host_with_port().rsplit_once(':').unwrap().1.parse().unwrap();

        let h = harness();
        let (ws, agent) = dirs();
        let cfg = config();
        let browser = h
            .manager
            .ensure("s", &ws, &agent, &cfg, false)
            .await
            .unwrap()
            .unwrap();
        h.engine.set_port_mapping(&browser.container_name, 9222, port);
        h.manager.ensure("s", &ws, &agent, &cfg, false).await.unwrap();
        h.engine.clear_calls();

        let bridge = h.manager.bridge("s").await.unwrap();
        bridge.ensure_attach().await.unwrap();
        assert!(h.engine.calls().is_empty());
        h.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_bridge() {
        let h = harness();
        let (ws, agent) = dirs();
        h.manager
            .ensure("s", &ws, &agent, &config(), false)
            .await
            .unwrap();

        assert!(h.manager.stop_bridge("s").await);
        assert!(!h.manager.stop_bridge("s").await);
        assert!(h.manager.bridge("s").await.is_none());
    }

    #[test]
    fn test_novnc_url() {
        assert_eq!(
            novnc_url(6081),
            "http://127.0.0.1:6081/vnc.html?autoconnect=1&resize=remote"
        );
    }
}
