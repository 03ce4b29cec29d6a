//! Loopback control-plane server fronting a sandboxed browser's CDP port.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    axum::{
        Json, Router,
        extract::{Path, RawQuery, State},
        http::{StatusCode, header},
        response::{IntoResponse, Response},
        routing::{get, post, put},
    },
    reqwest::Method,
    tokio::{net::TcpListener, sync::oneshot, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{
    error::BrowserError,
    probe::is_cdp_reachable,
    types::{ResolvedBrowserConfig, ResolvedProfile},
};

/// Called before every proxied control call so the owner can make sure the
/// browser behind the profile is attachable (e.g. start its container).
#[async_trait]
pub trait AttachHook: Send + Sync {
    async fn ensure_attach(&self, profile: &ResolvedProfile) -> Result<(), BrowserError>;
}

/// Options for [`BrowserBridge::start`].
pub struct BridgeOptions {
    pub resolved: ResolvedBrowserConfig,
    pub host: String,
    pub hook: Option<Arc<dyn AttachHook>>,
}

impl BridgeOptions {
    pub fn new(resolved: ResolvedBrowserConfig) -> Self {
        Self {
            resolved,
            host: "127.0.0.1".into(),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn AttachHook>) -> Self {
        self.hook = Some(hook);
        self
    }
}

struct BridgeState {
    resolved: ResolvedBrowserConfig,
    client: reqwest::Client,
    hook: Option<Arc<dyn AttachHook>>,
}

impl BridgeState {
    fn profile(&self) -> Result<ResolvedProfile, BrowserError> {
        self.resolved
            .default_profile()
            .ok_or_else(|| BrowserError::UnknownProfile(self.resolved.default_profile.clone()))
    }

    async fn ensure_attach(&self) -> Result<ResolvedProfile, BrowserError> {
        let profile = self.profile()?;
        if let Some(ref hook) = self.hook {
            hook.ensure_attach(&profile).await?;
        }
        Ok(profile)
    }

    async fn status(&self) -> Result<serde_json::Value, BrowserError> {
        let profile = self.profile()?;
        let timeout = Duration::from_millis(self.resolved.remote_cdp_timeout_ms);
        let reachable = is_cdp_reachable(&self.client, &profile.cdp_url, timeout).await;
        Ok(serde_json::json!({
            "enabled": self.resolved.enabled,
            "profile": profile.name,
            "cdpUrl": profile.cdp_url,
            "cdpPort": profile.cdp_port,
            "reachable": reachable,
            "attachOnly": self.resolved.attach_only,
            "headless": self.resolved.headless,
            "evaluateEnabled": self.resolved.evaluate_enabled,
        }))
    }

    /// Attach, then forward `method path[?query]` to the profile's CDP endpoint.
    async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
    ) -> Result<Response, BrowserError> {
        let profile = self.ensure_attach().await?;
        let url = match query {
            Some(q) if !q.is_empty() => format!("{}{path}?{q}", profile.cdp_url),
            _ => format!("{}{path}", profile.cdp_url),
        };
        debug!(%method, url, "proxying control call to cdp");

        let timeout = Duration::from_millis(self.resolved.remote_cdp_handshake_timeout_ms);
        let resp = self
            .client
            .request(method, &url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| BrowserError::Cdp {
                url: url.clone(),
                source,
            })?;

        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body = resp
            .bytes()
            .await
            .map_err(|source| BrowserError::Cdp { url, source })?;

        Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
    }
}

impl IntoResponse for BrowserError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::CdpTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UnknownProfile(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// A running control-plane server for one sandboxed browser.
pub struct BrowserBridge {
    base_url: String,
    addr: SocketAddr,
    state: Arc<BridgeState>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BrowserBridge {
    /// Bind the control plane on `host:control_port` (0 = ephemeral) and start
    /// serving in the background.
    pub async fn start(opts: BridgeOptions) -> Result<Self, BrowserError> {
        let bind = format!("{}:{}", opts.host, opts.resolved.control_port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|source| BrowserError::Bind {
                addr: bind.clone(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| BrowserError::Bind { addr: bind, source })?;

        let state = Arc::new(BridgeState {
            resolved: opts.resolved,
            client: reqwest::Client::new(),
            hook: opts.hook,
        });
        let app = router(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "browser bridge server exited with error");
            }
        });

        let base_url = format!("http://{addr}");
        info!(base_url, "browser bridge started");

        Ok(Self {
            base_url,
            addr,
            state,
            shutdown: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn resolved(&self) -> &ResolvedBrowserConfig {
        &self.state.resolved
    }

    /// CDP port of the default profile this bridge targets.
    pub fn cdp_port(&self) -> Option<u16> {
        self.state.resolved.default_profile().map(|p| p.cdp_port)
    }

    /// Run the attach hook for the default profile.
    pub async fn ensure_attach(&self) -> Result<(), BrowserError> {
        self.state.ensure_attach().await.map(|_| ())
    }

    /// Stop accepting requests and wait for the server task to finish.
    pub async fn stop(&self) {
        if let Some(tx) = take_locked(&self.shutdown) {
            let _ = tx.send(());
        }
        if let Some(task) = take_locked(&self.task)
            && let Err(e) = task.await
        {
            debug!(error = %e, "browser bridge task join failed");
        }
        info!(base_url = %self.base_url, "browser bridge stopped");
    }
}

impl Drop for BrowserBridge {
    fn drop(&mut self) {
        if let Some(tx) = take_locked(&self.shutdown) {
            let _ = tx.send(());
        }
    }
}

fn take_locked<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/start", post(start_handler))
        .route("/json/version", get(version_handler))
        .route("/json/list", get(list_handler))
        .route("/json/new", put(new_tab_handler))
        .route("/json/close/{id}", get(close_tab_handler))
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn status_handler(State(state): State<Arc<BridgeState>>) -> Response {
    match state.status().await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn start_handler(State(state): State<Arc<BridgeState>>) -> Response {
    if let Err(e) = state.ensure_attach().await {
        return e.into_response();
    }
    status_handler(State(state)).await
}

async fn version_handler(State(state): State<Arc<BridgeState>>) -> Response {
    into_response(state.forward(Method::GET, "/json/version", None).await)
}

async fn list_handler(State(state): State<Arc<BridgeState>>) -> Response {
    into_response(state.forward(Method::GET, "/json/list", None).await)
}

async fn new_tab_handler(
    State(state): State<Arc<BridgeState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let query = query.map(|q| q.strip_prefix("url=").map(str::to_string).unwrap_or(q));
    into_response(
        state
            .forward(Method::PUT, "/json/new", query.as_deref())
            .await,
    )
}

async fn close_tab_handler(
    State(state): State<Arc<BridgeState>>,
    Path(id): Path<String>,
) -> Response {
    into_response(
        state
            .forward(Method::GET, &format!("/json/close/{id}"), None)
            .await,
    )
}

fn into_response(result: Result<Response, BrowserError>) -> Response {
    result.unwrap_or_else(IntoResponse::into_response)
}
