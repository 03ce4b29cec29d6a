//! In-memory engine for exercising the managers without a container runtime.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::sandbox::{
    engine::{ContainerEngine, EngineOutput},
    error::Result,
};

#[derive(Debug, Default)]
struct FakeContainer {
    running: bool,
    labels: HashMap<String, String>,
    ports: HashMap<u16, u16>,
    create_args: Vec<String>,
}

#[derive(Debug)]
struct FakeState {
    images: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    calls: Vec<Vec<String>>,
    next_host_port: u16,
    image_inspect_failure: Option<String>,
    race_next_create: bool,
}

/// Scripted engine: keeps images and containers in memory and records every
/// invocation.
#[derive(Debug)]
pub(crate) struct FakeEngine {
    state: Mutex<FakeState>,
}

fn ok(stdout: impl Into<String>) -> EngineOutput {
    EngineOutput {
        stdout: stdout.into(),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn fail(exit_code: i32, stderr: impl Into<String>) -> EngineOutput {
    EngineOutput {
        stdout: String::new(),
        stderr: stderr.into(),
        exit_code,
    }
}

fn flag_values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .collect()
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                images: HashSet::new(),
                containers: HashMap::new(),
                calls: Vec::new(),
                next_host_port: 49152,
                image_inspect_failure: None,
                race_next_create: false,
            }),
        }
    }

    pub(crate) fn add_image(&self, image: &str) {
        self.state.lock().unwrap().images.insert(image.to_string());
    }

    pub(crate) fn has_image(&self, image: &str) -> bool {
        self.state.lock().unwrap().images.contains(image)
    }

    /// Make every `image inspect` fail with an unexpected error.
    pub(crate) fn fail_image_inspect(&self, stderr: &str) {
        self.state.lock().unwrap().image_inspect_failure = Some(stderr.to_string());
    }

    pub(crate) fn insert_container(&self, name: &str, running: bool, config_hash: Option<&str>) {
        let mut labels = HashMap::new();
        if let Some(hash) = config_hash {
            labels.insert(crate::sandbox::LABEL_CONFIG_HASH.to_string(), hash.to_string());
        }
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(name.to_string(), FakeContainer {
                running,
                labels,
                ..FakeContainer::default()
            });
    }

    pub(crate) fn set_running(&self, name: &str, running: bool) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.running = running;
        }
    }

    pub(crate) fn set_port_mapping(&self, name: &str, container_port: u16, host_port: u16) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.ports.insert(container_port, host_port);
        }
    }

    /// The next `create` finds the name taken, as if a concurrent caller
    /// created the same container first.
    pub(crate) fn race_next_create(&self) {
        self.state.lock().unwrap().race_next_create = true;
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub(crate) fn is_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .is_some_and(|c| c.running)
    }

    pub(crate) fn label(&self, name: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .and_then(|c| c.labels.get(key).cloned())
    }

    pub(crate) fn create_args(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| c.create_args.clone())
            .unwrap_or_default()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of invocations whose first argument is `verb`.
    pub(crate) fn count(&self, verb: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.first().is_some_and(|v| v == verb))
            .count()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn handle(state: &mut FakeState, args: &[String]) -> EngineOutput {
        let verb = args.first().map(String::as_str).unwrap_or_default();
        let last = args.last().cloned().unwrap_or_default();
        match verb {
            "image" => {
                if let Some(stderr) = &state.image_inspect_failure {
                    return fail(1, stderr.clone());
                }
                if state.images.contains(&last) {
                    ok("[]\n")
                } else {
                    fail(1, format!("Error response from daemon: No such image: {last}\n"))
                }
            },
            "pull" => {
                state.images.insert(last);
                ok("")
            },
            "tag" => {
                state.images.insert(last);
                ok("")
            },
            "inspect" => {
                let Some(container) = state.containers.get(&last) else {
                    return fail(1, format!("Error: No such object: {last}\n"));
                };
                let format = args.get(2).cloned().unwrap_or_default();
                if format.contains(".State.Running") {
                    return ok(format!("{}\n", container.running));
                }
                let key = format.split('"').nth(1).unwrap_or_default();
                match container.labels.get(key) {
                    Some(value) => ok(format!("{value}\n")),
                    None => ok("<no value>\n"),
                }
            },
            "create" => {
                let name = flag_values(args, "--name")
                    .first()
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let conflict = || {
                    fail(
                        125,
                        format!(
                            "Error response from daemon: Conflict. The container name \"/{name}\" is already in use by container \"0f3c\".\n"
                        ),
                    )
                };
                if state.containers.contains_key(&name) {
                    return conflict();
                }
                let labels = flag_values(args, "--label")
                    .into_iter()
                    .filter_map(|kv| kv.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                let mut ports = HashMap::new();
                // The engine ignores publications on the `none` network.
                let isolated = flag_values(args, "--network").contains(&"none");
                for publish in flag_values(args, "-p").into_iter().filter(|_| !isolated) {
                    if let Some((_, port)) = publish.rsplit_once(':')
                        && let Ok(port) = port.parse::<u16>()
                    {
                        ports.insert(port, state.next_host_port);
                        state.next_host_port += 1;
                    }
                }
                state.containers.insert(name.clone(), FakeContainer {
                    running: false,
                    labels,
                    ports,
                    create_args: args.to_vec(),
                });
                // A racing caller created the same container first.
                if std::mem::take(&mut state.race_next_create) {
                    return conflict();
                }
                ok("0f3c\n")
            },
            "start" => match state.containers.get_mut(&last) {
                Some(c) => {
                    c.running = true;
                    ok(format!("{last}\n"))
                },
                None => fail(
                    1,
                    format!("Error response from daemon: No such container: {last}\n"),
                ),
            },
            "rm" => match state.containers.remove(&last) {
                Some(_) => ok(format!("{last}\n")),
                None => fail(
                    1,
                    format!("Error response from daemon: No such container: {last}\n"),
                ),
            },
            "port" => {
                let name = args.get(1).cloned().unwrap_or_default();
                let spec = args.get(2).cloned().unwrap_or_default();
                let port = spec
                    .trim_end_matches("/tcp")
                    .parse::<u16>()
                    .unwrap_or_default();
                match state.containers.get(&name).and_then(|c| c.ports.get(&port)) {
                    Some(host) => ok(format!("127.0.0.1:{host}\n")),
                    None => fail(
                        1,
                        format!("Error: No public port '{spec}' published for {name}\n"),
                    ),
                }
            },
            _ => ok(""),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn program(&self) -> &str {
        "docker"
    }

    async fn output(&self, args: &[String]) -> Result<EngineOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(args.to_vec());
        Ok(Self::handle(&mut state, args))
    }
}
