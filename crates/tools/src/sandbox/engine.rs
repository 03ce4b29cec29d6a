//! Container engine client.
//!
//! [`ContainerEngine::output`] is the single primitive; `run` and
//! `run_allow_failure` make the failure policy explicit at each call site.
//! The free functions below are the engine queries the managers build on.

use std::process::Stdio;

use {async_trait::async_trait, tracing::debug};

use crate::sandbox::{
    LABEL_CONFIG_HASH,
    error::{Error, Result, is_name_conflict},
};

/// Captured result of one engine invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Existence and run state of a named container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub exists: bool,
    pub running: bool,
}

/// Outcome of `create` when a concurrent caller may have won the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Binary name, used in error messages.
    fn program(&self) -> &str;

    /// Invoke the engine and capture its output whatever the exit status.
    /// Only a failure to spawn is an error.
    async fn output(&self, args: &[String]) -> Result<EngineOutput>;

    /// Invoke the engine; a non-zero exit is an error carrying trimmed stderr.
    async fn run(&self, args: &[String]) -> Result<EngineOutput> {
        let out = self.output(args).await?;
        if !out.success() {
            return Err(Error::Engine {
                program: self.program().to_string(),
                command: args.join(" "),
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }

    /// Invoke the engine, leaving the exit status to the caller.
    async fn run_allow_failure(&self, args: &[String]) -> Result<EngineOutput> {
        self.output(args).await
    }
}

/// Engine backed by a CLI binary (`docker` or a compatible one).
#[derive(Debug, Clone)]
pub struct CliEngine {
    program: String,
}

impl CliEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CliEngine {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    fn program(&self) -> &str {
        &self.program
    }

    async fn output(&self, args: &[String]) -> Result<EngineOutput> {
        debug!(program = %self.program, args = %args.join(" "), "engine invocation");
        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(EngineOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Build an owned argument vector.
pub(crate) fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Host port the container's `port/tcp` is published on, if any.
pub async fn read_mapped_port(
    engine: &dyn ContainerEngine,
    name: &str,
    port: u16,
) -> Result<Option<u16>> {
    let out = engine
        .run_allow_failure(&argv(&["port", name, &format!("{port}/tcp")]))
        .await?;
    if !out.success() {
        return Ok(None);
    }
    Ok(parse_mapped_port(&out.stdout))
}

/// Parse the host port from the first line of `port` output, e.g.
/// `127.0.0.1:49153`.
pub fn parse_mapped_port(stdout: &str) -> Option<u16> {
    let line = stdout.lines().next()?.trim_end();
    let (_, port) = line.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse().ok()
}

/// Whether `image` exists locally. "No such image" is `false`; any other
/// inspect failure is fatal.
pub async fn image_exists(engine: &dyn ContainerEngine, image: &str) -> Result<bool> {
    let args = argv(&["image", "inspect", image]);
    let out = engine.run_allow_failure(&args).await?;
    if out.success() {
        return Ok(true);
    }
    if out.stderr.to_ascii_lowercase().contains("no such image") {
        return Ok(false);
    }
    Err(Error::Engine {
        program: engine.program().to_string(),
        command: args.join(" "),
        exit_code: out.exit_code,
        stderr: out.stderr.trim().to_string(),
    })
}

/// Any inspect failure, including "no such container", reads as absent.
pub async fn container_state(engine: &dyn ContainerEngine, name: &str) -> Result<ContainerState> {
    let out = engine
        .run_allow_failure(&argv(&["inspect", "-f", "{{.State.Running}}", name]))
        .await?;
    if !out.success() {
        return Ok(ContainerState::default());
    }
    Ok(ContainerState {
        exists: true,
        running: out.stdout.trim() == "true",
    })
}

/// Config hash label on the live container.
pub async fn read_config_hash_label(
    engine: &dyn ContainerEngine,
    name: &str,
) -> Result<Option<String>> {
    let format = format!("{{{{ index .Config.Labels \"{LABEL_CONFIG_HASH}\" }}}}");
    let out = engine
        .run_allow_failure(&argv(&["inspect", "-f", &format, name]))
        .await?;
    if !out.success() {
        return Ok(None);
    }
    let raw = out.stdout.trim();
    if raw.is_empty() || raw == "<no value>" {
        return Ok(None);
    }
    Ok(Some(raw.to_string()))
}

/// `rm -f`; failures are tolerated and logged.
pub async fn remove_container(engine: &dyn ContainerEngine, name: &str) -> Result<()> {
    let out = engine.run_allow_failure(&argv(&["rm", "-f", name])).await?;
    if !out.success() {
        debug!(container = name, stderr = %out.stderr.trim(), "container removal failed");
    }
    Ok(())
}

pub async fn start_container(engine: &dyn ContainerEngine, name: &str) -> Result<()> {
    engine.run(&argv(&["start", name])).await?;
    Ok(())
}

/// Run `create`, reporting a name conflict instead of failing so a
/// concurrent ensure can fall back to starting the winner's container.
pub async fn create_container(
    engine: &dyn ContainerEngine,
    args: &[String],
) -> Result<CreateOutcome> {
    let out = engine.run_allow_failure(args).await?;
    if out.success() {
        return Ok(CreateOutcome::Created);
    }
    if is_name_conflict(&out.stderr) {
        return Ok(CreateOutcome::AlreadyExists);
    }
    Err(Error::Engine {
        program: engine.program().to_string(),
        command: args.join(" "),
        exit_code: out.exit_code,
        stderr: out.stderr.trim().to_string(),
    })
}
