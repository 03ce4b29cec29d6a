use std::path::PathBuf;

use {
    anyhow::Result,
    berth_config::SandboxConfig,
    clap::{Args, Subcommand},
};

use berth_tools::{
    policy::ToolPolicy,
    sandbox::{
        self, RecreateTarget, SandboxOrchestrator,
        naming::{browser_container_name, container_name, recreate_hint, resolve_scope_key},
    },
};

#[derive(Args)]
pub struct SessionArgs {
    /// Session key the sandbox is resolved for.
    #[arg(long, default_value = "agent:main:main")]
    session: String,
    /// Session key treated as "main" by `mode = "non-main"`.
    #[arg(long, default_value = "agent:main:main")]
    main_session: String,
    /// Agent workspace directory on the host.
    #[arg(long, default_value = ".")]
    agent_workspace: PathBuf,
}

#[derive(Subcommand)]
pub enum SandboxAction {
    /// Create or reuse the sandbox for a session and print its context.
    Ensure {
        #[command(flatten)]
        target: SessionArgs,
        /// Allow the browser bridge to evaluate scripts.
        #[arg(long, default_value_t = false)]
        evaluate: bool,
    },
    /// Create or reuse only the browser sandbox and serve its bridge until
    /// interrupted.
    Browser {
        #[command(flatten)]
        target: SessionArgs,
        #[arg(long, default_value_t = false)]
        evaluate: bool,
    },
    /// List known sandbox containers.
    List {
        /// List browser containers instead.
        #[arg(long, default_value_t = false)]
        browser: bool,
        /// Print JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show how a session maps onto sandbox resources, without touching them.
    Explain {
        #[command(flatten)]
        target: SessionArgs,
    },
    /// Remove sandboxes so the next run recreates them from current config.
    #[command(group = clap::ArgGroup::new("target").required(true).multiple(false))]
    Recreate {
        #[arg(long, group = "target")]
        session: Option<String>,
        #[arg(long, group = "target")]
        agent: Option<String>,
        #[arg(long, group = "target")]
        all: bool,
    },
    /// Remove sandboxes past the configured idle/age thresholds.
    Prune,
}

pub async fn handle_sandbox(action: SandboxAction, config: &SandboxConfig) -> Result<()> {
    let orchestrator = SandboxOrchestrator::from_defaults();
    match action {
        SandboxAction::Ensure { target, evaluate } => {
            ensure(&orchestrator, &target, evaluate, config).await
        },
        SandboxAction::Browser { target, evaluate } => {
            browser(&orchestrator, &target, evaluate, config).await
        },
        SandboxAction::List { browser, json } => list(&orchestrator, browser, json, config).await,
        SandboxAction::Explain { target } => {
            explain(&target, config);
            Ok(())
        },
        SandboxAction::Recreate {
            session,
            agent,
            all,
        } => {
            let target = match (session, agent, all) {
                (Some(session), _, _) => RecreateTarget::Session(session),
                (None, Some(agent), _) => RecreateTarget::Agent(agent),
                _ => RecreateTarget::All,
            };
            recreate(&orchestrator, &target).await
        },
        SandboxAction::Prune => prune(&orchestrator, config).await,
    }
}

async fn wait_for_interrupt(orchestrator: &SandboxOrchestrator) -> Result<()> {
    println!("Bridge running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    orchestrator.browsers().stop_all().await;
    Ok(())
}

async fn ensure(
    orchestrator: &SandboxOrchestrator,
    target: &SessionArgs,
    evaluate: bool,
    config: &SandboxConfig,
) -> Result<()> {
    let ctx = orchestrator
        .resolve(
            &target.session,
            &target.main_session,
            &target.agent_workspace,
            config,
            evaluate,
        )
        .await?;
    let Some(ctx) = ctx else {
        println!(
            "Session {} is not sandboxed (mode = {}).",
            target.session, config.mode
        );
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&ctx)?);
    if ctx.browser.is_some() {
        wait_for_interrupt(orchestrator).await?;
    }
    Ok(())
}

async fn browser(
    orchestrator: &SandboxOrchestrator,
    target: &SessionArgs,
    evaluate: bool,
    config: &SandboxConfig,
) -> Result<()> {
    let scope_key = resolve_scope_key(config.scope, &target.session);
    let workspace_dir =
        SandboxOrchestrator::workspace_dir_for(config, &scope_key, &target.agent_workspace);
    tokio::fs::create_dir_all(&workspace_dir).await?;
    let ensured = orchestrator
        .browsers()
        .ensure(
            &scope_key,
            &workspace_dir,
            &target.agent_workspace,
            config,
            evaluate,
        )
        .await?;
    match ensured {
        Some(browser) => {
            println!("{}", serde_json::to_string_pretty(&browser)?);
            wait_for_interrupt(orchestrator).await
        },
        None => {
            println!("Sandbox browser is disabled or denied by the sandbox tool policy.");
            Ok(())
        },
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

async fn list(
    orchestrator: &SandboxOrchestrator,
    browser: bool,
    json: bool,
    config: &SandboxConfig,
) -> Result<()> {
    if browser {
        let infos = orchestrator.list_browsers(config).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&infos)?);
            return Ok(());
        }
        if infos.is_empty() {
            println!("No sandbox browsers found.");
            return Ok(());
        }
        println!(
            "{:<48} {:<8} {:<6} {:>6}  SCOPE",
            "CONTAINER", "RUNNING", "IMAGE", "CDP"
        );
        for info in &infos {
            println!(
                "{:<48} {:<8} {:<6} {:>6}  {}",
                info.entry.container_name,
                yes_no(info.running),
                if info.image_match {
                    "ok"
                } else {
                    "stale"
                },
                info.entry.cdp_port,
                info.entry.scope_key
            );
        }
        return Ok(());
    }

    let infos = orchestrator.list_containers(config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }
    if infos.is_empty() {
        println!("No sandbox containers found.");
        return Ok(());
    }
    println!("{:<48} {:<8} {:<6}  SCOPE", "CONTAINER", "RUNNING", "IMAGE");
    for info in &infos {
        println!(
            "{:<48} {:<8} {:<6}  {}",
            info.entry.container_name,
            yes_no(info.running),
            if info.image_match {
                "ok"
            } else {
                "stale"
            },
            info.entry.scope_key
        );
    }
    Ok(())
}

fn explain(target: &SessionArgs, config: &SandboxConfig) {
    let sandboxed = sandbox::is_sandboxed(config.mode, &target.session, &target.main_session);
    let scope_key = resolve_scope_key(config.scope, &target.session);
    let policy = ToolPolicy::from(&config.tools);
    let workspace_dir =
        SandboxOrchestrator::workspace_dir_for(config, &scope_key, &target.agent_workspace);

    println!("Session:    {}", target.session.trim());
    println!("Mode:       {} (sandboxed: {})", config.mode, yes_no(sandboxed));
    println!("Scope:      {} -> {scope_key}", config.scope);
    println!(
        "Container:  {}",
        container_name(&config.docker.container_prefix, &scope_key)
    );
    println!("Image:      {}", config.docker.image);
    println!(
        "Workspace:  {} -> {} (access: {})",
        workspace_dir.display(),
        config.docker.workdir,
        config.workspace_access
    );
    if config.browser.enabled {
        println!(
            "Browser:    {} (allowed: {})",
            browser_container_name(&config.browser.container_prefix, config.scope, &scope_key),
            yes_no(policy.is_allowed("browser"))
        );
    } else {
        println!("Browser:    disabled");
    }
    println!("Tools:      allow [{}]", policy.allow.join(", "));
    println!("            deny  [{}]", policy.deny.join(", "));
    println!("Recreate:   {}", recreate_hint(config.scope, &scope_key));
}

async fn recreate(orchestrator: &SandboxOrchestrator, target: &RecreateTarget) -> Result<()> {
    let report = orchestrator.recreate(target).await?;
    if report.containers.is_empty() && report.browsers.is_empty() {
        println!("No matching sandbox containers.");
        return Ok(());
    }
    for name in report.containers.iter().chain(&report.browsers) {
        println!("Removed: {name}");
    }
    println!("They will be recreated on next use.");
    Ok(())
}

async fn prune(orchestrator: &SandboxOrchestrator, config: &SandboxConfig) -> Result<()> {
    let report = orchestrator.prune(&config.prune, sandbox::now_ms()).await?;
    if report.is_empty() {
        println!("Nothing to prune.");
        return Ok(());
    }
    let count = report.containers.len() + report.browsers.len();
    for name in report.containers.iter().chain(&report.browsers) {
        println!("Removed: {name}");
    }
    println!(
        "Pruned {count} sandbox container{}.",
        if count == 1 {
            ""
        } else {
            "s"
        }
    );
    Ok(())
}
