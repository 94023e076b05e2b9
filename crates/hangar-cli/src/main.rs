//! # hangar-cli
//!
//! Binary entry point for the Hangar orchestrator.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Application initialization and configuration
//! - An in-process lifecycle driver: create a cluster from a definition,
//!   stream its events until it runs, tear it down again

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use hangar_adapters::{AnsiblePlaybook, FsWorkspace, TerraformCli};
use hangar_core::{ClusterRegistry, HangarConfig, Orchestrator, Reaper};
use hangar_proto::{Cluster, ClusterDefinition, ClusterStatus, WorkspaceManager};

/// Output format for lifecycle results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable event stream
    #[default]
    Text,
    /// Final cluster snapshot as JSON
    Json,
}

/// Hangar - ephemeral cluster provisioning orchestrator
#[derive(Parser, Debug)]
#[command(name = "hangar", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "hangar.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a full cluster lifecycle from a definition file
    Run(RunArgs),

    /// Check a definition file without creating anything
    Validate(ValidateArgs),

    /// List the selectable cluster templates
    Templates,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Cluster definition file (YAML)
    #[arg(short = 'f', long = "file")]
    definition: PathBuf,

    /// Keep the cluster running until Ctrl-C instead of tearing it down
    /// immediately
    #[arg(long)]
    hold: bool,

    /// Seconds to wait for the cluster to come up or go down
    #[arg(long, default_value_t = 1800)]
    timeout_secs: u64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Cluster definition file (YAML)
    #[arg(short = 'f', long = "file")]
    definition: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run(args) => run_command(&config, args).await,
        Commands::Validate(args) => validate_command(&config, &args),
        Commands::Templates => templates_command(&config),
    }
}

fn load_config(path: &PathBuf) -> Result<HangarConfig> {
    let config = if path.exists() {
        HangarConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?
    } else {
        warn!("Config file {:?} not found, using defaults", path);
        HangarConfig::default()
    };

    let warnings = config.validate().context("Configuration validation failed")?;
    for warning in &warnings {
        eprintln!("{warning}");
    }
    Ok(config)
}

fn build_orchestrator(config: &HangarConfig) -> Result<Arc<Orchestrator>> {
    let workspace = FsWorkspace::new(&config.workspace.root, &config.workspace.templates)
        .context("Failed to set up workspace directories")?;
    let infra = TerraformCli::new(&config.infra.binary)
        .with_variables(config.infra.variables.clone());
    let provisioner = AnsiblePlaybook::new(
        &config.provisioner.binary,
        &config.provisioner.provision_playbook,
        &config.provisioner.deprovision_playbook,
    )
    .with_extra_args(config.provisioner.extra_args.clone());

    Ok(Arc::new(Orchestrator::new(
        Arc::new(ClusterRegistry::new(config.limits.max_clusters)),
        Arc::new(workspace),
        Arc::new(infra),
        Arc::new(provisioner),
        config.create_retry.policy(),
        config.teardown_retry.policy(),
    )))
}

async fn run_command(config: &HangarConfig, args: RunArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.definition)
        .with_context(|| format!("Failed to read definition {:?}", args.definition))?;
    let definition = ClusterDefinition::from_yaml(&text)?;

    let orchestrator = build_orchestrator(config)?;
    let _reaper = config.reaper.enabled.then(|| {
        Reaper::new(
            Arc::clone(orchestrator.registry()),
            config.reaper.interval(),
            config.reaper.max_inactivity(),
        )
        .spawn()
    });

    let cluster = orchestrator.create(&definition)?;
    let id = cluster.id();
    println!("Cluster {id} accepted (status {})", cluster.status());

    let timeout = Duration::from_secs(args.timeout_secs);
    let status = stream_until_settled(&cluster, args.output, timeout, ClusterStatus::Running).await?;
    if status != ClusterStatus::Running {
        print_log_hint(&orchestrator, &cluster);
        bail!("cluster launch failed (status {status})");
    }

    if args.output == OutputFormat::Text {
        if let Some(Ok(info)) = orchestrator.cluster_info(id) {
            println!("\n{info}");
        }
        if let Some(Ok(access)) = orchestrator.access_file(id) {
            println!("\nAccess:\n{access}");
        }
    }

    if args.hold {
        info!("Cluster is running; press Ctrl-C to tear it down");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        println!("Tearing down cluster {id}");
    }

    orchestrator
        .delete(id)?
        .context("cluster vanished before deletion")?;
    let status =
        stream_until_settled(&cluster, args.output, timeout, ClusterStatus::Terminated).await?;

    if args.output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&cluster.snapshot())?);
    }

    if status != ClusterStatus::Terminated {
        print_log_hint(&orchestrator, &cluster);
        bail!("cluster teardown failed (status {status})");
    }
    println!("Cluster {id} terminated");
    Ok(())
}

/// Polls the cluster, printing events as they appear, until it reaches
/// `goal`, any terminal status, or the timeout expires.
async fn stream_until_settled(
    cluster: &Cluster,
    output: OutputFormat,
    timeout: Duration,
    goal: ClusterStatus,
) -> Result<ClusterStatus> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut printed = 0;
    loop {
        let events = cluster.events();
        if output == OutputFormat::Text {
            for event in &events[printed..] {
                println!("{event}");
            }
        }
        printed = events.len();

        let status = cluster.status();
        if status == goal || status.is_terminal() {
            return Ok(status);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out after {}s waiting for {goal}", timeout.as_secs());
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

fn print_log_hint(orchestrator: &Orchestrator, cluster: &Cluster) {
    if let Some(Ok(log)) = orchestrator.logs(cluster.id()) {
        let tail: Vec<&str> = log.lines().rev().take(20).collect();
        eprintln!("--- last tool output ---");
        for line in tail.iter().rev() {
            eprintln!("{line}");
        }
    }
}

fn validate_command(config: &HangarConfig, args: &ValidateArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.definition)
        .with_context(|| format!("Failed to read definition {:?}", args.definition))?;
    let definition = ClusterDefinition::from_yaml(&text)?;

    let workspace = FsWorkspace::new(&config.workspace.root, &config.workspace.templates)?;
    workspace.resolve_template(definition.template())?;

    println!(
        "Definition OK (template '{}'{})",
        definition.template(),
        definition
            .wait_after_apply()
            .map(|wait| format!(", settle delay {}min", wait.as_secs() / 60))
            .unwrap_or_default()
    );
    Ok(())
}

fn templates_command(config: &HangarConfig) -> Result<()> {
    let workspace = FsWorkspace::new(&config.workspace.root, &config.workspace.templates)?;
    let names = workspace.template_names()?;
    if names.is_empty() {
        println!("No templates found in {:?}", config.workspace.templates);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}
