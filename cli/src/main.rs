//! `dib` command line: build images from TOML build plans

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use dib::{
    BuildContext, BuilderConfig, CommitOptions, DockerRuntime, extract_config,
    models::{BuildEvent, BuildPlan, VolumeBinding},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing_subscriber::EnvFilter;

mod plan;

/// Build container images by running steps in a container and committing it
#[derive(Parser)]
#[command(name = "dib", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file. Env variables prefixed with `DIB_` take precedence.
    #[arg(short, long, global = true, default_value = "dib.toml")]
    config: PathBuf,

    /// Log level or filter directives, e.g. `debug` or `dib=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image from a build plan
    Build {
        /// Path to the build plan
        plan: PathBuf,

        /// Tag of the committed image, overrides the plan's tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Extra build-time volume (HOST:CONTAINER[:ro])
        #[arg(short, long = "volume")]
        volumes: Vec<String>,
    },

    /// Print the JSON schema of build plans
    Schema,

    /// Remove leftover build containers
    Prune,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = match extract_config(Some(&cli.config)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    };
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build { plan, tag, volumes } => cmd_build(config, &plan, tag, &volumes).await,
        Commands::Schema => cmd_schema(),
        Commands::Prune => cmd_prune(config).await,
    };
    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn cmd_build(
    config: BuilderConfig,
    plan_path: &Path,
    tag: Option<String>,
    volumes: &[String],
) -> anyhow::Result<()> {
    let plan = plan::load_plan(plan_path)?;
    let tag = tag.or_else(|| plan.tag.clone());

    let runtime = DockerRuntime::connect(&config).await?;
    let (tx, rx) = mpsc::channel(256);
    let printer = spawn_event_printer(rx);
    let mut context = BuildContext::new(runtime, config).with_events(tx);

    for binding in plan.volumes.iter().cloned() {
        context.buildtime_binding(binding)?;
    }
    for volume in volumes {
        let binding: VolumeBinding = volume.parse()?;
        context.buildtime_binding(binding)?;
    }

    let outcome = context
        .build(&plan.base, async |session| {
            for step in &plan.steps {
                session.apply(step).await?;
            }
            match &tag {
                Some(tag) => {
                    let options = CommitOptions {
                        author: plan.author.clone(),
                        message: plan.message.clone(),
                    };
                    session.commit_with(tag, options).await.map(Some)
                }
                None => Ok(None),
            }
        })
        .await;

    // Close the event channel so the printer finishes
    drop(context);
    printer.await.context("Event printer failed")?;

    match outcome? {
        Some(outcome) => println!(
            "Successfully built {} ({})",
            outcome.spec.image, outcome.image_id
        ),
        None => println!("Build finished without a tag, nothing was committed"),
    }
    Ok(())
}

fn cmd_schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(BuildPlan);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

async fn cmd_prune(config: BuilderConfig) -> anyhow::Result<()> {
    let runtime = DockerRuntime::connect(&config).await?;
    let removed = runtime.prune_build_containers().await?;
    println!("Removed {removed} build container(s)");
    Ok(())
}

/// Print build events as they arrive. Command output is indented under its step.
fn spawn_event_printer(mut rx: mpsc::Receiver<BuildEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BuildEvent::Info(line) => println!("{line}"),
                BuildEvent::Stdout(line) => println!("    {line}"),
                BuildEvent::Stderr(line) => eprintln!("    {line}"),
                // Errors are returned from the build and printed by `main`
                BuildEvent::Debug(line) | BuildEvent::Error(line) => tracing::debug!("{line}"),
            }
        }
    })
}
