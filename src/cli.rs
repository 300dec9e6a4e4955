//! CLI front-end: a thin `run` subcommand that decodes a workflow document,
//! drives the engine to completion, and renders progress to the terminal.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::model::{ResultEvent, Status};
use crate::source;

#[derive(Parser, Debug)]
#[command(name = "stepgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = "stepgraph.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow document to completion
    Run(RunArgs),

    /// Show the effective engine configuration
    Config,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow document (YAML)
    pub workflow_file: PathBuf,

    /// Variable overrides, `key=value`, merged into the engine environment
    #[arg(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run_workflow(args, &self.config).await,
            Commands::Config => {
                let config = EngineConfig::from_file(std::path::Path::new(&self.config))?;
                println!("{}", toml::to_string_pretty(&config).context("serializing config")?);
                Ok(())
            }
        }
    }
}

async fn run_workflow(args: RunArgs, config_path: &str) -> Result<()> {
    let document = tokio::fs::read_to_string(&args.workflow_file)
        .await
        .with_context(|| format!("reading workflow file: {}", args.workflow_file.display()))?;
    let workflow = source::decode_workflow(&document).context("decoding workflow document")?;

    let mut config = EngineConfig::from_file(std::path::Path::new(config_path))?;
    config.environment.extend(args.vars);

    let engine = Engine::builder(config).build(&workflow).context("building workflow graph")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let mut rx = engine.execute();
    let mut final_status = Status::NotStarted;

    while let Some(item) = rx.recv().await {
        match item {
            Ok((snapshot, event)) => {
                final_status = snapshot.status.clone();
                report_event(&spinner, &event);
            }
            Err(e) => {
                spinner.finish_and_clear();
                return Err(anyhow::anyhow!(e));
            }
        }
    }

    spinner.finish_and_clear();
    print_summary(&final_status);

    if matches!(final_status, Status::Failure { .. }) {
        std::process::exit(1);
    }
    Ok(())
}

fn report_event(spinner: &ProgressBar, event: &ResultEvent) {
    match event {
        ResultEvent::ShellOutput { chunk, .. } => spinner.set_message(chunk.clone()),
        ResultEvent::TemplateProgress {
            output_path,
            completed,
            total,
            ..
        } => spinner.set_message(format!("{output_path} ({completed}/{total})")),
        ResultEvent::StepBoundary { script_id } => {
            spinner.set_message(format!("finished {}", script_id.as_str()))
        }
        ResultEvent::FormRequest { rendezvous_id, .. } => {
            spinner.set_message(format!("waiting for form data: {rendezvous_id}"))
        }
    }
    spinner.tick();
}

fn print_summary(status: &Status) {
    match status {
        Status::Success { .. } => println!("{}", style("workflow succeeded").green().bold()),
        Status::Failure { .. } => println!("{}", style("workflow failed").red().bold()),
        other => println!("{}", style(format!("workflow ended as {other:?}")).yellow()),
    }
}
