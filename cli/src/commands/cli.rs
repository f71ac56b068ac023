use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "resilient", version, about = "Inspect and exercise the resilient task engine")]
pub struct Args {
    /// Config file; defaults to ./resilient.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoMode {
    /// Registration order, one task at a time.
    Sequence,
    /// Dependency stages, each stage in parallel.
    Graph,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DemoArgs {
    #[arg(long, value_enum, default_value_t = DemoMode::Graph)]
    pub mode: DemoMode,

    /// Overrides the configured base retry delay so the demo stays short.
    #[arg(long, default_value_t = 50)]
    pub base_delay_ms: u64,

    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Complete every task left waiting for a human with a canned value.
    #[arg(long)]
    pub auto_approve: bool,

    /// Print results as JSON lines instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ClassifyArgs {
    /// Error message to classify.
    pub message: String,

    /// Error name (e.g. NetworkError) consulted by name-based patterns.
    #[arg(long, default_value = "Error")]
    pub name: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DelaysArgs {
    /// immediate, linear, exponential or fibonacci; defaults to the config value.
    #[arg(long)]
    pub strategy: Option<String>,

    #[arg(long)]
    pub base_ms: Option<u64>,

    #[arg(long)]
    pub max_ms: Option<u64>,

    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a small batch of flaky tasks through the engine.
    Demo(DemoArgs),
    /// Show which error kind and pattern a message maps to.
    Classify(ClassifyArgs),
    /// Print the backoff schedule for a retry policy.
    Delays(DelaysArgs),
    /// Print the resolved configuration as JSON.
    Config,
}
