pub mod check;
pub mod cycles;
pub mod project;
pub mod tree;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use strata_core::composer::Composer;
use strata_core::config::StrataConfig;
use strata_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the ordered containment forest
    Tree(tree::TreeArgs),
    /// Print a level-bounded projection of the forest
    Project(project::ProjectArgs),
    /// List entities flagged by the cycle report
    Cycles(cycles::CyclesArgs),
    /// Report build statistics and verify the forest
    Check(check::CheckArgs),
}

pub fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Tree(args) => tree::run(&args, quiet),
        Command::Project(args) => project::run(&args, quiet),
        Command::Cycles(args) => cycles::run(&args, quiet),
        Command::Check(args) => check::run(&args, quiet),
    }
}

/// Input files shared by every subcommand.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Analysis result (JSON)
    pub analysis: PathBuf,

    /// Cycle report (JSON); without it nothing is flagged
    #[arg(long)]
    pub cycles: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Declared project root name (overrides `[project] root_name`)
    #[arg(long)]
    pub root_name: Option<String>,

    /// Show progress bars while composing
    #[arg(long)]
    pub progress: bool,
}

/// Output format for projections.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Json,
    Dot,
}

/// Output format for reports.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl InputArgs {
    pub fn load_config(&self) -> anyhow::Result<StrataConfig> {
        let mut config = match &self.config {
            Some(path) => StrataConfig::load(path)
                .with_context(|| format!("Cannot load config: {}", path.display()))?,
            None => StrataConfig::default(),
        };
        if let Some(root) = &self.root_name {
            config.project.root_name = Some(root.clone());
        }
        Ok(config)
    }

    /// Read both inputs and compose them.
    pub fn compose(&self, quiet: bool) -> anyhow::Result<Composer> {
        let config = self.load_config()?;
        tracing::debug!(
            analysis = %self.analysis.display(),
            cycles = ?self.cycles,
            root_name = ?config.project.root_name,
            "Loading inputs"
        );
        let analysis = read_input(&self.analysis, "analysis")?;
        let cycles = self
            .cycles
            .as_deref()
            .map(|path| read_input(path, "cycle report"))
            .transpose()?;

        let reporter: Box<dyn ProgressReporter> = if self.progress && !quiet {
            Box::new(IndicatifReporter::new())
        } else {
            Box::new(NoopReporter)
        };

        Composer::from_json(&analysis, cycles.as_deref(), &config, reporter.as_ref())
            .with_context(|| format!("Cannot compose analysis: {}", self.analysis.display()))
    }
}

fn read_input(path: &Path, what: &str) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {what}: {}", path.display()))
}

/// `[high]`-style badge for a cycle severity, or nothing.
pub fn badge(severity: Option<strata_core::types::Severity>) -> String {
    severity
        .map(|s| format!(" [cycle: {s}]"))
        .unwrap_or_default()
}
