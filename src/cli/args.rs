//! Command line argument parsing
//!
//! - `run`: Execute the selected tasks and everything they depend on
//! - `ls`: List the tasks of the project tree

use crate::address::Address;
use crate::env;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build orchestration for projects declared in kiln.toml")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute tasks (the default tasks when no selector is given)
    Run {
        #[command(flatten)]
        build: BuildOptions,
        #[command(flatten)]
        graph: GraphOptions,
    },
    /// List the selected tasks and their dependencies
    Ls {
        #[command(flatten)]
        build: BuildOptions,
        #[command(flatten)]
        graph: GraphOptions,
    },
}

/// Where the build reads its project and keeps its state.
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct BuildOptions {
    /// Project directory containing kiln.toml
    #[arg(short = 'p', long = "project-dir")]
    pub project_dir: Option<PathBuf>,

    /// Build directory, relative paths resolve against the project directory
    #[arg(short = 'b', long = "build-dir")]
    pub build_dir: Option<PathBuf>,

    /// Directory the build state is saved to
    #[arg(long = "state-dir")]
    pub state_dir: Option<PathBuf>,

    /// Additional directories to read build state from when resuming
    #[arg(long = "additional-state-dir")]
    pub additional_state_dirs: Vec<PathBuf>,

    /// Name of the state file written by this invocation
    #[arg(long = "state-name")]
    pub state_name: Option<String>,

    /// Don't save the build state
    #[arg(long = "no-save")]
    pub no_save: bool,
}

impl BuildOptions {
    pub fn project_dir(&self) -> PathBuf {
        self.project_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn build_dir(&self) -> PathBuf {
        let project_dir = self.project_dir();
        match &self.build_dir {
            Some(dir) => project_dir.join(dir),
            None => project_dir.join(env::DEFAULT_BUILD_DIR),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| env::state_dir_path(&self.build_dir()))
    }

    /// The state directory followed by the additional ones.
    pub fn state_dirs(&self) -> Vec<PathBuf> {
        std::iter::once(self.state_dir())
            .chain(self.additional_state_dirs.iter().cloned())
            .collect()
    }

    pub fn state_name(&self) -> String {
        self.state_name.clone().unwrap_or_else(env::short_id)
    }

    pub fn manifest_path(&self) -> PathBuf {
        env::manifest_path(&self.project_dir())
    }
}

/// Which tasks to execute and how to treat the previous build.
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct GraphOptions {
    /// Tasks or projects to execute
    pub selectors: Vec<String>,

    /// Resume from the saved build state, skipping tasks that already succeeded
    #[arg(short = 'r', long)]
    pub resume: bool,

    /// With --resume, discard the saved results and start over
    #[arg(long, requires = "resume")]
    pub restart: bool,

    /// Execute the full graph instead of only what the selection needs
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Skip these tasks
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,

    /// Skip these tasks and everything only they depend on
    #[arg(short = 'X', long = "exclude-subgraph")]
    pub exclude_subgraph: Vec<String>,
}

impl GraphOptions {
    pub fn with_selectors<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Parse task selectors, `None` when there are none.
pub fn parse_selectors(selectors: &[String]) -> Result<Option<Vec<Address>>, crate::address::AddressParseError> {
    if selectors.is_empty() {
        return Ok(None);
    }
    selectors
        .iter()
        .map(|s| Address::parse(s))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
