use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod completion;
mod console_host;
mod dispatch;
mod render;

use completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "launchpad")]
#[command(about = "Versioned payload launcher for host applications", long_about = None)]
struct Cli {
    /// User prefix holding selections, logs and launchpad.toml.
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,
    /// Base directory scanned for installed payloads.
    #[arg(long, global = true)]
    install_root: Option<PathBuf>,
    /// Host version string, for example 2024.
    #[arg(long = "host", global = true)]
    host_version: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List installed payloads for the host.
    List,
    /// Print the entry module the next launch would use.
    Resolve,
    /// Persist the payload at INDEX (as shown by `list`) for the host.
    Select { index: usize },
    /// Resolve and start the payload under a console host.
    Launch {
        /// Startup journal entry, repeatable.
        #[arg(long = "journal", value_name = "KEY=VALUE")]
        journal: Vec<String>,
        /// Shorthand for `--journal debug=true`.
        #[arg(long)]
        debug: bool,
    },
    Doctor,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::run_cli(cli)
}

#[cfg(test)]
mod tests;
