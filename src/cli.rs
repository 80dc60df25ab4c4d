use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "drft")]
#[command(version)]
#[command(about = "Declarative resource management", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the operations an apply would perform
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply the desired state
    Apply {
        /// Skip the interactive confirmation
        #[arg(long)]
        auto_approve: bool,
    },

    /// Delete every managed resource
    Destroy {
        /// Skip the interactive confirmation
        #[arg(long)]
        auto_approve: bool,
    },

    /// Re-read actual state from providers
    Refresh,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
