use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rib")]
#[command(version, about = "Root image build tool", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Create a work directory and run its build scripts
    rib init ./image
    rib -d ./image build
    rib -d ./image -vv build --buildseq 40

    # Inspect the result
    rib -d ./image shell
    rib -d ./image shell ls -l /etc

    # Show what a build would run
    rib -d ./image list --json
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Work directory
    #[arg(short, long, value_name = "DIR", default_value = ".", env = "RIB_DIR", global = true)]
    pub dir: PathBuf,

    /// Verbose output (repeat for debug output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty work directory
    Init {
        /// Work directory (overrides --dir)
        workdir: Option<PathBuf>,
    },

    /// Run build scripts
    Build {
        /// Minimum sequence number
        #[arg(short = 's', long, value_name = "N", default_value_t = 0)]
        buildseq: u64,
    },

    /// Run an interactive command inside the image
    Shell {
        /// Command and arguments (default: bash)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remove rootfs, tmp and fakeroot.save
    Clean {
        /// Also remove the dist and log directories
        #[arg(short, long)]
        all: bool,
    },

    /// List the scripts a build would run
    List {
        /// Minimum sequence number
        #[arg(short = 's', long, value_name = "N", default_value_t = 0)]
        buildseq: u64,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}
