//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Berth - locate and validate the native packages a build depends on
#[derive(Parser)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve packages and print the flags they contribute
    Configure(ConfigureArgs),

    /// List the known packages
    List(ListArgs),

    /// Show how a package is searched for
    Show(ShowArgs),

    /// Report the HIP platform and GPU architecture of this host
    Platform(PlatformArgs),
}

/// Settings shared by every command that probes the host.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Override a setting, e.g. `hip-dir=/opt/rocm` or `hip=0` (repeatable)
    #[arg(long = "with", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Packages to configure (default: every known package)
    pub packages: Vec<String>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Also write the configuration as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Also print each package's dependencies
    #[arg(long)]
    pub deps: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Package name
    pub package: String,
}

#[derive(Args, Debug)]
pub struct PlatformArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,
}
