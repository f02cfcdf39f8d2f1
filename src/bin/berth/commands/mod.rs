//! Command implementations

pub mod configure;
pub mod list;
pub mod platform;
pub mod show;

use anyhow::{Context, Result};

use berth::util::config::{global_config_path, load_config, project_config_path};
use berth::util::{Config, Environment};

use crate::cli::OverrideArgs;

/// Configuration and environment for a command that probes the host.
pub struct Session {
    pub config: Config,
    pub env: Environment,
}

impl Session {
    /// Load `~/.berth/config.toml` and `.berth/config.toml`, then apply
    /// the `--with` overrides on top.
    pub fn load(args: &OverrideArgs) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let global = global_config_path().unwrap_or_default();
        let mut config = load_config(&global, &project_config_path(&cwd));

        for item in &args.overrides {
            config
                .apply_override(item)
                .with_context(|| format!("invalid --with {}", item))?;
        }

        Ok(Session {
            config,
            env: Environment::capture(),
        })
    }
}
