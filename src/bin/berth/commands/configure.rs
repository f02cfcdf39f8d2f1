//! `berth configure` command

use anyhow::Result;

use berth::builder::detect_toolchains;
use berth::ops::{configure, ConfigureEnv, ConfigureOptions, PackageOutcome};
use berth::util::SystemRunner;
use berth::RecipeRegistry;

use crate::cli::ConfigureArgs;
use crate::commands::Session;

pub fn execute(args: ConfigureArgs) -> Result<()> {
    let session = Session::load(&args.overrides)?;
    let registry = RecipeRegistry::builtin()?;
    let runner = SystemRunner;
    let toolchains = detect_toolchains(&session.config.compilers, &session.env, &runner)?;

    let cx = ConfigureEnv {
        registry: &registry,
        toolchains: &toolchains,
        runner: &runner,
        env: &session.env,
        config: &session.config,
    };
    let opts = ConfigureOptions {
        packages: args.packages,
    };
    let report = configure(&opts, &cx)?;

    for package in report.configured() {
        print!("{}", package);
    }

    let absent: Vec<String> = report
        .packages
        .iter()
        .filter_map(|p| match &p.outcome {
            PackageOutcome::Configured => None,
            PackageOutcome::NotFound { .. } => Some(format!("{} (not found)", p.name)),
            PackageOutcome::Skipped { missing } => {
                Some(format!("{} (needs {})", p.name, missing))
            }
            PackageOutcome::Disabled => Some(format!("{} (disabled)", p.name)),
        })
        .collect();
    if !absent.is_empty() {
        println!("Not configured: {}", absent.join(", "));
    }

    let flags = &report.flags;
    let defines: Vec<String> = flags
        .defines()
        .into_iter()
        .map(|(name, value)| format!("-D{}={}", name, value))
        .collect();
    if !defines.is_empty() {
        println!("Defines:    {}", defines.join(" "));
    }
    let libs: Vec<String> = flags.link_items().iter().map(|i| i.to_flag()).collect();
    if !libs.is_empty() {
        println!("Link:       {}", libs.join(" "));
    }
    let device = flags.device_flags();
    if !device.is_empty() {
        println!("Device:     {}", device.join(" "));
    }

    if let Some(path) = args.json {
        report.write_json(&path)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
