//! `berth platform` command

use anyhow::Result;

use berth::builder::detect_toolchains;
use berth::ops::detect_platform;
use berth::util::SystemRunner;

use crate::cli::PlatformArgs;
use crate::commands::Session;

pub fn execute(args: PlatformArgs) -> Result<()> {
    let session = Session::load(&args.overrides)?;
    let runner = SystemRunner;
    let toolchains = detect_toolchains(&session.config.compilers, &session.env, &runner)?;

    let report = detect_platform(&toolchains, &runner, &session.env, &session.config)?;

    println!("HIP platform: {}", report.platform);
    if let Some(ref arch) = report.arch {
        println!("{}", arch.status_line());
    }
    if let Some(ref err) = report.arch_error {
        tracing::warn!("{}", err);
    }

    Ok(())
}
