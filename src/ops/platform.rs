//! HIP platform and GPU architecture report.

use anyhow::Result;

use crate::builder::toolchain::{Language, Toolchains};
use crate::resolver::platform::{GpuArch, HipPlatform, PlatformProbe};
use crate::resolver::search::compiler_root;
use crate::util::config::Config;
use crate::util::env::Environment;
use crate::util::process::ProbeRunner;

/// What the vendor tools report about this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformReport {
    pub platform: HipPlatform,
    /// Only probed on the AMD platform
    pub arch: Option<GpuArch>,
    /// Why no architecture could be determined
    pub arch_error: Option<String>,
}

/// Detect the HIP platform and, on AMD, the GPU architecture.
pub fn detect_platform(
    toolchains: &Toolchains,
    runner: &dyn ProbeRunner,
    env: &Environment,
    config: &Config,
) -> Result<PlatformReport> {
    let overrides = config.overrides("hip");
    let root = overrides.dir.clone().or_else(|| {
        toolchains
            .for_language(Language::Hip)
            .and_then(|hipcc| compiler_root(hipcc.compiler_path(), "hipcc"))
            .map(|d| d.path)
    });

    let probe = PlatformProbe::new(runner, env, config.probe.tool_timeout());
    let platform = probe.platform(
        "hip",
        overrides.platform.as_deref(),
        root.as_deref(),
        toolchains.for_language(Language::Cuda).is_some(),
    )?;

    let (arch, arch_error) = match platform {
        HipPlatform::Nvidia => (None, None),
        HipPlatform::Amd => match probe.arch("hip", overrides.arch.as_deref(), root.as_deref()) {
            Ok(arch) => (Some(arch), None),
            Err(e) => (None, Some(format!("{} ({})", e, e.hint()))),
        },
    };

    Ok(PlatformReport {
        platform,
        arch,
        arch_error,
    })
}
