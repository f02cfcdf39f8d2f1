//! GPU platform and architecture detection.
//!
//! HIP code can target AMD GPUs directly or NVIDIA GPUs through CUDA. The
//! platform decides which defines and include paths apply; on AMD the GPU
//! architecture must also be known, since device code is compiled for it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::builder::toolchain::CommandSpec;
use crate::resolver::errors::{ResolveError, ResolveStage};
use crate::util::env::Environment;
use crate::util::process::ProbeRunner;

/// Marketing name of the APU whose memory is shared between CPU and GPU.
const UNIFIED_MEMORY_DEVICE: &str = "AMD Instinct MI300A";

/// The vendor backend HIP compiles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HipPlatform {
    Amd,
    Nvidia,
}

impl HipPlatform {
    /// Parse a platform name as printed by `hipconfig --platform`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "amd" | "hcc" => Some(HipPlatform::Amd),
            "nvidia" | "nvcc" => Some(HipPlatform::Nvidia),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HipPlatform::Amd => "amd",
            HipPlatform::Nvidia => "nvidia",
        }
    }
}

impl fmt::Display for HipPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated GPU architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuArch {
    pub name: String,
    pub unified_memory: bool,
}

impl GpuArch {
    /// The device compiler flag selecting this architecture.
    pub fn offload_flag(&self) -> String {
        format!("--offload-arch={}", self.name)
    }

    /// Status line as shown after configuration.
    pub fn status_line(&self) -> String {
        if self.unified_memory {
            format!("HIP arch: {} with unified memory", self.name)
        } else {
            format!("HIP arch: {}", self.name)
        }
    }
}

/// Result of scanning `rocminfo` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchScan {
    Parsed { arch: String, unified_memory: bool },
    Unparsed,
}

/// Extract the GPU architecture from `rocminfo` output.
///
/// The first whitespace-separated token that begins with `gfx` is taken as
/// the architecture; the output naming an MI300A marks unified memory.
pub fn parse_rocminfo(output: &str) -> ArchScan {
    let Some(arch) = output
        .split_whitespace()
        .find(|token| token.to_ascii_lowercase().starts_with("gfx"))
    else {
        return ArchScan::Unparsed;
    };

    ArchScan::Parsed {
        arch: arch.to_ascii_lowercase(),
        unified_memory: output.contains(UNIFIED_MEMORY_DEVICE),
    }
}

/// Parse a user-supplied architecture such as `gfx90a` or `gfx942_apu`.
pub fn parse_arch_override(value: &str) -> Result<GpuArch, String> {
    let lowered = value.trim().to_ascii_lowercase();
    let mut parts = lowered.split('_');
    let name = parts.next().unwrap_or_default().to_string();
    let unified_memory = lowered.contains('_') && lowered.rsplit('_').next() == Some("apu");

    validate_arch(&name)?;
    Ok(GpuArch {
        name,
        unified_memory,
    })
}

fn validate_arch(name: &str) -> Result<(), String> {
    let valid = Regex::new(r"^gfx[0-9a-z]+$")
        .map(|re| re.is_match(name))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(format!(
            "HIP arch name {} is not in the supported gfxnnn or gfxnnn_apu format",
            name
        ))
    }
}

/// Runs the vendor tools that report the platform and architecture.
pub struct PlatformProbe<'a> {
    runner: &'a dyn ProbeRunner,
    env: &'a Environment,
    timeout: Duration,
}

impl<'a> PlatformProbe<'a> {
    pub fn new(runner: &'a dyn ProbeRunner, env: &'a Environment, timeout: Duration) -> Self {
        PlatformProbe {
            runner,
            env,
            timeout,
        }
    }

    /// Decide the HIP platform.
    ///
    /// Precedence: user override, `hipconfig --platform`, the `HIP_PLATFORM`
    /// environment variable, NVIDIA when a CUDA compiler is configured, AMD.
    pub fn platform(
        &self,
        package: &str,
        user: Option<&str>,
        root: Option<&Path>,
        has_cuda_compiler: bool,
    ) -> Result<HipPlatform, ResolveError> {
        if let Some(value) = user {
            return HipPlatform::from_name(value).ok_or_else(|| ResolveError::InvalidOverride {
                package: package.to_string(),
                key: format!("{}-platform", package),
                value: value.to_string(),
                reason: "expected amd or nvidia".to_string(),
                stage: ResolveStage::Platform,
            });
        }

        if let Some(hipconfig) = self.locate("hipconfig", root) {
            let output = self
                .runner
                .run(&CommandSpec::new(&hipconfig).arg("--platform"), self.timeout);
            if output.succeeded() {
                match HipPlatform::from_name(&output.stdout) {
                    Some(platform) => {
                        tracing::debug!("hipconfig reports platform {}", platform);
                        return Ok(platform);
                    }
                    None => tracing::warn!(
                        "ignoring unrecognized hipconfig platform `{}`",
                        output.stdout.trim()
                    ),
                }
            } else {
                tracing::debug!("hipconfig --platform failed: {}", output.diagnostic());
            }
        }

        if let Some(value) = self.env.var("HIP_PLATFORM") {
            match HipPlatform::from_name(value) {
                Some(platform) => return Ok(platform),
                None => tracing::warn!("ignoring unrecognized HIP_PLATFORM `{}`", value),
            }
        }

        if has_cuda_compiler {
            Ok(HipPlatform::Nvidia)
        } else {
            Ok(HipPlatform::Amd)
        }
    }

    /// Decide the GPU architecture for the AMD platform.
    ///
    /// A user override always wins and skips the probe.
    pub fn arch(
        &self,
        package: &str,
        user: Option<&str>,
        root: Option<&Path>,
    ) -> Result<GpuArch, ResolveError> {
        if let Some(value) = user {
            return parse_arch_override(value).map_err(|reason| ResolveError::InvalidOverride {
                package: package.to_string(),
                key: format!("{}-arch", package),
                value: value.to_string(),
                reason,
                stage: ResolveStage::Platform,
            });
        }

        let ambiguous = || ResolveError::Ambiguous {
            package: package.to_string(),
            fact: "the GPU architecture".to_string(),
            hint: format!(
                "pass --with {}-arch=<gfx…> (e.g. gfx942_apu, gfx942, gfx90a, gfx908) or put rocminfo on PATH",
                package
            ),
        };

        let Some(rocminfo) = self.locate("rocminfo", root) else {
            tracing::debug!("rocminfo not found");
            return Err(ambiguous());
        };

        let output = self.runner.run(&CommandSpec::new(&rocminfo), self.timeout);
        if !output.succeeded() {
            tracing::warn!(
                "ROCm utility {} failed: {}",
                rocminfo.display(),
                output.diagnostic()
            );
            return Err(ambiguous());
        }

        match parse_rocminfo(&output.stdout) {
            ArchScan::Parsed {
                arch,
                unified_memory,
            } => {
                tracing::debug!(
                    "ROCm utility {} said the HIP arch is {}{}",
                    rocminfo.display(),
                    arch,
                    if unified_memory { " with unified memory" } else { "" }
                );
                validate_arch(&arch).map_err(|reason| ResolveError::InvalidOverride {
                    package: package.to_string(),
                    key: format!("{}-arch", package),
                    value: arch.clone(),
                    reason,
                    stage: ResolveStage::Platform,
                })?;
                Ok(GpuArch {
                    name: arch,
                    unified_memory,
                })
            }
            ArchScan::Unparsed => {
                tracing::warn!("unable to parse the output of {}", rocminfo.display());
                Err(ambiguous())
            }
        }
    }

    /// A vendor tool from the package root, else from PATH.
    fn locate(&self, tool: &str, root: Option<&Path>) -> Option<PathBuf> {
        root.map(|r| r.join("bin").join(tool))
            .filter(|p| p.is_file())
            .or_else(|| self.env.find_tool(tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{outputs, CommandExpectation, CommandPattern, MockRunner};

    #[test]
    fn test_parse_rocminfo_noisy_output() {
        let out = outputs::rocminfo("gfx90a", "AMD Instinct MI250X").stdout;
        assert_eq!(
            parse_rocminfo(&out),
            ArchScan::Parsed {
                arch: "gfx90a".to_string(),
                unified_memory: false
            }
        );
    }

    #[test]
    fn test_parse_rocminfo_ignores_isa_names() {
        let out = "  Name:  amdgcn-amd-amdhsa--gfx942:sramecc+:xnack-\n  Name:  gfx942\n  \
                   Marketing Name: AMD Instinct MI300A\n";
        assert_eq!(
            parse_rocminfo(out),
            ArchScan::Parsed {
                arch: "gfx942".to_string(),
                unified_memory: true
            }
        );
    }

    #[test]
    fn test_parse_rocminfo_without_gpu() {
        assert_eq!(parse_rocminfo("ROCk module is NOT loaded"), ArchScan::Unparsed);
        assert_eq!(parse_rocminfo(""), ArchScan::Unparsed);
    }

    #[test]
    fn test_arch_override() {
        let arch = parse_arch_override("GFX942_APU").unwrap();
        assert_eq!(arch.name, "gfx942");
        assert!(arch.unified_memory);
        assert_eq!(arch.offload_flag(), "--offload-arch=gfx942");
        assert_eq!(arch.status_line(), "HIP arch: gfx942 with unified memory");

        let arch = parse_arch_override("gfx90a").unwrap();
        assert!(!arch.unified_memory);

        assert!(parse_arch_override("sm_80").is_err());
        assert!(parse_arch_override("").is_err());
    }

    #[test]
    fn test_platform_precedence() {
        let runner = MockRunner::new().expect(CommandExpectation::new(
            CommandPattern::Contains("hipconfig --platform".to_string()),
            outputs::hipconfig_platform("nvidia"),
        ));
        let env = Environment::empty()
            .with_tool("hipconfig", "/opt/rocm/bin/hipconfig")
            .with_var("HIP_PLATFORM", "amd");
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));

        assert_eq!(probe.platform("hip", Some("amd"), None, false).unwrap(), HipPlatform::Amd);
        assert!(runner.calls().is_empty());

        assert_eq!(probe.platform("hip", None, None, false).unwrap(), HipPlatform::Nvidia);

        let env = Environment::empty().with_var("HIP_PLATFORM", "nvcc");
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));
        assert_eq!(probe.platform("hip", None, None, false).unwrap(), HipPlatform::Nvidia);

        let env = Environment::empty();
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));
        assert_eq!(probe.platform("hip", None, None, true).unwrap(), HipPlatform::Nvidia);
        assert_eq!(probe.platform("hip", None, None, false).unwrap(), HipPlatform::Amd);
    }

    #[test]
    fn test_bad_platform_override() {
        let runner = MockRunner::new();
        let env = Environment::empty();
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));
        let err = probe.platform("hip", Some("intel"), None, false).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidOverride { .. }));
    }

    #[test]
    fn test_arch_from_rocminfo() {
        let runner = MockRunner::new().expect(CommandExpectation::new(
            CommandPattern::Contains("rocminfo".to_string()),
            outputs::rocminfo("gfx942", "AMD Instinct MI300A"),
        ));
        let env = Environment::empty().with_tool("rocminfo", "/opt/rocm/bin/rocminfo");
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));

        let arch = probe.arch("hip", None, None).unwrap();
        assert_eq!(arch.name, "gfx942");
        assert!(arch.unified_memory);
    }

    #[test]
    fn test_override_skips_rocminfo() {
        let runner = MockRunner::new();
        let env = Environment::empty().with_tool("rocminfo", "/opt/rocm/bin/rocminfo");
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));

        let arch = probe.arch("hip", Some("gfx908"), None).unwrap();
        assert_eq!(arch.name, "gfx908");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_missing_arch_is_ambiguous() {
        let runner = MockRunner::new();
        let env = Environment::empty();
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));

        let err = probe.arch("hip", None, None).unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { .. }));
        assert!(err.hint().contains("--with hip-arch=<gfx…>"));
    }

    #[test]
    fn test_rocminfo_timeout_is_ambiguous() {
        let runner = MockRunner::new().expect(CommandExpectation::new(
            CommandPattern::Contains("rocminfo".to_string()),
            crate::util::process::ProbeOutput::timeout(),
        ));
        let env = Environment::empty().with_tool("rocminfo", "/opt/rocm/bin/rocminfo");
        let probe = PlatformProbe::new(&runner, &env, Duration::from_secs(1));
        assert!(matches!(
            probe.arch("hip", None, None),
            Err(ResolveError::Ambiguous { .. })
        ));
    }
}
