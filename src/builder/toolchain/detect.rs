//! Toolchain detection functions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::util::config::CompilerConfig;
use crate::util::env::Environment;
use crate::util::process::ProbeRunner;

use super::{CommandSpec, GccToolchain, Language, ToolchainPlatform, Toolchains};

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Detect the compilers available to the resolver.
///
/// Each compiler is looked up with the following priority:
/// 1. Config file (`[compilers]` in `.berth/config.toml` or `~/.berth/config.toml`)
/// 2. Environment variables (CC, CXX, HIPCC, NVCC)
/// 3. Searching PATH for common driver names
///
/// Only the host C compiler is mandatory.
pub fn detect_toolchains(
    config: &CompilerConfig,
    env: &Environment,
    runner: &dyn ProbeRunner,
) -> Result<Toolchains> {
    let Some((cc, cc_flags)) = locate(config.cc.as_deref(), env, "CC", &["cc", "gcc", "clang"])
    else {
        bail!(
            "no C compiler found\n\
             \n\
             berth needs a C compiler to run its probes.\n\
             Set the CC environment variable, pass --with cc=<path>, or install a compiler."
        );
    };

    let family = detect_compiler_family(&cc, runner);
    tracing::debug!("host C compiler: {} ({})", cc.display(), family.as_str());

    let mut toolchains = Toolchains::new(Box::new(
        GccToolchain::new(cc.clone(), Language::C, family).with_flags(cc_flags),
    ));

    let inferred_cxx = GccToolchain::infer_cxx(&cc);
    let inferred_name = inferred_cxx.to_string_lossy().into_owned();
    if let Some((cxx, flags)) = locate(
        config.cxx.as_deref(),
        env,
        "CXX",
        &[inferred_name.as_str(), "c++", "g++", "clang++"],
    ) {
        let family = detect_compiler_family(&cxx, runner);
        tracing::debug!("host C++ compiler: {}", cxx.display());
        toolchains = toolchains
            .with(Box::new(GccToolchain::new(cxx, Language::Cxx, family).with_flags(flags)));
    }

    if let Some((hipcc, flags)) = locate(config.hip.as_deref(), env, "HIPCC", &["hipcc"]) {
        tracing::debug!("HIP compiler: {}", hipcc.display());
        toolchains = toolchains.with(Box::new(
            GccToolchain::new(hipcc, Language::Hip, ToolchainPlatform::Hipcc).with_flags(flags),
        ));
    }

    if let Some((nvcc, flags)) = locate(config.cuda.as_deref(), env, "NVCC", &["nvcc"]) {
        tracing::debug!("CUDA compiler: {}", nvcc.display());
        toolchains = toolchains.with(Box::new(
            GccToolchain::new(nvcc, Language::Cuda, ToolchainPlatform::Nvcc).with_flags(flags),
        ));
    }

    Ok(toolchains)
}

/// Find one compiler: configured path, then environment variable, then PATH.
///
/// Configured and environment values are taken as given, without checking
/// that they exist; a bad path surfaces as failing probes. An environment
/// value may carry flags (`CC="gcc -m64"`).
fn locate(
    configured: Option<&Path>,
    env: &Environment,
    var: &str,
    candidates: &[&str],
) -> Option<(PathBuf, Vec<String>)> {
    if let Some(path) = configured {
        return Some((path.to_path_buf(), Vec::new()));
    }

    if let Some(value) = env.var(var) {
        let mut words = value.split_whitespace();
        if let Some(program) = words.next() {
            return Some((PathBuf::from(program), words.map(String::from).collect()));
        }
    }

    candidates
        .iter()
        .find_map(|name| env.find_tool(name))
        .map(|path| (path, Vec::new()))
}

/// Detect the compiler family from its name, falling back to `--version` output.
pub fn detect_compiler_family(cc: &Path, runner: &dyn ProbeRunner) -> ToolchainPlatform {
    let name = cc
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.contains("hipcc") {
        return ToolchainPlatform::Hipcc;
    } else if name.contains("nvcc") {
        return ToolchainPlatform::Nvcc;
    } else if name.contains("gcc") || name.contains("g++") {
        return ToolchainPlatform::Gcc;
    }

    let output = runner.run(&CommandSpec::new(cc).arg("--version"), VERSION_TIMEOUT);
    let stdout = output.stdout.to_lowercase();

    if stdout.contains("clang") {
        if stdout.contains("apple") {
            ToolchainPlatform::AppleClang
        } else {
            ToolchainPlatform::Clang
        }
    } else {
        ToolchainPlatform::Gcc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRunner;

    #[test]
    fn test_family_from_name() {
        let runner = MockRunner::new();
        assert_eq!(
            detect_compiler_family(Path::new("/usr/bin/x86_64-linux-gnu-gcc"), &runner),
            ToolchainPlatform::Gcc
        );
        assert_eq!(
            detect_compiler_family(Path::new("/opt/rocm/bin/hipcc"), &runner),
            ToolchainPlatform::Hipcc
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_family_from_version_output() {
        let runner = MockRunner::new().expect_contains(
            "cc --version",
            "Apple clang version 15.0.0 (clang-1500.3.9.4)",
        );
        assert_eq!(
            detect_compiler_family(Path::new("/usr/bin/cc"), &runner),
            ToolchainPlatform::AppleClang
        );
    }

    #[test]
    fn test_env_compiler_with_flags() {
        let env = Environment::empty().with_var("CC", "gcc -m64");
        let runner = MockRunner::new();
        let toolchains = detect_toolchains(&CompilerConfig::default(), &env, &runner).unwrap();
        assert_eq!(toolchains.host().compiler_path(), Path::new("gcc"));
        assert!(toolchains.for_language(Language::Hip).is_none());
    }

    #[test]
    fn test_config_wins_over_env() {
        let env = Environment::empty()
            .with_var("CC", "gcc")
            .with_tool("hipcc", "/opt/rocm/bin/hipcc");
        let config = CompilerConfig {
            cc: Some(PathBuf::from("/usr/bin/clang")),
            ..Default::default()
        };
        let runner = MockRunner::new();
        let toolchains = detect_toolchains(&config, &env, &runner).unwrap();
        assert_eq!(toolchains.host().compiler_path(), Path::new("/usr/bin/clang"));
        assert_eq!(
            toolchains.for_language(Language::Hip).unwrap().compiler_path(),
            Path::new("/opt/rocm/bin/hipcc")
        );
    }

    #[test]
    fn test_no_compiler_is_an_error() {
        let runner = MockRunner::new();
        let err = detect_toolchains(&CompilerConfig::default(), &Environment::empty(), &runner)
            .unwrap_err();
        assert!(err.to_string().contains("no C compiler found"));
    }
}
