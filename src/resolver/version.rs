//! Version extraction.
//!
//! Every failure here is soft: the resolver gets `None` and applies the
//! package's version policy itself.

use std::path::Path;
use std::time::Duration;

use regex::Regex;

use crate::builder::probe::{self, Probe, ProbeFlags};
use crate::builder::toolchain::{CommandSpec, Toolchain};
use crate::core::descriptor::{PackageDescriptor, VersionSource};
use crate::core::version::Version;
use crate::resolver::macros::{MacroTable, MacroValue};
use crate::resolver::search::SearchDir;
use crate::util::env::Environment;
use crate::util::process::ProbeRunner;

/// Reads a package's version from headers or tools.
pub struct VersionResolver<'a> {
    runner: &'a dyn ProbeRunner,
    compiler: &'a dyn Toolchain,
    env: &'a Environment,
    tool_timeout: Duration,
    compile_timeout: Duration,
}

impl<'a> VersionResolver<'a> {
    pub fn new(
        runner: &'a dyn ProbeRunner,
        compiler: &'a dyn Toolchain,
        env: &'a Environment,
        tool_timeout: Duration,
        compile_timeout: Duration,
    ) -> Self {
        VersionResolver {
            runner,
            compiler,
            env,
            tool_timeout,
            compile_timeout,
        }
    }

    /// Determine the version of `desc` installed at `dir`.
    pub fn resolve(
        &self,
        dir: &SearchDir,
        desc: &PackageDescriptor,
        flags: &ProbeFlags,
    ) -> Option<Version> {
        let source = desc.version_source.as_ref()?;
        let version = match source {
            VersionSource::Header { includes, macros } if dir.is_default() => {
                self.from_preprocessor(desc, includes, macros, flags)
            }
            VersionSource::Header { includes, macros } => {
                from_installed_header(&dir.path, &desc.include_subdirs, includes, macros)
            }
            VersionSource::Tool {
                program,
                args,
                pattern,
            } => self.from_tool(dir, program, args, pattern),
        };

        match version {
            Some(ref v) => tracing::debug!("{}: found version {} in {}", desc.name, v, dir),
            None => tracing::debug!("{}: no version found in {}", desc.name, dir),
        }
        version
    }

    fn from_preprocessor(
        &self,
        desc: &PackageDescriptor,
        includes: &[String],
        macros: &[String],
        flags: &ProbeFlags,
    ) -> Option<Version> {
        let mut probe = Probe::new(self.runner, self.compiler, self.compile_timeout);
        for header in includes {
            let source = probe::macro_echo_source(header, macros);
            let output = probe.preprocess("version", &source, flags);
            if !output.succeeded() {
                tracing::debug!(
                    "{}: preprocessing <{}> failed: {}",
                    desc.name,
                    header,
                    output.diagnostic()
                );
                continue;
            }
            let values = parse_macro_echo(&output.stdout, macros.len())?;
            return version_from_values(values);
        }
        None
    }

    fn from_tool(
        &self,
        dir: &SearchDir,
        program: &Path,
        args: &[String],
        pattern: &str,
    ) -> Option<Version> {
        let exe = if dir.is_default() {
            let name = program.file_name()?.to_str()?;
            self.env.find_tool(name)?
        } else {
            dir.path.join(program)
        };

        let output = self
            .runner
            .run(&CommandSpec::new(&exe).args(args.iter().cloned()), self.tool_timeout);
        if !output.succeeded() {
            tracing::warn!("{} failed: {}", exe.display(), output.diagnostic());
            return None;
        }

        let re = Regex::new(pattern).ok()?;
        let text = format!("{}\n{}", output.stdout, output.stderr);
        let Some(caps) = re.captures(&text) else {
            tracing::warn!("unable to find a version in the output of {}", exe.display());
            return None;
        };
        Version::parse(caps.name("version")?.as_str()).ok()
    }
}

/// Read and evaluate version macros from the first existing header below `root`.
pub fn from_installed_header(
    root: &Path,
    include_subdirs: &[String],
    includes: &[String],
    macros: &[String],
) -> Option<Version> {
    for subdir in include_subdirs {
        for header in includes {
            let path = root.join(subdir).join(header);
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            tracing::debug!("reading version macros from {}", path.display());
            let table = MacroTable::parse(&text);
            let values = macros
                .iter()
                .map(|m| table.evaluate(m))
                .collect::<Option<Vec<_>>>();
            return values.and_then(version_from_values);
        }
    }
    None
}

/// Extract the marker lines printed by the macro-echo probe.
pub fn parse_macro_echo(stdout: &str, count: usize) -> Option<Vec<MacroValue>> {
    let mut values: Vec<Option<MacroValue>> = vec![None; count];
    let table = MacroTable::default();

    for line in stdout.lines() {
        let Some(rest) = line.trim().strip_prefix(probe::MACRO_MARKER) else {
            continue;
        };
        let Some((index, expr)) = rest.split_once('=') else {
            continue;
        };
        let Ok(index) = index.trim().parse::<usize>() else {
            continue;
        };
        if let Some(slot) = values.get_mut(index) {
            *slot = table.evaluate_text(expr.trim().trim_end_matches(';'));
        }
    }

    values.into_iter().collect()
}

/// Join macro values into a version.
///
/// Several integers become the components; a single string literal is
/// parsed as a dotted version, ignoring any suffix (`1.6.47.git`).
pub fn version_from_values(values: Vec<MacroValue>) -> Option<Version> {
    if let [MacroValue::Str(s)] = values.as_slice() {
        let leading = Regex::new(r"^\s*v?(\d+(?:\.\d+)*)").ok()?;
        let caps = leading.captures(s)?;
        return Version::parse(caps.get(1)?.as_str()).ok();
    }

    let components = values
        .into_iter()
        .map(|v| match v {
            MacroValue::Int(i) => u64::try_from(i).ok(),
            MacroValue::Str(_) => None,
        })
        .collect::<Option<Vec<u64>>>()?;
    if components.is_empty() {
        return None;
    }
    Some(Version::new(components))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::builder::toolchain::{GccToolchain, ToolchainPlatform};
    use crate::core::language::Language;
    use crate::test_support::{headers, outputs, InstallTree, MockRunner};

    fn hip_descriptor() -> PackageDescriptor {
        PackageDescriptor::builder("hip")
            .version_from_header(
                ["rocm-core/rocm_version.h", "rocm_version.h"],
                ["ROCM_VERSION_MAJOR", "ROCM_VERSION_MINOR", "ROCM_VERSION_PATCH"],
            )
            .build()
            .unwrap()
    }

    fn cc() -> GccToolchain {
        GccToolchain::new(PathBuf::from("cc"), Language::C, ToolchainPlatform::Gcc)
    }

    #[test]
    fn test_header_in_directory() {
        let tree = InstallTree::rocm(5, 0, 0);
        let runner = MockRunner::new();
        let cc = cc();
        let env = Environment::empty();
        let resolver = VersionResolver::new(
            &runner,
            &cc,
            &env,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let version = resolver.resolve(
            &SearchDir::user(tree.root()),
            &hip_descriptor(),
            &ProbeFlags::default(),
        );
        assert_eq!(version, Some(Version::new(vec![5, 0, 0])));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_second_header_candidate() {
        let tree =
            InstallTree::new().header("include/rocm_version.h", &headers::rocm_version(6, 4, 1));
        let version = from_installed_header(
            tree.root(),
            &["include".to_string()],
            &["rocm-core/rocm_version.h".to_string(), "rocm_version.h".to_string()],
            &["ROCM_VERSION_MAJOR".to_string(), "ROCM_VERSION_MINOR".to_string()],
        );
        assert_eq!(version, Some(Version::new(vec![6, 4])));
    }

    #[test]
    fn test_missing_macro_is_soft() {
        let tree =
            InstallTree::new().header("include/rocm_version.h", "#define ROCM_VERSION_MAJOR 6\n");
        let version = from_installed_header(
            tree.root(),
            &["include".to_string()],
            &["rocm_version.h".to_string()],
            &["ROCM_VERSION_MAJOR".to_string(), "ROCM_VERSION_MINOR".to_string()],
        );
        assert_eq!(version, None);
    }

    #[test]
    fn test_default_dir_uses_preprocessor() {
        let runner = MockRunner::new().expect(crate::test_support::CommandExpectation::new(
            crate::test_support::CommandPattern::Contains(" -E ".to_string()),
            outputs::macro_echo(&["6", "(2)", "0"]),
        ));
        let cc = cc();
        let env = Environment::empty();
        let resolver = VersionResolver::new(
            &runner,
            &cc,
            &env,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let version = resolver.resolve(
            &SearchDir::system_default(),
            &hip_descriptor(),
            &ProbeFlags::default(),
        );
        assert_eq!(version, Some(Version::new(vec![6, 2, 0])));
    }

    #[test]
    fn test_unexpanded_macro_in_preprocessor_output() {
        let values =
            parse_macro_echo("berth_macro_0 = 6;\nberth_macro_1 = ROCM_VERSION_MINOR;\n", 2);
        assert_eq!(values, None);
    }

    #[test]
    fn test_string_version() {
        let values = vec![MacroValue::Str("1.6.47.git".to_string())];
        assert_eq!(version_from_values(values), Some(Version::new(vec![1, 6, 47])));
        assert_eq!(version_from_values(vec![MacroValue::Int(-1)]), None);
    }

    #[test]
    fn test_tool_version() {
        let tree = InstallTree::new().executable("bin/matlab", "#!/bin/sh\n");
        let runner = MockRunner::new().expect(crate::test_support::CommandExpectation::new(
            crate::test_support::CommandPattern::Contains("bin/matlab -nojvm".to_string()),
            outputs::matlab_version("24.2.0.2712019"),
        ));
        let desc = PackageDescriptor::builder("matlab")
            .version_from_tool(
                "bin/matlab",
                ["-nojvm", "-nodisplay"],
                r"Version (?P<version>[0-9]+\.[0-9]+)",
            )
            .build()
            .unwrap();
        let cc = cc();
        let env = Environment::empty();
        let resolver = VersionResolver::new(
            &runner,
            &cc,
            &env,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let version =
            resolver.resolve(&SearchDir::user(tree.root()), &desc, &ProbeFlags::default());
        assert_eq!(version, Some(Version::new(vec![24, 2])));
    }
}
