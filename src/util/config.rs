//! Configuration file support for berth.
//!
//! berth supports two configuration file locations:
//! - Global: `~/.berth/config.toml` - User-wide defaults
//! - Project: `.berth/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and `--with key=value`
//! flags on the command line take precedence over both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Default timeout for vendor introspection tools (rocminfo, hipconfig).
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

/// Default timeout for compile and link probes.
pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 120;

/// berth configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Probe settings
    pub probe: ProbeConfig,

    /// Project-wide facts the resolver checks dependencies against
    pub project: ProjectConfig,

    /// Compiler overrides
    pub compilers: CompilerConfig,

    /// Per-package user overrides, keyed by package name
    pub packages: BTreeMap<String, PackageOverrides>,
}

/// Probe execution settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Timeout for vendor tools, in seconds
    pub tool_timeout_secs: Option<u64>,

    /// Timeout for compile/link probes, in seconds
    pub compile_timeout_secs: Option<u64>,
}

impl ProbeConfig {
    /// Timeout applied to vendor introspection tools.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS))
    }

    /// Timeout applied to each compile or link probe.
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(
            self.compile_timeout_secs
                .unwrap_or(DEFAULT_COMPILE_TIMEOUT_SECS),
        )
    }
}

/// Floating point precision the project is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Half,
    Single,
    #[default]
    Double,
    Quad,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Half => "half",
            Precision::Single => "single",
            Precision::Double => "double",
            Precision::Quad => "quad",
        }
    }
}

impl std::str::FromStr for Precision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "half" | "__fp16" => Ok(Precision::Half),
            "single" => Ok(Precision::Single),
            "double" => Ok(Precision::Double),
            "quad" | "__float128" => Ok(Precision::Quad),
            other => bail!(
                "invalid precision '{}', valid values: half, single, double, quad",
                other
            ),
        }
    }
}

/// Project-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Prefix applied to package-scoped defines (e.g. "PETSC_")
    pub define_prefix: Option<String>,

    /// Floating point precision
    pub precision: Option<Precision>,

    /// Index integer width in bits (32 or 64)
    pub index_bits: Option<u32>,
}

impl ProjectConfig {
    pub fn define_prefix(&self) -> &str {
        self.define_prefix.as_deref().unwrap_or("")
    }

    pub fn precision(&self) -> Precision {
        self.precision.unwrap_or_default()
    }

    pub fn index_bits(&self) -> u32 {
        self.index_bits.unwrap_or(32)
    }
}

/// Compiler path overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Host C compiler
    pub cc: Option<PathBuf>,

    /// Host C++ compiler
    pub cxx: Option<PathBuf>,

    /// HIP compiler (hipcc)
    pub hip: Option<PathBuf>,

    /// CUDA compiler (nvcc)
    pub cuda: Option<PathBuf>,
}

/// User overrides for a single package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageOverrides {
    /// Explicit installation root
    pub dir: Option<PathBuf>,

    /// Explicit device architecture (e.g. gfx942_apu)
    pub arch: Option<String>,

    /// Explicit platform name (e.g. amd, nvidia)
    pub platform: Option<String>,

    /// Whether device double alignment is known to match the host
    pub known_align_double: Option<bool>,

    /// Force the package on (true) or off (false)
    pub enabled: Option<bool>,
}

impl PackageOverrides {
    /// Merge another set of overrides into this one (other takes precedence).
    pub fn merge(&mut self, other: PackageOverrides) {
        if other.dir.is_some() {
            self.dir = other.dir;
        }
        if other.arch.is_some() {
            self.arch = other.arch;
        }
        if other.platform.is_some() {
            self.platform = other.platform;
        }
        if other.known_align_double.is_some() {
            self.known_align_double = other.known_align_double;
        }
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
    }

    /// The user asserted this package must be configured.
    ///
    /// An explicit directory counts as a request for the package.
    pub fn is_forced(&self) -> bool {
        self.enabled == Some(true) || (self.enabled.is_none() && self.dir.is_some())
    }

    /// The user turned this package off.
    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.probe.tool_timeout_secs.is_some() {
            self.probe.tool_timeout_secs = other.probe.tool_timeout_secs;
        }
        if other.probe.compile_timeout_secs.is_some() {
            self.probe.compile_timeout_secs = other.probe.compile_timeout_secs;
        }

        if other.project.define_prefix.is_some() {
            self.project.define_prefix = other.project.define_prefix;
        }
        if other.project.precision.is_some() {
            self.project.precision = other.project.precision;
        }
        if other.project.index_bits.is_some() {
            self.project.index_bits = other.project.index_bits;
        }

        if other.compilers.cc.is_some() {
            self.compilers.cc = other.compilers.cc;
        }
        if other.compilers.cxx.is_some() {
            self.compilers.cxx = other.compilers.cxx;
        }
        if other.compilers.hip.is_some() {
            self.compilers.hip = other.compilers.hip;
        }
        if other.compilers.cuda.is_some() {
            self.compilers.cuda = other.compilers.cuda;
        }

        for (name, overrides) in other.packages {
            self.packages.entry(name).or_default().merge(overrides);
        }
    }

    /// Overrides for `package`, or the empty set.
    pub fn overrides(&self, package: &str) -> PackageOverrides {
        self.packages.get(package).cloned().unwrap_or_default()
    }

    /// Apply a command-line override of the form `key=value`.
    ///
    /// Recognized keys:
    /// - `<pkg>-dir`, `<pkg>-arch`, `<pkg>-platform`
    /// - `known-<pkg>-align-double` (0/1)
    /// - `<pkg>` (0/1, force the package off or on)
    /// - `cc`, `cxx`, `hipcc`, `nvcc`, `precision`, `define-prefix`, `index-bits`
    pub fn apply_override(&mut self, assignment: &str) -> Result<()> {
        let Some((key, value)) = assignment.split_once('=') else {
            bail!(
                "invalid override `{}`, expected key=value (e.g. hip-dir=/opt/rocm)",
                assignment
            );
        };
        let key = key.trim().trim_start_matches("with-");
        let value = value.trim();

        match key {
            "cc" => self.compilers.cc = Some(PathBuf::from(value)),
            "cxx" => self.compilers.cxx = Some(PathBuf::from(value)),
            "hipcc" => self.compilers.hip = Some(PathBuf::from(value)),
            "nvcc" => self.compilers.cuda = Some(PathBuf::from(value)),
            "precision" => self.project.precision = Some(value.parse()?),
            "define-prefix" => self.project.define_prefix = Some(value.to_string()),
            "index-bits" => {
                let bits: u32 = value
                    .parse()
                    .with_context(|| format!("invalid index-bits `{}`", value))?;
                if bits != 32 && bits != 64 {
                    bail!("index-bits must be 32 or 64, got {}", bits);
                }
                self.project.index_bits = Some(bits);
            }
            _ => {
                if let Some(pkg) = key
                    .strip_prefix("known-")
                    .and_then(|k| k.strip_suffix("-align-double"))
                {
                    self.package_mut(pkg).known_align_double = Some(parse_bool(key, value)?);
                } else if let Some(pkg) = key.strip_suffix("-dir") {
                    self.package_mut(pkg).dir = Some(PathBuf::from(value));
                } else if let Some(pkg) = key.strip_suffix("-arch") {
                    self.package_mut(pkg).arch = Some(value.to_string());
                } else if let Some(pkg) = key.strip_suffix("-platform") {
                    self.package_mut(pkg).platform = Some(value.to_string());
                } else {
                    self.package_mut(key).enabled = Some(parse_bool(key, value)?);
                }
            }
        }

        Ok(())
    }

    fn package_mut(&mut self, package: &str) -> &mut PackageOverrides {
        self.packages.entry(package.to_string()).or_default()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => bail!("`{}` expects a boolean (0/1), got `{}`", key, value),
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.berth/config.toml)
/// 2. Global config (~/.berth/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}

/// Get the global berth config directory (~/.berth).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".berth"))
}

/// Get the global config path (~/.berth/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.berth/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".berth").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.probe.tool_timeout(), Duration::from_secs(60));
        assert_eq!(config.project.precision(), Precision::Double);
        assert_eq!(config.project.define_prefix(), "");
        assert!(config.packages.is_empty());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[probe]
tool_timeout_secs = 5

[project]
define_prefix = "PETSC_"
precision = "single"

[compilers]
hip = "/opt/rocm/bin/hipcc"

[packages.hip]
arch = "gfx942_apu"
known_align_double = true
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.probe.tool_timeout(), Duration::from_secs(5));
        assert_eq!(config.project.define_prefix(), "PETSC_");
        assert_eq!(config.project.precision(), Precision::Single);
        assert_eq!(config.compilers.hip, Some(PathBuf::from("/opt/rocm/bin/hipcc")));

        let hip = config.overrides("hip");
        assert_eq!(hip.arch.as_deref(), Some("gfx942_apu"));
        assert_eq!(hip.known_align_double, Some(true));
    }

    #[test]
    fn test_config_merge_packages() {
        let mut base = Config::default();
        base.packages.insert(
            "hip".to_string(),
            PackageOverrides {
                dir: Some(PathBuf::from("/opt/rocm-5.7")),
                arch: Some("gfx90a".to_string()),
                ..Default::default()
            },
        );

        let mut project = Config::default();
        project.packages.insert(
            "hip".to_string(),
            PackageOverrides {
                dir: Some(PathBuf::from("/opt/rocm-6.2")),
                ..Default::default()
            },
        );

        base.merge(project);

        let hip = base.overrides("hip");
        assert_eq!(hip.dir, Some(PathBuf::from("/opt/rocm-6.2")));
        assert_eq!(hip.arch.as_deref(), Some("gfx90a"));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        config.apply_override("hip-dir=/opt/rocm").unwrap();
        config.apply_override("hip-arch=gfx90a").unwrap();
        config.apply_override("known-hip-align-double=0").unwrap();
        config.apply_override("p4est=1").unwrap();
        config.apply_override("precision=single").unwrap();

        let hip = config.overrides("hip");
        assert_eq!(hip.dir, Some(PathBuf::from("/opt/rocm")));
        assert_eq!(hip.arch.as_deref(), Some("gfx90a"));
        assert_eq!(hip.known_align_double, Some(false));
        assert!(hip.is_forced());
        assert!(config.overrides("p4est").is_forced());
        assert_eq!(config.project.precision(), Precision::Single);
    }

    #[test]
    fn test_apply_override_rejects_garbage() {
        let mut config = Config::default();
        assert!(config.apply_override("hip-dir").is_err());
        assert!(config.apply_override("hip=maybe").is_err());
        assert!(config.apply_override("index-bits=48").is_err());
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join("project.toml");

        std::fs::write(
            &global_path,
            r#"
[probe]
tool_timeout_secs = 30

[packages.hip]
platform = "amd"
"#,
        )
        .unwrap();

        std::fs::write(
            &project_path,
            r#"
[packages.hip]
platform = "nvidia"
"#,
        )
        .unwrap();

        let config = load_config(&global_path, &project_path);

        assert_eq!(config.overrides("hip").platform.as_deref(), Some("nvidia"));
        assert_eq!(config.probe.tool_timeout(), Duration::from_secs(30));
    }
}
