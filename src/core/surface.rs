//! Configuration surface - what a resolved dependency exports.
//!
//! A resolution accumulates its defines, include directories and link items
//! in a private [`ConfigurationState`]. Nothing becomes visible to other
//! packages until the state is finalized into a [`ConfiguredPackage`] and
//! merged into the orchestrator-owned [`FlagTable`]. A failed resolution
//! simply drops its state.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::version::Version;

/// Where a define came from and whether it is namespaced by the project prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefineScope {
    /// Rendered as `<prefix><NAME>` (e.g. `PETSC_HAVE_HIP`)
    Package,
    /// Per-library `HAVE_LIB<STEM>`, rendered with the prefix
    Library,
    /// Rendered verbatim (e.g. `__HIP_PLATFORM_AMD__`)
    Global,
}

/// A preprocessor define emitted by a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Define {
    pub name: String,
    pub value: String,
    pub scope: DefineScope,
}

impl Define {
    /// The define name as the compiler sees it.
    pub fn rendered_name(&self, prefix: &str) -> String {
        match self.scope {
            DefineScope::Package | DefineScope::Library => format!("{}{}", prefix, self.name),
            DefineScope::Global => self.name.clone(),
        }
    }

    /// Convert to compiler flag format.
    pub fn to_flag(&self, prefix: &str) -> String {
        format!("-D{}={}", self.rendered_name(prefix), self.value)
    }
}

/// One entry on a link line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum LinkItem {
    /// A library file linked by absolute path
    Path(PathBuf),
    /// A library found on the compiler's default search path (-l<name>)
    Name(String),
    /// A raw linker flag
    Flag(String),
}

impl LinkItem {
    /// Convert to linker flag format.
    pub fn to_flag(&self) -> String {
        match self {
            LinkItem::Path(path) => path.display().to_string(),
            LinkItem::Name(name) => format!("-l{}", name),
            LinkItem::Flag(flag) => flag.clone(),
        }
    }
}

/// Lifecycle of a single resolution. `Configured` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPhase {
    Unresolved,
    Searching,
    Configured,
    Failed,
}

/// Per-resolution accumulator.
///
/// Facts that are discovered once per resolution (version, directory,
/// platform) are stored in `OnceCell`s: the first recorded value sticks.
#[derive(Debug)]
pub struct ConfigurationState {
    package: String,
    display_name: String,
    phase: ResolutionPhase,
    defines: BTreeMap<(DefineScope, String), Define>,
    suppressed: BTreeSet<String>,
    suppressed_libraries: BTreeSet<String>,
    include_dirs: Vec<PathBuf>,
    link_items: Vec<LinkItem>,
    device_flags: Vec<String>,
    exports: BTreeMap<String, PathBuf>,
    status_lines: Vec<String>,
    version: OnceCell<Version>,
    directory: OnceCell<PathBuf>,
    platform: OnceCell<String>,
}

impl ConfigurationState {
    /// Create a fresh, unresolved state.
    pub fn new(package: impl Into<String>, display_name: impl Into<String>) -> Self {
        ConfigurationState {
            package: package.into(),
            display_name: display_name.into(),
            phase: ResolutionPhase::Unresolved,
            defines: BTreeMap::new(),
            suppressed: BTreeSet::new(),
            suppressed_libraries: BTreeSet::new(),
            include_dirs: Vec::new(),
            link_items: Vec::new(),
            device_flags: Vec::new(),
            exports: BTreeMap::new(),
            status_lines: Vec::new(),
            version: OnceCell::new(),
            directory: OnceCell::new(),
            platform: OnceCell::new(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn phase(&self) -> ResolutionPhase {
        self.phase
    }

    /// Move from `Unresolved` to `Searching`.
    pub fn begin_search(&mut self) {
        debug_assert_eq!(self.phase, ResolutionPhase::Unresolved);
        self.phase = ResolutionPhase::Searching;
    }

    /// Mark the resolution as failed. The state must not be finalized afterwards.
    pub fn mark_failed(&mut self) {
        self.phase = ResolutionPhase::Failed;
    }

    /// Add a package-scoped define (rendered with the project prefix).
    pub fn add_define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert_define(name.into(), value.into(), DefineScope::Package);
    }

    /// Add a per-library `HAVE_LIB<STEM>` define.
    pub fn add_library_define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert_define(name.into(), value.into(), DefineScope::Library);
    }

    /// Add a define rendered verbatim.
    pub fn add_global_define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert_define(name.into(), value.into(), DefineScope::Global);
    }

    fn insert_define(&mut self, name: String, value: String, scope: DefineScope) {
        self.defines
            .insert((scope, name.clone()), Define { name, value, scope });
    }

    /// Remove a define, in every scope, from the final output of this
    /// package and of every package merged into the same [`FlagTable`].
    ///
    /// Suppression wins regardless of whether the define is added before or
    /// after this call, or whether the other package is merged first.
    pub fn suppress_define(&mut self, name: impl Into<String>) {
        self.suppressed.insert(name.into());
    }

    /// Drop only the per-library define `name` from this package's output.
    ///
    /// A package define of the same name is kept.
    pub fn suppress_library_define(&mut self, name: impl Into<String>) {
        self.suppressed_libraries.insert(name.into());
    }

    /// Add an include directory, ignoring duplicates.
    pub fn add_include_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !dir.as_os_str().is_empty() && !self.include_dirs.contains(&dir) {
            self.include_dirs.push(dir);
        }
    }

    /// Append link items in order.
    pub fn add_link_items(&mut self, items: impl IntoIterator<Item = LinkItem>) {
        self.link_items.extend(items);
    }

    /// Add a flag for the device compiler (e.g. `--offload-arch=gfx90a`).
    pub fn add_device_flag(&mut self, flag: impl Into<String>) {
        let flag = flag.into();
        if !self.device_flags.contains(&flag) {
            self.device_flags.push(flag);
        }
    }

    /// Publish a path other packages may read (e.g. `rocblas-dir`).
    pub fn export(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) {
        self.exports.insert(key.into(), path.into());
    }

    /// Add a line to the human-readable status block.
    pub fn add_status_line(&mut self, line: impl Into<String>) {
        self.status_lines.push(line.into());
    }

    /// Record the resolved version. Returns `false` if one was already recorded.
    pub fn record_version(&mut self, version: Version) -> bool {
        self.version.set(version).is_ok()
    }

    /// Record the validated installation directory. Returns `false` if already set.
    pub fn record_directory(&mut self, dir: impl Into<PathBuf>) -> bool {
        self.directory.set(dir.into()).is_ok()
    }

    /// Record the detected platform. Returns `false` if already set.
    pub fn record_platform(&mut self, platform: impl Into<String>) -> bool {
        self.platform.set(platform.into()).is_ok()
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.get()
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.get().map(PathBuf::as_path)
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.get().map(String::as_str)
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn link_items(&self) -> &[LinkItem] {
        &self.link_items
    }

    pub fn device_flags(&self) -> &[String] {
        &self.device_flags
    }

    /// Consume the state and produce the package's final output.
    pub fn finalize(mut self) -> ConfiguredPackage {
        debug_assert_ne!(self.phase, ResolutionPhase::Failed);
        self.phase = ResolutionPhase::Configured;

        let suppressed = std::mem::take(&mut self.suppressed);
        let suppressed_libraries = std::mem::take(&mut self.suppressed_libraries);
        let mut defines = Vec::new();
        for define in self.defines.into_values() {
            let dropped = suppressed.contains(&define.name)
                || (define.scope == DefineScope::Library
                    && suppressed_libraries.contains(&define.name));
            if !dropped {
                defines.push(define);
            }
        }

        ConfiguredPackage {
            name: self.package,
            display_name: self.display_name,
            version: self.version.into_inner(),
            directory: self.directory.into_inner(),
            platform: self.platform.into_inner(),
            defines,
            include_dirs: self.include_dirs,
            link_items: self.link_items,
            device_flags: self.device_flags,
            exports: self.exports,
            status_lines: self.status_lines,
            suppressed: suppressed.into_iter().collect(),
        }
    }
}

/// The final, immutable output of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredPackage {
    pub name: String,
    pub display_name: String,
    pub version: Option<Version>,
    pub directory: Option<PathBuf>,
    pub platform: Option<String>,
    pub defines: Vec<Define>,
    pub include_dirs: Vec<PathBuf>,
    pub link_items: Vec<LinkItem>,
    pub device_flags: Vec<String>,
    pub exports: BTreeMap<String, PathBuf>,
    pub status_lines: Vec<String>,
    /// Define names this package removes from every merged package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<String>,
}

impl ConfiguredPackage {
    /// Look up a define by its unprefixed name.
    pub fn define(&self, name: &str) -> Option<&Define> {
        self.defines.iter().find(|d| d.name == name)
    }

    /// Look up an exported path.
    pub fn exported(&self, key: &str) -> Option<&Path> {
        self.exports.get(key).map(PathBuf::as_path)
    }
}

impl fmt::Display for ConfiguredPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.display_name)?;
        if let Some(ref version) = self.version {
            writeln!(f, "  Version:    {}", version)?;
        }
        if !self.include_dirs.is_empty() {
            let includes: Vec<String> = self
                .include_dirs
                .iter()
                .map(|d| format!("-I{}", d.display()))
                .collect();
            writeln!(f, "  Includes:   {}", includes.join(" "))?;
        }
        if !self.link_items.is_empty() {
            let libs: Vec<String> = self.link_items.iter().map(LinkItem::to_flag).collect();
            writeln!(f, "  Libraries:  {}", libs.join(" "))?;
        }
        for line in &self.status_lines {
            writeln!(f, "  {}", line)?;
        }
        Ok(())
    }
}

/// Orchestrator-owned table of all configured packages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagTable {
    define_prefix: String,
    packages: Vec<ConfiguredPackage>,
}

impl FlagTable {
    pub fn new(define_prefix: impl Into<String>) -> Self {
        FlagTable {
            define_prefix: define_prefix.into(),
            packages: Vec::new(),
        }
    }

    /// Merge a finalized package. A package merged twice keeps its latest output.
    pub fn merge(&mut self, package: ConfiguredPackage) {
        self.packages.retain(|p| p.name != package.name);
        self.packages.push(package);
    }

    pub fn get(&self, name: &str) -> Option<&ConfiguredPackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Packages in the order they were configured.
    pub fn packages(&self) -> &[ConfiguredPackage] {
        &self.packages
    }

    pub fn define_prefix(&self) -> &str {
        &self.define_prefix
    }

    /// All defines as `(rendered name, value)`, later packages winning on collision.
    ///
    /// A name suppressed by any merged package is left out, whichever
    /// package defined it and in whatever order they were merged.
    pub fn defines(&self) -> BTreeMap<String, String> {
        let suppressed: BTreeSet<&str> = self
            .packages
            .iter()
            .flat_map(|p| p.suppressed.iter().map(String::as_str))
            .collect();
        let mut out = BTreeMap::new();
        for package in &self.packages {
            for define in &package.defines {
                if suppressed.contains(define.name.as_str()) {
                    continue;
                }
                out.insert(define.rendered_name(&self.define_prefix), define.value.clone());
            }
        }
        out
    }

    /// All include directories, deduplicated in configuration order.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::new();
        for dir in self.packages.iter().flat_map(|p| &p.include_dirs) {
            if !out.contains(dir) {
                out.push(dir.clone());
            }
        }
        out
    }

    /// All link items in configuration order.
    ///
    /// Later packages are placed first so dependents precede their
    /// dependencies on the link line.
    pub fn link_items(&self) -> Vec<LinkItem> {
        let mut out: Vec<LinkItem> = Vec::new();
        for item in self.packages.iter().rev().flat_map(|p| &p.link_items) {
            if !out.contains(item) {
                out.push(item.clone());
            }
        }
        out
    }

    /// All device compiler flags in configuration order.
    pub fn device_flags(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for flag in self.packages.iter().flat_map(|p| &p.device_flags) {
            if !out.contains(flag) {
                out.push(flag.clone());
            }
        }
        out
    }
}
