//! Dependency configuration resolution.
//!
//! One resolution walks the candidate directories of a single package and
//! settles on the first one whose version, headers and libraries check out.
//! All findings go into a private [`ConfigurationState`]; the package only
//! becomes visible to others once the state is finalized.
//!
//! The resolver holds no global state. Everything it reads comes in through
//! the [`ResolveContext`], including the already-configured dependencies,
//! which are read-only.

pub mod abi;
pub mod errors;
pub mod link;
pub mod macros;
pub mod platform;
pub mod search;
pub mod version;

pub use errors::{ResolveError, ResolveStage};
pub use link::ProbeResult;
pub use search::{SearchDir, SearchDirectories};

use std::path::PathBuf;
use std::time::Duration;

use crate::builder::probe::ProbeFlags;
use crate::builder::toolchain::{Toolchain, Toolchains};
use crate::core::descriptor::{LibraryName, PackageDescriptor};
use crate::core::surface::{ConfigurationState, ConfiguredPackage, FlagTable, LinkItem};
use crate::core::version::Version;
use crate::recipes::Recipe;
use crate::util::config::{Config, PackageOverrides, ProjectConfig};
use crate::util::env::Environment;
use crate::util::process::ProbeRunner;

use self::link::{HeaderCheck, LibraryLinker};
use self::version::VersionResolver;

/// Everything a resolution may read.
pub struct ResolveContext<'a> {
    pub toolchains: &'a Toolchains,
    pub runner: &'a dyn ProbeRunner,
    pub env: &'a Environment,
    pub config: &'a Config,
    /// Packages configured so far
    pub deps: &'a FlagTable,
}

impl ResolveContext<'_> {
    /// User overrides for `package`.
    pub fn overrides(&self, package: &str) -> PackageOverrides {
        self.config.overrides(package)
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.config.project
    }

    /// Timeout for vendor tools.
    pub fn tool_timeout(&self) -> Duration {
        self.config.probe.tool_timeout()
    }

    /// Timeout for compile and link probes.
    pub fn compile_timeout(&self) -> Duration {
        self.config.probe.compile_timeout()
    }
}

/// What a successful directory search settled on.
#[derive(Debug, Clone)]
pub struct Found {
    pub dir: SearchDir,
    pub version: Option<Version>,
    /// The descriptor after specialization for `dir`
    pub descriptor: PackageDescriptor,
    pub include_dirs: Vec<PathBuf>,
    /// Index of the library set that linked, if the package has libraries
    pub set_index: Option<usize>,
    pub libraries: Vec<LibraryName>,
    pub link_items: Vec<LinkItem>,
}

enum DirOutcome {
    Usable(Box<Found>),
    Rejected(String),
}

/// Resolves packages against one context.
pub struct Resolver<'a> {
    ctx: &'a ResolveContext<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(ctx: &'a ResolveContext<'a>) -> Self {
        Resolver { ctx }
    }

    /// Configure the package described by `recipe`.
    pub fn resolve(&self, recipe: &dyn Recipe) -> Result<ConfiguredPackage, ResolveError> {
        let base = recipe.descriptor();
        let name = base.name.as_str();
        let overrides = self.ctx.overrides(name);

        let dep_flags = self.dependency_flags(base)?;
        let compiler = self
            .ctx
            .toolchains
            .for_language(base.link_language)
            .ok_or_else(|| ResolveError::Toolchain {
                package: name.to_string(),
                language: base.link_language,
            })?;

        let mut state = ConfigurationState::new(name, base.display_name.as_str());
        state.begin_search();

        if let Some(ref dir) = overrides.dir {
            if !dir.is_dir() {
                state.mark_failed();
                return Err(ResolveError::UserDirectoryUnusable {
                    package: name.to_string(),
                    dir: dir.clone(),
                    reason: "directory does not exist".to_string(),
                });
            }
        }

        let dirs =
            SearchDirectories::new(overrides.dir.clone(), recipe.derived_directories(self.ctx));
        let mut tried = Vec::new();
        let mut found = None;

        for dir in dirs {
            tracing::debug!("{}: checking {}", name, dir);
            tried.push(dir.path.clone());

            let outcome = match self.try_directory(recipe, base, &dir, &dep_flags, compiler) {
                Ok(outcome) => outcome,
                Err(e) => {
                    state.mark_failed();
                    return Err(e);
                }
            };

            match outcome {
                DirOutcome::Usable(f) => {
                    found = Some(*f);
                    break;
                }
                DirOutcome::Rejected(reason) if dir.is_user() => {
                    state.mark_failed();
                    return Err(ResolveError::UserDirectoryUnusable {
                        package: name.to_string(),
                        dir: dir.path,
                        reason,
                    });
                }
                DirOutcome::Rejected(reason) => {
                    tracing::debug!("{}: rejected {}: {}", name, dir, reason);
                }
            }
        }

        let Some(found) = found else {
            state.mark_failed();
            return Err(ResolveError::NotFound {
                package: name.to_string(),
                tried,
            });
        };

        self.emit(&found, &mut state);
        if let Err(e) = recipe.configure(self.ctx, &found, &mut state) {
            state.mark_failed();
            return Err(e);
        }

        let configured = state.finalize();
        tracing::info!(
            "configured {}{}",
            configured.display_name,
            configured
                .version
                .as_ref()
                .map(|v| format!(" {}", v))
                .unwrap_or_default()
        );
        Ok(configured)
    }

    fn try_directory(
        &self,
        recipe: &dyn Recipe,
        base: &PackageDescriptor,
        dir: &SearchDir,
        dep_flags: &ProbeFlags,
        compiler: &dyn Toolchain,
    ) -> Result<DirOutcome, ResolveError> {
        if let Err(reason) = recipe.validate_directory(self.ctx, dir) {
            return Ok(DirOutcome::Rejected(reason));
        }

        let versions = VersionResolver::new(
            self.ctx.runner,
            compiler,
            self.ctx.env,
            self.ctx.tool_timeout(),
            self.ctx.compile_timeout(),
        );
        let version = versions.resolve(dir, base, dep_flags);

        if let (Some(found), Some(required)) = (&version, &base.min_version) {
            if !found.at_least(required) {
                return Err(ResolveError::VersionTooOld {
                    package: base.name.clone(),
                    found: found.clone(),
                    required: required.clone(),
                    dir: Some(dir.path.clone()).filter(|p| !p.as_os_str().is_empty()),
                });
            }
        }

        let mut desc = base.clone();
        recipe.specialize(self.ctx, dir, version.as_ref(), &mut desc)?;

        let linker = LibraryLinker::new(self.ctx.runner, compiler, self.ctx.compile_timeout());
        let include_dirs = match linker.check_headers(dir, &desc, dep_flags) {
            HeaderCheck::Found { include_dirs } => include_dirs,
            HeaderCheck::Missing { reason } => return Ok(DirOutcome::Rejected(reason)),
        };

        let (set_index, libraries, link_items) = if desc.is_header_only() {
            (None, Vec::new(), Vec::new())
        } else {
            match linker.link(dir, &desc, dep_flags) {
                ProbeResult::Linked {
                    set_index,
                    libraries,
                    items,
                } => (Some(set_index), libraries, items),
                ProbeResult::Failed { diagnostics } => {
                    let reason = if diagnostics.is_empty() {
                        "no library set links".to_string()
                    } else {
                        format!("no library set links: {}", diagnostics.join("; "))
                    };
                    return Ok(DirOutcome::Rejected(reason));
                }
            }
        };

        if version.is_none() && desc.version_source.is_some() {
            if desc.requires_version {
                return Err(ResolveError::VersionUnavailable {
                    package: desc.name.clone(),
                    dir: Some(dir.path.clone()).filter(|p| !p.as_os_str().is_empty()),
                });
            }
            tracing::warn!("{}: unable to determine the version in {}", desc.name, dir);
        }

        Ok(DirOutcome::Usable(Box::new(Found {
            dir: dir.clone(),
            version,
            descriptor: desc,
            include_dirs,
            set_index,
            libraries,
            link_items,
        })))
    }

    /// Include directories and link items of the configured dependencies.
    fn dependency_flags(&self, desc: &PackageDescriptor) -> Result<ProbeFlags, ResolveError> {
        let mut flags = ProbeFlags::default();

        for dep in &desc.required_deps {
            if !self.ctx.deps.is_configured(dep) {
                return Err(ResolveError::MissingDependency {
                    package: desc.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        for dep in desc.all_deps() {
            let Some(configured) = self.ctx.deps.get(dep) else {
                continue;
            };
            for inc in &configured.include_dirs {
                flags = flags.with_include_dir(inc);
            }
            flags = flags.with_link_items(configured.link_items.iter().cloned());
        }

        Ok(flags)
    }

    /// Record what every successful resolution emits.
    fn emit(&self, found: &Found, state: &mut ConfigurationState) {
        if !found.dir.is_default() {
            state.record_directory(&found.dir.path);
        }
        if let Some(ref version) = found.version {
            state.record_version(version.clone());
        }
        for inc in &found.include_dirs {
            state.add_include_dir(inc);
        }
        state.add_link_items(found.link_items.iter().cloned());

        for lib in &found.libraries {
            state.add_library_define(lib.have_define(), "1");
        }
        state.add_define(found.descriptor.have_define(), "1");
    }
}
