//! Header and library probing.
//!
//! Library sets are alternatives: each is tried on its own, in declaration
//! order, and the first one that links wins. Libraries from different sets
//! are never combined.

use std::path::PathBuf;
use std::time::Duration;

use crate::builder::probe::{self, Probe, ProbeFlags};
use crate::builder::toolchain::Toolchain;
use crate::core::descriptor::{LibraryName, LibrarySet, PackageDescriptor};
use crate::core::surface::LinkItem;
use crate::resolver::search::SearchDir;
use crate::util::process::ProbeRunner;

/// Library subdirectories searched below an installation root.
pub const LIBRARY_SUBDIRS: &[&str] = &["lib", "lib64"];

/// Outcome of probing the library sets of one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Linked {
        set_index: usize,
        libraries: Vec<LibraryName>,
        items: Vec<LinkItem>,
    },
    Failed {
        diagnostics: Vec<String>,
    },
}

/// Outcome of the header check for one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCheck {
    /// Headers usable; these include directories must be added.
    Found { include_dirs: Vec<PathBuf> },
    Missing { reason: String },
}

/// Compiles and links probes for one package.
pub struct LibraryLinker<'a> {
    runner: &'a dyn ProbeRunner,
    compiler: &'a dyn Toolchain,
    timeout: Duration,
}

impl<'a> LibraryLinker<'a> {
    pub fn new(
        runner: &'a dyn ProbeRunner,
        compiler: &'a dyn Toolchain,
        timeout: Duration,
    ) -> Self {
        LibraryLinker {
            runner,
            compiler,
            timeout,
        }
    }

    /// Check that the package's headers are present and compile.
    ///
    /// One of the header candidates must compile on its own, and every
    /// required header must compile together in a single translation unit.
    pub fn check_headers(
        &self,
        dir: &SearchDir,
        desc: &PackageDescriptor,
        flags: &ProbeFlags,
    ) -> HeaderCheck {
        let include_dirs: Vec<PathBuf> = if dir.is_default() {
            Vec::new()
        } else {
            desc.include_subdirs
                .iter()
                .map(|sub| dir.path.join(sub))
                .filter(|p| p.is_dir())
                .collect()
        };

        if desc.header_candidates.is_empty() && desc.required_headers.is_empty() {
            return HeaderCheck::Found { include_dirs };
        }

        let installed = |h: &str| include_dirs.iter().any(|inc| inc.join(h).is_file());
        let mut candidates: Vec<&str> = desc.header_candidates.iter().map(String::as_str).collect();
        if !dir.is_default() {
            if !candidates.is_empty() {
                match candidates.iter().copied().find(|&h| installed(h)) {
                    Some(h) => candidates = vec![h],
                    None => {
                        return HeaderCheck::Missing {
                            reason: format!(
                                "none of {} found below {}",
                                desc.header_candidates.join(", "),
                                dir.path.display()
                            ),
                        }
                    }
                }
            }
            if let Some(h) = desc.required_headers.iter().find(|h| !installed(h.as_str())) {
                return HeaderCheck::Missing {
                    reason: format!("{} not found below {}", h, dir.path.display()),
                };
            }
        }

        let mut probe = Probe::new(self.runner, self.compiler, self.timeout);
        let mut probe_flags = flags.clone();
        for inc in &include_dirs {
            probe_flags = probe_flags.with_include_dir(inc);
        }

        if !candidates.is_empty() {
            let mut failures = Vec::new();
            let compiled = candidates.iter().any(|&h| {
                let output = probe.compile("header", &probe::header_source(&[h]), &probe_flags);
                if !output.succeeded() {
                    failures.push(format!("<{}>: {}", h, output.diagnostic()));
                }
                output.succeeded()
            });
            if !compiled {
                return HeaderCheck::Missing {
                    reason: failures.join("; "),
                };
            }
        }

        if !desc.required_headers.is_empty() {
            let required: Vec<&str> = desc.required_headers.iter().map(String::as_str).collect();
            let output = probe.compile("headers", &probe::header_source(&required), &probe_flags);
            if !output.succeeded() {
                return HeaderCheck::Missing {
                    reason: format!("<{}>: {}", required.join("> <"), output.diagnostic()),
                };
            }
        }

        tracing::debug!("{}: headers compile", desc.name);
        HeaderCheck::Found { include_dirs }
    }

    /// Try each library set in order until one links.
    pub fn link(
        &self,
        dir: &SearchDir,
        desc: &PackageDescriptor,
        flags: &ProbeFlags,
    ) -> ProbeResult {
        let mut diagnostics = Vec::new();
        let mut probe = Probe::new(self.runner, self.compiler, self.timeout);
        let source = probe::link_source(&desc.required_symbols, self.compiler.language());

        for (set_index, set) in desc.library_sets.iter().enumerate() {
            let items = match resolve_set(dir, set) {
                Ok(items) => items,
                Err(missing) => {
                    tracing::debug!("{}: set {} skipped, {}", desc.name, set, missing);
                    diagnostics.push(format!("{}: {}", set, missing));
                    continue;
                }
            };

            let mut probe_flags = flags.clone();
            if !dir.is_default() {
                for sub in &desc.include_subdirs {
                    probe_flags = probe_flags.with_include_dir(dir.path.join(sub));
                }
            }
            let mut link_items = items.clone();
            link_items.extend(flags.link_items.iter().cloned());
            probe_flags.link_items = link_items;

            let output = probe.link("link", &source, &probe_flags);
            if output.succeeded() {
                tracing::debug!("{}: linked with {}", desc.name, set);
                return ProbeResult::Linked {
                    set_index,
                    libraries: set.libraries().to_vec(),
                    items,
                };
            }

            tracing::debug!("{}: {} does not link: {}", desc.name, set, output.diagnostic());
            diagnostics.push(format!("{}: {}", set, output.diagnostic()));
        }

        ProbeResult::Failed { diagnostics }
    }
}

/// Map every library in `set` to a link item for `dir`.
///
/// Fails with a message naming the first library whose file is missing.
fn resolve_set(dir: &SearchDir, set: &LibrarySet) -> Result<Vec<LinkItem>, String> {
    if dir.is_default() {
        return Ok(set.iter().map(LibraryName::default_link_item).collect());
    }

    set.iter()
        .map(|lib| {
            LIBRARY_SUBDIRS
                .iter()
                .map(|sub| dir.path.join(sub).join(lib.file_name()))
                .find(|p| p.is_file())
                .map(LinkItem::Path)
                .ok_or_else(|| {
                    format!(
                        "{} not found in {}/{{{}}}",
                        lib.file_name(),
                        dir.path.display(),
                        LIBRARY_SUBDIRS.join(",")
                    )
                })
        })
        .collect()
}
