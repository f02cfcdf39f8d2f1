//! Resolution error types and diagnostics.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::language::Language;
use crate::core::version::Version;
use crate::util::diagnostic::Diagnostic;

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    Search,
    Version,
    Headers,
    Link,
    Abi,
    Platform,
    Dependencies,
    Toolchain,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolveStage::Search => "search",
            ResolveStage::Version => "version check",
            ResolveStage::Headers => "header check",
            ResolveStage::Link => "link check",
            ResolveStage::Abi => "compiler consistency check",
            ResolveStage::Platform => "platform detection",
            ResolveStage::Dependencies => "dependency check",
            ResolveStage::Toolchain => "toolchain lookup",
        };
        f.write_str(s)
    }
}

/// Which ABI fact disagreed between the host and device compilers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiCheck {
    PointerSize,
    DoubleAlignment,
}

impl fmt::Display for AbiCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiCheck::PointerSize => f.write_str("sizeof(void*)"),
            AbiCheck::DoubleAlignment => f.write_str("double alignment"),
        }
    }
}

/// Error while configuring one dependency.
///
/// Only [`ResolveError::NotFound`] is soft: the driver decides whether an
/// absent package matters. Everything else stops the configure run.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ResolveError {
    #[error("{package}: could not find a usable installation")]
    #[diagnostic(code(berth::resolve::not_found))]
    NotFound {
        package: String,
        tried: Vec<PathBuf>,
    },

    #[error("{package}: unable to use the installation at {}: {reason}", dir.display())]
    #[diagnostic(code(berth::resolve::user_directory))]
    UserDirectoryUnusable {
        package: String,
        dir: PathBuf,
        reason: String,
    },

    #[error("{package}: version {found} is older than the required {required}")]
    #[diagnostic(code(berth::resolve::version_too_old))]
    VersionTooOld {
        package: String,
        found: Version,
        required: Version,
        dir: Option<PathBuf>,
    },

    #[error("{package}: unable to determine the version of the installation")]
    #[diagnostic(code(berth::resolve::version_unavailable))]
    VersionUnavailable {
        package: String,
        dir: Option<PathBuf>,
    },

    #[error("{package}: {check} with the {language} compiler is {device} but {host} with the C compiler")]
    #[diagnostic(code(berth::resolve::abi_mismatch))]
    AbiMismatch {
        package: String,
        check: AbiCheck,
        language: Language,
        host: String,
        device: String,
    },

    #[error("{package}: {precision} precision is not supported, use one of: {}", supported.join(", "))]
    #[diagnostic(code(berth::resolve::precision))]
    UnsupportedPrecision {
        package: String,
        precision: String,
        supported: Vec<String>,
    },

    #[error("{package}: cannot determine {fact}")]
    #[diagnostic(code(berth::resolve::ambiguous))]
    Ambiguous {
        package: String,
        fact: String,
        hint: String,
    },

    #[error("{package}: invalid value `{value}` for {key}: {reason}")]
    #[diagnostic(code(berth::resolve::invalid_override))]
    InvalidOverride {
        package: String,
        key: String,
        value: String,
        reason: String,
        stage: ResolveStage,
    },

    #[error("{package}: required dependency `{dependency}` is not configured")]
    #[diagnostic(code(berth::resolve::missing_dependency))]
    MissingDependency { package: String, dependency: String },

    #[error("{package}: no {language} compiler is available")]
    #[diagnostic(code(berth::resolve::toolchain))]
    Toolchain { package: String, language: Language },
}

impl ResolveError {
    /// The package being configured.
    pub fn package(&self) -> &str {
        match self {
            ResolveError::NotFound { package, .. }
            | ResolveError::UserDirectoryUnusable { package, .. }
            | ResolveError::VersionTooOld { package, .. }
            | ResolveError::VersionUnavailable { package, .. }
            | ResolveError::AbiMismatch { package, .. }
            | ResolveError::UnsupportedPrecision { package, .. }
            | ResolveError::Ambiguous { package, .. }
            | ResolveError::InvalidOverride { package, .. }
            | ResolveError::MissingDependency { package, .. }
            | ResolveError::Toolchain { package, .. } => package,
        }
    }

    /// The stage that failed.
    pub fn stage(&self) -> ResolveStage {
        match self {
            ResolveError::NotFound { .. } | ResolveError::UserDirectoryUnusable { .. } => {
                ResolveStage::Search
            }
            ResolveError::VersionTooOld { .. } | ResolveError::VersionUnavailable { .. } => {
                ResolveStage::Version
            }
            ResolveError::AbiMismatch { .. } | ResolveError::UnsupportedPrecision { .. } => {
                ResolveStage::Abi
            }
            ResolveError::Ambiguous { .. } => ResolveStage::Platform,
            ResolveError::InvalidOverride { stage, .. } => *stage,
            ResolveError::MissingDependency { .. } => ResolveStage::Dependencies,
            ResolveError::Toolchain { .. } => ResolveStage::Toolchain,
        }
    }

    /// Whether the driver may treat this as "package absent".
    pub fn is_soft(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }

    /// The override the user can pass to get past this error.
    pub fn hint(&self) -> String {
        match self {
            ResolveError::NotFound { package, .. } => {
                format!("pass --with {}-dir=<root> to point at the installation", package)
            }
            ResolveError::UserDirectoryUnusable { package, .. } => format!(
                "check the directory, or drop --with {}-dir to search the default locations",
                package
            ),
            ResolveError::VersionTooOld {
                package, required, ..
            } => format!(
                "install {} {} or newer and pass --with {}-dir=<root>",
                package, required, package
            ),
            ResolveError::VersionUnavailable { package, .. } => format!(
                "the installation is incomplete; pass --with {}-dir=<root> to select another",
                package
            ),
            ResolveError::AbiMismatch {
                package,
                check: AbiCheck::DoubleAlignment,
                ..
            } => format!(
                "add -malign-double to the compiler options, or pass --with known-{}-align-double=1 if they are compatible",
                package
            ),
            ResolveError::AbiMismatch { .. } => {
                "use host and device compilers that target the same architecture".to_string()
            }
            ResolveError::UnsupportedPrecision { supported, .. } => {
                format!("pass --with precision={}", supported.join("|"))
            }
            ResolveError::Ambiguous { hint, .. } => hint.clone(),
            ResolveError::InvalidOverride { key, .. } => format!("correct --with {}=<value>", key),
            ResolveError::MissingDependency { dependency, .. } => format!(
                "configure {} first, or pass --with {}-dir=<root>",
                dependency, dependency
            ),
            ResolveError::Toolchain { language, .. } => match language {
                Language::Hip => "pass --with hipcc=<path> or put hipcc on PATH".to_string(),
                Language::Cuda => "pass --with nvcc=<path> or put nvcc on PATH".to_string(),
                Language::Cxx => "pass --with cxx=<path> or set CXX".to_string(),
                Language::C => "pass --with cc=<path> or set CC".to_string(),
            },
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string())
            .with_context(format!("failed during {}", self.stage()));

        match self {
            ResolveError::NotFound { tried, .. } => {
                if !tried.is_empty() {
                    let dirs: Vec<String> = tried
                        .iter()
                        .map(|d| {
                            if d.as_os_str().is_empty() {
                                "<compiler default paths>".to_string()
                            } else {
                                d.display().to_string()
                            }
                        })
                        .collect();
                    diag = diag.with_context(format!("searched: {}", dirs.join(", ")));
                }
            }
            ResolveError::UserDirectoryUnusable { dir, .. } => {
                diag = diag.with_location(dir);
            }
            ResolveError::VersionTooOld { dir: Some(dir), .. }
            | ResolveError::VersionUnavailable { dir: Some(dir), .. } => {
                diag = diag.with_location(dir);
            }
            _ => {}
        }

        diag.with_suggestion(self.hint())
    }
}
