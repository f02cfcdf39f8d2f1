//! Toolchain abstraction for the compilers used to run probes.
//!
//! This module provides a unified interface for generating preprocess,
//! compile and link commands for the host C/C++ compilers and for the
//! device compilers (hipcc, nvcc) that some dependencies build with.
//!
//! Toolchain detection priority:
//! 1. Compiler paths from config (`[compilers]` in `.berth/config.toml`)
//! 2. Environment variables (CC, CXX, HIPCC, NVCC)
//! 3. Auto-detection (searching PATH for common compilers)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::surface::LinkItem;

mod detect;
mod gcc;

pub use detect::{detect_compiler_family, detect_toolchains};
pub use gcc::GccToolchain;

pub use crate::core::language::Language;

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run (e.g., "gcc", "hipcc")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The command line as a single string, for logs and test matching.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Input for a preprocess or compile step.
#[derive(Debug, Clone, Default)]
pub struct CompileInput {
    /// Source file to compile
    pub source: PathBuf,
    /// Output object file (ignored when preprocessing)
    pub output: PathBuf,
    /// Include directories
    pub include_dirs: Vec<PathBuf>,
    /// Preprocessor defines (name, optional value)
    pub defines: Vec<(String, Option<String>)>,
    /// Additional compiler flags
    pub cflags: Vec<String>,
}

/// Input for a link step producing an executable.
#[derive(Debug, Clone, Default)]
pub struct LinkInput {
    /// Object files to link
    pub objects: Vec<PathBuf>,
    /// Output executable
    pub output: PathBuf,
    /// Library search paths
    pub lib_dirs: Vec<PathBuf>,
    /// Libraries and raw link items, in link order
    pub libs: Vec<LinkItem>,
    /// Additional linker flags
    pub ldflags: Vec<String>,
}

/// The platform/family of a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainPlatform {
    /// GCC (GNU Compiler Collection)
    Gcc,
    /// Clang/LLVM
    Clang,
    /// Apple Clang (macOS)
    AppleClang,
    /// AMD hipcc driver
    Hipcc,
    /// NVIDIA nvcc driver
    Nvcc,
}

impl ToolchainPlatform {
    /// Get the platform name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainPlatform::Gcc => "gcc",
            ToolchainPlatform::Clang => "clang",
            ToolchainPlatform::AppleClang => "apple-clang",
            ToolchainPlatform::Hipcc => "hipcc",
            ToolchainPlatform::Nvcc => "nvcc",
        }
    }
}

/// Trait for toolchain implementations.
///
/// Each toolchain knows how to generate commands for its specific compiler.
pub trait Toolchain: Send + Sync {
    /// Get the toolchain platform.
    fn platform(&self) -> ToolchainPlatform;

    /// Language this compiler is used for.
    fn language(&self) -> Language;

    /// Get the compiler path.
    fn compiler_path(&self) -> &Path;

    /// Generate a command that preprocesses `input.source` to stdout.
    fn preprocess_command(&self, input: &CompileInput) -> CommandSpec;

    /// Generate a compile-only command.
    fn compile_command(&self, input: &CompileInput) -> CommandSpec;

    /// Generate a link command for an executable.
    fn link_exe_command(&self, input: &LinkInput) -> CommandSpec;

    /// Get the object file extension.
    fn object_extension(&self) -> &str;

    /// Get the executable extension.
    fn exe_extension(&self) -> &str;
}

/// The set of compilers available to the resolver, keyed by language.
///
/// The host C compiler is always present; C++ and device compilers are
/// optional and looked up on demand.
pub struct Toolchains {
    host: Box<dyn Toolchain>,
    others: HashMap<Language, Box<dyn Toolchain>>,
}

impl Toolchains {
    /// Create a toolchain set around the host C compiler.
    pub fn new(host: Box<dyn Toolchain>) -> Self {
        Toolchains {
            host,
            others: HashMap::new(),
        }
    }

    /// Register the compiler for another language.
    pub fn with(mut self, toolchain: Box<dyn Toolchain>) -> Self {
        self.others.insert(toolchain.language(), toolchain);
        self
    }

    /// The project's primary C compiler.
    pub fn host(&self) -> &dyn Toolchain {
        self.host.as_ref()
    }

    /// The compiler for `lang`, if one was configured or detected.
    pub fn for_language(&self, lang: Language) -> Option<&dyn Toolchain> {
        match lang {
            Language::C => Some(self.host.as_ref()),
            other => self.others.get(&other).map(|t| t.as_ref()),
        }
    }
}

impl std::fmt::Debug for Toolchains {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_map();
        list.entry(&"c", &self.host.compiler_path());
        for (lang, tc) in &self.others {
            list.entry(&lang.as_str(), &tc.compiler_path());
        }
        list.finish()
    }
}
