//! GCC-style compiler drivers (gcc, clang, hipcc, nvcc).
//!
//! All drivers the resolver talks to accept the same core flags:
//! `-E`, `-c`, `-I`, `-D`, `-L`, `-l` and `-o`.

use std::path::{Path, PathBuf};

use crate::core::surface::LinkItem;

use super::{CommandSpec, CompileInput, Language, LinkInput, Toolchain, ToolchainPlatform};

/// A GCC-compatible compiler driver.
#[derive(Debug, Clone)]
pub struct GccToolchain {
    /// Path to the compiler driver
    pub compiler: PathBuf,
    /// Language the driver compiles
    pub language: Language,
    /// Compiler family (gcc, clang, hipcc, ...)
    pub family: ToolchainPlatform,
    /// Flags passed to every invocation
    pub flags: Vec<String>,
}

impl GccToolchain {
    /// Create a new GCC-style toolchain.
    pub fn new(compiler: PathBuf, language: Language, family: ToolchainPlatform) -> Self {
        GccToolchain {
            compiler,
            language,
            family,
            flags: Vec::new(),
        }
    }

    /// Add flags passed to every invocation.
    pub fn with_flags(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Infer C++ compiler path from C compiler path.
    ///
    /// Handles common patterns:
    /// - gcc, x86_64-linux-gnu-gcc -> g++, x86_64-linux-gnu-g++
    /// - clang -> clang++
    /// - cc, /usr/bin/cc -> c++, /usr/bin/c++
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if cc_str.ends_with("gcc") {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 2]));
        }

        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }

        // Only match "cc" as a complete basename (not "mycc")
        let is_standalone_cc = cc_str == "cc"
            || cc_str.ends_with("/cc")
            || cc_str.ends_with("\\cc")
            || cc_str.ends_with("-cc");

        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }

    fn push_compile_flags(&self, mut cmd: CommandSpec, input: &CompileInput) -> CommandSpec {
        cmd = cmd.args(self.flags.iter().cloned());

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }

        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("-D{}={}", name, v)),
                None => cmd = cmd.arg(format!("-D{}", name)),
            }
        }

        cmd.args(input.cflags.iter().cloned())
    }
}

impl Toolchain for GccToolchain {
    fn platform(&self) -> ToolchainPlatform {
        self.family
    }

    fn language(&self) -> Language {
        self.language
    }

    fn compiler_path(&self) -> &Path {
        &self.compiler
    }

    fn preprocess_command(&self, input: &CompileInput) -> CommandSpec {
        let cmd = CommandSpec::new(&self.compiler).arg("-E");
        self.push_compile_flags(cmd, input)
            .arg(input.source.display().to_string())
    }

    fn compile_command(&self, input: &CompileInput) -> CommandSpec {
        let cmd = CommandSpec::new(&self.compiler).arg("-c");
        self.push_compile_flags(cmd, input)
            .arg(input.source.display().to_string())
            .arg("-o")
            .arg(input.output.display().to_string())
    }

    fn link_exe_command(&self, input: &LinkInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.compiler).args(self.flags.iter().cloned());

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        cmd = cmd.arg("-o").arg(input.output.display().to_string());
        cmd = cmd.args(input.ldflags.iter().cloned());

        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("-L{}", dir.display()));
        }

        for lib in &input.libs {
            cmd = match lib {
                LinkItem::Path(path) => cmd.arg(path.display().to_string()),
                LinkItem::Name(name) => cmd.arg(format!("-l{}", name)),
                LinkItem::Flag(flag) => cmd.arg(flag.clone()),
            };
        }

        cmd
    }

    fn object_extension(&self) -> &str {
        "o"
    }

    fn exe_extension(&self) -> &str {
        if cfg!(windows) {
            "exe"
        } else {
            ""
        }
    }
}
