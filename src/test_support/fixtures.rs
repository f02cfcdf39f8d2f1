//! Test fixtures for common test scenarios.
//!
//! Fake installation trees on disk plus canned tool outputs.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::util::process::ProbeOutput;

/// A fake installation prefix in a temporary directory.
///
/// The directory is removed when the fixture is dropped.
#[derive(Debug)]
pub struct InstallTree {
    dir: TempDir,
}

impl InstallTree {
    /// Create an empty installation prefix.
    pub fn new() -> Self {
        InstallTree {
            dir: TempDir::new().unwrap(),
        }
    }

    /// The installation root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `rel` below the root.
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a file below the root, creating parent directories.
    pub fn file(self, rel: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Self {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        self
    }

    /// Create an empty directory below the root.
    pub fn dir(self, rel: impl AsRef<Path>) -> Self {
        std::fs::create_dir_all(self.path(rel)).unwrap();
        self
    }

    /// Write a header below the root (e.g. `include/zlib.h`).
    pub fn header(self, rel: impl AsRef<Path>, content: &str) -> Self {
        self.file(rel, content)
    }

    /// Create an empty library file in `lib/`.
    pub fn library(self, name: &str) -> Self {
        self.file(Path::new("lib").join(name), b"!<arch>\n")
    }

    /// Create an empty library file in `lib64/`.
    pub fn library64(self, name: &str) -> Self {
        self.file(Path::new("lib64").join(name), b"!<arch>\n")
    }

    /// Create an executable script below the root.
    pub fn executable(self, rel: impl AsRef<Path>, script: &str) -> Self {
        let rel = rel.as_ref().to_path_buf();
        let this = self.file(&rel, script);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = this.path(&rel);
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
        }
        this
    }

    /// A ROCm prefix: `bin/hipcc`, the version header, and the HIP libraries.
    pub fn rocm(major: u64, minor: u64, patch: u64) -> Self {
        let mut tree = InstallTree::new()
            .executable("bin/hipcc", "#!/bin/sh\nexit 0\n")
            .header("include/hip/hip_runtime.h", "#pragma once\n")
            .header(
                "include/rocm-core/rocm_version.h",
                &headers::rocm_version(major, minor, patch),
            );
        for lib in [
            "libhipsparse.a",
            "libhipblas.a",
            "libhipsolver.a",
            "librocsparse.a",
            "librocsolver.a",
            "librocblas.a",
            "librocrand.a",
            "libamdhip64.a",
            "libhsa-runtime64.a",
        ] {
            tree = tree.library(lib);
        }
        tree
    }
}

impl Default for InstallTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Header contents.
pub mod headers {
    /// `rocm_version.h` as installed by rocm-core.
    pub fn rocm_version(major: u64, minor: u64, patch: u64) -> String {
        format!(
            r#"#ifndef ROCM_VERSION_H
#define ROCM_VERSION_H

#define ROCM_VERSION_MAJOR   {major}
#define ROCM_VERSION_MINOR   {minor}
#define ROCM_VERSION_PATCH   {patch}

#define ROCM_BUILD_INFO  "{major}.{minor}.{patch}-0"

#endif
"#
        )
    }

    /// `slu_ddefs.h` carrying the SuperLU version macros.
    pub fn superlu(major: u64, minor: u64, patch: u64) -> String {
        format!(
            "#define SUPERLU_MAJOR_VERSION {major}\n\
             #define SUPERLU_MINOR_VERSION {minor}\n\
             #define SUPERLU_PATCH_VERSION {patch}\n\
             extern void set_default_options(void *);\n"
        )
    }

    /// `png.h` carrying the string version macro.
    pub fn libpng(version: &str) -> String {
        format!("#define PNG_LIBPNG_VER_STRING \"{version}\"\n")
    }
}

/// Canned tool outputs.
pub mod outputs {
    use super::ProbeOutput;

    /// `rocminfo` output for a single agent.
    pub fn rocminfo(arch: &str, marketing_name: &str) -> ProbeOutput {
        ProbeOutput::success(format!(
            "ROCk module is loaded\n\
             =====================\n\
             HSA Agents\n\
             *******\n\
             Agent 2\n\
             *******\n\
             \x20 Name:                    {arch}\n\
             \x20 Uuid:                    GPU-XX\n\
             \x20 Marketing Name:          {marketing_name}\n\
             \x20 Vendor Name:             AMD\n"
        ))
    }

    /// `hipconfig --platform` output.
    pub fn hipconfig_platform(platform: &str) -> ProbeOutput {
        ProbeOutput::success(platform.to_string())
    }

    /// Preprocessor output for the macro-echo probe.
    pub fn macro_echo(values: &[&str]) -> ProbeOutput {
        let mut out = String::from("# 1 \"probe.c\"\n");
        for (i, value) in values.iter().enumerate() {
            out.push_str(&format!("berth_macro_{} = {};\n", i, value));
        }
        ProbeOutput::success(out)
    }

    /// `matlab -nojvm` banner output.
    pub fn matlab_version(version: &str) -> ProbeOutput {
        ProbeOutput::success(format!(
            "\n                            < M A T L A B (R) >\n\nVersion {} (R2024b)\n",
            version
        ))
    }

    /// Linker output for an undefined symbol.
    pub fn link_undefined_symbol(symbol: &str) -> ProbeOutput {
        ProbeOutput::failure(1, format!("undefined reference to `{}'", symbol))
    }
}
