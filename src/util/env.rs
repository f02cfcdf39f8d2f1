//! Read-only snapshot of the process environment.
//!
//! The resolver never reads `std::env` directly. The environment is captured
//! once and passed down, so resolutions can run side by side without racing
//! on process-global state.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Captured environment variables plus pinned tool locations.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    tools: HashMap<String, PathBuf>,
    cwd: PathBuf,
}

impl Environment {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Environment {
            vars: std::env::vars().collect(),
            tools: HashMap::new(),
            cwd: std::env::current_dir().unwrap_or_default(),
        }
    }

    /// An environment with no variables and no tools.
    pub fn empty() -> Self {
        Environment::default()
    }

    /// Set a variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Pin the location of a tool, bypassing the PATH search.
    pub fn with_tool(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(name.into(), path.into());
        self
    }

    /// Look up a variable.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Locate an executable by name on the captured PATH.
    ///
    /// Pinned tools win over the PATH search. Names that already contain a
    /// path separator are resolved relative to the captured working directory.
    pub fn find_tool(&self, name: &str) -> Option<PathBuf> {
        if let Some(path) = self.tools.get(name) {
            return Some(path.clone());
        }

        let search_path = self.vars.get("PATH")?;
        which::which_in(name, Some(search_path), &self.cwd).ok()
    }

    /// Locate an executable and follow symlinks to its real location.
    pub fn find_tool_real(&self, name: &str) -> Option<PathBuf> {
        self.find_tool(name).map(|path| real_path(&path))
    }
}

/// Follow symlinks, falling back to the path itself when it cannot be resolved.
pub fn real_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
