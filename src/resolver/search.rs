//! Candidate installation directories.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::util::env::Environment;

/// Where a candidate directory came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirOrigin {
    /// `--with <pkg>-dir=<root>` or the config file
    UserOverride,
    /// Derived from the location of a tool executable
    ToolDerived(String),
    /// The compiler's default search paths
    SystemDefault,
}

/// A candidate installation root.
///
/// The system default is represented by the empty path: nothing is added to
/// the include or library search paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDir {
    pub path: PathBuf,
    pub origin: DirOrigin,
}

impl SearchDir {
    pub fn user(path: impl Into<PathBuf>) -> Self {
        SearchDir {
            path: path.into(),
            origin: DirOrigin::UserOverride,
        }
    }

    pub fn derived(path: impl Into<PathBuf>, tool: impl Into<String>) -> Self {
        SearchDir {
            path: path.into(),
            origin: DirOrigin::ToolDerived(tool.into()),
        }
    }

    pub fn system_default() -> Self {
        SearchDir {
            path: PathBuf::new(),
            origin: DirOrigin::SystemDefault,
        }
    }

    /// Whether this is the compiler-default entry.
    pub fn is_default(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    pub fn is_user(&self) -> bool {
        self.origin == DirOrigin::UserOverride
    }
}

impl fmt::Display for SearchDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            DirOrigin::SystemDefault => f.write_str("<compiler default paths>"),
            DirOrigin::UserOverride => write!(f, "{} (user)", self.path.display()),
            DirOrigin::ToolDerived(ref tool) => {
                write!(f, "{} (from {})", self.path.display(), tool)
            }
        }
    }
}

/// Ordered, deduplicated candidate directories for one resolution.
///
/// Yields the user root first, then tool-derived roots as the recipe
/// produces them, then the system default exactly once. Derived roots are
/// computed lazily, so a tool is only located if the earlier candidates did
/// not already settle the search.
pub struct SearchDirectories<'a> {
    user: Option<PathBuf>,
    derived: Box<dyn Iterator<Item = SearchDir> + 'a>,
    seen: HashSet<PathBuf>,
    default_emitted: bool,
}

impl<'a> SearchDirectories<'a> {
    pub fn new(user: Option<PathBuf>, derived: impl Iterator<Item = SearchDir> + 'a) -> Self {
        SearchDirectories {
            user: user.filter(|p| !p.as_os_str().is_empty()),
            derived: Box::new(derived),
            seen: HashSet::new(),
            default_emitted: false,
        }
    }
}

impl Iterator for SearchDirectories<'_> {
    type Item = SearchDir;

    fn next(&mut self) -> Option<SearchDir> {
        if let Some(path) = self.user.take() {
            self.seen.insert(path.clone());
            return Some(SearchDir::user(path));
        }

        for dir in self.derived.by_ref() {
            if dir.is_default() || !self.seen.insert(dir.path.clone()) {
                continue;
            }
            return Some(dir);
        }

        if !self.default_emitted {
            self.default_emitted = true;
            return Some(SearchDir::system_default());
        }

        None
    }
}

impl std::iter::FusedIterator for SearchDirectories<'_> {}

/// The installation root implied by a tool: `/opt/rocm` from `/opt/rocm/bin/hipcc`.
///
/// Symlinks are followed first, so `/usr/bin/matlab -> /opt/matlab/bin/matlab`
/// gives `/opt/matlab`.
pub fn tool_root(env: &Environment, tool: &str) -> Option<SearchDir> {
    let exe = env.find_tool_real(tool)?;
    grandparent(&exe).map(|root| SearchDir::derived(root, tool))
}

/// Like [`tool_root`] for a compiler path that is already known.
pub fn compiler_root(compiler: &Path, tool: &str) -> Option<SearchDir> {
    let exe = crate::util::env::real_path(compiler);
    grandparent(&exe).map(|root| SearchDir::derived(root, tool))
}

fn grandparent(path: &Path) -> Option<PathBuf> {
    path.parent()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn paths(dirs: SearchDirectories<'_>) -> Vec<String> {
        dirs.map(|d| d.path.display().to_string()).collect()
    }

    #[test]
    fn test_order_and_default_last() {
        let dirs = SearchDirectories::new(
            Some(PathBuf::from("/opt/user")),
            vec![
                SearchDir::derived("/opt/rocm", "hipcc"),
                SearchDir::derived("/opt/rocm-6.2", "hipconfig"),
            ]
            .into_iter(),
        );
        assert_eq!(paths(dirs), vec!["/opt/user", "/opt/rocm", "/opt/rocm-6.2", ""]);
    }

    #[test]
    fn test_duplicates_and_empties_dropped() {
        let dirs = SearchDirectories::new(
            Some(PathBuf::from("/opt/rocm")),
            vec![
                SearchDir::derived("", "hipcc"),
                SearchDir::derived("/opt/rocm/", "hipcc"),
                SearchDir::derived("/usr", "cc"),
                SearchDir::derived("/usr", "c++"),
            ]
            .into_iter(),
        );
        let all: Vec<SearchDir> = dirs.collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().filter(|d| d.is_default()).count(), 1);
        assert!(all.last().unwrap().is_default());
        assert!(all[0].is_user());
    }

    #[test]
    fn test_exhausted_iterator_stays_exhausted() {
        let mut dirs = SearchDirectories::new(None, std::iter::empty());
        assert!(dirs.next().unwrap().is_default());
        assert!(dirs.next().is_none());
        assert!(dirs.next().is_none());
    }

    #[test]
    fn test_derived_roots_are_lazy() {
        let evaluated = Cell::new(false);
        let mut dirs = SearchDirectories::new(
            Some(PathBuf::from("/opt/user")),
            std::iter::once_with(|| {
                evaluated.set(true);
                SearchDir::derived("/opt/rocm", "hipcc")
            }),
        );
        assert!(dirs.next().unwrap().is_user());
        assert!(!evaluated.get());
        dirs.next();
        assert!(evaluated.get());
    }

    #[test]
    fn test_compiler_root() {
        let root = compiler_root(Path::new("/nonexistent/rocm/bin/hipcc"), "hipcc").unwrap();
        assert_eq!(root.path, PathBuf::from("/nonexistent/rocm"));
        assert_eq!(root.origin, DirOrigin::ToolDerived("hipcc".to_string()));
        assert!(compiler_root(Path::new("hipcc"), "hipcc").is_none());
    }
}
