//! MATLAB engine libraries.
//!
//! MATLAB ships no pkg-config or version header; the interpreter itself is
//! asked for its version, and the engine library directory names the
//! platform (`glnxa64`, `maci64`, ...).

use std::path::{Path, PathBuf};

use crate::core::descriptor::{DescriptorError, PackageDescriptor};
use crate::core::surface::{ConfigurationState, LinkItem};
use crate::core::version::Version;
use crate::recipes::Recipe;
use crate::resolver::search::tool_root;
use crate::resolver::{Found, ResolveContext, ResolveError, SearchDir};

const ENGINE_LIBRARIES: &[&str] = &["eng", "mx", "mat", "ut"];

/// Recipe for the MATLAB engine.
#[derive(Debug, Clone)]
pub struct MatlabRecipe {
    descriptor: PackageDescriptor,
}

impl MatlabRecipe {
    pub fn new() -> Result<Self, DescriptorError> {
        let descriptor = PackageDescriptor::builder("matlab")
            .display_name("Matlab")
            .min_version(Version::new(vec![6, 0]))
            .version_from_tool(
                Path::new("bin").join("matlab"),
                ["-nojvm", "-nodisplay", "-r", "['Version ' version]; exit"],
                r"Version (?P<version>[0-9]+\.[0-9]+)",
            )
            .requires_version(true)
            .include_subdirs(["extern/include"])
            .build()?;
        Ok(MatlabRecipe { descriptor })
    }
}

/// The engine platform directory below `root/extern/lib`.
///
/// Installations normally carry exactly one; the first in name order wins.
pub fn engine_arch(root: &Path) -> Option<String> {
    let entries = std::fs::read_dir(root.join("extern").join("lib")).ok()?;
    let mut archs: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    archs.sort();
    archs.into_iter().next()
}

/// Linker arguments for the engine libraries of `arch` below `root`.
pub fn engine_link_items(root: &Path, arch: &str) -> Vec<LinkItem> {
    let engine_dir = root.join("extern").join("lib").join(arch);
    let mut rpath = format!("-Wl,-rpath,{}", engine_dir.display());
    // 32-bit Linux engines load their runtime from sys/os
    if arch == "glnx86" {
        rpath.push_str(&format!(":{}", root.join("sys").join("os").join("glnx86").display()));
    }
    let mut items = vec![
        LinkItem::Flag(rpath),
        LinkItem::Flag(format!("-L{}", engine_dir.display())),
        LinkItem::Flag(format!("-L{}", root.join("bin").join(arch).display())),
    ];
    items.extend(ENGINE_LIBRARIES.iter().map(|l| LinkItem::Name(l.to_string())));
    if arch == "mac" {
        items.push(LinkItem::Flag(format!(
            "-L{}",
            root.join("sys").join("os").join("mac").display()
        )));
        items.push(LinkItem::Name("dl".to_string()));
    }
    items
}

impl Recipe for MatlabRecipe {
    fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    fn derived_directories<'a>(
        &'a self,
        ctx: &'a ResolveContext<'a>,
    ) -> Box<dyn Iterator<Item = SearchDir> + 'a> {
        Box::new(std::iter::once_with(move || tool_root(ctx.env, "matlab")).flatten())
    }

    fn validate_directory(&self, _ctx: &ResolveContext<'_>, dir: &SearchDir) -> Result<(), String> {
        if dir.is_default() {
            return Err("MATLAB is never on the compiler's default paths".to_string());
        }
        if engine_arch(&dir.path).is_none() {
            return Err(format!(
                "{} is not the root directory of MATLAB, no engine libraries in extern/lib",
                dir.path.display()
            ));
        }
        Ok(())
    }

    fn configure(
        &self,
        _ctx: &ResolveContext<'_>,
        found: &Found,
        state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        let root = &found.dir.path;
        let arch = engine_arch(root).ok_or_else(|| ResolveError::UserDirectoryUnusable {
            package: self.descriptor.name.clone(),
            dir: root.clone(),
            reason: "the engine library directory disappeared".to_string(),
        })?;
        tracing::debug!("matlab: using {} with engine arch {}", root.display(), arch);

        state.add_link_items(engine_link_items(root, &arch));

        let interpreter: PathBuf = root.join("bin").join("matlab");
        state.export("matlab-command", &interpreter);
        state.export("matlab-mex", root.join("bin").join("mex"));
        state.add_status_line(format!("Using {}", interpreter.display()));
        Ok(())
    }
}
