//! Low-level libraries other recipes depend on.

use crate::core::descriptor::{DescriptorError, PackageDescriptor};
use crate::recipes::{DescriptorRecipe, Recipe};
use crate::resolver::search::tool_root;
use crate::resolver::{ResolveContext, SearchDir};

/// zlib.
pub fn zlib() -> Result<DescriptorRecipe, DescriptorError> {
    PackageDescriptor::builder("zlib")
        .version_from_header(["zlib.h"], ["ZLIB_VERSION"])
        .symbols(["compress", "uncompress"])
        .headers(["zlib.h"])
        .library_set(["libz.a"])
        .library_set(["libz.so"])
        .library_set(["libz.dylib"])
        .library_set(["zlib.lib"])
        .build()
        .map(DescriptorRecipe::new)
}

/// The C math library.
pub fn mathlib() -> Result<DescriptorRecipe, DescriptorError> {
    PackageDescriptor::builder("mathlib")
        .display_name("Math library")
        .symbols(["floor", "log10", "pow"])
        .headers(["math.h"])
        .library_set(["libm.a"])
        .library_set(["libm.so"])
        .library_set(["libm.dylib"])
        .build()
        .map(DescriptorRecipe::new)
}

/// BLAS and LAPACK, from whichever vendor is installed.
pub fn blaslapack() -> Result<DescriptorRecipe, DescriptorError> {
    PackageDescriptor::builder("blaslapack")
        .display_name("BLAS/LAPACK")
        .symbols(["dgemm_", "dgetrf_"])
        .library_set(["libopenblas.a"])
        .library_set(["libopenblas.so"])
        .library_set(["libflexiblas.so"])
        .library_set(["liblapack.a", "libblas.a"])
        .library_set(["liblapack.so", "libblas.so"])
        .library_set(["libmkl_rt.so"])
        .build()
        .map(DescriptorRecipe::new)
}

/// MPI.
#[derive(Debug, Clone)]
pub struct MpiRecipe {
    descriptor: PackageDescriptor,
}

impl MpiRecipe {
    pub fn new() -> Result<Self, DescriptorError> {
        // MPI_VERSION is the standard version, not the implementation's
        let descriptor = PackageDescriptor::builder("mpi")
            .display_name("MPI")
            .version_from_header(["mpi.h"], ["MPI_VERSION", "MPI_SUBVERSION"])
            .symbols(["MPI_Init", "MPI_Finalize"])
            .headers(["mpi.h"])
            .library_set(["libmpi.so"])
            .library_set(["libmpich.so"])
            .library_set(["libmpi.a"])
            .library_set(["libmpich.a"])
            .library_set(["msmpi.lib"])
            .build()?;
        Ok(MpiRecipe { descriptor })
    }
}

impl Recipe for MpiRecipe {
    fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    /// `/usr/lib64/openmpi` from `/usr/lib64/openmpi/bin/mpicc`.
    fn derived_directories<'a>(
        &'a self,
        ctx: &'a ResolveContext<'a>,
    ) -> Box<dyn Iterator<Item = SearchDir> + 'a> {
        Box::new(std::iter::once_with(move || tool_root(ctx.env, "mpicc")).flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::builder::toolchain::{GccToolchain, Language, ToolchainPlatform, Toolchains};
    use crate::core::surface::{FlagTable, LinkItem};
    use crate::core::version::Version;
    use crate::resolver::Resolver;
    use crate::test_support::{outputs, CommandExpectation, CommandPattern, InstallTree, MockRunner};
    use crate::util::config::Config;
    use crate::util::env::Environment;

    fn toolchains() -> Toolchains {
        Toolchains::new(Box::new(GccToolchain::new(
            PathBuf::from("cc"),
            Language::C,
            ToolchainPlatform::Gcc,
        )))
    }

    #[test]
    fn test_zlib_from_compiler_defaults() {
        let runner = MockRunner::new()
            .expect(CommandExpectation::new(
                CommandPattern::Regex(r"\s-E\s".to_string()),
                outputs::macro_echo(&["\"1.3.1\""]),
            ))
            .compile_succeeds()
            .link_succeeds_with("-lz");
        let toolchains = toolchains();
        let env = Environment::empty();
        let config = Config::default();
        let deps = FlagTable::default();
        let ctx = ResolveContext {
            toolchains: &toolchains,
            runner: &runner,
            env: &env,
            config: &config,
            deps: &deps,
        };

        let configured = Resolver::new(&ctx).resolve(&zlib().unwrap()).unwrap();
        assert_eq!(configured.version, Some(Version::new(vec![1, 3, 1])));
        assert_eq!(configured.directory, None);
        assert_eq!(configured.link_items, vec![LinkItem::Name("z".to_string())]);
        assert!(configured.define("HAVE_LIBZ").is_some());
    }

    #[test]
    fn test_blaslapack_falls_back_to_reference() {
        let tree = InstallTree::new().library("liblapack.a").library("libblas.a");
        let runner = MockRunner::new()
            .compile_succeeds()
            .link_succeeds_with("liblapack.a");
        let toolchains = toolchains();
        let env = Environment::empty();
        let mut config = Config::default();
        config
            .apply_override(&format!("blaslapack-dir={}", tree.root().display()))
            .unwrap();
        let deps = FlagTable::default();
        let ctx = ResolveContext {
            toolchains: &toolchains,
            runner: &runner,
            env: &env,
            config: &config,
            deps: &deps,
        };

        let configured = Resolver::new(&ctx).resolve(&blaslapack().unwrap()).unwrap();
        assert_eq!(
            configured.link_items,
            vec![
                LinkItem::Path(tree.path("lib/liblapack.a")),
                LinkItem::Path(tree.path("lib/libblas.a")),
            ]
        );
        // Only the complete set was ever linked
        assert_eq!(runner.calls().iter().filter(|c| !c.contains(" -c ")).count(), 1);
    }

    #[test]
    fn test_mpi_found_through_mpicc() {
        let tree = InstallTree::new()
            .executable("bin/mpicc", "#!/bin/sh\n")
            .header("include/mpi.h", "#define MPI_VERSION 3\n#define MPI_SUBVERSION 1\n")
            .library("libmpich.so");
        let runner = MockRunner::new()
            .compile_succeeds()
            .link_succeeds_with("libmpich.so");
        let toolchains = toolchains();
        let env = Environment::empty().with_tool("mpicc", tree.path("bin/mpicc"));
        let config = Config::default();
        let deps = FlagTable::default();
        let ctx = ResolveContext {
            toolchains: &toolchains,
            runner: &runner,
            env: &env,
            config: &config,
            deps: &deps,
        };

        let configured = Resolver::new(&ctx).resolve(&MpiRecipe::new().unwrap()).unwrap();
        assert_eq!(configured.version, Some(Version::new(vec![3, 1])));
        assert_eq!(
            configured.directory.as_deref().map(crate::util::env::real_path),
            Some(crate::util::env::real_path(tree.root()))
        );
    }
}
