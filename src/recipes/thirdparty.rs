//! Numerical and I/O libraries used directly by the project.

use crate::builder::toolchain::Language;
use crate::core::descriptor::{DescriptorError, PackageDescriptor};
use crate::core::surface::ConfigurationState;
use crate::core::version::Version;
use crate::recipes::{DescriptorRecipe, Recipe};
use crate::resolver::abi;
use crate::resolver::{Found, ResolveContext, ResolveError, ResolveStage};
use crate::util::config::Precision;

/// SuperLU, the sequential sparse direct solver.
#[derive(Debug, Clone)]
pub struct SuperLuRecipe {
    descriptor: PackageDescriptor,
}

impl SuperLuRecipe {
    pub fn new() -> Result<Self, DescriptorError> {
        // 5.2.0 has bugs that prevent it from working
        let descriptor = PackageDescriptor::builder("superlu")
            .display_name("SuperLU")
            .min_version(Version::new(vec![5, 2, 1]))
            .version_from_header(
                ["slu_ddefs.h"],
                [
                    "SUPERLU_MAJOR_VERSION",
                    "SUPERLU_MINOR_VERSION",
                    "SUPERLU_PATCH_VERSION",
                ],
            )
            .symbols(["set_default_options"])
            .headers(["slu_ddefs.h"])
            .library_set(["libsuperlu.a"])
            .library_set(["libsuperlu.so"])
            .requires(["blaslapack"])
            .build()?;
        Ok(SuperLuRecipe { descriptor })
    }
}

impl Recipe for SuperLuRecipe {
    fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    fn configure(
        &self,
        ctx: &ResolveContext<'_>,
        _found: &Found,
        _state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        let bits = ctx.project().index_bits();
        if bits != 32 {
            return Err(ResolveError::InvalidOverride {
                package: self.descriptor.name.clone(),
                key: "index-bits".to_string(),
                value: bits.to_string(),
                reason: "SuperLU only works with 32-bit indices".to_string(),
                stage: ResolveStage::Abi,
            });
        }
        abi::check_precision(
            &self.descriptor.name,
            ctx.project().precision(),
            &[Precision::Single, Precision::Double],
        )
    }
}

/// libpng. Its library define and package define share the name
/// `HAVE_LIBPNG`; only the package one is kept.
#[derive(Debug, Clone)]
pub struct LibpngRecipe {
    descriptor: PackageDescriptor,
}

impl LibpngRecipe {
    pub fn new() -> Result<Self, DescriptorError> {
        let descriptor = PackageDescriptor::builder("libpng")
            .version_from_header(["png.h"], ["PNG_LIBPNG_VER_STRING"])
            .symbols(["png_create_write_struct"])
            .headers(["png.h"])
            .library_set(["libpng.a"])
            .library_set(["libpng.so"])
            .library_set(["libpng.dylib"])
            .requires(["mathlib", "zlib"])
            .build()?;
        Ok(LibpngRecipe { descriptor })
    }
}

impl Recipe for LibpngRecipe {
    fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    fn configure(
        &self,
        _ctx: &ResolveContext<'_>,
        _found: &Found,
        state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        state.suppress_library_define("HAVE_LIBPNG");
        Ok(())
    }
}

/// p4est, forest-of-octrees mesh refinement, with its libsc.
pub fn p4est() -> Result<DescriptorRecipe, DescriptorError> {
    PackageDescriptor::builder("p4est")
        .version_from_header(
            ["p4est_config.h"],
            ["P4EST_VERSION_MAJOR", "P4EST_VERSION_MINOR", "P4EST_VERSION_POINT"],
        )
        .symbols(["p4est_init"])
        .headers(["p4est_bits.h"])
        .library_set(["libp4est.a", "libsc.a"])
        .library_set(["libp4est.so", "libsc.so"])
        .requires(["blaslapack", "zlib"])
        .optional(["mpi"])
        .build()
        .map(DescriptorRecipe::new)
}

/// Random123, counter-based random number generators. Headers only.
pub fn random123() -> Result<DescriptorRecipe, DescriptorError> {
    PackageDescriptor::builder("random123")
        .display_name("Random123")
        .required_headers([
            "Random123/ars.h",
            "Random123/philox.h",
            "Random123/threefry.h",
        ])
        .link_language(Language::Cxx)
        .build()
        .map(DescriptorRecipe::new)
}

/// OpenGL ES. Nothing is probed; the platform is assumed to provide it.
#[derive(Debug, Clone)]
pub struct OpenGlesRecipe {
    descriptor: PackageDescriptor,
}

impl OpenGlesRecipe {
    pub fn new() -> Result<Self, DescriptorError> {
        let descriptor = PackageDescriptor::builder("opengles")
            .display_name("OpenGLES")
            .build()?;
        Ok(OpenGlesRecipe { descriptor })
    }
}

impl Recipe for OpenGlesRecipe {
    fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    fn configure(
        &self,
        _ctx: &ResolveContext<'_>,
        _found: &Found,
        state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        state.add_define("HAVE_OPENGL", "1");
        state.add_define("HAVE_OPENGLES", "1");
        Ok(())
    }
}
