//! HIP, the GPU runtime of ROCm.

use std::path::{Path, PathBuf};

use crate::builder::toolchain::Language;
use crate::core::descriptor::{DescriptorError, PackageDescriptor};
use crate::core::surface::ConfigurationState;
use crate::core::version::Version;
use crate::recipes::Recipe;
use crate::resolver::abi;
use crate::resolver::platform::{HipPlatform, PlatformProbe};
use crate::resolver::search::{compiler_root, tool_root};
use crate::resolver::{Found, ResolveContext, ResolveError, SearchDir};
use crate::util::config::Precision;

const STATIC_LIBRARIES: &[&str] = &[
    "libhipsparse.a",
    "libhipblas.a",
    "libhipsolver.a",
    "librocsparse.a",
    "librocsolver.a",
    "librocblas.a",
    "librocrand.a",
    "libamdhip64.a",
    "libhsa-runtime64.a",
];

const IMPORT_LIBRARIES: &[&str] = &[
    "hipsparse.lib",
    "hipblas.lib",
    "hipsolver.lib",
    "rocsparse.lib",
    "rocsolver.lib",
    "rocblas.lib",
    "rocrand.lib",
    "amdhip64.lib",
    "hsa-runtime64.lib",
];

const SUPPORTED_PRECISIONS: &[Precision] = &[Precision::Single, Precision::Double];

/// Where the ROCTX tracing library lives in a ROCm installation.
///
/// The layout moved twice: into `include/roctracer` with ROCm 6 and into
/// the profiler SDK with ROCm 6.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoctxLayout {
    ProfilerSdk,
    Roctracer,
    Legacy,
}

impl RoctxLayout {
    /// Find the layout matching `version` below `root`, if it is installed.
    pub fn detect(root: &Path, version: &Version, include_subdirs: &[String]) -> Option<Self> {
        if version.at_least(&Version::new(vec![6, 4])) {
            let header = Path::new("rocprofiler-sdk-roctx").join("roctx.h");
            include_subdirs
                .iter()
                .any(|sub| root.join(sub).join(&header).is_file())
                .then_some(RoctxLayout::ProfilerSdk)
        } else if version.major() >= 6 {
            root.join("include")
                .join("roctracer")
                .is_dir()
                .then_some(RoctxLayout::Roctracer)
        } else {
            root.join("roctracer")
                .is_dir()
                .then_some(RoctxLayout::Legacy)
        }
    }

    /// Library names for the static and the import set.
    pub fn libraries(&self) -> (&'static str, &'static str) {
        match self {
            RoctxLayout::ProfilerSdk => ("librocprofiler-sdk-roctx.a", "rocprofiler-sdk-roctx.lib"),
            RoctxLayout::Roctracer | RoctxLayout::Legacy => ("libroctx64.a", "roctx64.lib"),
        }
    }

    /// `roctx.h` as included through the layout's include directory.
    pub fn header(&self) -> &'static str {
        match self {
            RoctxLayout::ProfilerSdk => "rocprofiler-sdk-roctx/roctx.h",
            RoctxLayout::Roctracer => "roctracer/roctx.h",
            RoctxLayout::Legacy => "roctx.h",
        }
    }

    /// Extra include subdirectory needed to find `roctx.h`.
    fn include_subdir(&self) -> Option<PathBuf> {
        match self {
            RoctxLayout::Legacy => Some(Path::new("roctracer").join("include")),
            _ => None,
        }
    }
}

/// Recipe for HIP.
#[derive(Debug, Clone)]
pub struct HipRecipe {
    descriptor: PackageDescriptor,
}

impl HipRecipe {
    pub fn new() -> Result<Self, DescriptorError> {
        // rocm-core's version, since HIP_VERSION_PATCH is a build number
        let descriptor = PackageDescriptor::builder("hip")
            .display_name("HIP")
            .min_version(Version::new(vec![5, 0, 0]))
            .version_from_header(
                ["rocm-core/rocm_version.h", "rocm_version.h"],
                ["ROCM_VERSION_MAJOR", "ROCM_VERSION_MINOR", "ROCM_VERSION_PATCH"],
            )
            .requires_version(true)
            .symbols(["hipInit"])
            .required_headers(["hip/hip_runtime.h"])
            .library_set(STATIC_LIBRARIES.iter().copied())
            .library_set(IMPORT_LIBRARIES.iter().copied())
            .link_language(Language::Hip)
            .build()?;
        Ok(HipRecipe { descriptor })
    }

    /// The platform as known before any vendor tool has run.
    fn expected_platform(&self, ctx: &ResolveContext<'_>) -> HipPlatform {
        ctx.overrides(&self.descriptor.name)
            .platform
            .as_deref()
            .and_then(HipPlatform::from_name)
            .or_else(|| ctx.env.var("HIP_PLATFORM").and_then(HipPlatform::from_name))
            .unwrap_or(if ctx.toolchains.for_language(Language::Cuda).is_some() {
                HipPlatform::Nvidia
            } else {
                HipPlatform::Amd
            })
    }

    fn configure_nvidia(
        &self,
        ctx: &ResolveContext<'_>,
        state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        let nvcc = ctx
            .toolchains
            .for_language(Language::Cuda)
            .ok_or_else(|| ResolveError::Toolchain {
                package: self.descriptor.name.clone(),
                language: Language::Cuda,
            })?;
        let cuda_root = compiler_root(nvcc.compiler_path(), "nvcc")
            .or_else(|| tool_root(ctx.env, "nvcc"))
            .ok_or_else(|| ResolveError::Toolchain {
                package: self.descriptor.name.clone(),
                language: Language::Cuda,
            })?;

        state.add_include_dir(cuda_root.path.join("include"));
        state.suppress_define("HAVE_CUDA");
        state.add_define("HAVE_HIPCUDA", "1");
        // __HIP_PLATFORM_NVCC__ is deprecated since HIP 4.3 but still read
        state.add_global_define("__HIP_PLATFORM_NVCC__", "1");
        state.add_global_define("__HIP_PLATFORM_NVIDIA__", "1");
        Ok(())
    }

    fn configure_amd(
        &self,
        ctx: &ResolveContext<'_>,
        probe: &PlatformProbe<'_>,
        found: &Found,
        state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        let name = self.descriptor.name.as_str();
        let overrides = ctx.overrides(name);

        state.add_define("HAVE_HIPROCM", "1");
        if found.libraries.iter().any(|lib| lib.stem().contains("roctx")) {
            state.add_global_define("HAVE_ROCTX", "1");
        }
        state.add_global_define("__HIP_PLATFORM_HCC__", "1");
        state.add_global_define("__HIP_PLATFORM_AMD__", "1");

        let arch = probe.arch(name, overrides.arch.as_deref(), installed_root(found))?;
        state.add_device_flag(arch.offload_flag());
        state.add_status_line(arch.status_line());

        // Consumers such as Kokkos Kernels need the rocBLAS and rocSPARSE roots
        let hip_dir = if found.dir.is_default() {
            ctx.toolchains
                .for_language(Language::Hip)
                .and_then(|hipcc| compiler_root(hipcc.compiler_path(), "hipcc"))
                .map(|d| d.path)
        } else {
            Some(found.dir.path.clone())
        };
        if let Some(dir) = hip_dir {
            state.export("hip-dir", &dir);
            state.export("rocblas-dir", &dir);
            state.export("rocsparse-dir", &dir);
        }
        Ok(())
    }
}

impl Recipe for HipRecipe {
    fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }

    /// `/opt/rocm` from `/opt/rocm/bin/hipcc`.
    fn derived_directories<'a>(
        &'a self,
        ctx: &'a ResolveContext<'a>,
    ) -> Box<dyn Iterator<Item = SearchDir> + 'a> {
        Box::new(
            ctx.toolchains
                .for_language(Language::Hip)
                .and_then(|hipcc| compiler_root(hipcc.compiler_path(), "hipcc"))
                .into_iter(),
        )
    }

    fn specialize(
        &self,
        ctx: &ResolveContext<'_>,
        dir: &SearchDir,
        version: Option<&Version>,
        desc: &mut PackageDescriptor,
    ) -> Result<(), ResolveError> {
        if dir.is_default() || self.expected_platform(ctx) != HipPlatform::Amd {
            return Ok(());
        }
        let Some(version) = version else {
            return Ok(());
        };
        let Some(layout) = RoctxLayout::detect(&dir.path, version, &desc.include_subdirs) else {
            tracing::debug!("hip: no ROCTX in {}", dir);
            return Ok(());
        };

        tracing::debug!("hip: found ROCTX ({:?} layout) in {}", layout, dir);
        let (static_lib, import_lib) = layout.libraries();
        for (index, lib) in [static_lib, import_lib].into_iter().enumerate() {
            desc.push_library(index, lib)
                .map_err(|e| ResolveError::InvalidOverride {
                    package: desc.name.clone(),
                    key: format!("{}-dir", desc.name),
                    value: dir.path.display().to_string(),
                    reason: e.to_string(),
                    stage: crate::resolver::ResolveStage::Link,
                })?;
        }
        if let Some(sub) = layout.include_subdir() {
            desc.include_subdirs.push(sub.to_string_lossy().into_owned());
        }
        desc.required_headers.push(layout.header().to_string());
        Ok(())
    }

    fn configure(
        &self,
        ctx: &ResolveContext<'_>,
        found: &Found,
        state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        let name = self.descriptor.name.as_str();
        let overrides = ctx.overrides(name);
        let hipcc = ctx
            .toolchains
            .for_language(Language::Hip)
            .ok_or_else(|| ResolveError::Toolchain {
                package: name.to_string(),
                language: Language::Hip,
            })?;

        let probe = PlatformProbe::new(ctx.runner, ctx.env, ctx.tool_timeout());
        let platform = probe.platform(
            name,
            overrides.platform.as_deref(),
            installed_root(found),
            ctx.toolchains.for_language(Language::Cuda).is_some(),
        )?;
        state.record_platform(platform.as_str());

        state.add_define("HAVE_HIP", "1");
        state.add_define("HAVE_CUPM", "1");
        match platform {
            HipPlatform::Nvidia => self.configure_nvidia(ctx, state)?,
            HipPlatform::Amd => self.configure_amd(ctx, &probe, found, state)?,
        }

        abi::check_precision(name, ctx.project().precision(), SUPPORTED_PRECISIONS)?;
        abi::check_consistency(
            name,
            ctx.runner,
            ctx.toolchains.host(),
            hipcc,
            ctx.compile_timeout(),
            overrides.known_align_double,
        )
    }
}

fn installed_root(found: &Found) -> Option<&Path> {
    (!found.dir.is_default()).then_some(found.dir.path.as_path())
}
