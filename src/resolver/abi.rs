//! Host/device compiler consistency.
//!
//! Data crosses between code built by the host C compiler and code built by
//! a device compiler (hipcc, nvcc). Both must agree on pointer size and on
//! the layout of structs holding doubles. Sizes are found with compile-only
//! probes that fail on a negative array size, so nothing is ever executed
//! and cross compilers work.

use std::time::Duration;

use crate::builder::probe::{self, Probe, ProbeFlags};
use crate::builder::toolchain::Toolchain;
use crate::core::language::Language;
use crate::resolver::errors::{AbiCheck, ResolveError, ResolveStage};
use crate::util::config::Precision;
use crate::util::process::ProbeRunner;

/// Candidate sizes for `void *`.
pub const POINTER_CANDIDATES: &[usize] = &[8, 4];

/// Candidate sizes for [`TESTSTRUCT`].
pub const STRUCT_CANDIDATES: &[usize] = &[16, 12];

/// A struct whose size depends on how the compiler aligns doubles.
pub const TESTSTRUCT: &str = "typedef struct {double a; int b;} teststruct;\n";

/// Sizes measured with one compiler. `None` means no candidate matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbiFacts {
    pub pointer_size: Option<usize>,
    pub teststruct_size: Option<usize>,
}

/// Determine `sizeof(type_name)` by trying each candidate in turn.
pub fn probe_sizeof(
    runner: &dyn ProbeRunner,
    compiler: &dyn Toolchain,
    timeout: Duration,
    type_name: &str,
    prelude: &str,
    candidates: &[usize],
) -> Option<usize> {
    let mut probe = Probe::new(runner, compiler, timeout);
    let source = probe::sizeof_source(type_name, prelude);
    let stem = format!("sizeof_{}", type_name.replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

    let size = candidates.iter().copied().find(|&n| {
        let flags = ProbeFlags::default().with_define(probe::CHECK_SIZE_MACRO, n.to_string());
        probe.compile(&stem, &source, &flags).succeeded()
    });

    match size {
        Some(n) => tracing::debug!(
            "sizeof({}) is {} with {}",
            type_name,
            n,
            compiler.compiler_path().display()
        ),
        None => tracing::warn!(
            "unable to determine sizeof({}) with {}",
            type_name,
            compiler.compiler_path().display()
        ),
    }
    size
}

/// Measure the facts for one compiler.
///
/// The struct is only measured when `with_struct` is set.
pub fn measure(
    runner: &dyn ProbeRunner,
    compiler: &dyn Toolchain,
    timeout: Duration,
    with_struct: bool,
) -> AbiFacts {
    let pointer_size = probe_sizeof(runner, compiler, timeout, "void *", "", POINTER_CANDIDATES);
    let teststruct_size = if with_struct {
        probe_sizeof(runner, compiler, timeout, "teststruct", TESTSTRUCT, STRUCT_CANDIDATES)
    } else {
        None
    };
    AbiFacts {
        pointer_size,
        teststruct_size,
    }
}

/// Apply the consistency policy to facts measured with both compilers.
///
/// `known_align_double` is the user's declaration: `Some(true)` accepts any
/// struct size difference, `Some(false)` is rejected outright because the
/// project needs matching alignment.
pub fn compare(
    package: &str,
    language: Language,
    host: &AbiFacts,
    device: &AbiFacts,
    known_align_double: Option<bool>,
) -> Result<(), ResolveError> {
    check_fact(package, language, AbiCheck::PointerSize, host.pointer_size, device.pointer_size)?;

    match known_align_double {
        Some(true) => Ok(()),
        Some(false) => Err(align_declared_incompatible(package)),
        None => check_fact(
            package,
            language,
            AbiCheck::DoubleAlignment,
            host.teststruct_size,
            device.teststruct_size,
        ),
    }
}

/// Run the probes and apply [`compare`].
pub fn check_consistency(
    package: &str,
    runner: &dyn ProbeRunner,
    host: &dyn Toolchain,
    device: &dyn Toolchain,
    timeout: Duration,
    known_align_double: Option<bool>,
) -> Result<(), ResolveError> {
    if known_align_double == Some(false) {
        return Err(align_declared_incompatible(package));
    }

    let with_struct = known_align_double.is_none();
    let device_facts = measure(runner, device, timeout, with_struct);
    let host_facts = measure(runner, host, timeout, with_struct);
    compare(
        package,
        device.language(),
        &host_facts,
        &device_facts,
        known_align_double,
    )
}

/// Check that the project precision is one the package supports.
pub fn check_precision(
    package: &str,
    precision: Precision,
    supported: &[Precision],
) -> Result<(), ResolveError> {
    if supported.contains(&precision) {
        return Ok(());
    }
    Err(ResolveError::UnsupportedPrecision {
        package: package.to_string(),
        precision: precision.as_str().to_string(),
        supported: supported.iter().map(|p| p.as_str().to_string()).collect(),
    })
}

fn check_fact(
    package: &str,
    language: Language,
    check: AbiCheck,
    host: Option<usize>,
    device: Option<usize>,
) -> Result<(), ResolveError> {
    match (host, device) {
        (Some(h), Some(d)) if h == d => Ok(()),
        _ => Err(ResolveError::AbiMismatch {
            package: package.to_string(),
            check,
            language,
            host: describe(host),
            device: describe(device),
        }),
    }
}

fn describe(size: Option<usize>) -> String {
    size.map(|n| n.to_string())
        .unwrap_or_else(|| "undeterminable".to_string())
}

fn align_declared_incompatible(package: &str) -> ResolveError {
    ResolveError::InvalidOverride {
        package: package.to_string(),
        key: format!("known-{}-align-double", package),
        value: "0".to_string(),
        reason: "device double alignment must match the C compiler".to_string(),
        stage: ResolveStage::Abi,
    }
}
