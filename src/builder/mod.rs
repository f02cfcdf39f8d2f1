//! Compiler drivers for probe programs.
//!
//! This module knows how to invoke each toolchain and how to write, compile
//! and link the small programs the resolver uses to test an installation.

pub mod probe;
pub mod toolchain;

pub use probe::{Probe, ProbeFlags};
pub use toolchain::{
    detect_toolchains, CommandSpec, GccToolchain, Toolchain, ToolchainPlatform, Toolchains,
};
