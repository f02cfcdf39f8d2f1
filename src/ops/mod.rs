//! High-level operations.
//!
//! This module contains the implementation of berth commands.

pub mod configure;
pub mod platform;

pub use configure::{
    configure, resolution_order, ConfigureEnv, ConfigureOptions, ConfigureReport, PackageOutcome,
    PackageReport,
};
pub use platform::{detect_platform, PlatformReport};
