//! Core data structures for berth.
//!
//! This module contains the foundational types used throughout berth:
//! - Package descriptors and library names
//! - Versions
//! - Per-resolution configuration state and the merged flag table

pub mod descriptor;
pub mod language;
pub mod surface;
pub mod version;

pub use descriptor::{LibraryName, LibrarySet, PackageDescriptor, VersionSource};
pub use language::Language;
pub use surface::{ConfigurationState, ConfiguredPackage, Define, FlagTable, LinkItem};
pub use version::Version;
