//! berth - dependency configuration resolver for large native builds
//!
//! This crate decides, per external dependency, whether a usable
//! installation exists and what defines, include paths and link flags the
//! build needs to use it. Every fact is established by probing: running the
//! vendor's tools and compiling and linking small test programs.

pub mod builder;
pub mod core;
pub mod ops;
pub mod recipes;
pub mod resolver;
pub mod util;

/// Test utilities and mocks for berth unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted probe runner and fake
/// installation trees.
#[cfg(test)]
pub mod test_support;

pub use core::{
    descriptor::PackageDescriptor,
    surface::{ConfiguredPackage, FlagTable},
    version::Version,
};

pub use recipes::{Recipe, RecipeRegistry};
pub use resolver::{ResolveContext, ResolveError, Resolver};
