//! Built-in package recipes.
//!
//! A recipe is a [`PackageDescriptor`] plus whatever per-package behaviour
//! the generic resolver can't express: extra search directories, descriptor
//! tweaks for one installation, and post-link configuration.

mod hip;
mod matlab;
mod support;
mod thirdparty;

pub use hip::HipRecipe;
pub use matlab::MatlabRecipe;

use std::collections::BTreeMap;

use crate::core::descriptor::{DescriptorError, PackageDescriptor};
use crate::core::surface::ConfigurationState;
use crate::core::version::Version;
use crate::resolver::{Found, ResolveContext, ResolveError, SearchDir};

/// Per-package resolution behaviour.
pub trait Recipe: Send + Sync {
    /// The static declaration.
    fn descriptor(&self) -> &PackageDescriptor;

    /// Installation roots implied by tools on this host, searched after the
    /// user's directory and before the compiler defaults.
    fn derived_directories<'a>(
        &'a self,
        _ctx: &'a ResolveContext<'a>,
    ) -> Box<dyn Iterator<Item = SearchDir> + 'a> {
        Box::new(std::iter::empty())
    }

    /// Reject a directory before anything is probed in it.
    fn validate_directory(
        &self,
        _ctx: &ResolveContext<'_>,
        _dir: &SearchDir,
    ) -> Result<(), String> {
        Ok(())
    }

    /// Adjust the descriptor for one candidate directory.
    fn specialize(
        &self,
        _ctx: &ResolveContext<'_>,
        _dir: &SearchDir,
        _version: Option<&Version>,
        _desc: &mut PackageDescriptor,
    ) -> Result<(), ResolveError> {
        Ok(())
    }

    /// Runs after the package linked. Anything recorded here is discarded
    /// if this returns an error.
    fn configure(
        &self,
        _ctx: &ResolveContext<'_>,
        _found: &Found,
        _state: &mut ConfigurationState,
    ) -> Result<(), ResolveError> {
        Ok(())
    }
}

/// A recipe with no behaviour beyond its descriptor.
#[derive(Debug, Clone)]
pub struct DescriptorRecipe {
    descriptor: PackageDescriptor,
}

impl DescriptorRecipe {
    pub fn new(descriptor: PackageDescriptor) -> Self {
        DescriptorRecipe { descriptor }
    }
}

impl Recipe for DescriptorRecipe {
    fn descriptor(&self) -> &PackageDescriptor {
        &self.descriptor
    }
}

/// All known recipes, by package name.
pub struct RecipeRegistry {
    recipes: BTreeMap<String, Box<dyn Recipe>>,
}

impl RecipeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        RecipeRegistry {
            recipes: BTreeMap::new(),
        }
    }

    /// The recipes shipped with berth.
    pub fn builtin() -> Result<Self, DescriptorError> {
        let mut registry = RecipeRegistry::new();

        registry.register(HipRecipe::new()?);
        registry.register(MatlabRecipe::new()?);
        registry.register(thirdparty::SuperLuRecipe::new()?);
        registry.register(thirdparty::LibpngRecipe::new()?);
        registry.register(thirdparty::p4est()?);
        registry.register(thirdparty::random123()?);
        registry.register(thirdparty::OpenGlesRecipe::new()?);
        registry.register(support::zlib()?);
        registry.register(support::mathlib()?);
        registry.register(support::blaslapack()?);
        registry.register(support::MpiRecipe::new()?);

        Ok(registry)
    }

    /// Add or replace a recipe.
    pub fn register(&mut self, recipe: impl Recipe + 'static) {
        let name = recipe.descriptor().name.clone();
        self.recipes.insert(name, Box::new(recipe));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Recipe> {
        self.recipes.get(name).map(|r| r.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Package names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Recipe> {
        self.recipes.values().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl Default for RecipeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = RecipeRegistry::builtin().unwrap();
        for name in [
            "hip",
            "superlu",
            "libpng",
            "p4est",
            "random123",
            "opengles",
            "matlab",
            "zlib",
            "mathlib",
            "blaslapack",
            "mpi",
        ] {
            assert!(registry.contains(name), "missing recipe {}", name);
        }
    }

    #[test]
    fn test_builtin_dependencies_are_registered() {
        let registry = RecipeRegistry::builtin().unwrap();
        for recipe in registry.iter() {
            for dep in recipe.descriptor().all_deps() {
                assert!(
                    registry.contains(dep),
                    "{} depends on unknown {}",
                    recipe.descriptor().name,
                    dep
                );
            }
        }
    }
}
