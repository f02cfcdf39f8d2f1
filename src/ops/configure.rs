//! The configure driver.
//!
//! Orders the requested recipes and everything they depend on, resolves
//! them one at a time, and merges each configured package into a single
//! [`FlagTable`]. A package only sees the packages configured before it.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::builder::toolchain::Toolchains;
use crate::core::surface::{ConfiguredPackage, FlagTable};
use crate::recipes::RecipeRegistry;
use crate::resolver::{ResolveContext, ResolveError, Resolver};
use crate::util::config::Config;
use crate::util::env::Environment;
use crate::util::process::ProbeRunner;

/// What to configure.
#[derive(Debug, Clone, Default)]
pub struct ConfigureOptions {
    /// Packages to configure. Empty means every known package, none required.
    pub packages: Vec<String>,
}

/// Outcome for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PackageOutcome {
    Configured,
    /// No candidate directory worked; the package is simply absent
    NotFound { searched: Vec<PathBuf> },
    /// A required dependency is absent
    Skipped { missing: String },
    /// Turned off by the user
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: PackageOutcome,
}

/// Result of a configure run.
#[derive(Debug, Clone)]
pub struct ConfigureReport {
    /// Per-package outcomes, in resolution order
    pub packages: Vec<PackageReport>,
    pub flags: FlagTable,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    packages: &'a [PackageReport],
    configured: &'a [ConfiguredPackage],
    defines: BTreeMap<String, String>,
    include_dirs: Vec<PathBuf>,
    link_flags: Vec<String>,
    device_flags: Vec<String>,
}

impl ConfigureReport {
    pub fn outcome(&self, name: &str) -> Option<&PackageOutcome> {
        self.packages
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.outcome)
    }

    pub fn configured(&self) -> &[ConfiguredPackage] {
        self.flags.packages()
    }

    /// Render the report and merged flags as JSON.
    pub fn to_json(&self) -> Result<String> {
        let report = JsonReport {
            packages: &self.packages,
            configured: self.flags.packages(),
            defines: self.flags.defines(),
            include_dirs: self.flags.include_dirs(),
            link_flags: self.flags.link_items().iter().map(|i| i.to_flag()).collect(),
            device_flags: self.flags.device_flags(),
        };
        serde_json::to_string_pretty(&report).context("failed to serialize configure report")
    }

    /// Write [`ConfigureReport::to_json`] to `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Everything a configure run reads.
pub struct ConfigureEnv<'a> {
    pub registry: &'a RecipeRegistry,
    pub toolchains: &'a Toolchains,
    pub runner: &'a dyn ProbeRunner,
    pub env: &'a Environment,
    pub config: &'a Config,
}

/// Configure the requested packages and their dependencies.
pub fn configure(opts: &ConfigureOptions, cx: &ConfigureEnv<'_>) -> Result<ConfigureReport> {
    let requested: Vec<String> = if opts.packages.is_empty() {
        cx.registry.names().map(str::to_string).collect()
    } else {
        opts.packages.clone()
    };
    for name in &requested {
        if !cx.registry.contains(name) {
            bail!(
                "unknown package `{}` (known packages: {})",
                name,
                cx.registry.names().collect::<Vec<_>>().join(", ")
            );
        }
    }

    let order = resolution_order(cx.registry, &requested)?;
    tracing::debug!("resolution order: {}", order.join(", "));

    let explicit = !opts.packages.is_empty();
    let mut table = FlagTable::new(cx.config.project.define_prefix());
    let mut reports: Vec<PackageReport> = Vec::with_capacity(order.len());

    for name in order {
        let Some(recipe) = cx.registry.get(&name) else {
            bail!("unknown package `{}`", name);
        };
        let overrides = cx.config.overrides(&name);
        let forced = overrides.is_forced() || (explicit && opts.packages.contains(&name));

        if overrides.is_disabled() {
            tracing::info!("{}: disabled", name);
            reports.push(PackageReport {
                name,
                outcome: PackageOutcome::Disabled,
            });
            continue;
        }

        let missing = recipe
            .descriptor()
            .required_deps
            .iter()
            .find(|dep| !table.is_configured(dep))
            .cloned();
        if let Some(missing) = missing {
            if forced {
                return Err(ResolveError::MissingDependency {
                    package: name,
                    dependency: missing,
                }
                .into());
            }
            tracing::info!("{}: skipped, {} is not available", name, missing);
            reports.push(PackageReport {
                name,
                outcome: PackageOutcome::Skipped { missing },
            });
            continue;
        }

        let result = {
            let ctx = ResolveContext {
                toolchains: cx.toolchains,
                runner: cx.runner,
                env: cx.env,
                config: cx.config,
                deps: &table,
            };
            Resolver::new(&ctx).resolve(recipe)
        };

        match result {
            Ok(configured) => {
                table.merge(configured);
                reports.push(PackageReport {
                    name,
                    outcome: PackageOutcome::Configured,
                });
            }
            Err(ResolveError::NotFound { tried, .. }) if !forced => {
                tracing::info!("{}: not found", name);
                reports.push(PackageReport {
                    name,
                    outcome: PackageOutcome::NotFound { searched: tried },
                });
            }
            Err(ResolveError::Toolchain { language, .. }) if !forced => {
                tracing::info!("{}: skipped, no {} compiler", name, language);
                reports.push(PackageReport {
                    name,
                    outcome: PackageOutcome::Skipped {
                        missing: format!("{} compiler", language),
                    },
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(ConfigureReport {
        packages: reports,
        flags: table,
    })
}

/// The requested packages and their transitive dependencies, dependencies first.
pub fn resolution_order(registry: &RecipeRegistry, requested: &[String]) -> Result<Vec<String>> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    let mut stack: Vec<String> = requested.to_vec();

    while let Some(name) = stack.pop() {
        if nodes.contains_key(&name) {
            continue;
        }
        let node = graph.add_node(name.clone());
        nodes.insert(name.clone(), node);

        let Some(recipe) = registry.get(&name) else {
            bail!("unknown package `{}`", name);
        };
        stack.extend(recipe.descriptor().all_deps().map(str::to_string));
    }

    for (name, &node) in &nodes {
        if let Some(recipe) = registry.get(name) {
            for dep in recipe.descriptor().all_deps() {
                if let Some(&dep_node) = nodes.get(dep) {
                    // dependency before dependent
                    graph.add_edge(dep_node, node, ());
                }
            }
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| {
        anyhow::anyhow!(
            "dependency cycle involving `{}`",
            graph[cycle.node_id()]
        )
    })?;
    Ok(sorted.into_iter().map(|n| graph[n].clone()).collect())
}
