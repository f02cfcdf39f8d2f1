//! `berth show` command

use anyhow::{bail, Result};

use berth::core::descriptor::VersionSource;
use berth::RecipeRegistry;

use crate::cli::ShowArgs;

pub fn execute(args: ShowArgs) -> Result<()> {
    let registry = RecipeRegistry::builtin()?;
    let Some(recipe) = registry.get(&args.package) else {
        bail!(
            "unknown package `{}`\nhelp: run `berth list` to see the available packages",
            args.package
        );
    };
    let desc = recipe.descriptor();

    println!("{} ({})", desc.display_name, desc.name);
    println!("  Define:     {}", desc.have_define());
    println!("  Language:   {}", desc.link_language);

    if let Some(ref min) = desc.min_version {
        println!("  Minimum:    {}", min);
    }
    match &desc.version_source {
        Some(VersionSource::Header { includes, macros }) => {
            println!("  Version:    {} from {}", macros.join(", "), includes.join(" or "));
        }
        Some(VersionSource::Tool { program, .. }) => {
            println!("  Version:    reported by {}", program.display());
        }
        None => {}
    }
    if desc.requires_version {
        println!("              (required)");
    }

    if !desc.header_candidates.is_empty() {
        println!("  Headers:    {}", desc.header_candidates.join(" "));
    }
    if !desc.required_headers.is_empty() {
        println!("  Headers:    {} (all required)", desc.required_headers.join(" "));
    }
    if !desc.required_symbols.is_empty() {
        println!("  Symbols:    {}", desc.required_symbols.join(" "));
    }
    for (i, set) in desc.library_sets.iter().enumerate() {
        let label = if i == 0 { "Libraries:" } else { "" };
        println!("  {:10}  {}", label, set);
    }
    if desc.is_header_only() {
        println!("  Libraries:  none (header only)");
    }
    if !desc.required_deps.is_empty() {
        println!("  Requires:   {}", desc.required_deps.join(", "));
    }
    if !desc.optional_deps.is_empty() {
        println!("  Optional:   {}", desc.optional_deps.join(", "));
    }

    Ok(())
}
