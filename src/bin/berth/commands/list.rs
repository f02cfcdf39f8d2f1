//! `berth list` command

use anyhow::Result;

use berth::RecipeRegistry;

use crate::cli::ListArgs;

pub fn execute(args: ListArgs) -> Result<()> {
    let registry = RecipeRegistry::builtin()?;

    let width = registry.names().map(str::len).max().unwrap_or(0);
    for recipe in registry.iter() {
        let desc = recipe.descriptor();
        let min = desc
            .min_version
            .as_ref()
            .map(|v| format!(" (>= {})", v))
            .unwrap_or_default();
        println!("{:width$}  {}{}", desc.name, desc.display_name, min, width = width);

        if args.deps {
            if !desc.required_deps.is_empty() {
                println!(
                    "{:width$}    requires: {}",
                    "",
                    desc.required_deps.join(", "),
                    width = width
                );
            }
            if !desc.optional_deps.is_empty() {
                println!(
                    "{:width$}    optional: {}",
                    "",
                    desc.optional_deps.join(", "),
                    width = width
                );
            }
        }
    }

    Ok(())
}
