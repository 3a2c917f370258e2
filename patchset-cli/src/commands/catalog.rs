//! `patchset catalog upsert|get|list|delete`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use patchset_core::{Catalog, FileCatalog, PluginDescriptor, PluginGroup};

/// Manage the plugin catalog at `~/.patchset/catalog.yaml`.
#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Insert or replace a plugin descriptor.
    Upsert(UpsertArgs),

    /// Show one plugin descriptor.
    Get(GetArgs),

    /// List every plugin, sorted by name.
    List(ListArgs),

    /// Remove a plugin. Unknown names are not an error.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct UpsertArgs {
    /// Plugin name; the catalog key.
    pub name: String,

    #[arg(long)]
    pub version: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Command group: run | manage | build | observe | system | version | admin | extra.
    #[arg(long, default_value = "run")]
    pub group: PluginGroup,

    /// Alternative command names. Repeatable.
    #[arg(long = "alias")]
    pub aliases: Vec<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub name: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub name: String,
}

pub fn run(cmd: CatalogCommand) -> Result<()> {
    let mut catalog = FileCatalog::open().context("failed to open plugin catalog")?;
    match cmd {
        CatalogCommand::Upsert(args) => upsert(&mut catalog, args),
        CatalogCommand::Get(args) => get(&catalog, args),
        CatalogCommand::List(args) => list(&catalog, args),
        CatalogCommand::Delete(args) => delete(&mut catalog, args),
    }
}

fn upsert(catalog: &mut FileCatalog, args: UpsertArgs) -> Result<()> {
    // Fields the CLI does not expose survive a re-upsert.
    let mut plugin = catalog
        .get(&args.name)
        .unwrap_or_else(|| PluginDescriptor::new(&args.name, &args.version));
    plugin.version = args.version;
    plugin.description = args.description;
    plugin.group = args.group;
    plugin.aliases = args.aliases;

    catalog
        .upsert(plugin)
        .with_context(|| format!("failed to save plugin '{}'", args.name))?;
    println!("✓ Saved plugin '{}' to {}", args.name, catalog.path().display());
    Ok(())
}

fn get(catalog: &FileCatalog, args: GetArgs) -> Result<()> {
    let plugin = catalog
        .get(&args.name)
        .with_context(|| format!("plugin '{}' not found in catalog", args.name))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plugin).context("failed to serialize plugin JSON")?
        );
        return Ok(());
    }

    println!("{}", serde_yaml::to_string(&plugin).context("failed to render plugin")?);
    Ok(())
}

#[derive(Tabled)]
struct PluginRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "group")]
    group: String,
    #[tabled(rename = "aliases")]
    aliases: String,
    #[tabled(rename = "description")]
    description: String,
}

fn list(catalog: &FileCatalog, args: ListArgs) -> Result<()> {
    let plugins = catalog.list();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plugins).context("failed to serialize catalog JSON")?
        );
        return Ok(());
    }

    if plugins.is_empty() {
        println!("No plugins in catalog.");
        println!("Run: patchset catalog upsert <name> --version <version>");
        return Ok(());
    }

    let rows: Vec<PluginRow> = plugins
        .into_iter()
        .map(|p| PluginRow {
            name: p.name,
            version: p.version,
            group: p.group.to_string(),
            aliases: p.aliases.join(", "),
            description: p.description,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn delete(catalog: &mut FileCatalog, args: DeleteArgs) -> Result<()> {
    let existed = catalog.get(&args.name).is_some();
    catalog
        .delete(&args.name)
        .with_context(|| format!("failed to delete plugin '{}'", args.name))?;
    if existed {
        println!("✓ Deleted plugin '{}'", args.name);
    } else {
        println!("Plugin '{}' was not in the catalog; nothing to do.", args.name);
    }
    Ok(())
}
