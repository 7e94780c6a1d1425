use blocksmith::bundle::Bundle;
use blocksmith::config::{self, BundleConfig};
use blocksmith::output;
use blocksmith::types::BlockKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blocksmith")]
#[command(about = "Incremental builder for pages assembled from reusable blocks")]
#[command(long_about = "\
Incremental builder for pages assembled from reusable blocks

A bundle is a directory with a config.json listing source directories and the
pages to build. Each page and block is a directory of template, stylesheet,
script and attachment files; templates pull in other blocks with #block-id#
placeholders.

Bundle structure:

  my-bundle/
  ├── config.json                  # Bundle config (source dirs, anchors, pages)
  ├── index.json                   # Compile index (fingerprints, dependencies)
  ├── index.html                   # Navigation map of compiled pages
  ├── pages/                       # Compiled pages
  ├── blocks/                      # Compiled blocks
  └── src/
      ├── pages/home/home.html     # Page template: #css-block# #menu#
      ├── blocks/menu/menu.html    # Block template
      ├── blocks/menu/menu.css
      ├── blocks/menu/dark/        # Variant, used as #menu_dark#
      └── attach/                  # Files referenced as _attach/<path>

Only pages whose sources (or dependencies) changed since the last compile are
rebuilt. Run 'blocksmith gen-config' to print a stock config.json.")]
#[command(version)]
struct Cli {
    /// Bundle directory
    #[arg(long, default_value = ".", global = true)]
    bundle: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new bundle
    Init {
        /// Page sources, relative to the bundle
        #[arg(long, default_value = "src/pages")]
        pages_dir: PathBuf,
        /// Block sources, relative to the bundle
        #[arg(long, default_value = "src/blocks")]
        blocks_dir: PathBuf,
        /// Files referenced from templates as _attach/<path>
        #[arg(long, default_value = "src/attach")]
        attach_dir: PathBuf,
        /// Merge CSS and minify JS
        #[arg(long)]
        compression: bool,
    },
    /// Compile every page whose sources changed
    Compile,
    /// Forget all compile results so the next compile rebuilds everything
    ResetIndex,
    /// Delete compiled pages and blocks
    Clear,
    /// Show index fields of a compiled page or block
    Info {
        /// `page` or `block`
        #[arg(value_parser = parse_kind)]
        kind: BlockKind,
        id: String,
        /// Field to show (repeatable); `actual` reports freshness
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
    },
    /// Edit the page list
    Pages {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Edit the attachment ignore patterns
    Ignore {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Print a stock config.json
    GenConfig,
}

#[derive(Subcommand)]
enum ListAction {
    Add { items: Vec<String> },
    Remove { items: Vec<String> },
}

fn parse_kind(s: &str) -> Result<BlockKind, String> {
    BlockKind::parse(s).ok_or_else(|| format!("expected `page` or `block`, got `{s}`"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init {
            pages_dir,
            blocks_dir,
            attach_dir,
            compression,
        } => {
            let mut config = BundleConfig::new(pages_dir, blocks_dir, attach_dir);
            config.compression = compression;
            Bundle::create(&cli.bundle, config)?;
        }
        Command::Compile => {
            let mut bundle = Bundle::open(&cli.bundle)?;
            println!("==> Compiling {}", bundle.root().display());
            let report = bundle.compile()?;
            output::print_compile_output(&report);
        }
        Command::ResetIndex => {
            Bundle::open(&cli.bundle)?.reset_index()?;
            println!("Index cleared");
        }
        Command::Clear => {
            Bundle::open(&cli.bundle)?.clear_compilation()?;
            println!("Compiled pages and blocks removed");
        }
        Command::Info { kind, id, fields } => {
            let bundle = Bundle::open(&cli.bundle)?;
            output::print_info(&bundle.info(kind, &id, &fields)?);
        }
        Command::Pages { action } => {
            let mut bundle = Bundle::open(&cli.bundle)?;
            match action {
                ListAction::Add { items } => bundle.add_pages(&items)?,
                ListAction::Remove { items } => bundle.remove_pages(&items)?,
            }
            println!("Pages: {}", bundle.config().pages.join(", "));
        }
        Command::Ignore { action } => {
            let mut bundle = Bundle::open(&cli.bundle)?;
            match action {
                ListAction::Add { items } => bundle.add_ignore(&items)?,
                ListAction::Remove { items } => bundle.remove_ignore(&items)?,
            }
            println!("Ignore: {}", bundle.config().ignore.join(", "));
        }
        Command::GenConfig => {
            println!("{}", config::stock_config_json());
        }
    }

    Ok(())
}
