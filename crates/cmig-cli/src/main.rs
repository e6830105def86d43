use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use cmig_content::load_export;
use cmig_core::MappingStore;
use cmig_graph::{GraphBuilder, TreePrinter};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("cmig")
        .version(cmig_core::VERSION)
        .about("Content migration inspection tools")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("tree")
                .about("Print the dependency tree of an export directory")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Export directory"),
                )
                .arg(
                    Arg::new("mapping")
                        .long("mapping")
                        .value_parser(value_parser!(PathBuf))
                        .help("Mapping file; mapped references count as resolved"),
                ),
        )
        .subcommand(
            Command::new("mapping")
                .about("Summarize a mapping file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Mapping file"),
                )
                .arg(
                    Arg::new("list")
                        .long("list")
                        .action(ArgAction::SetTrue)
                        .help("Print every content item entry"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("tree", args)) => {
            let dir = args
                .get_one::<PathBuf>("dir")
                .context("missing export directory")?;
            tree(dir, args.get_one::<PathBuf>("mapping")).await
        }
        Some(("mapping", args)) => {
            let file = args
                .get_one::<PathBuf>("file")
                .context("missing mapping file")?;
            mapping(file, args.get_flag("list")).await
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

async fn tree(dir: &Path, mapping_file: Option<&PathBuf>) -> Result<()> {
    let export = load_export(dir)
        .await
        .with_context(|| format!("reading export {}", dir.display()))?;
    for skipped in &export.skipped {
        tracing::warn!("Skipped {}", skipped);
    }

    let mapping = match mapping_file {
        Some(path) => MappingStore::load(path).await,
        None => MappingStore::in_memory(),
    };

    let resolved = |id: &str| mapping.has_content_item(id);
    let graph = GraphBuilder::new().build(export.records, resolved);
    tracing::info!(
        "{} records, {} levels, {} circular",
        graph.len(),
        graph.levels().len(),
        graph.circular().len()
    );

    print!("{}", TreePrinter::new(&graph).with_resolver(&resolved));
    Ok(())
}

async fn mapping(file: &Path, list: bool) -> Result<()> {
    if !tokio::fs::try_exists(file).await.unwrap_or(false) {
        bail!("no mapping file at {}", file.display());
    }
    let store = MappingStore::load(file).await;

    println!("Mapping: {}", file.display());
    println!("  Content items: {}", store.content_item_count());
    println!("  Content types: {}", store.content_type_count());

    if list {
        for (old, new) in store.content_items() {
            println!("{old} -> {new}");
        }
    }
    Ok(())
}
