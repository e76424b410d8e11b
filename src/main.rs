use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipbook::config::{AppConfig, CliConfig, FileConfig};
use clipbook::convert::{ConversionEngine, EpubBookWriter, ExtractingBookBuilder, ReadableExtractor};
use clipbook::ingest::{IngestEngine, IngestSource};
use clipbook::item_store::{SqliteItemStore, SCHEMA_VERSION};

const DEFAULT_CONFIG_FILENAME: &str = "clipbook.toml";

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(name = "clipbook", about = "Collect article links and bundle them into EPUBs.")]
struct CliArgs {
    /// Path to the SQLite item database file.
    #[clap(long, value_parser = parse_path)]
    db_path: Option<PathBuf>,

    /// Path to a TOML config file (defaults to ./clipbook.toml when present).
    #[clap(long, value_parser = parse_path)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest candidate links into the item database.
    Ingest {
        /// A single links or capture-queue file.
        #[clap(long, value_parser = parse_path, conflicts_with_all = ["input_dir", "vault"])]
        links_file: Option<PathBuf>,

        /// A directory of .md/.json files, ingested incrementally.
        #[clap(long, value_parser = parse_path, conflicts_with = "vault")]
        input_dir: Option<PathBuf>,

        /// A note vault to scan for Markdown clippings.
        #[clap(long, value_parser = parse_path)]
        vault: Option<PathBuf>,

        /// Parse and validate without writing anything.
        #[clap(long)]
        dry_run: bool,
    },

    /// Convert pending items into a new EPUB artifact.
    Convert {
        /// Directory to place the finished artifact in.
        #[clap(long, value_parser = parse_path)]
        output_dir: Option<PathBuf>,

        /// Directory for URL-batch audit snapshots.
        #[clap(long, value_parser = parse_path)]
        staging_dir: Option<PathBuf>,
    },

    /// Open the item database and apply any pending schema migrations.
    Migrate,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILENAME);
            if default.exists() {
                Some(FileConfig::load(default)?)
            } else {
                None
            }
        }
    };

    let mut cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        ..Default::default()
    };
    match &cli_args.command {
        Command::Ingest { input_dir, vault, .. } => {
            cli_config.input_path = input_dir.clone();
            cli_config.clippings_path = vault.clone();
        }
        Command::Convert {
            output_dir,
            staging_dir,
        } => {
            cli_config.output_path = output_dir.clone();
            cli_config.staging_path = staging_dir.clone();
        }
        Command::Migrate => {}
    }
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening item database at {:?}...", config.db_path);
    let store = SqliteItemStore::open(&config.db_path)?;

    match cli_args.command {
        Command::Migrate => {
            // Opening the store already ran the migration chain.
            info!("Item database ready at schema version {}", SCHEMA_VERSION);
        }
        Command::Ingest {
            links_file,
            input_dir,
            vault,
            dry_run,
        } => {
            // Paths below were validated during config resolution.
            let source = if let Some(file) = links_file {
                IngestSource::File(file)
            } else if input_dir.is_some() {
                IngestSource::Directory(config.input_path.clone().unwrap())
            } else if vault.is_some() {
                IngestSource::Vault(config.clippings_path.clone().unwrap())
            } else if let Some(input) = &config.input_path {
                IngestSource::Directory(input.clone())
            } else if let Some(vault) = &config.clippings_path {
                IngestSource::Vault(vault.clone())
            } else {
                bail!(
                    "No ingest source: pass --links-file, --input-dir, or --vault, \
                     or set input_path/clippings_path in the config file"
                );
            };
            let report = IngestEngine::new(&store, dry_run).run(&source)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Convert { .. } => {
            let output_dir = config.output_dir()?.to_path_buf();
            let staging_dir = config.staging_dir()?;
            let builder = ExtractingBookBuilder::new(ReadableExtractor::new()?, EpubBookWriter);
            let engine = ConversionEngine::new(&store, builder);
            let outcome = engine.convert_pending(&output_dir, &staging_dir)?;
            match &outcome.artifact_path {
                Some(path) => println!(
                    "Created {} with {} of {} items ({} failed)",
                    path.display(),
                    outcome.converted,
                    outcome.candidates,
                    outcome.failed
                ),
                None if outcome.candidates == 0 => println!("Nothing to convert."),
                None => println!(
                    "No artifact created; all {} items failed to convert",
                    outcome.failed
                ),
            }
        }
    }
    Ok(())
}
