//! Arbor CLI
//!
//! Command-line interface for Arbor - hierarchical notes.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use arbor_core::{Config, LinkPreviewSource, NoPreviews, Store, StoreOptions, TextKind};

mod commands;
mod output;
mod preview;

use output::{Output, OutputFormat};
use preview::FlagPreview;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Arbor - hierarchical notes in a single document")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tree
    Tree {
        /// Only print the subtree under this node
        root: Option<String>,
    },
    /// Show node details
    Show {
        /// Node ID (full, prefix, path, master or trash)
        id: String,
    },
    /// Add a node
    Add {
        #[command(subcommand)]
        command: AddCommands,
    },
    /// Move a node under a new parent
    #[command(name = "mv", alias = "move")]
    Move {
        /// Node to move
        id: String,
        /// New parent
        parent: String,
        /// Insert before this sibling instead of at the end
        #[arg(short, long)]
        before: Option<String>,
    },
    /// Swap two nodes' positions
    Swap { a: String, b: String },
    /// Make a node the last child of its previous sibling
    Indent { id: String },
    /// Make a node the next sibling of its parent
    Outdent { id: String },
    /// Switch a node between text, heading and quote
    Retype {
        id: String,
        /// text, heading or quote
        kind: TextKind,
    },
    /// Permanently remove a node and everything under it
    #[command(name = "rm", alias = "remove")]
    Remove { id: String },
    /// Move a node to the Trash
    Trash { id: String },
    /// Permanently remove everything in the Trash
    EmptyTrash,
    /// Print the path of a node
    Path { id: String },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// List stored files
    Files,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum AddCommands {
    /// Add a text node
    Text { parent: String, text: String },
    /// Add a heading node
    Heading { parent: String, text: String },
    /// Add a quote node
    Quote { parent: String, text: String },
    /// Add a math node
    Math { parent: String, expression: String },
    /// Create a directory path like /projects/arbor
    Dir { path: String },
    /// Import an image file
    Image { parent: String, path: PathBuf },
    /// Add a link anchor
    Anchor {
        parent: String,
        url: String,
        /// Page title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Page description
        #[arg(short, long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
enum TagCommands {
    /// List all tags
    #[command(alias = "ls")]
    List,
    /// Create a tag
    Create {
        name: String,
        /// Color such as #ff9800
        #[arg(short, long)]
        color: Option<String>,
    },
    /// Tag a node (creates the tag if needed)
    Add { id: String, tag: String },
    /// Remove a tag from a node
    Remove { id: String, tag: String },
    /// Delete a tag everywhere
    #[command(alias = "rm")]
    Delete { tag: String },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, save_delay_ms, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    let previews: Arc<dyn LinkPreviewSource> = match &cli.command {
        Commands::Add {
            command:
                AddCommands::Anchor {
                    title, description, ..
                },
        } => Arc::new(FlagPreview::new(title.clone(), description.clone())),
        _ => Arc::new(NoPreviews),
    };

    let store = Store::open_with(StoreOptions::from_config(&config).with_previews(previews))
        .await
        .context("Failed to open library")?;
    debug!("Opened library at {}", store.location());

    let result = run(cli.command, &store, &output).await;

    // Always write what the command changed, even when it failed midway
    let closed = store.close().await.context("Failed to save library");
    result?;
    closed
}

async fn run(command: Commands, store: &Store, output: &Output) -> Result<()> {
    match command {
        Commands::Tree { root } => commands::node::tree(store, root, output),
        Commands::Show { id } => commands::node::show(store, id, output),
        Commands::Add { command } => handle_add_command(command, store, output).await,
        Commands::Move { id, parent, before } => {
            commands::node::mv(store, id, parent, before, output)
        }
        Commands::Swap { a, b } => commands::node::swap(store, a, b, output),
        Commands::Indent { id } => commands::node::indent(store, id, output),
        Commands::Outdent { id } => commands::node::outdent(store, id, output),
        Commands::Retype { id, kind } => commands::node::retype(store, id, kind, output),
        Commands::Remove { id } => commands::node::rm(store, id, output).await,
        Commands::Trash { id } => commands::node::trash(store, id, output),
        Commands::EmptyTrash => commands::node::empty_trash(store, output).await,
        Commands::Path { id } => commands::node::path(store, id, output),
        Commands::Tag { command } => handle_tag_command(command, store, output),
        Commands::Files => commands::files::list(store, output),
        Commands::Config { command } => handle_config_command(command, output),
    }
}

async fn handle_add_command(command: AddCommands, store: &Store, output: &Output) -> Result<()> {
    use commands::node;

    match command {
        AddCommands::Text { parent, text } => {
            node::add_text(store, parent, TextKind::Text, text, output)
        }
        AddCommands::Heading { parent, text } => {
            node::add_text(store, parent, TextKind::Heading, text, output)
        }
        AddCommands::Quote { parent, text } => {
            node::add_text(store, parent, TextKind::Quote, text, output)
        }
        AddCommands::Math { parent, expression } => {
            node::add_math(store, parent, expression, output)
        }
        AddCommands::Dir { path } => node::add_dir(store, path, output),
        AddCommands::Image { parent, path } => node::add_image(store, parent, path, output).await,
        AddCommands::Anchor { parent, url, .. } => {
            node::add_anchor(store, parent, url, output).await
        }
    }
}

fn handle_tag_command(command: TagCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        TagCommands::List => commands::tag::list(store, output),
        TagCommands::Create { name, color } => commands::tag::create(store, name, color, output),
        TagCommands::Add { id, tag } => commands::tag::add(store, id, tag, output),
        TagCommands::Remove { id, tag } => commands::tag::remove(store, id, tag, output),
        TagCommands::Delete { tag } => commands::tag::delete(store, tag, output),
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Initialize logging to stderr, or to `log_file` when configured
///
/// `ARBOR_LOG` overrides the filter derived from `--verbose`.
fn init_logging(config: &Config, verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_env("ARBOR_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!("arbor_core={},arbor_cli={}", log_level, log_level))
    });

    if let Some(ref log_path) = config.log_file {
        match File::options().create(true).append(true).open(log_path) {
            Ok(log_file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(log_file)
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
