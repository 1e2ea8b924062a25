//! # pkb
//!
//! Command-line shell for the personal knowledge-base client: uploads files
//! and follows their classification, asks questions, searches documents,
//! manages collections and shows category statistics.
//!
//! ```bash
//! pkb upload ./notes.md ./scan.pdf
//! pkb status 7f1c2a
//! pkb ask "Where are my tax documents?" --category Finance
//! pkb search "invoice" --category Finance --top-k 5
//! pkb collections create Taxes --description "Returns and receipts"
//! pkb categories
//! ```

mod commands;
mod events;
mod state;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use tracing_subscriber::EnvFilter;

use state::AppState;

#[derive(Parser)]
#[command(
    name = "pkb",
    about = "Upload documents to the personal knowledge base and query it",
    version
)]
struct Cli {
    /// Path to the client configuration (JSON).
    ///
    /// Defaults to `<config_dir>/pkb/client.json`; built-in defaults are used
    /// when that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging. `RUST_LOG` takes precedence when set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files and follow them until classification finishes.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Query the processing status of an uploaded document once.
    Status {
        /// Content id returned by the upload.
        content_id: String,
    },

    /// Ask a question about the knowledge base.
    Ask {
        question: String,

        /// Restrict the answer to one category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Show the questions and answers of the current session.
    History,

    /// Rate an answer.
    Feedback {
        /// Id of the answer, as printed by `pkb ask`.
        qa_id: String,

        /// `good` or `bad`.
        rating: String,
    },

    /// Forget the current QA session; the next question starts a new one.
    NewSession,

    /// Show document counts per category, or list one category's documents.
    Categories {
        /// Category to list.
        name: Option<String>,

        /// Text to search for within the category.
        #[arg(long, requires = "name")]
        query: Option<String>,

        /// Maximum number of documents to list.
        #[arg(long, default_value_t = pkb_client::api::client::DEFAULT_CATEGORY_TOP_K)]
        top_k: u32,
    },

    /// Search across all documents.
    Search(SearchCommand),

    /// Manage user-defined collections.
    Collections {
        #[command(subcommand)]
        action: Option<CollectionAction>,
    },
}

#[derive(Args)]
struct SearchCommand {
    query: String,

    /// Maximum number of hits.
    #[arg(long, default_value_t = pkb_client::api::models::DEFAULT_SEARCH_TOP_K)]
    top_k: u32,

    /// `keyword`, `semantic` or `hybrid`. Defaults to the configured QA search type.
    #[arg(long)]
    mode: Option<String>,

    /// Only documents in this category. Repeat for several.
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Only documents in this collection. Repeat for several.
    #[arg(long = "collection")]
    collections: Vec<String>,
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List collections with their document counts (the default).
    List,

    /// Create a collection.
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Do not let the backend file matching uploads into it.
        #[arg(long)]
        no_auto_match: bool,
    },

    /// Rename a collection or change its description.
    Update {
        /// Id or name of the collection.
        collection: String,

        #[arg(long, required_unless_present = "description")]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a collection. Its documents are kept.
    Delete {
        /// Id or name of the collection.
        collection: String,
    },

    /// List the documents of a collection.
    Contents {
        /// Id or name of the collection.
        collection: String,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already set, skipping initialization");
        return;
    }

    // Library code logs through both `log` and `tracing`.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
}

async fn run(cli: Cli) -> pkb_client::Result<()> {
    let config = pkb_client::load_config_or_default(cli.config.as_deref())?;
    let state = AppState::new(config)?;

    match cli.command {
        Commands::Upload { files } => commands::upload::upload(&state, files).await,
        Commands::Status { content_id } => commands::status::status(&state, &content_id).await,
        Commands::Ask { question, category } => {
            commands::qa::ask(&state, &question, category.as_deref()).await
        }
        Commands::History => commands::qa::history(&state).await,
        Commands::Feedback { qa_id, rating } => {
            commands::qa::feedback(&state, &qa_id, &rating).await
        }
        Commands::NewSession => commands::qa::new_session(),
        Commands::Categories { name, query, top_k } => match name {
            Some(name) => {
                commands::categories::documents(&state, &name, query.as_deref(), top_k).await
            }
            None => commands::categories::stats(&state).await,
        },
        Commands::Search(search) => {
            let args = commands::search::SearchArgs {
                query: search.query,
                top_k: search.top_k,
                mode: search.mode,
                categories: search.categories,
                collections: search.collections,
            };
            commands::search::search(&state, args).await
        }
        Commands::Collections { action } => {
            run_collections(&state, action.unwrap_or(CollectionAction::List)).await
        }
    }
}

async fn run_collections(state: &AppState, action: CollectionAction) -> pkb_client::Result<()> {
    use commands::collections;

    match action {
        CollectionAction::List => collections::list(state).await,
        CollectionAction::Create {
            name,
            description,
            no_auto_match,
        } => collections::create(state, &name, description.as_deref(), !no_auto_match).await,
        CollectionAction::Update {
            collection,
            name,
            description,
        } => {
            collections::update(state, &collection, name.as_deref(), description.as_deref()).await
        }
        CollectionAction::Delete { collection } => collections::delete(state, &collection).await,
        CollectionAction::Contents { collection } => {
            collections::contents(state, &collection).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("pkb v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
