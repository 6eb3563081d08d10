//! pdfedit command line
//!
//! Upload PDFs, replace text in them with the original look preserved, and
//! talk to them in plain language:
//!
//! - `upload` / `list` / `show`: document registry
//! - `edit`: literal replacement against the latest version
//! - `chat`: free-form instructions, routed to an edit or an answer
//! - `spans` / `fonts`: inspect what the engine sees

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pdfedit_assist::{OpenAiDelegate, TextDelegate, UnavailableDelegate};
use pdfedit_core::FontLibrary;
use pdfedit_service::{EditService, JsonDocumentStore, ServiceConfig, StorageProvider};
use tracing::{debug, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

/// Command-line arguments for pdfedit
#[derive(Parser, Debug)]
#[command(name = "pdfedit", version)]
#[command(about = "Replace text in PDFs without changing how it looks")]
struct Args {
    /// Directory of .ttf/.otf files used to re-embed original fonts
    #[arg(long, global = true)]
    fonts_dir: Option<PathBuf>,

    /// JSON file holding the document registry
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Store artifacts in this local directory instead of the configured backend
    #[arg(long, global = true)]
    storage_dir: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a PDF and store its original
    Upload { file: PathBuf },

    /// List registered documents
    List,

    /// Show a document's record and current text
    Show { document: String },

    /// Replace literal text in the latest version of a document
    Edit {
        document: String,
        original: String,
        replacement: String,
    },

    /// Send an instruction or question; without one, start an interactive session
    Chat {
        document: String,
        instruction: Option<String>,
    },

    /// List text spans of a registered document or a PDF file
    Spans {
        source: String,
        /// Only this page (1-based)
        #[arg(long)]
        page: Option<usize>,
        /// Only spans containing this text
        #[arg(long)]
        contains: Option<String>,
    },

    /// Show how font names resolve to substitutes and library fonts
    Fonts {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn build_delegate(config: &ServiceConfig) -> Arc<dyn TextDelegate> {
    match &config.llm.api_key {
        Some(key) => Arc::new(
            OpenAiDelegate::new(key.clone())
                .with_model(&config.llm.model)
                .with_base_url(&config.llm.base_url),
        ),
        None => Arc::new(UnavailableDelegate::new("OPENAI_API_KEY is not set")),
    }
}

/// Environment configuration with command-line overrides applied
fn load_config(args: &Args) -> anyhow::Result<ServiceConfig> {
    let mut config = ServiceConfig::from_env().context("Invalid configuration")?;
    if let Some(dir) = &args.fonts_dir {
        config.fonts_dir = dir.clone();
    }
    if let Some(file) = &args.state_file {
        config.state_file = file.clone();
    }
    if let Some(dir) = &args.storage_dir {
        config.storage.provider = StorageProvider::Local;
        config.storage.bucket = dir.clone();
    }
    debug!("Storage provider: {:?}", config.storage.provider);
    Ok(config)
}

async fn build_service(config: &ServiceConfig) -> anyhow::Result<EditService> {
    let artifacts = config
        .storage
        .build_artifact_store()
        .context("Failed to set up artifact storage")?;
    let documents = JsonDocumentStore::open(&config.state_file)
        .await
        .with_context(|| format!("Failed to open {}", config.state_file.display()))?;
    let fonts = FontLibrary::scan(&config.fonts_dir);
    info!(
        "Loaded {} fonts from {}",
        fonts.len(),
        config.fonts_dir.display()
    );

    Ok(EditService::new(
        Arc::new(artifacts),
        Arc::new(documents),
        build_delegate(config),
        Arc::new(fonts),
    )
    .with_history_turns(config.history_turns))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    if let Command::Fonts { names } = &args.command {
        let library = FontLibrary::scan(&config.fonts_dir);
        return commands::fonts(&library, names, args.json);
    }

    let service = build_service(&config).await?;
    match &args.command {
        Command::Upload { file } => commands::upload(&service, file, args.json).await,
        Command::List => commands::list(&service, args.json).await,
        Command::Show { document } => commands::show(&service, document, args.json).await,
        Command::Edit {
            document,
            original,
            replacement,
        } => commands::edit(&service, document, original, replacement, args.json).await,
        Command::Chat {
            document,
            instruction: Some(instruction),
        } => commands::chat_once(&service, document, instruction, args.json).await,
        Command::Chat {
            document,
            instruction: None,
        } => commands::chat_session(&service, document).await,
        Command::Spans {
            source,
            page,
            contains,
        } => commands::spans(&service, source, *page, contains.as_deref(), args.json).await,
        Command::Fonts { .. } => Ok(()),
    }
}
