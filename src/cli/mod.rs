//! CLI parser and command dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "consenso")]
#[command(about = "Multi-engine OCR field consensus pipeline for vehicle invoices")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, short = 't', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of
    /// config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose tracing
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if debug mode is enabled (for early logging setup).
pub fn is_debug() -> bool {
    std::env::args().any(|arg| arg == "-d" || arg == "--debug")
}

/// Stage to restart from when forcing reprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReprocessStage {
    /// Re-run OCR text extraction (full-text rows are superseded too).
    Text,
    /// Re-run field parsing over the stored texts.
    Fields,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Register intake PDFs as documents (state 1)
    Register,

    /// Run every configured OCR engine over registered documents (1 -> 2)
    ExtractText {
        /// Single document id
        #[arg(long)]
        id: Option<i64>,
        /// Process every eligible document
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Parse field candidates out of the stored texts (2 -> 3)
    ParseFields {
        /// Single document id
        #[arg(long, conflicts_with_all = ["all", "forzar_id"])]
        id: Option<i64>,
        /// Process every eligible document
        #[arg(long, aliases = ["procesar-todos", "procesar_todos"])]
        all: bool,
        /// Force re-parsing of one document, superseding its candidates
        #[arg(long, alias = "forzar_id", conflicts_with = "all")]
        forzar_id: Option<i64>,
    },

    /// Score unscored candidates with the per-field validators (3 -> 4)
    Score {
        /// Single document id
        #[arg(long)]
        id: Option<i64>,
        /// Process every eligible document
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Score candidates by cross-engine agreement (3 -> 4)
    Consensus {
        /// Single document id
        #[arg(long, required_unless_present = "all")]
        id: Option<i64>,
        /// Evaluate every document with pending candidates
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Reduce candidates to one value per field (4 -> 5)
    Consolidate {
        /// Consolidate only this document id
        #[arg(long, alias = "forzar_id")]
        forzar_id: Option<i64>,
        /// Consolidate only this field
        #[arg(long, alias = "solo_campo")]
        solo_campo: Option<String>,
    },

    /// Hand consolidated rows to the delivery target (5 -> 6)
    Deliver {
        /// Single document id
        #[arg(long)]
        id: Option<i64>,
        /// Process every eligible document
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Force reprocessing of one document from a given stage
    Reprocess {
        /// Document id
        #[arg(long)]
        id: i64,
        /// Stage to restart from
        #[arg(long, value_enum, default_value = "fields")]
        desde: ReprocessStage,
    },

    /// Show document counts per pipeline state
    Status,

    /// Run every stage in order over the current backlog
    Pipeline,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, _config) = load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
        use_cwd: cli.cwd,
        data: cli.data.clone(),
    })?;

    match cli.command {
        Commands::Init => commands::cmd_init(&settings),
        Commands::Register => commands::cmd_register(&settings),
        Commands::ExtractText { id, all } => commands::cmd_extract_text(&settings, scope(id, all)),
        Commands::ParseFields { id, all, forzar_id } => {
            commands::cmd_parse_fields(&settings, scope(id.or(forzar_id), all), forzar_id.is_some())
        }
        Commands::Score { id, all } => commands::cmd_score(&settings, scope(id, all)),
        Commands::Consensus { id, all } => {
            commands::cmd_consensus(&settings, scope(id, all), cli.debug)
        }
        Commands::Consolidate {
            forzar_id,
            solo_campo,
        } => commands::cmd_consolidate(&settings, forzar_id, solo_campo.as_deref()),
        Commands::Deliver { id, all } => commands::cmd_deliver(&settings, scope(id, all)),
        Commands::Reprocess { id, desde } => commands::cmd_reprocess(&settings, id, desde),
        Commands::Status => commands::cmd_status(&settings),
        Commands::Pipeline => commands::cmd_pipeline(&settings),
    }
}

/// `--id` beats `--all`; neither means "all eligible" for batch stages.
fn scope(id: Option<i64>, _all: bool) -> Option<i64> {
    id
}
