//! Grafter CLI
//!
//! Runs the identifier-resolution pipeline on local files:
//! - `build`: raw records to a surrogate-id graph (all stages)
//! - `merge`, `hash-ids`, `sort-dict`, `join-edges`: one stage at a time
//! - `load`: raw records into an in-memory graph store, saved as a snapshot
//! - `lookup`: surrogate ids back to raw ids

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod options;

use options::{InputArgs, KeyArg, PipelineArgs};

#[derive(Parser)]
#[command(name = "grafter")]
#[command(author, version, about = "Grafter: distributed graph id resolution")]
struct Cli {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Raw records to `vertices/`, `edges/` and both dictionary directions.
    Build {
        #[command(flatten)]
        input: InputArgs,
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
        /// Write the run report (counters included) as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Tokenize and deduplicate raw records into vertex and edge lists.
    Merge {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Assign surrogate ids to a vertex list.
    ///
    /// Writes renamed vertices to `<out>/vertices` and dictionary entries to
    /// `<out>/entries`.
    HashIds {
        /// Vertex list file or directory
        vertices: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Shard dictionary entries into one file per partition.
    SortDict {
        /// Dictionary entry file or directory (`surrogateId<TAB>rawId`)
        entries: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        /// Shard by this column (defaults to the config's `dictionary_key`)
        #[arg(long, value_enum)]
        key: Option<KeyArg>,
    },

    /// Rewrite both endpoints of an edge list to surrogate ids.
    JoinEdges {
        /// Edge list file or directory
        edges: PathBuf,
        /// Dictionary directory sharded by raw id
        #[arg(long)]
        dictionary: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Load raw records into an in-memory graph store and save a snapshot.
    Load {
        #[command(flatten)]
        input: InputArgs,
        /// Snapshot file to write
        #[arg(long)]
        snapshot: PathBuf,
        /// JSON label schema the store enforces
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Translate surrogate ids back to raw ids.
    Lookup {
        /// Dictionary directory sharded by surrogate id
        #[arg(long)]
        dictionary: PathBuf,
        /// Surrogate ids
        #[arg(required = true)]
        ids: Vec<u64>,
    },
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.pipeline.resolve()?;
    match cli.command {
        Commands::Build { input, out, report } => {
            commands::build(config, &input, &out, report.as_deref())
        }
        Commands::Merge { input, out } => commands::merge(config, &input, &out),
        Commands::HashIds { vertices, out } => commands::hash_ids(config, &vertices, &out),
        Commands::SortDict { entries, out, key } => {
            let key = key.map(Into::into).unwrap_or(config.dictionary_key);
            commands::sort_dict(config, &entries, &out, key)
        }
        Commands::JoinEdges {
            edges,
            dictionary,
            out,
        } => commands::join_edges(config, &edges, &dictionary, &out),
        Commands::Load {
            input,
            snapshot,
            schema,
        } => commands::load(config, &input, &snapshot, schema.as_deref()),
        Commands::Lookup { dictionary, ids } => commands::lookup(config, &dictionary, ids),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(commands::exit_code(&err))
        }
    }
}
