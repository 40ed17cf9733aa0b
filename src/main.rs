//! Confgraph CLI - closures, consolidation and relationship edits over
//! configuration databases

mod commands;

use clap::{Parser, Subcommand};
use confgraph::config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "confgraph")]
#[command(version)]
#[command(about = "Typed configuration object database - closures and consolidation")]
#[command(long_about = r#"
Confgraph loads a configuration database (schema and data files linked by
includes) and lets you:
  • List the transitive includes of a file
  • Compute the objects reachable from chosen roots
  • Extract a self-contained sub-configuration
  • Flatten, merge and copy data files
  • Validate not-null relationships and toggle disabled resources

Example usage:
  confgraph includes partitions/main.data.json
  confgraph closure partitions/main.data.json --root main@Session
  confgraph extract partitions/main.data.json --root seg-01@Segment -o seg.data.json
  confgraph disable partitions/main.data.json --session main@Session --resource hlt@Segment
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (default: ./confgraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the files a file includes, transitively unless --direct
    Includes {
        file: PathBuf,

        /// Only the includes written in the file itself
        #[arg(long)]
        direct: bool,
    },

    /// List every object reachable from the root objects
    Closure {
        file: PathBuf,

        /// Root object, as id@Class (repeatable)
        #[arg(short, long = "root", required = true)]
        roots: Vec<String>,
    },

    /// Write the closure of the roots to a new self-contained data file
    Extract {
        file: PathBuf,

        /// Root object, as id@Class (repeatable)
        #[arg(short, long = "root")]
        roots: Vec<String>,

        /// Data file whose objects are all roots (repeatable)
        #[arg(long = "data-root")]
        data_roots: Vec<PathBuf>,

        /// Schema file fixing the output's includes (repeatable)
        #[arg(long = "schema-root")]
        schema_roots: Vec<PathBuf>,

        /// Output file (default: timestamped name in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Consolidate everything a data file reaches into one file
    Flatten {
        file: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Combine the objects of several data files into one
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Copy data files and their data includes into a directory
    Copy {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Destination directory
        #[arg(short, long)]
        dest: PathBuf,
    },

    /// Report empty not-null relationships
    Validate {
        file: PathBuf,

        /// Only this object, as id@Class
        #[arg(short, long)]
        object: Option<String>,
    },

    /// Disable a resource in a session
    Disable {
        file: PathBuf,

        /// Object holding the disabled list, as id@Class
        #[arg(short, long)]
        session: String,

        /// Resource to disable, as id@Class
        #[arg(short, long)]
        resource: String,

        /// Relationship holding disabled resources
        #[arg(long)]
        relationship: Option<String>,
    },

    /// Re-enable a disabled resource in a session
    Enable {
        file: PathBuf,

        #[arg(short, long)]
        session: String,

        #[arg(short, long)]
        resource: String,

        #[arg(long)]
        relationship: Option<String>,
    },

    /// Show statistics about a database
    Stats { file: PathBuf },

    /// Write a default confgraph.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// JSON envelope wrapping a command's result
fn envelope(command: &str, error: Option<&str>, data: serde_json::Value) -> serde_json::Value {
    let mut envelope = serde_json::json!({
        "ok": error.is_none(),
        "command": command,
        "data": data,
    });
    if let Some(error) = error {
        envelope["error"] = serde_json::Value::from(error);
    }
    envelope
}

/// Print a `{"ok": true, "command": ..., "data": ...}` envelope in JSON mode
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode.is_human() {
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&envelope(command, None, data))?);
    Ok(())
}

/// Print an `"ok": false` envelope carrying the error in JSON mode
pub fn emit_failure(
    output_mode: OutputMode,
    command: &str,
    error: &str,
    data: serde_json::Value,
) -> anyhow::Result<()> {
    if output_mode.is_human() {
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&envelope(command, Some(error), data))?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if confgraph::output::is_quiet() || cli.json {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };

    if let Commands::Init { force } = cli.command {
        let path = cli.config.unwrap_or_else(config::default_config_path);
        return commands::run_init(output_mode, &path, force);
    }

    let loaded = config::load_config(cli.config.as_deref())?;
    if loaded.is_none() {
        tracing::debug!("no config file found, using defaults");
    }
    let ctx = commands::Context {
        config: loaded.unwrap_or_default(),
        output_mode,
    };

    let result = match cli.command {
        Commands::Includes { file, direct } => commands::run_includes(&ctx, &file, direct),
        Commands::Closure { file, roots } => commands::run_closure(&ctx, &file, &roots),
        Commands::Extract {
            file,
            roots,
            data_roots,
            schema_roots,
            output,
        } => commands::run_extract(&ctx, &file, &roots, &data_roots, &schema_roots, output),
        Commands::Flatten { file, output } => commands::run_flatten(&ctx, &file, &output),
        Commands::Merge { inputs, output } => commands::run_merge(&ctx, &inputs, &output),
        Commands::Copy { inputs, dest } => commands::run_copy(&ctx, &inputs, &dest),
        Commands::Validate { file, object } => commands::run_validate(&ctx, &file, object.as_deref()),
        Commands::Disable {
            file,
            session,
            resource,
            relationship,
        } => commands::run_toggle(&ctx, &file, &session, &resource, relationship.as_deref(), false),
        Commands::Enable {
            file,
            session,
            resource,
            relationship,
        } => commands::run_toggle(&ctx, &file, &session, &resource, relationship.as_deref(), true),
        Commands::Stats { file } => commands::run_stats(&ctx, &file),
        Commands::Init { .. } => Ok(()),
    };

    if let Err(e) = &result {
        if output_mode.is_human() {
            confgraph::ui::error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
    result
}
