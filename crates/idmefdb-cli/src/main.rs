//! idmefdb command-line client
//!
//! A read-only query tool for IDMEF alert databases.

mod commands;
mod error;
mod formatter;

use clap::Parser;
use tracing::debug;

use idmefdb_core::{Db, DialectRegistry, QueryConfig, Settings, Sql};

use commands::Command;
use error::CliError;
use formatter::OutputFormat;

/// idmefdb command-line client
#[derive(Parser, Debug)]
#[command(name = "idmefdb")]
#[command(version, about = "Query IDMEF alert databases")]
pub struct Args {
    /// Connection settings, e.g. "type=sqlite file=/var/lib/idmef.db"
    #[arg(long)]
    pub settings: String,

    /// Database format, detected from the database when omitted
    #[arg(long = "db-format")]
    pub db_format: Option<String>,

    /// Offset from GMT in seconds for time criteria, local offset by default
    #[arg(long, allow_hyphen_values = true)]
    pub gmt_offset: Option<i32>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    match run(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<String, CliError> {
    let mut registry = DialectRegistry::new();
    idmefdb_sqlite::register(&mut registry);

    let mut config = QueryConfig::new();
    if let Some(offset) = args.gmt_offset {
        config = config.with_gmt_offset(offset);
    }

    let settings = Settings::parse(&args.settings)?;
    debug!(dialect = settings.dialect_type().unwrap_or_default(), "connecting");

    let sql = Sql::open(&registry, settings, config)?;
    let db = Db::new(sql, args.db_format.as_deref())?;

    let formatter = formatter::create_formatter(args.format);
    commands::execute(&db, &args.command, &*formatter)
}
