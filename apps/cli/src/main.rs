mod args;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warehouse_app::{AppState, ShredInput, ShredRequest};

use crate::args::{Cli, Command, ShredArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level)
            .with_context(|| format!("invalid log level: {}", cli.log_level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = config::load(cli.config.as_deref())?;
    let state = AppState::new(config);
    state
        .setup_db()
        .with_context(|| format!("initialize {}", state.config.db_path.display()))?;

    match cli.command {
        Command::Migrate => {
            info!(path = %state.config.db_path.display(), "Database is up to date");
        }
        Command::Shred(args) => {
            let request = shred_request(args);
            let summary = state.services.shred.run(&request)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Ingest(range) => {
            state.services.ingest.run(range.start, range.end)?;
        }
        Command::Aggregate(args) => {
            state
                .services
                .aggregate
                .run(args.range.start, args.range.end, args.append)?;
        }
    }
    Ok(())
}

fn shred_request(args: ShredArgs) -> ShredRequest {
    let input = match (args.dir, args.input) {
        (_, Some(file)) => ShredInput::File(file),
        (Some(dir), None) => ShredInput::Directory(dir),
        // clap requires one of the two
        (None, None) => ShredInput::Directory(".".into()),
    };
    ShredRequest {
        truncate: args.truncate,
        ingest_all: args.ingest_all,
        repair_node_cpu_counts: args.repair,
        error_report: args.error_report,
        ..ShredRequest::new(args.format, args.resource, input)
    }
}
