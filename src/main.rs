//! Stuart CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use stuart::cli::commands;
use stuart::cli::{Cli, Commands};
use stuart::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if let Some(hint) = e.hint() {
                eprintln!("Error: {e}\n  Hint: {hint}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let actor = cli.actor.as_deref();

    match &cli.command {
        Commands::Init {
            name,
            language,
            description,
        } => commands::init::execute(name, *language, description.as_deref(), db, actor, cli.json),
        Commands::Render { root } => commands::render::execute(root.as_ref(), db, actor, cli.json),
        Commands::Extract { root } => commands::extract::execute(root.as_ref(), db, actor, cli.json),
        Commands::Tree => commands::tree::execute(db, cli.json),
        Commands::Status { root } => commands::status::execute(root.as_ref(), db, cli.json),
    }
}
