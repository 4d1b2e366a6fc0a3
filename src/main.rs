//! planmark CLI entry point.

use clap::Parser;
use planmark::cli::commands;
use planmark::cli::{Cli, Commands};
use planmark::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
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
            2 => EnvFilter::new("debug,notify=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let project = cli.project.as_deref();

    match &cli.command {
        Commands::Init { plan_root, force } => {
            commands::init::execute(project, plan_root, *force, json)
        }

        // Documents
        Commands::Index { path } => commands::index::execute(project, path.as_deref(), json),
        Commands::Outline { path } => commands::index::outline(project, path, json),
        Commands::Resolve(args) => commands::resolve::execute(project, args, json),

        // Records
        Commands::Annotate { command } => commands::annotate::execute(command, project, json),
        Commands::Cycle { command } => commands::cycle::execute(command, project, json),
        Commands::Node { command } => commands::node::execute(command, project, json),

        Commands::Watch => commands::watch::execute(project),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
