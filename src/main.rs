//! spkg CLI
//!
//! Entry point for the spkg command-line application.

use clap::Parser;

use spkg::cli::output::display_error;
use spkg::cli::Cli;

fn main() {
    let cli = Cli::parse();
    let output = cli.output_config();

    // Initialize tracing subscriber; RUST_LOG takes precedence over -v/-q
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_directive())),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the command and handle errors
    match cli.run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
