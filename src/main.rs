use clap::Parser;
use kubediag::{cli::Cli, config, run_command};
use std::process;

/// Target unreachable, configuration or usage error.
const EXIT_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    process::exit(run().await);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging();

    // Load configuration
    let config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return EXIT_ERROR;
        }
    };

    // Execute command
    match run_command(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    }
}
