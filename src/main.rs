// src/main.rs — browserpilot entry point

use clap::Parser;

use browserpilot::cli::{serve, Cli, Commands, ServeArgs};
use browserpilot::infra::config::Config;
use browserpilot::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = match cli.config {
        Some(ref path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Serve(args)) => serve::run_serve(config, args).await,
        None => serve::run_serve(config, ServeArgs::default()).await,
    }
}
