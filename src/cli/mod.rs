// src/cli/mod.rs — CLI definition (clap derive)

pub mod serve;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "browserpilot",
    about = "Session-affine browser automation service",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service (default)
    Serve(ServeArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ServeArgs {
    /// Override `server.host`
    #[arg(long)]
    pub host: Option<String>,

    /// Override `server.port`
    #[arg(long)]
    pub port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::parse_from(["browserpilot"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from([
            "browserpilot",
            "serve",
            "--port",
            "9000",
            "--config",
            "/tmp/bp.toml",
        ]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/bp.toml"));
        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.port, Some(9000));
                assert_eq!(args.host, None);
            }
            _ => panic!("expected serve"),
        }
    }
}
