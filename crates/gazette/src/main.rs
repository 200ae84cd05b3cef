//! Gazette CLI - build single-page sites for static hosting.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use gazette_bundler::ModuleFormat;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "gazette")]
#[command(about = "Build single-page sites for static hosting")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to gazette.toml config file
    #[arg(short, long, default_value = "gazette.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default gazette.toml
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        yes: bool,
    },

    /// Build the site (default)
    Build {
        /// Output directory (defaults to config or "dist")
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip minification
        #[arg(long)]
        no_minify: bool,

        /// Script module format
        #[arg(long, value_enum)]
        format: Option<Format>,
    },

    /// Preview a built site
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Directory to serve
        #[arg(short, long, default_value = "dist")]
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Esm,
    Iife,
}

impl From<Format> for ModuleFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Esm => ModuleFormat::Esm,
            Format::Iife => ModuleFormat::Iife,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let command = cli.command.unwrap_or(Commands::Build {
        output: None,
        no_minify: false,
        format: None,
    });

    match command {
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes).await?;
        }
        Commands::Build {
            output,
            no_minify,
            format,
        } => {
            let overrides = config::Overrides {
                output,
                minify: if no_minify { Some(false) } else { None },
                format: format.map(ModuleFormat::from),
            };
            commands::build::run(&cli.config, overrides).await?;
        }
        Commands::Serve { port, dir } => {
            commands::serve::run(port, dir).await?;
        }
    }

    Ok(())
}
