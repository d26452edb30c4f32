mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crucible-cli")]
#[command(about = "Crucible CLI - Run code in sandboxed containers and manage language images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file in a sandbox
    Run {
        /// Language name (e.g., python, java, cpp)
        #[arg(short, long)]
        language: String,

        /// Source file to execute
        file: PathBuf,

        /// File whose contents are fed to the program's stdin
        #[arg(short, long)]
        stdin: Option<PathBuf>,

        /// Wall-clock limit in milliseconds
        #[arg(short, long, default_value = "5000")]
        timeout_ms: u64,

        /// CPU limit in cores
        #[arg(long, default_value = "0.5")]
        cpu: f64,

        /// Memory limit in MB
        #[arg(short, long, default_value = "256")]
        memory_mb: u64,

        /// Print the full result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List supported languages
    Languages,

    /// Pull language images ahead of time
    Pull {
        /// Only this language (defaults to all)
        #[arg(short, long)]
        language: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so program output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            file,
            stdin,
            timeout_ms,
            cpu,
            memory_mb,
            json,
        } => {
            let options = commands::RunOptions {
                language,
                file,
                stdin,
                timeout_ms,
                cpu,
                memory_mb,
                json,
            };
            let code = commands::run(&options).await?;
            std::process::exit(code);
        }
        Commands::Languages => {
            commands::list_languages();
        }
        Commands::Pull { language } => {
            commands::pull_images(language.as_deref()).await?;
        }
    }

    Ok(())
}
