mod cache;
mod commands;
mod config;
mod diagnostics;
mod document;
mod error;
mod extractor;
mod resolver;
mod scanner;
mod types;
mod validator;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "citecheck",
    about = "Citation validation and content extraction for markdown corpora"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the anchors a document exposes
    Anchors {
        /// Document to inspect
        file: PathBuf,
    },
    /// Validate all citations in a source document
    Check {
        /// Source document to validate
        source: PathBuf,
        /// Vault root for vault-absolute and fallback resolution
        #[arg(long)]
        scope: Option<PathBuf>,
        /// Emit the result record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate, then extract and deduplicate referenced content
    Extract {
        /// Source document whose citations are extracted
        source: PathBuf,
        /// Vault root for vault-absolute and fallback resolution
        #[arg(long)]
        scope: Option<PathBuf>,
        /// Make whole-file links extraction-eligible
        #[arg(long)]
        full_files: bool,
        /// Emit the result record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rewrite fragile or broken citations that have a confident correction
    Fix {
        /// Source document to rewrite
        source: PathBuf,
        /// Vault root for vault-absolute and fallback resolution
        #[arg(long)]
        scope: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Anchors { file } => commands::anchors(file).await.map(|()| ExitCode::SUCCESS),
        Commands::Check { source, scope, json } => {
            commands::check(source, scope.as_deref(), *json).await
        },
        Commands::Extract { source, scope, full_files, json } => {
            commands::extract(source, scope.as_deref(), *full_files, *json).await
        },
        Commands::Fix { source, scope } => {
            commands::fix(source, scope.as_deref()).await.map(|()| ExitCode::SUCCESS)
        },
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::FAILURE
        },
    }
}
