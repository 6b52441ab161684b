//! The sexpand command-line interface.
//!
//! Thin orchestration over [`crate::engine::Pipeline`]: read files, pick the
//! options, run a pipeline entry point and hand the result to
//! [`output`] for printing. Exits with status 1 when anything was reported
//! as an error.

use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::{
    config::{ConfigError, ExpansionOptions},
    engine::Pipeline,
};

pub mod output;

/// Extension of the documents `check` picks up from directories.
pub const DOCUMENT_EXTENSION: &str = "sexp";

// ============================================================================
// CLI ARGUMENTS
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "sexpand",
    version,
    about = "Expands templates and includes in S-expression documents and checks their cross-references."
)]
pub struct SexpandArgs {
    #[command(subcommand)]
    pub command: ArgsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ArgsCommand {
    /// Parse a document and print it back.
    Parse {
        #[arg(required = true)]
        file: PathBuf,
        /// Print the node tree as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Process includes and expand templates.
    Expand {
        #[arg(required = true)]
        file: PathBuf,
        /// Print the node tree as JSON.
        #[arg(long)]
        json: bool,
        /// YAML file with expansion options.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Drop comments from the output.
        #[arg(long)]
        strip_comments: bool,
        /// Override the maximum expansion depth.
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Expand documents and check their cross-references.
    Check {
        /// Files, or directories searched for `.sexp` files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// YAML file with expansion options.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Failures outside the documents themselves.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("cannot read {}: {source}", .path.display())]
    #[diagnostic(code(sexpand::cli::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    #[diagnostic(code(sexpand::cli::config))]
    Config(#[from] ConfigError),
    #[error("cannot encode output as JSON: {0}")]
    #[diagnostic(code(sexpand::cli::json))]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

pub fn run() {
    init_tracing();
    let args = SexpandArgs::parse();

    let result = match args.command {
        ArgsCommand::Parse { file, json } => parse(&file, json),
        ArgsCommand::Expand {
            file,
            json,
            config,
            strip_comments,
            max_depth,
        } => load_options(config.as_deref()).and_then(|mut options| {
            if strip_comments {
                options.keep_comments = false;
            }
            if let Some(max_depth) = max_depth {
                options.max_expansion_depth = max_depth;
            }
            expand(&file, json, options)
        }),
        ArgsCommand::Check { paths, config } => {
            load_options(config.as_deref()).and_then(|options| check(&paths, options))
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(error) => {
            output::print_error(error);
            process::exit(1);
        }
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============================================================================
// COMMANDS
// ============================================================================
//
// Each returns Ok(false) when the documents had errors.

fn parse(file: &Path, json: bool) -> Result<bool, CliError> {
    let (id, text) = read(file)?;
    let processed = Pipeline::default().parse(&id, &text);
    output::print_reports(&id, &text, processed.errors.reports());
    output::print_nodes(&processed.nodes, json)?;
    Ok(!processed.errors.has_errors())
}

fn expand(file: &Path, json: bool, options: ExpansionOptions) -> Result<bool, CliError> {
    let (id, text) = read(file)?;
    let pipeline = Pipeline::new(options);
    let mut resolver = pipeline.file_resolver(file);
    let processed = pipeline.expand_with_includes(&id, &text, &mut resolver);
    output::print_reports(&id, &text, processed.errors.reports());
    output::print_nodes(&processed.nodes, json)?;
    Ok(!processed.errors.has_errors())
}

fn check(paths: &[PathBuf], options: ExpansionOptions) -> Result<bool, CliError> {
    let pipeline = Pipeline::new(options);
    let mut summary = output::Summary::default();
    for file in documents(paths) {
        let (id, text) = match read(&file) {
            Ok(document) => document,
            Err(error) => {
                output::print_error(error);
                summary.add_unreadable();
                continue;
            }
        };
        let mut resolver = pipeline.file_resolver(&file);
        let checked = pipeline.check(&id, &text, &mut resolver);
        debug!(%id, resolved = checked.resolved.len(), "checked");
        output::print_reports(&id, &text, checked.errors.reports());
        summary.add(&checked.errors);
    }
    output::print_summary(&summary);
    Ok(summary.errors == 0)
}

// ============================================================================
// HELPERS
// ============================================================================

fn load_options(config: Option<&Path>) -> Result<ExpansionOptions, CliError> {
    match config {
        Some(path) => Ok(ExpansionOptions::from_yaml_file(path)?),
        None => Ok(ExpansionOptions::default()),
    }
}

fn read(path: &Path) -> Result<(String, String), CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((path.to_string_lossy().into_owned(), text))
}

/// Files named directly, plus every `.sexp` file under named directories, in
/// a stable order.
fn documents(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let found = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|file| file.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION));
        files.extend(found);
    }
    files
}
