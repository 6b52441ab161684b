//! User-facing output for the CLI.
//!
//! Documents go to stdout; diagnostics and the summary go to stderr, so the
//! output of `parse` and `expand` can be piped on.

use std::io::Write;

use miette::{NamedSource, Report};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::errors::{ErrorCollector, SexpError};
use crate::syntax::Node;

use super::CliError;

/// Prints nodes one top-level form per line, or as a JSON array.
pub fn print_nodes(nodes: &[Node], json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(nodes)?);
        return Ok(());
    }
    for node in nodes {
        match node {
            // Comments print their own line end.
            Node::Comment(_) => print!("{node}"),
            _ => println!("{node}"),
        }
    }
    Ok(())
}

/// Renders each report against the document it was found in.
pub fn print_reports(id: &str, text: &str, reports: &[SexpError]) {
    for report in reports {
        let report =
            Report::new(report.clone()).with_source_code(NamedSource::new(id, text.to_string()));
        eprintln!("{report:?}");
    }
}

pub fn print_error(error: CliError) {
    let report = Report::new(error);
    eprintln!("{report:?}");
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub files: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl Summary {
    pub fn add(&mut self, errors: &ErrorCollector) {
        self.files += 1;
        self.errors += errors.error_count();
        self.warnings += errors.warning_count();
    }

    /// Counts a file that could not be read as one error.
    pub fn add_unreadable(&mut self) {
        self.files += 1;
        self.errors += 1;
    }
}

pub fn print_summary(summary: &Summary) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let color = if summary.errors > 0 {
        Color::Red
    } else if summary.warnings > 0 {
        Color::Yellow
    } else {
        Color::Green
    };
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
    let _ = writeln!(
        stderr,
        "checked {} file{}: {} error{}, {} warning{}",
        summary.files,
        plural(summary.files),
        summary.errors,
        plural(summary.errors),
        summary.warnings,
        plural(summary.warnings),
    );
    let _ = stderr.reset();
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
