//! The processing pipeline.
//!
//! Parse → include → strip comments → collect templates → expand → check
//! references. Each entry point runs a prefix of these stages and hands back
//! the nodes together with everything that was reported along the way;
//! reports never stop a stage early.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::config::ExpansionOptions;
use crate::errors::ErrorCollector;
use crate::include::{include_source, FileIncludeResolver, IncludeResolver};
use crate::macros::{standard_macros, strip_templates, Expander, Macro};
use crate::references::{check_references, Resolved};
use crate::syntax::{parse_from, Node, NodeBuilder, SExpression, StripComments};

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// Nodes produced by a pipeline run and the reports made while producing them.
#[derive(Debug, Default)]
pub struct Processed {
    pub nodes: Vec<Node>,
    pub errors: ErrorCollector,
}

/// A fully expanded document and its matched cross-references.
#[derive(Debug, Default)]
pub struct Checked {
    pub nodes: Vec<Node>,
    pub resolved: Vec<Resolved>,
    pub errors: ErrorCollector,
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: ExpansionOptions,
}

impl Pipeline {
    pub fn new(options: ExpansionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExpansionOptions {
        &self.options
    }

    /// Parses `text` without transforming it.
    pub fn parse(&self, origin: &str, text: &str) -> Processed {
        let mut errors = ErrorCollector::new();
        let mut builder = NodeBuilder::new();
        parse_from(origin, text, None, self.options.max_nesting_depth, &mut builder, &mut errors);
        let nodes = builder.into_nodes();
        debug!(%origin, nodes = nodes.len(), reports = errors.reports().len(), "parsed");
        Processed { nodes, errors }
    }

    /// Expands `text` as a self-contained document. Include forms are left to
    /// the expander like any other form.
    pub fn expand_source(&self, origin: &str, text: &str) -> Processed {
        let Processed { nodes, mut errors } = self.parse(origin, text);
        let nodes = self.expand_nodes(&nodes, &mut errors);
        Processed { nodes, errors }
    }

    /// Expands the root document `id`, with its includes fetched through
    /// `resolver`.
    pub fn expand_with_includes(
        &self,
        id: &str,
        text: &str,
        resolver: &mut dyn IncludeResolver,
    ) -> Processed {
        let mut errors = ErrorCollector::new();
        let included = include_source(
            id,
            text,
            self.options.max_nesting_depth,
            resolver,
            &mut errors,
        );
        debug!(%id, nodes = included.len(), "includes processed");
        let nodes = self.expand_nodes(&included, &mut errors);
        Processed { nodes, errors }
    }

    /// Expands the root document `id` and checks its cross-references.
    pub fn check(&self, id: &str, text: &str, resolver: &mut dyn IncludeResolver) -> Checked {
        let Processed { nodes, mut errors } = self.expand_with_includes(id, text, resolver);
        let resolved = check_references(&nodes, &self.options.scopes, &mut errors);
        Checked {
            nodes,
            resolved,
            errors,
        }
    }

    /// Reads and expands a file, resolving includes on disk.
    pub fn expand_file(&self, path: &Path) -> io::Result<Processed> {
        let (id, text, mut resolver) = self.open(path)?;
        Ok(self.expand_with_includes(&id, &text, &mut resolver))
    }

    /// Reads, expands and checks a file, resolving includes on disk.
    pub fn check_file(&self, path: &Path) -> io::Result<Checked> {
        let (id, text, mut resolver) = self.open(path)?;
        Ok(self.check(&id, &text, &mut resolver))
    }

    /// The include resolver for a file on disk. Includes are taken from
    /// `include_root` when set, otherwise from the file's own directory.
    pub fn file_resolver(&self, path: &Path) -> FileIncludeResolver {
        let root = match &self.options.include_root {
            Some(root) => root.clone(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        FileIncludeResolver::new(root)
    }

    fn open(&self, path: &Path) -> io::Result<(String, String, FileIncludeResolver)> {
        let text = std::fs::read_to_string(path)?;
        let id = path.to_string_lossy().into_owned();
        Ok((id, text, self.file_resolver(path)))
    }

    /// Comment filtering, template collection and expansion.
    fn expand_nodes(&self, nodes: &[Node], errors: &mut ErrorCollector) -> Vec<Node> {
        let mut filtered = StripComments::new(NodeBuilder::new(), self.options.keep_comments);
        nodes.accept(&mut filtered);
        let filtered = filtered.into_inner().into_nodes();

        let mut stripped = NodeBuilder::new();
        let templates = strip_templates(&filtered, &mut stripped, errors);
        let stripped = stripped.into_nodes();
        debug!(templates = templates.len(), "templates collected");

        let mut expander =
            Expander::new(errors).with_max_depth(self.options.max_expansion_depth);
        if self.options.builtin_macros {
            expander.register_all(standard_macros());
        }
        for template in templates {
            trace!(name = template.name(), location = %template.location(), "registering template");
            expander.register(Box::new(template));
        }
        let expanded = expander.expand_nodes(&stripped);
        debug!(nodes = expanded.len(), "expanded");
        expanded
    }
}
