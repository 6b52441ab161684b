//! Include processing.
//!
//! Three forms are intercepted:
//!
//! - `(include target)` is replaced by the nodes of the target document.
//! - `(include-modules target)` is replaced by the top-level `(~module ...)`
//!   forms of the target only. Anything the target includes in turn is
//!   filtered the same way.
//! - `(no-include ...)` is replaced by its contents in the root document and
//!   dropped from included ones.
//!
//! Included text is parsed with every location chained onto the include site.
//! Including a document that is already being included is reported, except
//! among module includes, where the cycle is skipped quietly.
//!
//! Fetching text is left to an [`IncludeResolver`]; this module only runs the
//! protocol.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

use crate::errors::{ErrorHandler, ErrorKind, SexpError};
use crate::macros::{Cutout, Cutter};
use crate::syntax::{parse_from, Node, NodeBuilder, SExpression, Seq, SexpVisitor, MAX_NESTING_DEPTH};

pub const INCLUDE: &str = "include";
pub const INCLUDE_MODULES: &str = "include-modules";
pub const NO_INCLUDE: &str = "no-include";
pub const MODULE: &str = "~module";

// ============================================================================
// RESOLVERS
// ============================================================================

#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("the include names no document")]
    NoTarget,
    #[error("there is no document called {0}")]
    NotFound(String),
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Supplies included documents.
pub trait IncludeResolver {
    /// Turns an include form into the id of the document it names.
    fn convert(&mut self, include: &Seq) -> Result<String, IncludeError> {
        include_target(include).map(str::to_string)
    }

    /// The text of the document with the given id.
    fn resolve(&mut self, id: &str) -> Result<String, IncludeError>;
}

/// The first positional atom of an include form, skipping keyword arguments.
pub fn include_target(include: &Seq) -> Result<&str, IncludeError> {
    let mut args = include.tail();
    while let Some(arg) = args.next() {
        let Some(atom) = arg.as_atom() else {
            continue;
        };
        if atom.keyword().is_some() {
            args.next();
            continue;
        }
        return Ok(atom.value.as_str());
    }
    Err(IncludeError::NoTarget)
}

/// Documents held in memory, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct MapIncludeResolver {
    documents: HashMap<String, String>,
}

impl MapIncludeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(id.into(), text.into());
    }
}

impl IncludeResolver for MapIncludeResolver {
    fn resolve(&mut self, id: &str) -> Result<String, IncludeError> {
        self.documents
            .get(id)
            .cloned()
            .ok_or_else(|| IncludeError::NotFound(id.to_string()))
    }
}

/// Documents on disk. Relative targets are taken from `root`.
#[derive(Debug, Clone)]
pub struct FileIncludeResolver {
    root: PathBuf,
}

impl FileIncludeResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl IncludeResolver for FileIncludeResolver {
    fn convert(&mut self, include: &Seq) -> Result<String, IncludeError> {
        let target = include_target(include)?;
        Ok(self.root.join(target).to_string_lossy().into_owned())
    }

    fn resolve(&mut self, id: &str) -> Result<String, IncludeError> {
        fs::read_to_string(id).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => IncludeError::NotFound(id.to_string()),
            _ => IncludeError::Io {
                path: PathBuf::from(id),
                source,
            },
        })
    }
}

// ============================================================================
// THE INCLUDER
// ============================================================================

/// A document currently being replayed.
#[derive(Debug)]
struct Included {
    id: String,
    modules_only: bool,
}

/// Cutter that replaces include forms with the documents they name.
pub struct Includer<'a> {
    resolver: &'a mut dyn IncludeResolver,
    errors: &'a mut dyn ErrorHandler,
    root: Option<String>,
    max_nesting: usize,
    /// One entry per replacement being replayed; `None` for a spliced
    /// `no-include`.
    stack: Vec<Option<Included>>,
}

impl<'a> Includer<'a> {
    pub fn new(resolver: &'a mut dyn IncludeResolver, errors: &'a mut dyn ErrorHandler) -> Self {
        Self {
            resolver,
            errors,
            root: None,
            max_nesting: MAX_NESTING_DEPTH,
            stack: Vec::new(),
        }
    }

    /// Names the root document, so that including it is caught as a cycle.
    pub fn with_root(mut self, id: impl Into<String>) -> Self {
        self.root = Some(id.into());
        self
    }

    /// Nesting limit for the text of included documents.
    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// Replays `input` into `output` with every include form processed.
    pub fn process<S: SExpression + ?Sized>(&mut self, input: &S, output: &mut dyn SexpVisitor) {
        let mut cutout = Cutout::new(&mut *self, output);
        input.accept(&mut cutout);
        cutout.finish();
    }

    fn included(&self) -> impl Iterator<Item = &Included> {
        self.stack.iter().flatten()
    }

    fn in_root(&self) -> bool {
        self.included().next().is_none()
    }

    fn filtering_modules(&self) -> bool {
        self.included().any(|i| i.modules_only)
    }

    fn is_active(&self, id: &str) -> bool {
        self.root.as_deref() == Some(id) || self.included().any(|i| i.id == id)
    }

    fn include(&mut self, node: &Node, seq: &Seq, modules_only: bool) -> Option<Box<dyn SExpression>> {
        let unresolvable = |error: IncludeError| {
            SexpError::at_node(
                ErrorKind::UnresolvableInclude {
                    reason: error.to_string(),
                },
                node,
            )
        };

        let id = match self.resolver.convert(seq) {
            Ok(id) => id,
            Err(error) => {
                self.errors.handle(unresolvable(error));
                return None;
            }
        };

        if self.is_active(&id) {
            if !self.filtering_modules() {
                self.errors
                    .handle(SexpError::at_node(ErrorKind::RecursiveInclude { source_id: id }, node));
            } else {
                trace!(%id, "skipping module cycle");
            }
            return None;
        }

        let text = match self.resolver.resolve(&id) {
            Ok(text) => text,
            Err(error) => {
                self.errors.handle(unresolvable(error));
                return None;
            }
        };

        trace!(%id, site = %node.location(), modules_only, "including");
        let mut builder = NodeBuilder::new();
        parse_from(
            &id,
            &text,
            Some(node.location()),
            self.max_nesting,
            &mut builder,
            self.errors,
        );
        let mut nodes = builder.into_nodes();
        if modules_only {
            nodes.retain(survives_module_filter);
        }

        self.stack.push(Some(Included { id, modules_only }));
        Some(Box::new(nodes))
    }
}

/// Top-level forms kept from a module include. Nested includes are kept so
/// that their own modules can be found.
fn survives_module_filter(node: &Node) -> bool {
    matches!(
        node.as_seq().and_then(Seq::head_name),
        Some(MODULE | INCLUDE | INCLUDE_MODULES)
    )
}

impl Cutter for Includer<'_> {
    type Buffer = NodeBuilder;

    fn cut(&mut self, head: &str) -> Option<NodeBuilder> {
        matches!(head, INCLUDE | INCLUDE_MODULES | NO_INCLUDE).then(NodeBuilder::new)
    }

    fn paste(&mut self, buffer: NodeBuilder) -> Option<Box<dyn SExpression>> {
        let node = buffer.into_node()?;
        let seq = node.as_seq()?;
        match seq.head_name()? {
            NO_INCLUDE if self.in_root() => {
                self.stack.push(None);
                Some(Box::new(seq.tail().cloned().collect::<Vec<Node>>()))
            }
            NO_INCLUDE => None,
            head => {
                let modules_only = head == INCLUDE_MODULES || self.filtering_modules();
                self.include(&node, seq, modules_only)
            }
        }
    }

    fn pasted(&mut self) {
        self.stack.pop();
    }
}

/// Loads the root document `id` and everything it includes.
pub fn load(id: &str, resolver: &mut dyn IncludeResolver, errors: &mut dyn ErrorHandler) -> Vec<Node> {
    let text = match resolver.resolve(id) {
        Ok(text) => text,
        Err(error) => {
            errors.handle(SexpError::new(ErrorKind::UnresolvableInclude {
                reason: error.to_string(),
            }));
            return Vec::new();
        }
    };
    include_source(id, &text, MAX_NESTING_DEPTH, resolver, errors)
}

/// Parses `text` as the root document `id` and processes its includes. No
/// document may nest lists deeper than `max_nesting`.
pub fn include_source(
    id: &str,
    text: &str,
    max_nesting: usize,
    resolver: &mut dyn IncludeResolver,
    errors: &mut dyn ErrorHandler,
) -> Vec<Node> {
    debug!(%id, "loading root document");
    let mut parsed = NodeBuilder::new();
    parse_from(id, text, None, max_nesting, &mut parsed, errors);
    let parsed = parsed.into_nodes();

    let mut output = NodeBuilder::new();
    Includer::new(resolver, errors)
        .with_root(id)
        .with_max_nesting(max_nesting)
        .process(&parsed, &mut output);
    output.into_nodes()
}
