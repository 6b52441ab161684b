//! sexpand error handling.
//!
//! Every stage reports problems to a single [`ErrorHandler`] instead of
//! returning early, so one pass over a document surfaces as many problems as
//! possible. A report is a [`SexpError`]: what went wrong ([`ErrorKind`]), how
//! bad it is ([`Severity`]) and which locations and nodes are to blame.
//! `SexpError` is a `miette::Diagnostic`, so the CLI can render it against the
//! source text.

use std::fmt;

use miette::{Diagnostic, LabeledSpan};
use serde::Serialize;
use thiserror::Error;

use crate::syntax::{Location, Node};

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Parse,
    Invocation,
    Template,
    Expansion,
    Include,
    Resolution,
}

impl ErrorCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Parse => "parse",
            ErrorCategory::Invocation => "invocation",
            ErrorCategory::Template => "template",
            ErrorCategory::Expansion => "expansion",
            ErrorCategory::Include => "include",
            ErrorCategory::Resolution => "resolution",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything that can go wrong with a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // Parse errors
    #[error("unexpected '{found}', expected '{expected}'")]
    MismatchedClose { expected: char, found: char },
    #[error("'{found}' does not close anything")]
    UnbalancedClose { found: char },
    #[error("expected {count} more closing brackets")]
    UnclosedGroups { count: usize },
    #[error("unterminated quoted atom")]
    UnterminatedString,
    #[error("lists nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    // Invocation shape errors
    #[error("an empty list was not expected here")]
    EmptyInvocation,
    #[error("a word was expected here, not a list")]
    HeadNotAtom,
    #[error("a list was expected here, not a word")]
    NotAList,
    #[error("repeated keyword {key}:")]
    DuplicateKeyword { key: String },
    #[error("unexpected keyword {key}: after positional arguments")]
    KeywordAfterPositional { key: String },
    #[error("keyword {key}: has no value")]
    MissingKeywordValue { key: String },

    // Template definition errors
    #[error("a template should have the form (template name [arguments] body...)")]
    MalformedTemplate,
    #[error("template arguments should be atoms like @arg or lists like [@arg default], not {text}")]
    MalformedParameter { text: String },
    #[error("repeated template argument @{name}")]
    DuplicateParameter { name: String },
    #[error("template body contains @{name}, which is not in the template's argument list")]
    UnboundPlaceholder { name: String },
    #[error("numbered template argument @{index} is out of order")]
    PositionalOutOfOrder { index: String },
    #[error("mandatory numbered argument @{index} must come before every optional numbered argument")]
    MandatoryAfterOptional { index: String },
    #[error("duplicate definition of template {name}")]
    DuplicateTemplate { name: String },

    // Expansion errors
    #[error("{name} requires named argument {argument}")]
    MissingArgument { name: String, argument: String },
    #[error("{name} does not expect argument {argument}")]
    UnexpectedArgument { name: String, argument: String },
    #[error("{name} expects at least {min} unnamed arguments, but there are {found}")]
    TooFewArguments { name: String, min: usize, found: usize },
    #[error("{name} expects at most {max} unnamed arguments, but there are {found}")]
    TooManyArguments { name: String, max: usize, found: usize },
    #[error("{name} expands recursively")]
    RecursiveExpansion { name: String },
    #[error("expansion nested deeper than {limit} levels")]
    ExpansionDepthExceeded { limit: usize },
    #[error("{name}: {message}")]
    MacroArgument { name: String, message: String },

    // Include errors
    #[error("unable to resolve include: {reason}")]
    UnresolvableInclude { reason: String },
    #[error("{source_id} recursively includes itself")]
    RecursiveInclude { source_id: String },

    // Resolution errors
    #[error("unresolved identifier #{id}")]
    UnresolvedIdentifier { id: String },
    #[error("{id} is defined more than once in the same scope")]
    DuplicateDefinition { id: String },
    #[error("#{id} refers to a {found}, but a {expected} is required here")]
    KindMismatch {
        id: String,
        expected: String,
        found: String,
    },
    #[error("no enclosing scope accepts a {kind} called {id}")]
    NoAcceptingScope { id: String, kind: String },
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        use ErrorKind::*;
        match self {
            MismatchedClose { .. }
            | UnbalancedClose { .. }
            | UnclosedGroups { .. }
            | UnterminatedString
            | NestingTooDeep { .. } => ErrorCategory::Parse,

            EmptyInvocation
            | HeadNotAtom
            | NotAList
            | DuplicateKeyword { .. }
            | KeywordAfterPositional { .. }
            | MissingKeywordValue { .. } => ErrorCategory::Invocation,

            MalformedTemplate
            | MalformedParameter { .. }
            | DuplicateParameter { .. }
            | UnboundPlaceholder { .. }
            | PositionalOutOfOrder { .. }
            | MandatoryAfterOptional { .. }
            | DuplicateTemplate { .. } => ErrorCategory::Template,

            MissingArgument { .. }
            | UnexpectedArgument { .. }
            | TooFewArguments { .. }
            | TooManyArguments { .. }
            | RecursiveExpansion { .. }
            | ExpansionDepthExceeded { .. }
            | MacroArgument { .. } => ErrorCategory::Expansion,

            UnresolvableInclude { .. } | RecursiveInclude { .. } => ErrorCategory::Include,

            UnresolvedIdentifier { .. }
            | DuplicateDefinition { .. }
            | KindMismatch { .. }
            | NoAcceptingScope { .. } => ErrorCategory::Resolution,
        }
    }

    /// Suffix of the diagnostic code.
    pub const fn code_suffix(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            MismatchedClose { .. } => "mismatched_close",
            UnbalancedClose { .. } => "unbalanced_close",
            UnclosedGroups { .. } => "unclosed_groups",
            UnterminatedString => "unterminated_string",
            NestingTooDeep { .. } => "nesting_too_deep",
            EmptyInvocation => "empty_invocation",
            HeadNotAtom => "head_not_atom",
            NotAList => "not_a_list",
            DuplicateKeyword { .. } => "duplicate_keyword",
            KeywordAfterPositional { .. } => "keyword_after_positional",
            MissingKeywordValue { .. } => "missing_keyword_value",
            MalformedTemplate => "malformed_template",
            MalformedParameter { .. } => "malformed_parameter",
            DuplicateParameter { .. } => "duplicate_parameter",
            UnboundPlaceholder { .. } => "unbound_placeholder",
            PositionalOutOfOrder { .. } => "positional_out_of_order",
            MandatoryAfterOptional { .. } => "mandatory_after_optional",
            DuplicateTemplate { .. } => "duplicate_template",
            MissingArgument { .. } => "missing_argument",
            UnexpectedArgument { .. } => "unexpected_argument",
            TooFewArguments { .. } => "too_few_arguments",
            TooManyArguments { .. } => "too_many_arguments",
            RecursiveExpansion { .. } => "recursive_expansion",
            ExpansionDepthExceeded { .. } => "expansion_depth_exceeded",
            MacroArgument { .. } => "macro_argument",
            UnresolvableInclude { .. } => "unresolvable_include",
            RecursiveInclude { .. } => "recursive_include",
            UnresolvedIdentifier { .. } => "unresolved_identifier",
            DuplicateDefinition { .. } => "duplicate_definition",
            KindMismatch { .. } => "kind_mismatch",
            NoAcceptingScope { .. } => "no_accepting_scope",
        }
    }

    fn label(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Parse => "here",
            ErrorCategory::Invocation => "in this invocation",
            ErrorCategory::Template => "in this template",
            ErrorCategory::Expansion => "while expanding this",
            ErrorCategory::Include => "included here",
            ErrorCategory::Resolution => "referenced here",
        }
    }
}

// ============================================================================
// THE REPORT
// ============================================================================

/// A single report: kind, severity and the offending locations and nodes.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct SexpError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub locations: Vec<Location>,
    pub nodes: Vec<Node>,
}

impl SexpError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            locations: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn at(kind: ErrorKind, location: &Location) -> Self {
        Self::new(kind).with_location(location)
    }

    pub fn at_node(kind: ErrorKind, node: &Node) -> Self {
        Self::new(kind).with_node(node)
    }

    pub fn with_location(mut self, location: &Location) -> Self {
        self.locations.push(location.clone());
        self
    }

    pub fn with_node(mut self, node: &Node) -> Self {
        self.nodes.push(node.clone());
        self
    }

    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Every location involved: explicit ones first, then those of the nodes.
    pub fn all_locations(&self) -> impl Iterator<Item = &Location> {
        self.locations
            .iter()
            .chain(self.nodes.iter().map(Node::location))
    }

    pub fn primary_location(&self) -> Option<&Location> {
        self.all_locations().next()
    }

    pub fn diagnostic_code(&self) -> String {
        format!("sexpand::{}::{}", self.kind.category(), self.kind.code_suffix())
    }

    /// `location: message`, for logs and plain-text output.
    pub fn describe(&self) -> String {
        match self.primary_location() {
            Some(location) => format!("{}: {}", location, self.kind),
            None => self.kind.to_string(),
        }
    }
}

impl Diagnostic for SexpError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.diagnostic_code()))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
        })
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        // Explicit locations may sit at the very end of the text, so they
        // get zero-width labels.
        let explicit = self
            .locations
            .iter()
            .map(|location| LabeledSpan::new(Some(self.kind.label().to_string()), location.outermost().offset, 0));
        let nodes = self.nodes.iter().map(|node| {
            // Only an atom written where it sits spans its whole value.
            let len = match node {
                Node::Atom(atom) if !atom.quoted && atom.location.depth() == 1 => atom.value.len().max(1),
                _ => 1,
            };
            LabeledSpan::new(
                Some(self.kind.label().to_string()),
                node.location().outermost().offset,
                len,
            )
        });
        let labels: Vec<LabeledSpan> = explicit.chain(nodes).collect();
        if labels.is_empty() {
            None
        } else {
            Some(Box::new(labels.into_iter()))
        }
    }
}

// ============================================================================
// SINKS
// ============================================================================

/// Where reports go.
pub trait ErrorHandler {
    fn handle(&mut self, error: SexpError);
}

impl<F: FnMut(SexpError)> ErrorHandler for F {
    fn handle(&mut self, error: SexpError) {
        self(error)
    }
}

/// Keeps every report, in order.
#[derive(Debug, Default, Clone)]
pub struct ErrorCollector {
    reports: Vec<SexpError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[SexpError] {
        &self.reports
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ErrorKind> {
        self.reports.iter().map(|r| &r.kind)
    }

    pub fn error_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.reports.len() - self.error_count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl ErrorHandler for ErrorCollector {
    fn handle(&mut self, error: SexpError) {
        self.reports.push(error);
    }
}

/// Logs reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHandler;

impl ErrorHandler for TracingHandler {
    fn handle(&mut self, error: SexpError) {
        let code = error.diagnostic_code();
        let location = error
            .primary_location()
            .map(ToString::to_string)
            .unwrap_or_default();
        match error.severity {
            Severity::Error => tracing::error!(%code, %location, "{}", error.kind),
            Severity::Warning => tracing::warn!(%code, %location, "{}", error.kind),
        }
    }
}

/// Panics on the first report. Only meant for tests that want a failure to
/// stop them at the point of detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RaisingHandler;

impl ErrorHandler for RaisingHandler {
    fn handle(&mut self, error: SexpError) {
        panic!("{}", error.describe());
    }
}
