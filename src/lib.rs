//! sexpand: an S-expression front end.
//!
//! Documents are parsed into located [`Node`] trees, their includes are
//! spliced in, `(template ...)` definitions are collected and expanded
//! wherever they are invoked, and `#id` cross-references are matched with
//! their definitions across lexical scopes.

pub use crate::config::ExpansionOptions;
pub use crate::engine::{Checked, Pipeline, Processed};
pub use crate::errors::{ErrorCollector, ErrorHandler, ErrorKind, SexpError, Severity};
pub use crate::syntax::{Location, Node, SExpression, SexpVisitor};

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod include;
pub mod macros;
pub mod references;
pub mod resolver;
pub mod syntax;
