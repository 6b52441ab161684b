//! Syntax: the node model, the event stream and the scanner.
//!
//! Text becomes nodes in two steps. The [`parser`] turns characters into a flat
//! stream of events, and a [`NodeBuilder`] turns events into [`Node`]s. Every
//! later stage (includes, templates, expansion) is another visitor over the
//! same stream.

pub mod builder;
pub mod invocation;
pub mod location;
pub mod node;
pub mod parser;
pub mod visitor;

pub use builder::{NodeBuilder, Unfinished};
pub use invocation::Invocation;
pub use location::{Location, Position, PositionKind};
pub use node::{to_text, Atom, Comment, Node, Seq};
pub use parser::{parse, parse_from, parse_node, parse_nodes, MAX_NESTING_DEPTH};
pub use visitor::{Delim, SExpression, SexpVisitor, StripComments};
