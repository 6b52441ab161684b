//! # Macro Expansion
//!
//! Expansion is a purely structural rewrite of the event stream. A macro sees
//! one [`Invocation`] and hands back an expression to replay in its place; it
//! cannot evaluate anything.
//!
//! ## Pipeline
//!
//! 1. [`strip_templates`] removes every `(template ...)` definition from the
//!    document and validates it.
//! 2. An [`Expander`] replaces every invocation of a registered [`Macro`]
//!    (templates and builtins alike) with its expansion.
//!
//! Both stages are [`cutout::Cutout`]s. Because replacements are replayed
//! through the same cutout, macros may expand into other macros. Arguments are
//! expanded before the invocation that receives them.
//!
//! ## Failure
//!
//! A bad invocation (wrong arguments, recursion, too deep) is reported and
//! expands to nothing; the rest of the document is still expanded.

use crate::errors::{ErrorHandler, ErrorKind, SexpError};
use crate::syntax::{Invocation, SExpression};

pub mod builtins;
pub mod cutout;
pub mod expander;
pub mod substitution;
pub mod template;

pub use builtins::{standard_macros, Concat, UniqueName};
pub use cutout::{Cutout, Cutter};
pub use expander::Expander;
pub use substitution::Substitution;
pub use template::{strip_templates, Fallback, Template};

/// Default limit on nested expansions.
pub const MAX_EXPANSION_DEPTH: usize = 128;

/// A structural macro.
///
/// The shape methods describe which arguments an invocation may carry; the
/// expander checks them with [`check_arguments`] before calling
/// [`Macro::transform`], so `transform` can rely on them.
pub trait Macro {
    /// The head an invocation must have.
    fn name(&self) -> &str;

    /// Keyword arguments that must be given.
    fn required_arguments(&self) -> Vec<&str>;

    /// Every keyword argument that may be given.
    fn allowed_arguments(&self) -> Vec<&str>;

    fn min_positional(&self) -> usize;

    /// `None` when any number of positional arguments is accepted.
    fn max_positional(&self) -> Option<usize>;

    fn transform(&self, invocation: &Invocation, errors: &mut dyn ErrorHandler) -> Box<dyn SExpression>;
}

/// Checks an invocation against the shape a macro declares, reporting every
/// violation. Returns false if there was any.
pub fn check_arguments(m: &dyn Macro, invocation: &Invocation, errors: &mut dyn ErrorHandler) -> bool {
    let mut valid = true;
    let name = invocation.name.as_str();

    for required in m.required_arguments() {
        if !invocation.has_argument(required) {
            errors.handle(SexpError::at_node(
                ErrorKind::MissingArgument {
                    name: name.to_string(),
                    argument: required.to_string(),
                },
                &invocation.node,
            ));
            valid = false;
        }
    }

    let allowed = m.allowed_arguments();
    for (key, value) in &invocation.arguments {
        if !allowed.contains(&key.as_str()) {
            errors.handle(SexpError::at_node(
                ErrorKind::UnexpectedArgument {
                    name: name.to_string(),
                    argument: key.clone(),
                },
                value,
            ));
            valid = false;
        }
    }

    let found = invocation.remainder.len();
    let min = m.min_positional();
    if found < min {
        errors.handle(SexpError::at_node(
            ErrorKind::TooFewArguments {
                name: name.to_string(),
                min,
                found,
            },
            &invocation.node,
        ));
        valid = false;
    }

    if let Some(max) = m.max_positional() {
        if found > max {
            errors.handle(SexpError::at_node(
                ErrorKind::TooManyArguments {
                    name: name.to_string(),
                    max,
                    found,
                },
                &invocation.remainder[max],
            ));
            valid = false;
        }
    }

    valid
}
