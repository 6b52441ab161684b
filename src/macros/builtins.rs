//! Macros that ship with the expander.

use std::cell::Cell;

use crate::errors::{ErrorHandler, ErrorKind, SexpError};
use crate::syntax::{Invocation, Node, SExpression};

use super::Macro;

/// Every builtin, freshly constructed.
pub fn standard_macros() -> Vec<Box<dyn Macro>> {
    vec![Box::new(Concat), Box::new(UniqueName::new())]
}

fn argument_error(name: &str, message: &str, node: &Node) -> SexpError {
    SexpError::at_node(
        ErrorKind::MacroArgument {
            name: name.to_string(),
            message: message.to_string(),
        },
        node,
    )
}

// ============================================================================
// concat
// ============================================================================

/// `(concat a b c separator: -)` becomes the single atom `a-b-c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Concat;

impl Macro for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    fn required_arguments(&self) -> Vec<&str> {
        Vec::new()
    }

    fn allowed_arguments(&self) -> Vec<&str> {
        vec!["separator"]
    }

    fn min_positional(&self) -> usize {
        1
    }

    fn max_positional(&self) -> Option<usize> {
        None
    }

    fn transform(&self, invocation: &Invocation, errors: &mut dyn ErrorHandler) -> Box<dyn SExpression> {
        let mut parts = Vec::new();
        for node in &invocation.remainder {
            match node.as_atom() {
                Some(atom) => parts.push(atom.value.as_str()),
                None => errors.handle(argument_error(self.name(), "only atoms can be joined", node)),
            }
        }

        let separator = match invocation.argument("separator") {
            None => "",
            Some(Node::Atom(atom)) => atom.value.as_str(),
            Some(other) => {
                errors.handle(argument_error(self.name(), "the separator should be an atom", other));
                ""
            }
        };

        Box::new(Node::atom(parts.join(separator), invocation.node.location().clone()))
    }
}

// ============================================================================
// unique-name
// ============================================================================

/// `(unique-name)` becomes `*unique-name-N*` and `(unique-name x)` becomes
/// `*x-N*`, with N counting invocations.
#[derive(Debug, Default)]
pub struct UniqueName {
    counter: Cell<usize>,
}

impl UniqueName {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Macro for UniqueName {
    fn name(&self) -> &str {
        "unique-name"
    }

    fn required_arguments(&self) -> Vec<&str> {
        Vec::new()
    }

    fn allowed_arguments(&self) -> Vec<&str> {
        Vec::new()
    }

    fn min_positional(&self) -> usize {
        0
    }

    fn max_positional(&self) -> Option<usize> {
        Some(1)
    }

    fn transform(&self, invocation: &Invocation, errors: &mut dyn ErrorHandler) -> Box<dyn SExpression> {
        let n = self.counter.get() + 1;
        self.counter.set(n);

        let stem = match invocation.remainder.first() {
            None => self.name(),
            Some(Node::Atom(atom)) => atom.value.as_str(),
            Some(other) => {
                errors.handle(argument_error(self.name(), "the name stem should be an atom", other));
                self.name()
            }
        };

        Box::new(Node::atom(
            format!("*{stem}-{n}*"),
            invocation.node.location().clone(),
        ))
    }
}
