//! The `(name key: value ... positional ...)` view of a sequence.

use crate::errors::{ErrorHandler, ErrorKind, SexpError};

use super::node::{Node, Seq};

/// A sequence read as a call: a head name, keyword arguments and the
/// positional remainder. Comments among the arguments are skipped.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    /// The whole sequence, for diagnostics.
    pub node: Node,
    /// Keyword arguments in the order they were written; keys are unique.
    pub arguments: Vec<(String, Node)>,
    pub remainder: Vec<Node>,
}

impl Invocation {
    /// Reads `node` as an invocation. Any shape problem is reported and
    /// yields `None`.
    pub fn of(node: &Node, errors: &mut dyn ErrorHandler) -> Option<Invocation> {
        match node {
            Node::Seq(seq) => Self::from_seq(seq, node, errors),
            _ => {
                errors.handle(SexpError::at_node(ErrorKind::NotAList, node));
                None
            }
        }
    }

    fn from_seq(seq: &Seq, node: &Node, errors: &mut dyn ErrorHandler) -> Option<Invocation> {
        let Some(head) = seq.head() else {
            errors.handle(SexpError::at_node(ErrorKind::EmptyInvocation, node));
            return None;
        };
        let Some(name) = head.as_atom() else {
            errors.handle(SexpError::at_node(ErrorKind::HeadNotAtom, head));
            return None;
        };

        let mut arguments: Vec<(String, Node)> = Vec::new();
        let mut remainder = Vec::new();
        let mut key: Option<(String, &Node)> = None;

        for argument in seq.tail() {
            if let Some((k, _)) = key.take() {
                if arguments.iter().any(|(seen, _)| *seen == k) {
                    errors.handle(SexpError::at_node(ErrorKind::DuplicateKeyword { key: k }, argument));
                    return None;
                }
                arguments.push((k, argument.clone()));
                continue;
            }
            match argument.as_atom().and_then(|a| a.keyword()) {
                Some(k) if !remainder.is_empty() => {
                    errors.handle(SexpError::at_node(
                        ErrorKind::KeywordAfterPositional { key: k.to_string() },
                        argument,
                    ));
                    return None;
                }
                Some(k) => key = Some((k.to_string(), argument)),
                None => remainder.push(argument.clone()),
            }
        }

        if let Some((k, keyword)) = key {
            errors.handle(SexpError::at_node(ErrorKind::MissingKeywordValue { key: k }, keyword));
            return None;
        }

        Some(Invocation {
            name: name.value.clone(),
            node: node.clone(),
            arguments,
            remainder,
        })
    }

    /// The value of keyword argument `key`.
    pub fn argument(&self, key: &str) -> Option<&Node> {
        self.arguments
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn has_argument(&self, key: &str) -> bool {
        self.argument(key).is_some()
    }

    pub fn argument_names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(|(k, _)| k.as_str())
    }
}
