//! Scoped, deferred identifier resolution.
//!
//! A [`Resolver`] keeps a tree of lexical scopes ("blocks"). `push` opens a
//! block under the current one and `pop` closes it; closed blocks stay in the
//! tree, because a requirement made inside them may still be met by a
//! definition that appears later in an enclosing block.
//!
//! - [`Resolver::resolve`] looks an identifier up from the innermost block
//!   outwards. If it is already defined with a compatible kind the
//!   continuation runs at once, otherwise the requirement waits in the
//!   innermost block.
//! - [`Resolver::define`] walks outwards to the first block that accepts the
//!   definition's kind, stores it there and retries every waiting requirement
//!   in that block and the blocks below it.
//! - Popping the outermost block fails every requirement still waiting, in
//!   the order they were made.
//!
//! Each continuation runs exactly once, with either the value or an
//! [`UnresolvableIdentifier`].

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::errors::{ErrorHandler, ErrorKind, SexpError};
use crate::syntax::Node;

/// A declared type for definitions and requirements.
pub trait Kind: Clone + fmt::Debug + fmt::Display {
    /// True when a definition of kind `other` satisfies `self`.
    fn accepts(&self, other: &Self) -> bool;
}

/// One-shot continuation for a lookup.
pub type Continuation<V> = Box<dyn FnOnce(Result<V, UnresolvableIdentifier>)>;

/// A requirement that was never met.
#[derive(Debug, Clone, Error)]
#[error("unresolved identifier #{id}")]
pub struct UnresolvableIdentifier {
    pub id: String,
    /// The node that made the reference.
    pub origin: Node,
    pub expected: String,
    /// The kind of a visible definition with the right name but the wrong
    /// kind, if there was one.
    pub found: Option<String>,
}

impl UnresolvableIdentifier {
    /// The report for this failure, pointing at the use site.
    pub fn to_error(&self) -> SexpError {
        let kind = match &self.found {
            Some(found) => ErrorKind::KindMismatch {
                id: self.id.clone(),
                expected: self.expected.clone(),
                found: found.clone(),
            },
            None => ErrorKind::UnresolvedIdentifier { id: self.id.clone() },
        };
        SexpError::at_node(kind, &self.origin)
    }
}

struct Definition<K, V> {
    kind: K,
    value: V,
    origin: Node,
}

struct Requirement<K, V> {
    /// Order of the `resolve` call, so failures come out in document order.
    sequence: usize,
    id: String,
    kind: K,
    origin: Node,
    callback: Continuation<V>,
}

struct Block<K, V> {
    parent: Option<usize>,
    children: Vec<usize>,
    accepts: Vec<K>,
    definitions: HashMap<String, Definition<K, V>>,
    /// Waiting requirements, by identifier.
    outstanding: HashMap<String, Vec<Requirement<K, V>>>,
}

impl<K: Kind, V> Block<K, V> {
    fn definition(&self, id: &str) -> Option<&Definition<K, V>> {
        self.definitions.get(id)
    }

    fn holds(&self, kind: &K) -> bool {
        self.accepts.iter().any(|a| a.accepts(kind))
    }
}

pub struct Resolver<K, V> {
    blocks: Vec<Block<K, V>>,
    stack: Vec<usize>,
    sequence: usize,
}

impl<K: Kind, V: Clone> Default for Resolver<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kind, V: Clone> Resolver<K, V> {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            stack: Vec::new(),
            sequence: 0,
        }
    }

    /// Number of open blocks.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Opens a block accepting definitions of the given kinds.
    pub fn push(&mut self, accepts: Vec<K>) {
        let index = self.blocks.len();
        let parent = self.stack.last().copied();
        if let Some(parent) = parent {
            self.blocks[parent].children.push(index);
        }
        self.blocks.push(Block {
            parent,
            children: Vec::new(),
            accepts,
            definitions: HashMap::new(),
            outstanding: HashMap::new(),
        });
        self.stack.push(index);
    }

    /// Closes the innermost block. Closing the outermost one fails every
    /// requirement still waiting and resets the resolver.
    pub fn pop(&mut self) {
        let Some(top) = self.stack.pop() else {
            return;
        };
        if !self.stack.is_empty() {
            return;
        }

        let mut failed = Vec::new();
        for index in self.subtree(top) {
            let waiting = std::mem::take(&mut self.blocks[index].outstanding);
            for requirement in waiting.into_values().flatten() {
                let found = self.near_miss(index, &requirement.id).map(|k| k.to_string());
                failed.push((requirement, found));
            }
        }
        failed.sort_by_key(|(r, _)| r.sequence);
        trace!(failed = failed.len(), "outermost block closed");
        self.blocks.clear();

        for (requirement, found) in failed {
            let error = UnresolvableIdentifier {
                id: requirement.id,
                origin: requirement.origin,
                expected: requirement.kind.to_string(),
                found,
            };
            (requirement.callback)(Err(error));
        }
    }

    /// Asks for `id` as a `kind`. `callback` runs now if the identifier is
    /// already visible, later when it gets defined, or with an error when the
    /// outermost block closes without it.
    pub fn resolve(&mut self, origin: &Node, id: &str, kind: K, callback: Continuation<V>) {
        let sequence = self.sequence;
        self.sequence += 1;
        let requirement = Requirement {
            sequence,
            id: id.to_string(),
            kind,
            origin: origin.clone(),
            callback,
        };

        let Some(&top) = self.stack.last() else {
            let error = UnresolvableIdentifier {
                id: requirement.id,
                origin: requirement.origin,
                expected: requirement.kind.to_string(),
                found: None,
            };
            (requirement.callback)(Err(error));
            return;
        };

        match self.lookup(top, id, &requirement.kind).cloned() {
            Some(value) => (requirement.callback)(Ok(value)),
            None => self.blocks[top]
                .outstanding
                .entry(requirement.id.clone())
                .or_default()
                .push(requirement),
        }
    }

    /// Defines `id` in the nearest block that accepts `kind`. A second
    /// definition of the same id in that block is reported and ignored.
    pub fn define(&mut self, origin: &Node, id: &str, kind: K, value: V, errors: &mut dyn ErrorHandler) {
        let accepting = self
            .chain(self.stack.last().copied())
            .find(|&index| self.blocks[index].holds(&kind));
        let Some(index) = accepting else {
            errors.handle(SexpError::at_node(
                ErrorKind::NoAcceptingScope {
                    id: id.to_string(),
                    kind: kind.to_string(),
                },
                origin,
            ));
            return;
        };

        if let Some(first) = self.blocks[index].definition(id) {
            errors.handle(
                SexpError::at_node(ErrorKind::DuplicateDefinition { id: id.to_string() }, origin)
                    .with_node(&first.origin),
            );
            return;
        }

        trace!(%id, %kind, block = index, "defined");
        self.blocks[index].definitions.insert(
            id.to_string(),
            Definition {
                kind,
                value,
                origin: origin.clone(),
            },
        );
        self.retry(index, id);
    }

    /// The value `id` currently resolves to as a `kind`, without waiting.
    pub fn find(&self, id: &str, kind: &K) -> Option<&V> {
        self.lookup(*self.stack.last()?, id, kind)
    }

    fn chain(&self, from: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(from, move |&index| self.blocks[index].parent)
    }

    fn subtree(&self, root: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut todo = vec![root];
        while let Some(index) = todo.pop() {
            out.push(index);
            todo.extend(self.blocks[index].children.iter().rev().copied());
        }
        out
    }

    fn lookup(&self, from: usize, id: &str, kind: &K) -> Option<&V> {
        self.chain(Some(from))
            .filter_map(|index| self.blocks[index].definition(id))
            .find(|d| kind.accepts(&d.kind))
            .map(|d| &d.value)
    }

    fn near_miss(&self, from: usize, id: &str) -> Option<&K> {
        self.chain(Some(from))
            .find_map(|index| self.blocks[index].definition(id))
            .map(|d| &d.kind)
    }

    /// Runs the requirements for `id` waiting in `from` and the blocks below
    /// it that can now be met.
    fn retry(&mut self, from: usize, id: &str) {
        for index in self.subtree(from) {
            let Some(waiting) = self.blocks[index].outstanding.remove(id) else {
                continue;
            };
            let mut still_waiting = Vec::new();
            for requirement in waiting {
                match self.lookup(index, id, &requirement.kind).cloned() {
                    Some(value) => (requirement.callback)(Ok(value)),
                    None => still_waiting.push(requirement),
                }
            }
            if !still_waiting.is_empty() {
                self.blocks[index].outstanding.insert(id.to_string(), still_waiting);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::errors::ErrorCollector;
    use crate::syntax::Location;

    /// Shapes, where a `Shape` requirement takes any shape.
    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Shape {
        Any,
        Circle,
        Square,
    }

    impl fmt::Display for Shape {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Kind for Shape {
        fn accepts(&self, other: &Self) -> bool {
            *self == Shape::Any || self == other
        }
    }

    type Outcome = Rc<RefCell<Vec<Result<i32, String>>>>;

    fn recorder() -> (Outcome, impl Fn() -> Continuation<i32>) {
        let outcome: Outcome = Rc::default();
        let sink = Rc::clone(&outcome);
        let make = move || {
            let sink = Rc::clone(&sink);
            Box::new(move |r: Result<i32, UnresolvableIdentifier>| {
                sink.borrow_mut().push(r.map_err(|e| e.to_error().kind.to_string()));
            }) as Continuation<i32>
        };
        (outcome, make)
    }

    fn here(line: usize) -> Node {
        Node::atom("#x", Location::at("test", 0, line, 1))
    }

    #[test]
    fn definition_before_requirement() {
        let (outcome, callback) = recorder();
        let mut errors = ErrorCollector::new();
        let mut resolver = Resolver::new();
        resolver.push(vec![Shape::Any]);
        resolver.define(&here(1), "x", Shape::Circle, 7, &mut errors);
        resolver.resolve(&here(2), "x", Shape::Circle, callback());
        assert_eq!(*outcome.borrow(), vec![Ok(7)]);
        resolver.pop();
        assert_eq!(outcome.borrow().len(), 1);
    }

    #[test]
    fn definition_after_requirement_in_an_outer_block() {
        let (outcome, callback) = recorder();
        let mut errors = ErrorCollector::new();
        let mut resolver = Resolver::new();
        resolver.push(vec![Shape::Any]);
        resolver.push(vec![]);
        resolver.resolve(&here(1), "x", Shape::Any, callback());
        resolver.pop();
        assert!(outcome.borrow().is_empty());
        resolver.define(&here(2), "x", Shape::Square, 3, &mut errors);
        assert_eq!(*outcome.borrow(), vec![Ok(3)]);
        resolver.pop();
        assert!(errors.is_empty());
    }

    #[test]
    fn unresolved_requirements_fail_in_order_at_the_use_site() {
        let (outcome, callback) = recorder();
        let mut resolver: Resolver<Shape, i32> = Resolver::new();
        resolver.push(vec![Shape::Any]);
        let failures: Rc<RefCell<Vec<usize>>> = Rc::default();
        for line in [3, 5] {
            let failures = Rc::clone(&failures);
            resolver.resolve(
                &here(line),
                "missing",
                Shape::Any,
                Box::new(move |r: Result<i32, UnresolvableIdentifier>| {
                    if let Err(e) = r {
                        failures.borrow_mut().push(e.origin.location().outermost().line);
                    }
                }),
            );
        }
        resolver.resolve(&here(9), "other", Shape::Any, callback());
        resolver.pop();
        assert_eq!(*failures.borrow(), vec![3, 5]);
        assert_eq!(*outcome.borrow(), vec![Err("unresolved identifier #other".to_string())]);
    }

    #[test]
    fn a_definition_only_wakes_requirements_for_its_own_name() {
        let mut errors = ErrorCollector::new();
        let mut resolver: Resolver<Shape, i32> = Resolver::new();
        resolver.push(vec![Shape::Any]);
        let seen: Rc<RefCell<Vec<(usize, Result<i32, String>)>>> = Rc::default();
        let waiting = [(1, "a"), (2, "b"), (3, "a"), (4, "c"), (5, "b")];
        for (line, id) in waiting {
            if line == 3 {
                resolver.push(vec![]);
            }
            let seen = Rc::clone(&seen);
            resolver.resolve(
                &here(line),
                id,
                Shape::Any,
                Box::new(move |r: Result<i32, UnresolvableIdentifier>| {
                    seen.borrow_mut().push((line, r.map_err(|e| e.id)));
                }),
            );
        }
        resolver.pop();

        resolver.define(&here(6), "a", Shape::Circle, 1, &mut errors);
        assert_eq!(*seen.borrow(), vec![(1, Ok(1)), (3, Ok(1))]);

        resolver.pop();
        assert_eq!(
            seen.borrow()[2..].to_vec(),
            vec![
                (2, Err("b".to_string())),
                (4, Err("c".to_string())),
                (5, Err("b".to_string())),
            ]
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn a_wrong_kind_is_a_mismatch() {
        let (outcome, callback) = recorder();
        let mut errors = ErrorCollector::new();
        let mut resolver = Resolver::new();
        resolver.push(vec![Shape::Any]);
        resolver.define(&here(1), "x", Shape::Square, 1, &mut errors);
        resolver.resolve(&here(2), "x", Shape::Circle, callback());
        resolver.pop();
        assert_eq!(
            *outcome.borrow(),
            vec![Err("#x refers to a Square, but a Circle is required here".to_string())]
        );
    }

    #[test]
    fn definitions_go_to_the_nearest_accepting_block() {
        let (outcome, callback) = recorder();
        let mut errors = ErrorCollector::new();
        let mut resolver = Resolver::new();
        resolver.push(vec![Shape::Circle]);
        resolver.push(vec![Shape::Square]);
        resolver.define(&here(1), "c", Shape::Circle, 1, &mut errors);
        resolver.pop();
        // The sibling sees the circle, which went to the outer block.
        resolver.push(vec![Shape::Square]);
        resolver.resolve(&here(2), "c", Shape::Circle, callback());
        resolver.pop();
        resolver.pop();
        assert_eq!(*outcome.borrow(), vec![Ok(1)]);
    }

    #[test]
    fn sibling_blocks_do_not_see_each_other() {
        let (outcome, callback) = recorder();
        let mut errors = ErrorCollector::new();
        let mut resolver = Resolver::new();
        resolver.push(vec![Shape::Circle]);
        resolver.push(vec![Shape::Square]);
        resolver.define(&here(1), "s", Shape::Square, 1, &mut errors);
        resolver.pop();
        resolver.push(vec![Shape::Square]);
        resolver.resolve(&here(2), "s", Shape::Square, callback());
        resolver.pop();
        resolver.pop();
        assert_eq!(*outcome.borrow(), vec![Err("unresolved identifier #s".to_string())]);
    }

    #[test]
    fn duplicates_and_homeless_definitions_are_reported() {
        let mut errors = ErrorCollector::new();
        let mut resolver: Resolver<Shape, i32> = Resolver::new();
        resolver.push(vec![Shape::Circle]);
        resolver.define(&here(1), "x", Shape::Circle, 1, &mut errors);
        resolver.define(&here(2), "x", Shape::Circle, 2, &mut errors);
        resolver.define(&here(3), "y", Shape::Square, 3, &mut errors);
        assert_eq!(resolver.find("x", &Shape::Circle), Some(&1));
        let kinds: Vec<ErrorKind> = errors.kinds().cloned().collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::DuplicateDefinition { id: "x".into() },
                ErrorKind::NoAcceptingScope {
                    id: "y".into(),
                    kind: "Square".into()
                },
            ]
        );
        assert_eq!(errors.reports()[0].nodes.len(), 2);
    }
}
