//! Cross-reference checking for expanded documents.
//!
//! Drives a [`Resolver`] over a macro-free tree:
//!
//! - the document is a scope that holds every kind of definition;
//! - a form whose head is a configured scope opens a nested scope that holds
//!   only the configured kinds;
//! - a form carrying `name: x` defines `x`, with the form's head as its kind,
//!   in the nearest scope that holds that kind;
//! - every `#x` atom is a reference, and may come before or after the
//!   definition it refers to.
//!
//! References still unmet when the document ends are reported at the
//! reference itself.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::errors::ErrorHandler;
use crate::resolver::{Kind, Resolver, UnresolvableIdentifier};
use crate::syntax::{Node, Seq};

/// The kind that holds, or is satisfied by, every other kind.
pub const ANY_KIND: &str = "*";

/// The keyword that names a definition.
pub const NAME: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReferenceKind(pub String);

impl ReferenceKind {
    pub fn any() -> Self {
        Self(ANY_KIND.to_string())
    }
}

impl From<&str> for ReferenceKind {
    fn from(kind: &str) -> Self {
        Self(kind.to_string())
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Kind for ReferenceKind {
    fn accepts(&self, other: &Self) -> bool {
        self.0 == ANY_KIND || self.0 == other.0
    }
}

/// A reference that was matched with its definition.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
    pub id: String,
    /// The `#id` atom.
    pub site: Node,
    /// The form that defined `id`.
    pub target: Node,
}

pub struct ReferenceChecker {
    scopes: BTreeMap<String, Vec<ReferenceKind>>,
    resolver: Resolver<ReferenceKind, Node>,
    resolved: Rc<RefCell<Vec<Resolved>>>,
    failed: Rc<RefCell<Vec<UnresolvableIdentifier>>>,
}

impl ReferenceChecker {
    /// `scopes` maps scope heads to the kinds their scopes hold.
    pub fn new(scopes: &BTreeMap<String, Vec<String>>) -> Self {
        let scopes = scopes
            .iter()
            .map(|(head, kinds)| {
                let kinds = kinds.iter().map(|k| ReferenceKind(k.clone())).collect();
                (head.clone(), kinds)
            })
            .collect();
        Self {
            scopes,
            resolver: Resolver::new(),
            resolved: Rc::default(),
            failed: Rc::default(),
        }
    }

    /// Checks one document. Returns every reference that was met, in the
    /// order they were met.
    pub fn check(&mut self, nodes: &[Node], errors: &mut dyn ErrorHandler) -> Vec<Resolved> {
        self.resolver.push(vec![ReferenceKind::any()]);
        for node in nodes {
            self.visit(node, errors);
        }
        self.resolver.pop();

        let failed = std::mem::take(&mut *self.failed.borrow_mut());
        let resolved = std::mem::take(&mut *self.resolved.borrow_mut());
        debug!(resolved = resolved.len(), failed = failed.len(), "references checked");
        for failure in failed {
            errors.handle(failure.to_error());
        }
        resolved
    }

    fn visit(&mut self, node: &Node, errors: &mut dyn ErrorHandler) {
        match node {
            Node::Atom(atom) => {
                if let Some(id) = atom.reference() {
                    self.require(node, id);
                }
            }
            Node::Seq(seq) => self.visit_seq(node, seq, errors),
            Node::Comment(_) => {}
        }
    }

    fn visit_seq(&mut self, node: &Node, seq: &Seq, errors: &mut dyn ErrorHandler) {
        let head = seq.head_name();
        if let (Some(head), Some(id)) = (head, defined_name(seq)) {
            self.resolver
                .define(node, id, ReferenceKind::from(head), node.clone(), errors);
        }

        let scope = head.and_then(|head| self.scopes.get(head)).cloned();
        let opened = scope.is_some();
        if let Some(kinds) = scope {
            self.resolver.push(kinds);
        }
        for child in &seq.children {
            self.visit(child, errors);
        }
        if opened {
            self.resolver.pop();
        }
    }

    fn require(&mut self, site: &Node, id: &str) {
        let resolved = Rc::clone(&self.resolved);
        let failed = Rc::clone(&self.failed);
        let reference = (id.to_string(), site.clone());
        self.resolver.resolve(
            site,
            id,
            ReferenceKind::any(),
            Box::new(move |result: Result<Node, UnresolvableIdentifier>| {
                let (id, site) = reference;
                match result {
                    Ok(target) => resolved.borrow_mut().push(Resolved { id, site, target }),
                    Err(failure) => failed.borrow_mut().push(failure),
                }
            }),
        );
    }
}

/// The value of a `name:` argument, if the form has one.
fn defined_name(seq: &Seq) -> Option<&str> {
    let mut args = seq.tail();
    while let Some(arg) = args.next() {
        if arg.as_atom().and_then(|a| a.keyword()) == Some(NAME) {
            let value = args.next()?.as_atom()?;
            return value.keyword().is_none().then_some(value.value.as_str());
        }
    }
    None
}

/// Checks `nodes` with a fresh [`ReferenceChecker`].
pub fn check_references(
    nodes: &[Node],
    scopes: &BTreeMap<String, Vec<String>>,
    errors: &mut dyn ErrorHandler,
) -> Vec<Resolved> {
    ReferenceChecker::new(scopes).check(nodes, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCollector, ErrorKind};
    use crate::syntax::parse_nodes;

    /// `scopes` lists (head, kind) pairs.
    fn check(text: &str, scopes: &[(&str, &str)]) -> (Vec<Resolved>, ErrorCollector) {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (head, kind) in scopes {
            map.entry(head.to_string()).or_default().push(kind.to_string());
        }
        let scopes = map;
        let mut errors = ErrorCollector::new();
        let nodes = parse_nodes("test", text, &mut errors);
        let resolved = check_references(&nodes, &scopes, &mut errors);
        (resolved, errors)
    }

    #[test]
    fn forward_references_resolve() {
        let (resolved, errors) = check("(door to: #hall) (room name: hall)", &[]);
        assert!(errors.is_empty(), "{:?}", errors.reports());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, "hall");
        assert_eq!(resolved[0].target.as_seq().and_then(Seq::head_name), Some("room"));
    }

    #[test]
    fn missing_definitions_are_reported_at_the_reference() {
        let (resolved, errors) = check("(a)\n(door to: #nowhere)", &[]);
        assert!(resolved.is_empty());
        let report = &errors.reports()[0];
        assert_eq!(report.kind, ErrorKind::UnresolvedIdentifier { id: "nowhere".into() });
        assert_eq!(report.primary_location().map(|l| l.outermost().line), Some(2));
    }

    #[test]
    fn scopes_keep_their_own_kinds() {
        let text = "(house name: h1 (room name: kitchen) (person name: ann at: #kitchen))\n\
                    (house name: h2 (person name: bob at: #kitchen))";
        let (resolved, errors) = check(text, &[("house", "room")]);
        // People are not held by houses, so both land in the document scope.
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].site.location().outermost().line, 1);
        assert_eq!(
            errors.kinds().cloned().collect::<Vec<_>>(),
            vec![ErrorKind::UnresolvedIdentifier { id: "kitchen".into() }]
        );
    }

    #[test]
    fn duplicate_names_in_one_scope_are_reported() {
        let (_, errors) = check("(room name: a) (room name: a)", &[]);
        assert_eq!(
            errors.kinds().cloned().collect::<Vec<_>>(),
            vec![ErrorKind::DuplicateDefinition { id: "a".into() }]
        );
    }

    #[test]
    fn the_document_scope_holds_every_kind() {
        let (_, errors) = check("(box (room name: a))", &[("box", "thing")]);
        // The document scope holds everything, so nothing is homeless.
        assert!(errors.is_empty());
    }
}
