//! Replaying a template body with its arguments filled in.

use std::collections::HashMap;

use crate::syntax::{Delim, Location, Node, PositionKind, SExpression, SexpVisitor};

/// A template body bound to one invocation.
///
/// Replaying it emits the body with every bound `@name` atom replaced by its
/// value. Body locations are chained onto the call site, so anything reported
/// about the output points at the invocation first. Bound values keep the
/// locations they were written at.
#[derive(Debug, Clone)]
pub struct Substitution {
    call_site: Location,
    body: Vec<Node>,
    bindings: HashMap<String, Vec<Node>>,
}

impl Substitution {
    pub fn new(call_site: &Location, body: Vec<Node>, bindings: HashMap<String, Vec<Node>>) -> Self {
        Self {
            call_site: call_site.clone(),
            body,
            bindings,
        }
    }
}

impl SExpression for Substitution {
    fn accept(&self, visitor: &mut dyn SexpVisitor) {
        let mut subbing = Subbing {
            substitution: self,
            delegate: visitor,
        };
        self.body.accept(&mut subbing);
    }
}

struct Subbing<'a> {
    substitution: &'a Substitution,
    delegate: &'a mut dyn SexpVisitor,
}

impl SexpVisitor for Subbing<'_> {
    fn locate(&mut self, location: &Location) {
        let rewritten = self.substitution.call_site.via(PositionKind::Template, location);
        self.delegate.locate(&rewritten);
    }

    fn open(&mut self, delim: Delim) {
        self.delegate.open(delim);
    }

    fn atom(&mut self, value: &str) {
        let bound = value
            .strip_prefix('@')
            .and_then(|name| self.substitution.bindings.get(name));
        match bound {
            Some(nodes) => nodes.accept(&mut *self.delegate),
            None => self.delegate.atom(value),
        }
    }

    fn comment(&mut self, text: &str) {
        self.delegate.comment(text);
    }

    fn close(&mut self, delim: Delim) {
        self.delegate.close(delim);
    }
}
