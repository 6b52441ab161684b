// tests/resolver_tests.rs

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use sexpand::errors::{ErrorCollector, ErrorKind};
use sexpand::resolver::{Continuation, Kind, Resolver, UnresolvableIdentifier};
use sexpand::syntax::{Location, Node};

/// A two-level type hierarchy: every `Text` is also an `Object`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Type {
    Object,
    Text,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => write!(f, "object"),
            Type::Text => write!(f, "text"),
        }
    }
}

impl Kind for Type {
    fn accepts(&self, other: &Self) -> bool {
        *self == Type::Object || self == other
    }
}

type Slot = Rc<RefCell<Option<Result<String, UnresolvableIdentifier>>>>;

fn callback() -> (Slot, Continuation<String>) {
    let slot: Slot = Rc::default();
    let sink = Rc::clone(&slot);
    let callback = Box::new(move |result: Result<String, UnresolvableIdentifier>| {
        let previous = sink.borrow_mut().replace(result);
        assert!(previous.is_none(), "continuation ran twice");
    }) as Continuation<String>;
    (slot, callback)
}

fn value(slot: &Slot) -> Option<String> {
    slot.borrow().as_ref().and_then(|r| r.as_ref().ok().cloned())
}

fn use_site(line: usize) -> Node {
    Node::atom("#ref", Location::at("doc", 0, line, 1))
}

#[test]
fn simple_resolution() {
    let mut errors = ErrorCollector::new();
    let mut resolver = Resolver::new();
    resolver.push(vec![Type::Object]);

    resolver.define(&use_site(1), "first", Type::Object, "o1".to_string(), &mut errors);
    let (first, cb1) = callback();
    let (second, cb2) = callback();
    resolver.resolve(&use_site(2), "first", Type::Object, cb1);
    resolver.resolve(&use_site(3), "second", Type::Object, cb2);
    assert_eq!(value(&first).as_deref(), Some("o1"));
    assert!(second.borrow().is_none());

    resolver.define(&use_site(4), "second", Type::Object, "o2".to_string(), &mut errors);
    resolver.pop();

    assert_eq!(value(&second).as_deref(), Some("o2"));
    assert!(errors.is_empty());
}

#[test]
fn matching_resolution() {
    let mut errors = ErrorCollector::new();
    let mut resolver = Resolver::new();
    resolver.push(vec![Type::Object]);
    resolver.push(vec![Type::Text]);

    resolver.define(&use_site(1), "first", Type::Text, "Hello".to_string(), &mut errors);
    let (second, cb1) = callback();
    resolver.resolve(&use_site(2), "second", Type::Object, cb1);
    resolver.pop();

    // Objects are not held by the inner block, so this lands in the outer
    // one and still reaches the requirement left in the closed inner block.
    resolver.define(&use_site(3), "second", Type::Object, "o1".to_string(), &mut errors);
    // The inner "first" is out of sight here, so this is no conflict.
    resolver.define(&use_site(4), "first", Type::Text, "World".to_string(), &mut errors);

    let (first, cb2) = callback();
    resolver.resolve(&use_site(5), "first", Type::Object, cb2);

    assert_eq!(value(&second).as_deref(), Some("o1"));
    assert_eq!(value(&first).as_deref(), Some("World"));
    assert!(errors.is_empty(), "{:?}", errors.reports());
    resolver.pop();
}

#[test]
fn requirements_fail_when_the_outermost_block_closes() {
    let mut resolver: Resolver<Type, String> = Resolver::new();
    resolver.push(vec![Type::Object]);
    let (missing, cb) = callback();
    resolver.resolve(&use_site(7), "missing", Type::Object, cb);
    resolver.push(vec![Type::Text]);
    resolver.pop();
    assert!(missing.borrow().is_none(), "inner pops do not fail anything");
    resolver.pop();

    let outcome = missing.borrow_mut().take().expect("continuation ran");
    let failure = outcome.expect_err("nothing defined it");
    assert_eq!(failure.id, "missing");
    assert_eq!(failure.origin.location().outermost().line, 7);
    assert_eq!(failure.to_error().kind, ErrorKind::UnresolvedIdentifier { id: "missing".into() });
}

#[test]
fn a_text_requirement_is_not_met_by_an_object() {
    let mut errors = ErrorCollector::new();
    let mut resolver = Resolver::new();
    resolver.push(vec![Type::Object]);
    resolver.define(&use_site(1), "x", Type::Object, "o".to_string(), &mut errors);
    let (x, cb) = callback();
    resolver.resolve(&use_site(2), "x", Type::Text, cb);
    resolver.pop();

    let failure = x.borrow_mut().take().expect("ran").expect_err("kinds differ");
    assert_eq!(
        failure.to_error().kind,
        ErrorKind::KindMismatch {
            id: "x".into(),
            expected: "text".into(),
            found: "object".into()
        }
    );
}

#[test]
fn resolving_with_no_open_block_fails_at_once() {
    let mut resolver: Resolver<Type, String> = Resolver::new();
    let (slot, cb) = callback();
    resolver.resolve(&use_site(1), "x", Type::Object, cb);
    assert!(matches!(*slot.borrow(), Some(Err(_))));
}

#[test]
fn the_resolver_is_reusable_after_the_outermost_pop() {
    let mut errors = ErrorCollector::new();
    let mut resolver = Resolver::new();
    resolver.push(vec![Type::Object]);
    resolver.define(&use_site(1), "x", Type::Object, "old".to_string(), &mut errors);
    resolver.pop();
    assert_eq!(resolver.depth(), 0);

    resolver.push(vec![Type::Object]);
    assert_eq!(resolver.find("x", &Type::Object), None);
    resolver.define(&use_site(2), "x", Type::Object, "new".to_string(), &mut errors);
    assert_eq!(resolver.find("x", &Type::Object).map(String::as_str), Some("new"));
    resolver.pop();
    assert!(errors.is_empty());
}
