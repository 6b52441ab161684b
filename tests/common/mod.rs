//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;

use sexpand::errors::{ErrorCollector, ErrorKind};
use sexpand::syntax::{parse_nodes, to_text, Node};
use sexpand::{ExpansionOptions, Pipeline};

/// Parses `text`, failing the test on any report.
pub fn parse_clean(text: &str) -> Vec<Node> {
    let mut errors = ErrorCollector::new();
    let nodes = parse_nodes("test", text, &mut errors);
    assert!(errors.is_empty(), "unexpected reports: {:?}", errors.reports());
    nodes
}

/// Expands a self-contained document with default options.
pub fn expand(text: &str) -> (String, ErrorCollector) {
    expand_with(ExpansionOptions::default(), text)
}

pub fn expand_with(options: ExpansionOptions, text: &str) -> (String, ErrorCollector) {
    let processed = Pipeline::new(options).expand_source("test", text);
    (to_text(&processed.nodes), processed.errors)
}

/// Expands a document that must not report anything.
pub fn expand_clean(text: &str) -> String {
    let (out, errors) = expand(text);
    assert!(errors.is_empty(), "unexpected reports: {:?}", errors.reports());
    out
}

pub fn kinds(errors: &ErrorCollector) -> Vec<ErrorKind> {
    errors.kinds().cloned().collect()
}

/// Scope configuration from (head, kind) pairs.
pub fn scopes(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (head, kind) in pairs {
        map.entry(head.to_string()).or_default().push(kind.to_string());
    }
    map
}
