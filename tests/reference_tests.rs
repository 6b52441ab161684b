// tests/reference_tests.rs

mod common;

use common::{kinds, parse_clean, scopes};
use sexpand::errors::{ErrorCollector, ErrorKind};
use sexpand::include::MapIncludeResolver;
use sexpand::references::ReferenceChecker;
use sexpand::syntax::Seq;
use sexpand::{ExpansionOptions, Pipeline};

#[test]
fn references_resolve_in_either_order() {
    let nodes = parse_clean("(a to: #b) (thing name: b) (c to: #b)");
    let mut errors = ErrorCollector::new();
    let resolved = ReferenceChecker::new(&scopes(&[])).check(&nodes, &mut errors);
    assert!(errors.is_empty());
    assert_eq!(resolved.len(), 2);
    assert!(resolved
        .iter()
        .all(|r| r.target.as_seq().and_then(Seq::head_name) == Some("thing")));
}

#[test]
fn inner_scopes_see_outer_definitions_but_not_siblings() {
    let nodes = parse_clean(
        "(world name: w
           (region name: north (town name: a) (road to: #b) (road to: #w))
           (region name: south (town name: b) (road to: #a)))",
    );
    let mut errors = ErrorCollector::new();
    let resolved =
        ReferenceChecker::new(&scopes(&[("region", "town")])).check(&nodes, &mut errors);

    let ids: Vec<&str> = resolved.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["w"]);
    assert_eq!(
        kinds(&errors),
        vec![
            ErrorKind::UnresolvedIdentifier { id: "b".into() },
            ErrorKind::UnresolvedIdentifier { id: "a".into() },
        ]
    );
}

#[test]
fn kinds_a_scope_rejects_go_to_the_enclosing_scope() {
    let nodes = parse_clean(
        "(region name: north (town name: a) (person name: ann))
         (region name: south (road to: #ann) (road to: #a))",
    );
    let mut errors = ErrorCollector::new();
    let resolved =
        ReferenceChecker::new(&scopes(&[("region", "town")])).check(&nodes, &mut errors);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id, "ann");
    assert_eq!(kinds(&errors), vec![ErrorKind::UnresolvedIdentifier { id: "a".into() }]);
}

#[test]
fn kinds_no_scope_holds_fall_back_to_the_document() {
    let nodes = parse_clean("(region (town name: a)) (road to: #a)");
    let mut errors = ErrorCollector::new();
    let resolved =
        ReferenceChecker::new(&scopes(&[("region", "road")])).check(&nodes, &mut errors);
    assert!(errors.is_empty(), "{:?}", errors.reports());
    assert_eq!(resolved.len(), 1);
}

#[test]
fn duplicate_definitions_point_at_both() {
    let nodes = parse_clean("(thing name: x)\n(thing name: x)");
    let mut errors = ErrorCollector::new();
    ReferenceChecker::new(&scopes(&[])).check(&nodes, &mut errors);
    let report = &errors.reports()[0];
    assert_eq!(report.kind, ErrorKind::DuplicateDefinition { id: "x".into() });
    let lines: Vec<usize> = report.all_locations().map(|l| l.outermost().line).collect();
    assert_eq!(lines, vec![2, 1]);
}

#[test]
fn the_pipeline_checks_expanded_output() {
    let options = ExpansionOptions::from_yaml_str("scopes:\n  region: [town]\n").expect("valid");
    let mut resolver = MapIncludeResolver::new();
    let checked = Pipeline::new(options).check(
        "main",
        "(template settle (@1) (town name: @1))
         (region (settle a) (road to: #a))
         (region (road to: #a))",
        &mut resolver,
    );
    assert_eq!(checked.resolved.len(), 1);
    let report = &checked.errors.reports()[0];
    assert_eq!(report.kind, ErrorKind::UnresolvedIdentifier { id: "a".into() });
    assert_eq!(report.primary_location().map(|l| l.outermost().line), Some(3));
}
