//! The expansion driver.
//!
//! Manages the macro table, the stack of invocations currently being replayed
//! and the depth limit. Recursion is caught by name: an invocation of a macro
//! whose own expansion is still being replayed is reported and dropped, so
//! neither direct nor mutual recursion can loop.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::errors::{ErrorHandler, ErrorKind, SexpError};
use crate::syntax::{Invocation, Node, NodeBuilder, SExpression, SexpVisitor};

use super::cutout::{Cutout, Cutter};
use super::{check_arguments, Macro, MAX_EXPANSION_DEPTH};

pub struct Expander<'e> {
    macros: HashMap<String, Box<dyn Macro>>,
    active: Vec<String>,
    max_depth: usize,
    errors: &'e mut dyn ErrorHandler,
}

impl<'e> Expander<'e> {
    pub fn new(errors: &'e mut dyn ErrorHandler) -> Self {
        Self {
            macros: HashMap::new(),
            active: Vec::new(),
            max_depth: MAX_EXPANSION_DEPTH,
            errors,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Adds a macro, replacing any earlier one with the same name.
    pub fn register(&mut self, m: Box<dyn Macro>) {
        trace!(name = m.name(), "registered macro");
        self.macros.insert(m.name().to_string(), m);
    }

    pub fn register_all(&mut self, macros: impl IntoIterator<Item = Box<dyn Macro>>) {
        for m in macros {
            self.register(m);
        }
    }

    /// Replays `input` into `output` with every invocation expanded.
    pub fn expand<S: SExpression + ?Sized>(&mut self, input: &S, output: &mut dyn SexpVisitor) {
        debug!(macros = self.macros.len(), max_depth = self.max_depth, "expanding");
        let mut cutout = Cutout::new(&mut *self, output);
        input.accept(&mut cutout);
        cutout.finish();
    }

    pub fn expand_nodes(&mut self, input: &[Node]) -> Vec<Node> {
        let mut builder = NodeBuilder::new();
        self.expand(input, &mut builder);
        builder.into_nodes()
    }
}

impl Cutter for Expander<'_> {
    type Buffer = NodeBuilder;

    fn cut(&mut self, head: &str) -> Option<NodeBuilder> {
        self.macros.contains_key(head).then(NodeBuilder::new)
    }

    fn paste(&mut self, buffer: NodeBuilder) -> Option<Box<dyn SExpression>> {
        let node = buffer.into_node()?;
        let invocation = Invocation::of(&node, self.errors)?;
        let m = self.macros.get(&invocation.name)?;

        if self.active.contains(&invocation.name) {
            self.errors.handle(SexpError::at_node(
                ErrorKind::RecursiveExpansion {
                    name: invocation.name.clone(),
                },
                &node,
            ));
            return None;
        }
        if self.active.len() >= self.max_depth {
            self.errors.handle(SexpError::at_node(
                ErrorKind::ExpansionDepthExceeded {
                    limit: self.max_depth,
                },
                &node,
            ));
            return None;
        }
        if !check_arguments(m.as_ref(), &invocation, self.errors) {
            return None;
        }

        trace!(name = %invocation.name, depth = self.active.len(), "expanding invocation");
        let replacement = m.transform(&invocation, self.errors);
        self.active.push(invocation.name);
        Some(replacement)
    }

    fn pasted(&mut self) {
        self.active.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCollector;
    use crate::macros::{standard_macros, strip_templates};
    use crate::syntax::{parse_nodes, to_text};

    fn expand(text: &str) -> (String, ErrorCollector) {
        let mut errors = ErrorCollector::new();
        let nodes = parse_nodes("test", text, &mut errors);
        let mut stripped = NodeBuilder::new();
        let templates = strip_templates(&nodes, &mut stripped, &mut errors);
        let stripped = stripped.into_nodes();

        let out = {
            let mut expander = Expander::new(&mut errors);
            expander.register_all(standard_macros());
            for t in templates {
                expander.register(Box::new(t));
            }
            expander.expand_nodes(&stripped)
        };
        (to_text(&out), errors)
    }

    #[test]
    fn templates_expand_into_other_templates() {
        let (out, errors) = expand("(template a (@1) (b @1)) (template b (@1) [@1 @1]) (a z)");
        assert!(errors.is_empty());
        assert_eq!(out, "[z z]");
    }

    #[test]
    fn arguments_expand_in_the_callers_context() {
        let (out, errors) = expand("(template f (@x) [@x]) (f x: (f x: 1))");
        assert!(errors.is_empty(), "{:?}", errors.reports());
        assert_eq!(out, "[[1]]");
    }

    #[test]
    fn recursion_is_reported_once_per_attempt() {
        let (out, errors) = expand("(template foo () (foo)) (foo)");
        assert_eq!(out, "");
        assert_eq!(
            errors.kinds().cloned().collect::<Vec<_>>(),
            vec![ErrorKind::RecursiveExpansion { name: "foo".into() }]
        );
    }

    #[test]
    fn shape_errors_drop_only_the_invocation() {
        let (out, errors) = expand("(template t (@x) @x) (a (t) (t x: 1 y: 2) (t x: 3))");
        assert_eq!(out, "(a 3)");
        let kinds: Vec<ErrorKind> = errors.kinds().cloned().collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::MissingArgument {
                    name: "t".into(),
                    argument: "x".into()
                },
                ErrorKind::UnexpectedArgument {
                    name: "t".into(),
                    argument: "y".into()
                },
            ]
        );
    }

    #[test]
    fn positional_counts_are_checked() {
        let (_, errors) = expand("(template t (@1 [@2]) @1) (t) (t a b c)");
        let kinds: Vec<ErrorKind> = errors.kinds().cloned().collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::TooFewArguments {
                    name: "t".into(),
                    min: 1,
                    found: 0
                },
                ErrorKind::TooManyArguments {
                    name: "t".into(),
                    max: 2,
                    found: 3
                },
            ]
        );
    }

    #[test]
    fn depth_limit_stops_long_chains() {
        let mut errors = ErrorCollector::new();
        let nodes = parse_nodes(
            "test",
            "(template a () (b)) (template b () (c)) (template c () done) (a)",
            &mut errors,
        );
        let mut stripped = NodeBuilder::new();
        let templates = strip_templates(&nodes, &mut stripped, &mut errors);
        let stripped = stripped.into_nodes();

        let out = {
            let mut expander = Expander::new(&mut errors).with_max_depth(2);
            expander.register_all(templates.into_iter().map(|t| Box::new(t) as Box<dyn Macro>));
            expander.expand_nodes(&stripped)
        };
        assert!(out.is_empty());
        assert_eq!(
            errors.kinds().cloned().collect::<Vec<_>>(),
            vec![ErrorKind::ExpansionDepthExceeded { limit: 2 }]
        );
    }

    #[test]
    fn builtins() {
        let (out, errors) = expand("(concat a b c) (concat separator: - x y) (unique-name) (unique-name v)");
        assert!(errors.is_empty());
        assert_eq!(out, "abc x-y *unique-name-1* *v-2*");

        let (_, errors) = expand("(concat a (b))");
        assert!(matches!(errors.kinds().next(), Some(ErrorKind::MacroArgument { .. })));
    }
}
