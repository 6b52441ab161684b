//! Template definitions.
//!
//! `(template name (params...) body...)` declares a structural macro. Each
//! parameter is one of:
//!
//! | form            | meaning                                          |
//! |-----------------|--------------------------------------------------|
//! | `@x`            | required keyword argument `x:`                   |
//! | `[@x d]`        | keyword argument `x:` defaulting to `d`          |
//! | `[@x]`          | keyword argument `x:` defaulting to nothing      |
//! | `@1`            | mandatory positional argument                    |
//! | `[@2 d]`/`[@2]` | optional positional argument                     |
//! | `@rest`         | every positional argument left over              |
//! | `[@rest d...]`  | as `@rest`, with values used when none are left  |
//!
//! Positional parameters are numbered from 1 without gaps, and mandatory ones
//! come before optional ones. Every `@name` in the body must be declared.

use std::collections::HashMap;

use tracing::trace;

use crate::errors::{ErrorHandler, ErrorKind, SexpError};
use crate::syntax::{Invocation, Location, Node, NodeBuilder, SExpression, SexpVisitor};

use super::cutout::{Cutout, Cutter};
use super::substitution::Substitution;
use super::Macro;

pub const TEMPLATE: &str = "template";
const REST: &str = "rest";

/// What a parameter falls back to when the caller leaves it out.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    /// The caller must supply it.
    Required,
    /// Expands to nothing.
    Nothing,
    Value(Node),
}

impl Fallback {
    fn from_parts(parts: &[&Node]) -> Fallback {
        match parts.get(1) {
            Some(node) => Fallback::Value((*node).clone()),
            None => Fallback::Nothing,
        }
    }

    fn bound(&self) -> Option<Vec<Node>> {
        match self {
            Fallback::Required => None,
            Fallback::Nothing => Some(Vec::new()),
            Fallback::Value(node) => Some(vec![node.clone()]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    location: Location,
    body: Vec<Node>,
    named: Vec<(String, Fallback)>,
    positional: Vec<Fallback>,
    /// Present when `@rest` is declared; holds its defaults.
    rest: Option<Vec<Node>>,
}

// ============================================================================
// DEFINITION
// ============================================================================

impl Template {
    /// Reads a `(template ...)` form. Problems with the form or its parameter
    /// list are reported and yield `None`; undeclared placeholders in the body
    /// are reported but the template is still returned.
    pub fn define(definition: &Node, errors: &mut dyn ErrorHandler) -> Option<Template> {
        let malformed = |errors: &mut dyn ErrorHandler| {
            errors.handle(SexpError::at_node(ErrorKind::MalformedTemplate, definition));
            None
        };
        let Some(seq) = definition.as_seq() else {
            return malformed(errors);
        };
        let (Some(head), Some(name), Some(params)) = (
            seq.expr(0).and_then(Node::as_atom),
            seq.expr(1).and_then(Node::as_atom),
            seq.expr(2).and_then(Node::as_seq),
        ) else {
            return malformed(errors);
        };
        if head.value != TEMPLATE {
            return malformed(errors);
        }

        let mut template = Template {
            name: name.value.clone(),
            location: definition.location().clone(),
            body: Vec::new(),
            named: Vec::new(),
            positional: Vec::new(),
            rest: None,
        };

        for param in params.exprs() {
            if let Err(error) = template.declare(param) {
                errors.handle(error);
                return None;
            }
        }

        let mut seen = 0;
        template.body = seq
            .children
            .iter()
            .skip_while(|node| {
                if seen == 3 {
                    return false;
                }
                if !node.is_comment() {
                    seen += 1;
                }
                true
            })
            .cloned()
            .collect();

        template.check_body(errors);
        Some(template)
    }

    fn declare(&mut self, param: &Node) -> Result<(), SexpError> {
        let malformed = || {
            SexpError::at_node(
                ErrorKind::MalformedParameter {
                    text: param.to_string(),
                },
                param,
            )
        };
        let (arg, parts) = match param {
            Node::Atom(atom) => (atom.placeholder().ok_or_else(malformed)?, None),
            Node::Seq(seq) => {
                let parts: Vec<&Node> = seq.exprs().collect();
                let arg = parts
                    .first()
                    .copied()
                    .and_then(Node::as_atom)
                    .and_then(|a| a.placeholder())
                    .ok_or_else(malformed)?;
                (arg, Some(parts))
            }
            Node::Comment(_) => return Err(malformed()),
        };

        if let Some(index) = numbered(arg) {
            return self.declare_positional(param, arg, index, parts.as_deref());
        }
        if arg.parse::<usize>().is_ok() {
            return Err(malformed());
        }

        if arg == REST {
            if self.rest.is_some() {
                return Err(duplicate(param, arg));
            }
            let defaults: Vec<Node> = parts
                .map(|p| p[1..].iter().map(|n| (*n).clone()).collect())
                .unwrap_or_default();
            self.rest = Some(defaults);
            return Ok(());
        }

        if self.named.iter().any(|(name, _)| name == arg) {
            return Err(duplicate(param, arg));
        }
        let fallback = match parts {
            None => Fallback::Required,
            Some(p) if p.len() <= 2 => Fallback::from_parts(&p),
            Some(_) => return Err(malformed()),
        };
        self.named.push((arg.to_string(), fallback));
        Ok(())
    }

    fn declare_positional(
        &mut self,
        param: &Node,
        arg: &str,
        index: usize,
        parts: Option<&[&Node]>,
    ) -> Result<(), SexpError> {
        if index != self.positional.len() + 1 {
            return Err(SexpError::at_node(
                ErrorKind::PositionalOutOfOrder {
                    index: arg.to_string(),
                },
                param,
            ));
        }
        let fallback = match parts {
            None => {
                if self.positional.iter().any(|f| *f != Fallback::Required) {
                    return Err(SexpError::at_node(
                        ErrorKind::MandatoryAfterOptional {
                            index: arg.to_string(),
                        },
                        param,
                    ));
                }
                Fallback::Required
            }
            Some(p) if p.len() <= 2 => Fallback::from_parts(p),
            Some(_) => {
                return Err(SexpError::at_node(
                    ErrorKind::MalformedParameter {
                        text: param.to_string(),
                    },
                    param,
                ))
            }
        };
        self.positional.push(fallback);
        Ok(())
    }

    fn declares(&self, arg: &str) -> bool {
        match numbered(arg) {
            Some(index) => (1..=self.positional.len()).contains(&index),
            None if arg == REST => self.rest.is_some(),
            None => self.named.iter().any(|(name, _)| name == arg),
        }
    }

    fn check_body(&self, errors: &mut dyn ErrorHandler) {
        for node in &self.body {
            node.walk(&mut |n| {
                if let Some(arg) = n.as_atom().and_then(|a| a.placeholder()) {
                    if !self.declares(arg) {
                        errors.handle(SexpError::at_node(
                            ErrorKind::UnboundPlaceholder {
                                name: arg.to_string(),
                            },
                            n,
                        ));
                    }
                }
                true
            });
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }

    /// Binds the arguments of an invocation that has passed the shape check.
    pub fn bind(&self, named: &[(String, Node)], remainder: &[Node]) -> HashMap<String, Vec<Node>> {
        let mut bindings = HashMap::new();

        for (name, fallback) in &self.named {
            let supplied = named
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| vec![v.clone()]);
            if let Some(value) = supplied.or_else(|| fallback.bound()) {
                bindings.insert(name.clone(), value);
            }
        }

        for (i, fallback) in self.positional.iter().enumerate() {
            let supplied = remainder.get(i).map(|n| vec![n.clone()]);
            if let Some(value) = supplied.or_else(|| fallback.bound()) {
                bindings.insert((i + 1).to_string(), value);
            }
        }

        if let Some(defaults) = &self.rest {
            let leftover = remainder.get(self.positional.len()..).unwrap_or_default();
            let value = if leftover.is_empty() {
                defaults.clone()
            } else {
                leftover.to_vec()
            };
            bindings.insert(REST.to_string(), value);
        }

        bindings
    }
}

/// The index of a numbered placeholder. Only plain numerals count, so `@01`
/// and `@+1` are not numbered.
fn numbered(arg: &str) -> Option<usize> {
    arg.parse::<usize>().ok().filter(|index| index.to_string() == arg)
}

fn duplicate(param: &Node, arg: &str) -> SexpError {
    SexpError::at_node(ErrorKind::DuplicateParameter { name: arg.to_string() }, param)
}

impl Macro for Template {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_arguments(&self) -> Vec<&str> {
        self.named
            .iter()
            .filter(|(_, f)| *f == Fallback::Required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn allowed_arguments(&self) -> Vec<&str> {
        self.named.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn min_positional(&self) -> usize {
        self.positional
            .iter()
            .filter(|f| **f == Fallback::Required)
            .count()
    }

    fn max_positional(&self) -> Option<usize> {
        match self.rest {
            Some(_) => None,
            None => Some(self.positional.len()),
        }
    }

    fn transform(
        &self,
        invocation: &Invocation,
        _errors: &mut dyn ErrorHandler,
    ) -> Box<dyn SExpression> {
        let bindings = self.bind(&invocation.arguments, &invocation.remainder);
        Box::new(Substitution::new(
            invocation.node.location(),
            self.body.clone(),
            bindings,
        ))
    }
}

// ============================================================================
// STRIPPING DEFINITIONS FROM A DOCUMENT
// ============================================================================

struct TemplateStripper<'e> {
    templates: Vec<Template>,
    errors: &'e mut dyn ErrorHandler,
}

impl Cutter for TemplateStripper<'_> {
    type Buffer = NodeBuilder;

    fn cut(&mut self, head: &str) -> Option<NodeBuilder> {
        (head == TEMPLATE).then(NodeBuilder::new)
    }

    fn paste(&mut self, buffer: NodeBuilder) -> Option<Box<dyn SExpression>> {
        let definition = buffer.into_node()?;
        let template = Template::define(&definition, self.errors)?;
        if self.templates.iter().any(|t| t.name == template.name) {
            self.errors.handle(SexpError::at_node(
                ErrorKind::DuplicateTemplate {
                    name: template.name.clone(),
                },
                &definition,
            ));
        } else {
            trace!(name = %template.name, location = %template.location, "registered template");
            self.templates.push(template);
        }
        None
    }
}

/// Removes every `(template ...)` form from `input`, forwarding the rest to
/// `output`, and returns the templates that were defined correctly.
pub fn strip_templates<S: SExpression + ?Sized>(
    input: &S,
    output: &mut dyn SexpVisitor,
    errors: &mut dyn ErrorHandler,
) -> Vec<Template> {
    let stripper = TemplateStripper {
        templates: Vec::new(),
        errors,
    };
    let mut cutout = Cutout::new(stripper, output);
    input.accept(&mut cutout);
    let (stripper, _) = cutout.finish();
    stripper.templates
}
