//! The node tree.
//!
//! Nodes are immutable once built. Equality is structural: two nodes are equal
//! when their shape, atom values, delimiters and comment texts agree, wherever
//! they were written.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::location::Location;
use super::visitor::{Delim, SExpression, SexpVisitor};

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Atom(Atom),
    Seq(Seq),
    Comment(Comment),
}

/// A leaf token. `quoted` is true when the value can only be written inside
/// double quotes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub value: String,
    pub quoted: bool,
    pub location: Location,
}

/// A bracketed group. `end` is the location of the closing bracket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seq {
    pub delim: Delim,
    pub children: Vec<Node>,
    pub location: Location,
    pub end: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub location: Location,
}

// ============================================================================
// CONSTRUCTION AND ACCESS
// ============================================================================

impl Atom {
    pub fn new(value: impl Into<String>, location: Location) -> Self {
        let value = value.into();
        let quoted = needs_quotes(&value);
        Self {
            value,
            quoted,
            location,
        }
    }

    /// The keyword name if this atom is written `name:`.
    pub fn keyword(&self) -> Option<&str> {
        if self.quoted {
            return None;
        }
        self.value
            .strip_suffix(':')
            .filter(|name| !name.is_empty())
    }

    /// The placeholder name if this atom is written `@name`.
    pub fn placeholder(&self) -> Option<&str> {
        self.value.strip_prefix('@').filter(|name| !name.is_empty())
    }

    /// The identifier if this atom is a `#id` cross-reference.
    pub fn reference(&self) -> Option<&str> {
        self.value.strip_prefix('#').filter(|id| !id.is_empty())
    }
}

impl Seq {
    pub fn new(delim: Delim, children: Vec<Node>, location: Location, end: Location) -> Self {
        Self {
            delim,
            children,
            location,
            end,
        }
    }

    /// Children that are not comments.
    pub fn exprs(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|n| !n.is_comment())
    }

    /// The `index`th non-comment child.
    pub fn expr(&self, index: usize) -> Option<&Node> {
        self.exprs().nth(index)
    }

    /// The first non-comment child.
    pub fn head(&self) -> Option<&Node> {
        self.expr(0)
    }

    /// The value of the head atom, if the head is an atom.
    pub fn head_name(&self) -> Option<&str> {
        self.head().and_then(Node::as_atom).map(|a| a.value.as_str())
    }

    /// Non-comment children after the head.
    pub fn tail(&self) -> impl Iterator<Item = &Node> {
        self.exprs().skip(1)
    }

    pub fn is_empty(&self) -> bool {
        self.exprs().next().is_none()
    }
}

impl Comment {
    pub fn new(text: impl Into<String>, location: Location) -> Self {
        Self {
            text: text.into(),
            location,
        }
    }
}

impl Node {
    pub fn atom(value: impl Into<String>, location: Location) -> Node {
        Node::Atom(Atom::new(value, location))
    }

    pub fn location(&self) -> &Location {
        match self {
            Node::Atom(a) => &a.location,
            Node::Seq(s) => &s.location,
            Node::Comment(c) => &c.location,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Node::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&Seq> {
        match self {
            Node::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Node::Comment(_))
    }

    /// Visits this node and, for sequences, every node below it, depth first.
    /// `f` returns false to skip the children of a sequence.
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&Node) -> bool,
    {
        let descend = f(self);
        if let (true, Node::Seq(seq)) = (descend, self) {
            for child in &seq.children {
                child.walk(f);
            }
        }
    }
}

// ============================================================================
// EVENT REPLAY
// ============================================================================

impl SExpression for Node {
    fn accept(&self, visitor: &mut dyn SexpVisitor) {
        match self {
            Node::Atom(atom) => {
                visitor.locate(&atom.location);
                visitor.atom(&atom.value);
            }
            Node::Comment(comment) => {
                visitor.locate(&comment.location);
                visitor.comment(&comment.text);
            }
            Node::Seq(seq) => {
                visitor.locate(&seq.location);
                visitor.open(seq.delim);
                for child in &seq.children {
                    child.accept(visitor);
                }
                visitor.locate(&seq.end);
                visitor.close(seq.delim);
            }
        }
    }
}

impl SExpression for [Node] {
    fn accept(&self, visitor: &mut dyn SexpVisitor) {
        for node in self {
            node.accept(visitor);
        }
    }
}

impl SExpression for Vec<Node> {
    fn accept(&self, visitor: &mut dyn SexpVisitor) {
        self.as_slice().accept(visitor)
    }
}

// ============================================================================
// STRUCTURAL EQUALITY
// ============================================================================

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialEq for Seq {
    fn eq(&self, other: &Self) -> bool {
        self.delim == other.delim && self.children == other.children
    }
}

impl PartialEq for Comment {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Atom(a), Node::Atom(b)) => a == b,
            (Node::Seq(a), Node::Seq(b)) => a == b,
            (Node::Comment(a), Node::Comment(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// TEXT FORM
// ============================================================================

/// True when the scanner would not read `value` back as one unquoted atom.
/// An unquoted run ends after its first colon, so only a trailing colon is
/// safe.
fn needs_quotes(value: &str) -> bool {
    let inner_colon = value
        .char_indices()
        .any(|(i, c)| c == ':' && i + 1 < value.len());
    value.is_empty()
        || inner_colon
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ';' | '"' | '\\'))
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.quoted {
            return write!(f, "{}", self.value);
        }
        write!(f, "\"")?;
        for c in self.value.chars() {
            if c == '"' || c == '\\' {
                write!(f, "\\")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "\"")
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.delim.open_char())?;
        let mut first = true;
        for child in &self.children {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}", child)?;
            first = false;
        }
        write!(f, "{}", self.delim.close_char())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Atom(a) => write!(f, "{}", a),
            Node::Seq(s) => write!(f, "{}", s),
            // The newline ends the comment so whatever follows still parses.
            Node::Comment(c) => writeln!(f, ";{}", c.text),
        }
    }
}

/// Writes nodes separated by single spaces.
pub fn to_text(nodes: &[Node]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
