//! Rebuilds a node tree from the event stream.

use super::location::Location;
use super::node::{Atom, Comment, Node, Seq};
use super::visitor::{Delim, SexpVisitor};

/// A group that has been opened but not yet closed.
#[derive(Debug)]
struct OpenSeq {
    delim: Delim,
    location: Location,
    children: Vec<Node>,
}

/// Returned by [`NodeBuilder::finish`] when groups were left open.
#[derive(Debug, Clone)]
pub struct Unfinished {
    /// The tree with every open group closed at the last known location.
    pub best_effort: Vec<Node>,
    /// Where the outermost still-open group started.
    pub unclosed: Location,
}

/// Collects events into nodes. The whole stream is treated as one implicit
/// outer group; its children are the top-level nodes.
#[derive(Debug)]
pub struct NodeBuilder {
    here: Location,
    top: Vec<Node>,
    open: Vec<OpenSeq>,
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            here: Location::nowhere(),
            top: Vec::new(),
            open: Vec::new(),
        }
    }

    /// Number of groups currently open.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(seq) => seq.children.push(node),
            None => self.top.push(node),
        }
    }

    /// The top-level nodes, or the best effort if groups were left open.
    pub fn finish(mut self) -> Result<Vec<Node>, Unfinished> {
        let Some(outermost) = self.open.first() else {
            return Ok(self.top);
        };
        let unclosed = outermost.location.clone();
        while let Some(delim) = self.open.last().map(|s| s.delim) {
            self.close(delim);
        }
        Err(Unfinished {
            best_effort: self.top,
            unclosed,
        })
    }

    /// The top-level nodes, closing anything left open.
    pub fn into_nodes(self) -> Vec<Node> {
        self.finish().unwrap_or_else(|unfinished| unfinished.best_effort)
    }

    /// The first top-level node, if any.
    pub fn into_node(self) -> Option<Node> {
        self.into_nodes().into_iter().next()
    }
}

impl SexpVisitor for NodeBuilder {
    fn locate(&mut self, location: &Location) {
        self.here = location.clone();
    }

    fn open(&mut self, delim: Delim) {
        self.open.push(OpenSeq {
            delim,
            location: self.here.clone(),
            children: Vec::new(),
        });
    }

    fn atom(&mut self, value: &str) {
        let atom = Atom::new(value, self.here.clone());
        self.push(Node::Atom(atom));
    }

    fn comment(&mut self, text: &str) {
        let comment = Comment::new(text, self.here.clone());
        self.push(Node::Comment(comment));
    }

    fn close(&mut self, _delim: Delim) {
        // A stray close with nothing open has nothing to finish.
        if let Some(seq) = self.open.pop() {
            let node = Seq::new(seq.delim, seq.children, seq.location, self.here.clone());
            self.push(Node::Seq(node));
        }
    }
}
