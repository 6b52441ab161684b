//! Source locations with include/template provenance.
//!
//! A [`Location`] is a non-empty chain of [`Position`]s. The first position is
//! the outermost point (the include site or template call site as seen from the
//! document being processed), the last one is the innermost point where the
//! characters were actually written. The kind of each position records how the
//! chain crossed into the next one.
//!
//! Chains are `im::Vector`s, so appending a hop during expansion shares the
//! existing positions instead of copying them.

use std::fmt;
use std::sync::Arc;

use im::Vector;
use serde::{Deserialize, Serialize};

/// How a position leads on to the next position in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionKind {
    /// Plain source text; the last position of every chain is normal.
    #[default]
    Normal,
    /// The text at this position included another document.
    Include,
    /// The text at this position invoked a template.
    Template,
}

impl fmt::Display for PositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionKind::Normal => write!(f, "normal"),
            PositionKind::Include => write!(f, "include"),
            PositionKind::Template => write!(f, "template"),
        }
    }
}

/// A single point in a named source. Lines and columns are 1-based, the offset
/// is a byte offset into the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub origin: Arc<str>,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub kind: PositionKind,
}

impl Position {
    pub fn new(origin: impl Into<Arc<str>>, offset: usize, line: usize, column: usize) -> Self {
        Self {
            origin: origin.into(),
            offset,
            line,
            column,
            kind: PositionKind::Normal,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.line, self.column)
    }
}

/// An immutable, append-only chain of positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    chain: Vector<Position>,
}

impl Location {
    /// A single-position location.
    pub fn at(origin: impl Into<Arc<str>>, offset: usize, line: usize, column: usize) -> Self {
        Self::from(Position::new(origin, offset, line, column))
    }

    /// Placeholder for synthesized nodes that never came from any text.
    pub fn nowhere() -> Self {
        Self::at("<nowhere>", 0, 0, 0)
    }

    /// Records crossing from `self` into `inner`: the last position of `self`
    /// takes `kind` and the positions of `inner` are appended after it.
    pub fn via(&self, kind: PositionKind, inner: &Location) -> Location {
        let mut chain = self.chain.clone();
        if let Some(last) = chain.back_mut() {
            last.kind = kind;
        }
        chain.append(inner.chain.clone());
        Location { chain }
    }

    /// The position a diagnostic should point at first.
    pub fn outermost(&self) -> &Position {
        &self.chain[0]
    }

    /// Where the characters were really written.
    pub fn innermost(&self) -> &Position {
        &self.chain[self.chain.len() - 1]
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.chain.iter()
    }

    /// Number of positions in the chain (always at least one).
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// True when any hop in the chain is of the given kind.
    pub fn crosses(&self, kind: PositionKind) -> bool {
        self.chain.iter().any(|p| p.kind == kind)
    }
}

impl From<Position> for Location {
    fn from(position: Position) -> Self {
        Location {
            chain: Vector::unit(position),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for position in &self.chain {
            if !first {
                write!(f, " -> ")?;
            }
            write!(f, "{}", position)?;
            if position.kind != PositionKind::Normal {
                write!(f, " ({})", position.kind)?;
            }
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn via_marks_the_hop_and_appends() {
        let call = Location::at("main.sexp", 10, 2, 3);
        let body = Location::at("lib.sexp", 4, 1, 5);
        let chained = call.via(PositionKind::Template, &body);

        assert_eq!(chained.depth(), 2);
        assert_eq!(chained.outermost().origin.as_ref(), "main.sexp");
        assert_eq!(chained.outermost().kind, PositionKind::Template);
        assert_eq!(chained.innermost().origin.as_ref(), "lib.sexp");
        assert_eq!(chained.innermost().kind, PositionKind::Normal);
        assert!(chained.crosses(PositionKind::Template));
        assert!(!chained.crosses(PositionKind::Include));
    }

    #[test]
    fn via_leaves_the_original_untouched() {
        let call = Location::at("main.sexp", 0, 1, 1);
        let _ = call.via(PositionKind::Include, &Location::at("inc.sexp", 0, 1, 1));
        assert_eq!(call.depth(), 1);
        assert_eq!(call.outermost().kind, PositionKind::Normal);
    }

    #[test]
    fn display_walks_the_chain() {
        let chained = Location::at("a", 0, 1, 2).via(PositionKind::Include, &Location::at("b", 0, 3, 4));
        assert_eq!(chained.to_string(), "a:1:2 (include) -> b:3:4");
    }
}
