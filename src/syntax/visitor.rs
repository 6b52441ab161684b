//! The flat event stream every stage speaks.
//!
//! A source of S-expressions ([`SExpression`]) pushes events into a
//! [`SexpVisitor`]: `locate` always precedes the event it describes, groups are
//! bracketed by `open`/`close`. Stages are visitors that forward (possibly
//! rewritten) events to a delegate, so a document streams through the whole
//! pipeline without intermediate trees where none are needed.

use serde::{Deserialize, Serialize};

use super::location::Location;

/// The bracket pair a group was written with. `(` and `[` are interchangeable
/// but must be closed by their own partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Delim {
    #[default]
    Paren,
    Bracket,
}

impl Delim {
    pub fn from_open(c: char) -> Option<Delim> {
        match c {
            '(' => Some(Delim::Paren),
            '[' => Some(Delim::Bracket),
            _ => None,
        }
    }

    pub fn from_close(c: char) -> Option<Delim> {
        match c {
            ')' => Some(Delim::Paren),
            ']' => Some(Delim::Bracket),
            _ => None,
        }
    }

    pub fn open_char(self) -> char {
        match self {
            Delim::Paren => '(',
            Delim::Bracket => '[',
        }
    }

    pub fn close_char(self) -> char {
        match self {
            Delim::Paren => ')',
            Delim::Bracket => ']',
        }
    }
}

/// Receiver of the S-expression event stream.
pub trait SexpVisitor {
    /// Sets the location of the next event.
    fn locate(&mut self, location: &Location);
    fn open(&mut self, delim: Delim);
    fn atom(&mut self, value: &str);
    fn comment(&mut self, text: &str);
    fn close(&mut self, delim: Delim);
}

impl<V: SexpVisitor + ?Sized> SexpVisitor for &mut V {
    fn locate(&mut self, location: &Location) {
        (**self).locate(location)
    }

    fn open(&mut self, delim: Delim) {
        (**self).open(delim)
    }

    fn atom(&mut self, value: &str) {
        (**self).atom(value)
    }

    fn comment(&mut self, text: &str) {
        (**self).comment(text)
    }

    fn close(&mut self, delim: Delim) {
        (**self).close(delim)
    }
}

/// Anything that can replay itself as an event stream.
pub trait SExpression {
    fn accept(&self, visitor: &mut dyn SexpVisitor);
}

/// Drops comment events unless `keep` is set; everything else passes through.
pub struct StripComments<V> {
    delegate: V,
    keep: bool,
    pending: Option<Location>,
}

impl<V: SexpVisitor> StripComments<V> {
    pub fn new(delegate: V, keep: bool) -> Self {
        Self {
            delegate,
            keep,
            pending: None,
        }
    }

    pub fn into_inner(self) -> V {
        self.delegate
    }

    // A location is only forwarded once we know the event it belongs to
    // survives, so a dropped comment leaves no stray `locate` behind.
    fn flush(&mut self) {
        if let Some(location) = self.pending.take() {
            self.delegate.locate(&location);
        }
    }
}

impl<V: SexpVisitor> SexpVisitor for StripComments<V> {
    fn locate(&mut self, location: &Location) {
        self.pending = Some(location.clone());
    }

    fn open(&mut self, delim: Delim) {
        self.flush();
        self.delegate.open(delim);
    }

    fn atom(&mut self, value: &str) {
        self.flush();
        self.delegate.atom(value);
    }

    fn comment(&mut self, text: &str) {
        if self.keep {
            self.flush();
            self.delegate.comment(text);
        } else {
            self.pending = None;
        }
    }

    fn close(&mut self, delim: Delim) {
        self.flush();
        self.delegate.close(delim);
    }
}
