//! Character-level S-expression scanner.
//!
//! The scanner is a small state machine fed one character at a time. It never
//! builds a tree itself: it emits `locate`/`open`/`atom`/`comment`/`close`
//! events to a [`SexpVisitor`] and reports problems to an [`ErrorHandler`].
//!
//! Surface rules:
//! - whitespace separates atoms; `(`/`[` open a group and `)`/`]` close it,
//!   each closing bracket must match the innermost open one;
//! - `;` starts a comment running to the end of the line;
//! - `"..."` is a quoted atom, `\` escapes the next character;
//! - an unquoted run ending in `:` is emitted at once, colon included, so
//!   `key:value` scans as the two atoms `key:` and `value`.
//!
//! A bracket mismatch is reported once and the scanner stops emitting. So is
//! a group opened deeper than the nesting limit: every later stage walks the
//! tree recursively, so the limit is what keeps them on the stack.

use std::sync::Arc;

use crate::errors::{ErrorHandler, ErrorKind, SexpError};

use super::builder::NodeBuilder;
use super::location::{Location, PositionKind};
use super::node::Node;
use super::visitor::{Delim, SexpVisitor};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Deepest group nesting the scanner accepts unless told otherwise.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// Scans `text` and emits its events to `visitor`.
pub fn parse(origin: &str, text: &str, visitor: &mut dyn SexpVisitor, errors: &mut dyn ErrorHandler) {
    parse_from(origin, text, None, MAX_NESTING_DEPTH, visitor, errors)
}

/// As [`parse`], with an explicit nesting limit. When `base` is given every
/// emitted location is chained onto it with an include hop, for text pulled
/// in from another document.
pub fn parse_from(
    origin: &str,
    text: &str,
    base: Option<&Location>,
    max_nesting: usize,
    visitor: &mut dyn SexpVisitor,
    errors: &mut dyn ErrorHandler,
) {
    let mut scanner = Scanner {
        origin: Arc::from(origin),
        base,
        max_nesting,
        open: Vec::new(),
        state: State::Whitespace,
        visitor,
        errors,
    };
    let mut mark = Mark::start();
    for c in text.chars() {
        if scanner.state.is_error() {
            break;
        }
        scanner.next(c, mark);
        mark = mark.advance(c);
    }
    scanner.complete(mark);
}

/// Every top-level node in `text`.
pub fn parse_nodes(origin: &str, text: &str, errors: &mut dyn ErrorHandler) -> Vec<Node> {
    let mut builder = NodeBuilder::new();
    parse(origin, text, &mut builder, errors);
    builder.into_nodes()
}

/// The first top-level node in `text`.
pub fn parse_node(origin: &str, text: &str, errors: &mut dyn ErrorHandler) -> Option<Node> {
    parse_nodes(origin, text, errors).into_iter().next()
}

// ============================================================================
// SCANNER STATE
// ============================================================================

/// Where the scanner is in the text.
#[derive(Debug, Clone, Copy)]
struct Mark {
    offset: usize,
    line: usize,
    column: usize,
}

impl Mark {
    fn start() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance(self, c: char) -> Self {
        if c == '\n' {
            Self {
                offset: self.offset + c.len_utf8(),
                line: self.line + 1,
                column: 1,
            }
        } else {
            Self {
                offset: self.offset + c.len_utf8(),
                column: self.column + 1,
                ..self
            }
        }
    }
}

#[derive(Debug)]
enum State {
    Whitespace,
    Atom {
        start: Mark,
        buffer: String,
        quoted: bool,
        escaping: bool,
    },
    Comment {
        start: Mark,
        buffer: String,
    },
    /// Absorbing: nothing more is emitted.
    Error,
}

impl State {
    fn is_error(&self) -> bool {
        matches!(self, State::Error)
    }
}

struct Scanner<'a> {
    origin: Arc<str>,
    base: Option<&'a Location>,
    max_nesting: usize,
    open: Vec<Delim>,
    state: State,
    visitor: &'a mut dyn SexpVisitor,
    errors: &'a mut dyn ErrorHandler,
}

// ============================================================================
// TRANSITIONS
// ============================================================================

impl Scanner<'_> {
    fn location(&self, mark: Mark) -> Location {
        let here = Location::at(Arc::clone(&self.origin), mark.offset, mark.line, mark.column);
        match self.base {
            Some(base) => base.via(PositionKind::Include, &here),
            None => here,
        }
    }

    fn next(&mut self, c: char, here: Mark) {
        match std::mem::replace(&mut self.state, State::Whitespace) {
            State::Whitespace => self.whitespace(c, here),
            State::Error => self.state = State::Error,
            State::Comment { start, mut buffer } => {
                if c == '\n' || c == '\r' {
                    self.send_comment(start, &buffer);
                } else {
                    buffer.push(c);
                    self.state = State::Comment { start, buffer };
                }
            }
            State::Atom {
                start,
                mut buffer,
                quoted: true,
                escaping,
            } => {
                if escaping {
                    buffer.push(c);
                    self.state = State::Atom {
                        start,
                        buffer,
                        quoted: true,
                        escaping: false,
                    };
                } else if c == '"' {
                    self.send_atom(start, &buffer);
                } else {
                    let escaping = c == '\\';
                    if !escaping {
                        buffer.push(c);
                    }
                    self.state = State::Atom {
                        start,
                        buffer,
                        quoted: true,
                        escaping,
                    };
                }
            }
            State::Atom {
                start,
                mut buffer,
                quoted: false,
                ..
            } => {
                if c == ':' {
                    buffer.push(c);
                    self.send_atom(start, &buffer);
                } else if ends_unquoted_atom(c) {
                    self.send_atom(start, &buffer);
                    self.whitespace(c, here);
                } else {
                    buffer.push(c);
                    self.state = State::Atom {
                        start,
                        buffer,
                        quoted: false,
                        escaping: false,
                    };
                }
            }
        }
    }

    fn whitespace(&mut self, c: char, here: Mark) {
        if c.is_whitespace() {
            return;
        }
        if let Some(delim) = Delim::from_open(c) {
            let location = self.location(here);
            if self.open.len() >= self.max_nesting {
                self.errors.handle(SexpError::at(
                    ErrorKind::NestingTooDeep {
                        limit: self.max_nesting,
                    },
                    &location,
                ));
                self.state = State::Error;
                return;
            }
            self.open.push(delim);
            self.visitor.locate(&location);
            self.visitor.open(delim);
            return;
        }
        if let Some(delim) = Delim::from_close(c) {
            self.close(delim, c, here);
            return;
        }
        self.state = match c {
            ';' => State::Comment {
                start: here,
                buffer: String::new(),
            },
            '"' => State::Atom {
                start: here,
                buffer: String::new(),
                quoted: true,
                escaping: false,
            },
            _ => State::Atom {
                start: here,
                buffer: c.to_string(),
                quoted: false,
                escaping: false,
            },
        };
    }

    fn close(&mut self, delim: Delim, c: char, here: Mark) {
        let location = self.location(here);
        match self.open.pop() {
            Some(open) if open == delim => {
                self.visitor.locate(&location);
                self.visitor.close(delim);
            }
            Some(open) => {
                self.errors.handle(SexpError::at(
                    ErrorKind::MismatchedClose {
                        expected: open.close_char(),
                        found: c,
                    },
                    &location,
                ));
                self.state = State::Error;
            }
            None => {
                self.errors
                    .handle(SexpError::at(ErrorKind::UnbalancedClose { found: c }, &location));
                self.state = State::Error;
            }
        }
    }

    fn send_atom(&mut self, start: Mark, value: &str) {
        let location = self.location(start);
        self.visitor.locate(&location);
        self.visitor.atom(value);
    }

    fn send_comment(&mut self, start: Mark, text: &str) {
        let location = self.location(start);
        self.visitor.locate(&location);
        self.visitor.comment(text);
    }

    fn complete(&mut self, end: Mark) {
        match std::mem::replace(&mut self.state, State::Whitespace) {
            State::Error => return,
            State::Whitespace => {}
            State::Comment { start, buffer } => self.send_comment(start, &buffer),
            State::Atom {
                start,
                buffer,
                quoted,
                ..
            } => {
                if quoted {
                    let location = self.location(start);
                    self.errors
                        .handle(SexpError::at(ErrorKind::UnterminatedString, &location));
                }
                self.send_atom(start, &buffer);
            }
        }
        if !self.open.is_empty() {
            let location = self.location(end);
            self.errors.handle(SexpError::at(
                ErrorKind::UnclosedGroups {
                    count: self.open.len(),
                },
                &location,
            ));
        }
    }
}

fn ends_unquoted_atom(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ';' | '"')
}
