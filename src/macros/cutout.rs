//! Balanced extraction and replacement over the event stream.
//!
//! A [`Cutout`] sits between an event source and a delegate. Whenever a group
//! opens and its first atom is a head the [`Cutter`] is interested in, the
//! whole balanced group is diverted into a buffer supplied by the cutter. When
//! the group closes the cutter gets the buffer back and may hand over a
//! replacement, which is replayed into the same cutout, so replacements are
//! themselves open to interception.
//!
//! Comments between an open bracket and the head atom cannot be routed until
//! the head is known. They wait in the `AfterOpen` state and follow the open
//! bracket to whichever sink wins.

use crate::syntax::{Delim, Location, SExpression, SexpVisitor};

/// Decides which groups a [`Cutout`] intercepts and what replaces them.
pub trait Cutter {
    type Buffer: SexpVisitor;

    /// Called for the first atom of every group. Returning a buffer diverts the
    /// group into it.
    fn cut(&mut self, head: &str) -> Option<Self::Buffer>;

    /// Called when an intercepted group closes. The returned expression is
    /// replayed in place of the group.
    fn paste(&mut self, buffer: Self::Buffer) -> Option<Box<dyn SExpression>>;

    /// Called once the expression returned by `paste` has been replayed.
    fn pasted(&mut self) {}
}

impl<C: Cutter + ?Sized> Cutter for &mut C {
    type Buffer = C::Buffer;

    fn cut(&mut self, head: &str) -> Option<Self::Buffer> {
        (**self).cut(head)
    }

    fn paste(&mut self, buffer: Self::Buffer) -> Option<Box<dyn SExpression>> {
        (**self).paste(buffer)
    }

    fn pasted(&mut self) {
        (**self).pasted()
    }
}

/// An intercepted group still being collected.
struct Frame<B> {
    buffer: B,
    depth: usize,
}

/// Routing state of the most recent open bracket.
enum Pending {
    Idle,
    /// An open bracket has been seen but not its head.
    AfterOpen {
        delim: Delim,
        location: Location,
        comments: Vec<(Location, String)>,
    },
}

pub struct Cutout<C: Cutter, D> {
    cutter: C,
    delegate: D,
    frames: Vec<Frame<C::Buffer>>,
    pending: Pending,
    here: Location,
}

impl<C: Cutter, D: SexpVisitor> Cutout<C, D> {
    pub fn new(cutter: C, delegate: D) -> Self {
        Self {
            cutter,
            delegate,
            frames: Vec::new(),
            pending: Pending::Idle,
            here: Location::nowhere(),
        }
    }

    /// Flushes a trailing open bracket and returns the cutter and delegate.
    /// Groups still being collected (only possible on broken input) are
    /// dropped.
    pub fn finish(mut self) -> (C, D) {
        self.shift_open();
        (self.cutter, self.delegate)
    }

    fn sink(&mut self) -> &mut dyn SexpVisitor {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.buffer,
            None => &mut self.delegate,
        }
    }

    /// Sends a pending open bracket, and any comments after it, to the
    /// current sink.
    fn shift_open(&mut self) {
        let Pending::AfterOpen {
            delim,
            location,
            comments,
        } = std::mem::replace(&mut self.pending, Pending::Idle)
        else {
            return;
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.depth += 1;
        }
        let sink = self.sink();
        sink.locate(&location);
        sink.open(delim);
        for (location, text) in comments {
            sink.locate(&location);
            sink.comment(&text);
        }
    }
}

impl<C: Cutter, D: SexpVisitor> SexpVisitor for Cutout<C, D> {
    fn locate(&mut self, location: &Location) {
        self.here = location.clone();
    }

    fn open(&mut self, delim: Delim) {
        self.shift_open();
        self.pending = Pending::AfterOpen {
            delim,
            location: self.here.clone(),
            comments: Vec::new(),
        };
    }

    fn atom(&mut self, value: &str) {
        if matches!(self.pending, Pending::AfterOpen { .. }) {
            if let Some(buffer) = self.cutter.cut(value) {
                self.frames.push(Frame { buffer, depth: 0 });
            }
            self.shift_open();
        }
        let here = self.here.clone();
        let sink = self.sink();
        sink.locate(&here);
        sink.atom(value);
    }

    fn comment(&mut self, text: &str) {
        if let Pending::AfterOpen { comments, .. } = &mut self.pending {
            comments.push((self.here.clone(), text.to_string()));
            return;
        }
        let here = self.here.clone();
        let sink = self.sink();
        sink.locate(&here);
        sink.comment(text);
    }

    fn close(&mut self, delim: Delim) {
        self.shift_open();
        let here = self.here.clone();
        let sink = self.sink();
        sink.locate(&here);
        sink.close(delim);

        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        frame.depth -= 1;
        if frame.depth > 0 {
            return;
        }
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if let Some(replacement) = self.cutter.paste(frame.buffer) {
            replacement.accept(self);
            self.cutter.pasted();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCollector;
    use crate::syntax::{parse, parse_nodes, to_text, Node, NodeBuilder};

    /// `(swap a b ...)` becomes its arguments reversed, `(drop ...)` vanishes
    /// and `(wrap)` becomes `(swap 1 2)`.
    #[derive(Default)]
    struct Shuffler {
        seen: Vec<String>,
    }

    impl Cutter for Shuffler {
        type Buffer = NodeBuilder;

        fn cut(&mut self, head: &str) -> Option<NodeBuilder> {
            matches!(head, "swap" | "drop" | "wrap").then(NodeBuilder::new)
        }

        fn paste(&mut self, buffer: NodeBuilder) -> Option<Box<dyn SExpression>> {
            let node = buffer.into_node()?;
            let seq = node.as_seq()?;
            self.seen.push(seq.to_string());
            match seq.head_name() {
                Some("swap") => {
                    let mut args: Vec<Node> = seq.tail().cloned().collect();
                    args.reverse();
                    Some(Box::new(args))
                }
                Some("wrap") => {
                    let mut errors = ErrorCollector::new();
                    Some(Box::new(parse_nodes("wrap", "(swap 1 2)", &mut errors)))
                }
                _ => None,
            }
        }
    }

    fn run(text: &str) -> (String, Shuffler) {
        let mut errors = ErrorCollector::new();
        let mut cutout = Cutout::new(Shuffler::default(), NodeBuilder::new());
        parse("test", text, &mut cutout, &mut errors);
        let (shuffler, builder) = cutout.finish();
        (to_text(&builder.into_nodes()), shuffler)
    }

    #[test]
    fn untouched_content_passes_through() {
        let (out, shuffler) = run("(a [b c] \"d e\")");
        assert_eq!(out, "(a [b c] \"d e\")");
        assert!(shuffler.seen.is_empty());
    }

    #[test]
    fn intercepted_groups_are_replaced() {
        assert_eq!(run("(a (swap 1 2) b)").0, "(a 2 1 b)");
        assert_eq!(run("(a (drop x (y)) b)").0, "(a b)");
    }

    #[test]
    fn nested_interceptions_resolve_inside_out() {
        let (out, shuffler) = run("(swap (swap 1 2) 3)");
        assert_eq!(out, "3 1 2");
        assert_eq!(shuffler.seen, vec!["(swap 1 2)", "(swap 2 1 3)"]);
    }

    #[test]
    fn replacements_are_intercepted_again() {
        assert_eq!(run("(wrap)").0, "2 1");
    }

    #[test]
    fn comments_after_open_follow_the_group() {
        let (_, shuffler) = run("(drop ; gone\n x)");
        assert!(shuffler.seen[0].contains("; gone"));

        let (_, shuffler) = run("(; leading\n drop x)");
        assert!(shuffler.seen[0].starts_with("(; leading"));

        let (out, _) = run("(; kept\n keep x)");
        assert_eq!(out, "(; kept\n keep x)");
    }

    #[test]
    fn a_group_headed_by_a_group_is_only_cut_inside() {
        assert_eq!(run("((swap 1 2) 3)").0, "(2 1 3)");
    }
}
