use std::{
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

use crate::common::source::Source;

/// A `Span` refers to a section of a source,
/// much like a `&str`, but with a reference to a `Source` rather than a `String`.
/// A `Span` is meant to be paired with other datastructures,
/// to be used during error reporting.
#[derive(Clone, Eq, PartialEq)]
pub struct Span {
    source: Rc<Source>,
    offset: usize,
    length: usize,
}

impl Span {
    /// Create a new `Span` from an offset with a length.
    /// All `Span`s have access to the `Source` from whence they came,
    /// So they can't be misinterpreted or miscombined.
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span {
            source: Rc::clone(source),
            offset,
            length,
        }
    }

    /// A `Span` that points at a specific point in the source.
    /// Has a length of `0`.
    pub fn point(source: &Rc<Source>, offset: usize) -> Span {
        Span::new(source, offset, 0)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Return the index of the end of the `Span`.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn source(&self) -> &Rc<Source> {
        &self.source
    }

    /// Creates a new `Span` which spans the space of the previous two.
    /// ```plain
    /// hello this is cool
    /// ^^^^^              | Span a
    ///            ^^      | Span b
    /// ^^^^^^^^^^^^^      | combined
    /// ```
    /// Spans from different sources can't be combined;
    /// the first span is kept in that case.
    pub fn combine(a: &Span, b: &Span) -> Span {
        if a.source != b.source {
            return a.clone();
        }

        let offset = a.offset.min(b.offset);
        let end = a.end().max(b.end());
        Span::new(&a.source, offset, end - offset)
    }

    /// Returns the contents of a `Span`.
    pub fn contents(&self) -> String {
        let contents = &self.source.contents;
        let end = self.end().min(contents.len());
        contents
            .get(self.offset.min(end)..end)
            .unwrap_or("")
            .to_string()
    }

    /// The full source lines this span touches.
    pub fn lines(&self) -> Vec<String> {
        let lines: Vec<_> = self.source.contents.split('\n').collect();
        let start_line = self.line(self.offset);
        let end_line = self.line(self.end()).min(lines.len() - 1);
        lines[start_line..=end_line]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn path(&self) -> String {
        self.source.path.to_string_lossy().to_string()
    }

    /// Zero-based line of a byte index in the source.
    pub fn line(&self, index: usize) -> usize {
        self.prefix(index).matches('\n').count()
    }

    /// Zero-based column (in chars) of a byte index in the source.
    pub fn col(&self, index: usize) -> usize {
        self.prefix(index)
            .rsplit('\n')
            .next()
            .unwrap_or("")
            .chars()
            .count()
    }

    /// One-based `(line, col)` of the start of this span.
    pub fn position(&self) -> (usize, usize) {
        (self.line(self.offset) + 1, self.col(self.offset) + 1)
    }

    fn prefix(&self, index: usize) -> &str {
        let contents = &self.source.contents;
        contents.get(..index.min(contents.len())).unwrap_or(contents)
    }

    pub fn format(&self) -> FormattedSpan {
        FormattedSpan {
            path: self.path(),
            start: self.line(self.offset),
            lines: self.lines(),
            start_col: self.col(self.offset),
            end_col: self.col(self.end()),
        }
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("contents", &self.contents())
            .field("start", &self.offset)
            .field("end", &self.end())
            .finish()
    }
}

impl Display for Span {
    /// Given a `Span`, `fmt` will print out where the `Span` occurs in its source.
    /// Single-line `Span`s:
    /// ```plain
    /// 12 | x = blatant { error }
    ///    |     ^^^^^^^^^^^^^^^^^
    /// ```
    /// Multi-line `Span`s:
    /// ```plain
    /// 12 > x = fn f(y) {
    /// 13 >    another { error }
    /// 14 > }
    /// ```
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Represents a formatted span, ready to be displayed.
/// Contains information about where the span is from,
/// and where in the text it starts and ends
/// relative to the lines in the source.
pub struct FormattedSpan {
    pub path: String,
    pub start: usize,
    pub lines: Vec<String>,
    pub start_col: usize,
    pub end_col: usize,
}

impl FormattedSpan {
    pub fn gutter_padding(&self) -> usize {
        (self.start + self.lines.len()).to_string().len()
    }

    /// If a single line span, returns the number of carrots between cols.
    pub fn carrots(&self) -> Option<usize> {
        if self.lines.len() == 1 {
            Some(self.end_col.saturating_sub(self.start_col))
        } else {
            None
        }
    }
}

impl Display for FormattedSpan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let padding = self.gutter_padding();
        writeln!(
            f,
            "In {}:{}:{}",
            self.path,
            self.start + 1,
            self.start_col + 1
        )?;
        writeln!(f, "{} |", " ".repeat(padding))?;

        if let Some(carrots) = self.carrots() {
            writeln!(f, "{:>padding$} | {}", self.start + 1, self.lines[0])?;
            writeln!(
                f,
                "{} | {}{}",
                " ".repeat(padding),
                " ".repeat(self.start_col),
                "^".repeat(carrots.max(1)),
            )?;
        } else {
            for (index, line) in self.lines.iter().enumerate() {
                writeln!(f, "{:>padding$} > {}", self.start + index + 1, line)?;
            }
        }

        Ok(())
    }
}

/// A wrapper for spanning types.
/// For example, a token can be spanned
/// to indicate where it was lexed from (a `Spanned<Token>`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Takes a generic item, and wraps in in a `Span` to make it `Spanned`.
    pub fn new(item: T, span: Span) -> Spanned<T> {
        Spanned { item, span }
    }

    /// Applies a function to a `Spanned`'s item.
    pub fn map<B>(self, f: impl FnOnce(T) -> B) -> Spanned<B> {
        Spanned::new(f(self.item), self.span)
    }
}
