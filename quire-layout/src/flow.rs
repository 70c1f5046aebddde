//! Line flow.
//!
//! Breaks the visible characters of a document into display lines:
//!
//! ```text
//!   "the quick\nbrown fox"   width = 6 glyphs
//!
//!   line 0  [t h e _]            end: Char('_')     soft wrap
//!   line 1  [q u i c k \n]       end: Char('\n')    hard break
//!   line 2  [b r o w n _]        end: Char('_')
//!   line 3  [f o x]              end: Eof
//! ```
//!
//! A hard break belongs to the line it ends. A document ending in `'\n'`
//! gets one extra line holding no characters whose end is `Eof`, so the
//! caret has somewhere to go. An empty document has no lines at all.

use quire_core::{Char, CharId, RichText};
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::metrics::{advance_for_chars, FontMetrics};

// ───────────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub horizontal: f32,
    pub vertical: f32,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            horizontal: 20.0,
            vertical: 20.0,
        }
    }
}

/// Layout input supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub font_size: f32,
    /// Wrap width of the text column. Margins lie outside it.
    pub width: f32,
    pub margin: Margin,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            font_size: 18.0,
            width: 600.0,
            margin: Margin::default(),
        }
    }
}

impl LayoutConfig {
    /// Whether switching from `self` to `next` changes line breaks.
    ///
    /// Margins only shift the rendered output.
    pub fn requires_reflow(&self, next: &LayoutConfig) -> bool {
        self.font_size != next.font_size || self.width != next.width
    }
}

// ───────────────────────────────────────────────────────────────────
// Lines
// ───────────────────────────────────────────────────────────────────

/// Last position of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineEnd {
    Char(CharId),
    /// The document's last line.
    Eof,
}

/// One display line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub chars: Vec<Char>,
    /// Horizontal advance of `chars`.
    pub advance: f32,
    /// Visible characters before this line.
    pub start: usize,
    pub end: LineEnd,
}

impl Line {
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Last line of the document.
    pub fn is_eof(&self) -> bool {
        self.end == LineEnd::Eof
    }

    /// The caret-only line after a trailing hard break.
    pub fn is_eof_only(&self) -> bool {
        self.is_eof() && self.chars.is_empty()
    }

    /// Ends with `'\n'`.
    pub fn is_hard_break(&self) -> bool {
        self.chars.last().is_some_and(Char::is_newline)
    }

    pub fn position_of(&self, id: CharId) -> Option<usize> {
        self.chars.iter().position(|c| c.id == id)
    }

    /// Whether `position` falls on this line. `EOF` falls on the last one.
    pub fn contains(&self, position: CharId) -> bool {
        (position.is_eof() && self.is_eof()) || self.position_of(position).is_some()
    }

    /// Characters of this line up to and including `position`.
    ///
    /// Empty when `position` is not on this line.
    pub fn chars_to(&self, position: CharId) -> &[Char] {
        if position.is_eof() && self.is_eof() {
            return &self.chars;
        }
        match self.position_of(position) {
            Some(i) => &self.chars[..=i],
            None => &[],
        }
    }

    /// Characters after `from` up to and including `to`.
    ///
    /// A `from` that is not on this line counts from the line start.
    pub fn chars_between(&self, from: CharId, to: CharId) -> &[Char] {
        let start = self.position_of(from).map_or(0, |i| i + 1);
        let end = self.chars_to(to).len();
        if end <= start {
            &[]
        } else {
            &self.chars[start..end]
        }
    }
}

/// Ordered display lines of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineList {
    lines: Vec<Line>,
    /// Visible characters covered.
    total: usize,
}

impl LineList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn last(&self) -> Option<&Line> {
        self.lines.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Line> {
        self.lines.iter()
    }

    pub fn as_slice(&self) -> &[Line] {
        &self.lines
    }

    /// Visible characters covered by all lines.
    pub fn total_chars(&self) -> usize {
        self.total
    }

    /// Check that the lines cover `doc` exactly, in order.
    pub fn verify(&self, doc: &RichText) -> Result<(), LayoutError> {
        if doc.is_empty() {
            if self.lines.is_empty() {
                return Ok(());
            }
            return Err(LayoutError::Inconsistent(format!(
                "{} lines for an empty document",
                self.lines.len()
            )));
        }
        let mut visible = doc.visible_chars();
        let mut expected_start = 0;
        for (index, line) in self.lines.iter().enumerate() {
            if line.start != expected_start {
                return Err(LayoutError::Inconsistent(format!(
                    "line {index} starts at {} instead of {expected_start}",
                    line.start
                )));
            }
            for c in &line.chars {
                match visible.next() {
                    Some(v) if v.id == c.id => {}
                    _ => {
                        return Err(LayoutError::Inconsistent(format!(
                            "line {index} holds {} out of document order",
                            c.id
                        )))
                    }
                }
            }
            expected_start += line.len();
        }
        if visible.next().is_some() || expected_start != doc.len() {
            return Err(LayoutError::Inconsistent(format!(
                "lines cover {expected_start} of {} characters",
                doc.len()
            )));
        }
        match self.lines.last() {
            Some(line) if line.is_eof() => Ok(()),
            _ => Err(LayoutError::Inconsistent("last line does not end at EOF".into())),
        }
    }
}

impl<'a> IntoIterator for &'a LineList {
    type Item = &'a Line;
    type IntoIter = std::slice::Iter<'a, Line>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

// ───────────────────────────────────────────────────────────────────
// Flow
// ───────────────────────────────────────────────────────────────────

fn is_space(c: &Char) -> bool {
    c.ch == ' ' || c.ch == '\t'
}

struct LineBuilder<'m, M: ?Sized> {
    metrics: &'m M,
    font_size: f32,
    width: f32,
    lines: Vec<Line>,
    current: Vec<Char>,
    /// Running advance of `current`, used for break decisions.
    advance: f32,
    consumed: usize,
}

impl<'m, M: FontMetrics + ?Sized> LineBuilder<'m, M> {
    fn fits(&self, extra: f32) -> bool {
        self.current.is_empty() || self.advance + extra <= self.width
    }

    fn push(&mut self, c: &Char, advance: f32) {
        self.current.push(c.clone());
        self.advance += advance;
    }

    fn finish(&mut self, end: LineEnd) {
        let chars = std::mem::take(&mut self.current);
        let advance = advance_for_chars(self.metrics, self.font_size, &chars);
        let start = self.consumed;
        self.consumed += chars.len();
        self.advance = 0.0;
        self.lines.push(Line {
            chars,
            advance,
            start,
            end,
        });
    }

    /// Soft wrap after the last pushed character.
    fn wrap(&mut self) {
        if let Some(last) = self.current.last() {
            let end = LineEnd::Char(last.id);
            self.finish(end);
        }
    }

    fn into_lines(mut self) -> LineList {
        if !self.current.is_empty() || self.lines.last().is_some_and(Line::is_hard_break) {
            self.finish(LineEnd::Eof);
        }
        LineList {
            lines: self.lines,
            total: self.consumed,
        }
    }
}

/// Break `doc` into lines no wider than `config.width`.
///
/// Words wrap as a whole. A word wider than the column breaks between
/// characters. Spaces never start a wrap and may overhang the column.
pub fn flow<M: FontMetrics + ?Sized>(
    doc: &RichText,
    config: &LayoutConfig,
    metrics: &M,
) -> LineList {
    let font_size = config.font_size;
    let chars: Vec<&Char> = doc.visible_chars().collect();
    let mut builder = LineBuilder {
        metrics,
        font_size,
        width: config.width,
        lines: Vec::new(),
        current: Vec::new(),
        advance: 0.0,
        consumed: 0,
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_newline() {
            builder.push(c, 0.0);
            builder.finish(LineEnd::Char(c.id));
            i += 1;
            continue;
        }
        if is_space(c) {
            let advance = advance_for_chars(metrics, font_size, [c]);
            builder.push(c, advance);
            i += 1;
            continue;
        }

        let end = chars[i..]
            .iter()
            .position(|c| is_space(c) || c.is_newline())
            .map_or(chars.len(), |n| i + n);
        let word = &chars[i..end];
        let word_advance = advance_for_chars(metrics, font_size, word.iter().copied());

        if !builder.fits(word_advance) {
            builder.wrap();
        }
        if word_advance <= config.width {
            for c in word {
                let advance = advance_for_chars(metrics, font_size, [*c]);
                builder.push(c, advance);
            }
        } else {
            for c in word {
                let advance = advance_for_chars(metrics, font_size, [*c]);
                if !builder.fits(advance) {
                    builder.wrap();
                }
                builder.push(c, advance);
            }
        }
        i = end;
    }

    let lines = builder.into_lines();
    log::debug!(
        "Reflowed {} chars into {} lines at width {}",
        lines.total_chars(),
        lines.len(),
        config.width
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::GlyphTable;
    use quire_core::ReplicaId;

    /// 10px glyphs at font size 10.
    fn metrics() -> GlyphTable {
        GlyphTable::monospace(1000, 1000)
    }

    fn config(glyphs: f32) -> LayoutConfig {
        LayoutConfig {
            font_size: 10.0,
            width: glyphs * 10.0,
            margin: Margin::default(),
        }
    }

    fn doc(text: &str) -> RichText {
        let mut doc = RichText::new(ReplicaId::from_u128(1));
        doc.insert_str(CharId::BASE, text, &[]).unwrap();
        doc
    }

    fn line_text(line: &Line) -> String {
        line.chars.iter().map(|c| c.ch).collect()
    }

    #[test]
    fn test_empty_document_has_no_lines() {
        let lines = flow(&doc(""), &config(10.0), &metrics());
        assert!(lines.is_empty());
        assert!(lines.verify(&doc("")).is_ok());
    }

    #[test]
    fn test_hard_break_splits_lines() {
        let d = doc("abc\ndef");
        let lines = flow(&d, &config(40.0), &metrics());
        assert_eq!(lines.len(), 2);

        let first = lines.get(0).unwrap();
        assert_eq!(line_text(first), "abc\n");
        assert!(first.is_hard_break());
        assert_eq!(first.advance, 30.0);
        assert!(matches!(first.end, LineEnd::Char(_)));

        let second = lines.get(1).unwrap();
        assert_eq!(line_text(second), "def");
        assert_eq!(second.start, 4);
        assert!(second.is_eof());
        assert!(lines.verify(&d).is_ok());
    }

    #[test]
    fn test_trailing_newline_adds_eof_only_line() {
        let d = doc("ab\n");
        let lines = flow(&d, &config(40.0), &metrics());
        assert_eq!(lines.len(), 2);
        let last = lines.last().unwrap();
        assert!(last.is_eof_only());
        assert_eq!(last.start, 3);
        assert!(lines.verify(&d).is_ok());
    }

    #[test]
    fn test_word_wrap() {
        let d = doc("the quick\nbrown fox");
        let lines = flow(&d, &config(6.0), &metrics());
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["the ", "quick\n", "brown ", "fox"]);
        assert!(lines.verify(&d).is_ok());
    }

    #[test]
    fn test_long_word_breaks_by_char() {
        let d = doc("abcdefgh ij");
        let lines = flow(&d, &config(3.0), &metrics());
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["abc", "def", "gh ", "ij"]);
        for line in &lines {
            let without_spaces = line.chars.iter().filter(|c| c.ch != ' ').count();
            assert!(without_spaces as f32 * 10.0 <= 30.0);
        }
    }

    #[test]
    fn test_spaces_overhang() {
        let d = doc("ab    cd");
        let lines = flow(&d, &config(3.0), &metrics());
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["ab    ", "cd"]);
    }

    #[test]
    fn test_verify_detects_stale_lines() {
        let mut d = doc("abc");
        let lines = flow(&d, &config(10.0), &metrics());
        d.insert(CharId::EOF, 'x', &[]).unwrap();
        assert!(matches!(lines.verify(&d), Err(LayoutError::Inconsistent(_))));
    }

    #[test]
    fn test_line_char_ranges() {
        let d = doc("abc");
        let lines = flow(&d, &config(10.0), &metrics());
        let line = lines.get(0).unwrap();
        let a = line.chars[0].id;
        let c = line.chars[2].id;
        assert_eq!(line.chars_to(a).len(), 1);
        assert_eq!(line.chars_to(CharId::EOF).len(), 3);
        assert_eq!(line.chars_to(CharId::BASE).len(), 0);
        assert_eq!(line.chars_between(a, c).len(), 2);
        assert_eq!(line.chars_between(CharId::BASE, c).len(), 3);
        assert!(line.chars_between(c, a).is_empty());
        assert!(line.contains(CharId::EOF));
    }

    #[test]
    fn test_requires_reflow() {
        let base = LayoutConfig::default();
        let mut moved = base;
        moved.margin.horizontal += 5.0;
        assert!(!base.requires_reflow(&moved));
        let mut narrower = base;
        narrower.width -= 1.0;
        assert!(base.requires_reflow(&narrower));
    }
}
