//! Selection geometry.
//!
//! A [`Selection`] runs from the position before its first character
//! (`left`) to its last character (`right`, inclusive). Geometry comes out
//! as one [`SelectionRect`] per covered line, measured from the start of the
//! text column:
//!
//! ```text
//!   line 0   a b [c \n ␠]      first line: from after `left` to line end,
//!   line 1  [d e f \n ␠]       plus a space for the hard break
//!   line 2  [g h] i            last line: up to and including `right`
//! ```

use quire_core::{Boundary, CharId, RichText};
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::flow::{LayoutConfig, LineList};
use crate::metrics::{advance_for_chars, FontMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub left: CharId,
    pub right: CharId,
}

impl Selection {
    pub fn new(left: CharId, right: CharId) -> Self {
        Self { left, right }
    }

    /// The whole document.
    pub fn all() -> Self {
        Self::new(CharId::BASE, CharId::EOF)
    }

    pub fn covers_everything(&self) -> bool {
        self.left.is_base() && self.right.is_eof()
    }

    /// The same selection with a deleted `left` moved to its nearest visible
    /// predecessor (or `BASE`), so it can be looked up in flowed lines.
    pub fn resolve(&self, doc: &RichText) -> Result<Selection, LayoutError> {
        if doc.is_visible(self.left) || self.left.is_sentinel() {
            return Ok(*self);
        }
        let left = doc.get_char_relative_to(self.left, 0, Boundary::Clamp)?;
        Ok(Self::new(left, self.right))
    }
}

/// First and last line a selection touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSpan {
    pub first: usize,
    pub last: usize,
}

impl SelectionSpan {
    pub fn contains(&self, line: usize) -> bool {
        line >= self.first && line <= self.last
    }
}

/// Highlight on one line, relative to the text column origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSelection {
    pub line: usize,
    pub rect: SelectionRect,
}

impl LineSelection {
    /// Top-left corner in host pixels, margins included.
    pub fn origin(&self, config: &LayoutConfig, line_height: f32) -> (f32, f32) {
        (
            config.margin.horizontal + self.rect.left,
            config.margin.vertical + line_height * self.line as f32,
        )
    }
}

fn rect_height(line_height: f32) -> f32 {
    (line_height * 10.0).round() / 10.0
}

/// Lines covered by `selection`, or `None` when it covers nothing.
///
/// The right boundary is only searched from the first selected line on;
/// a right boundary before it is an empty selection.
pub fn compute_selection_span(
    doc: &RichText,
    lines: &LineList,
    selection: &Selection,
) -> Result<Option<SelectionSpan>, LayoutError> {
    if lines.is_empty() {
        return Ok(None);
    }
    let first_char = doc.get_char_relative_to(selection.left, 1, Boundary::Sentinel)?;
    let first = lines.locate(doc, first_char, false)?;
    let last = lines.locate(doc, selection.right, false)?;
    if last.index < first.index {
        return Ok(None);
    }
    Ok(Some(SelectionSpan {
        first: first.index,
        last: last.index,
    }))
}

/// Highlight of `selection` on line `line_index`.
///
/// `selection.left` must be visible or a sentinel; see [`Selection::resolve`].
pub fn compute_line_selection_rect<M: FontMetrics + ?Sized>(
    lines: &LineList,
    line_index: usize,
    selection: &Selection,
    span: SelectionSpan,
    font_size: f32,
    metrics: &M,
) -> Option<SelectionRect> {
    if !span.contains(line_index) {
        return None;
    }
    let line = lines.get(line_index)?;
    let height = rect_height(metrics.line_height(font_size));
    let space = metrics.space_advance(font_size);
    let rect = |left, width| SelectionRect {
        left,
        width,
        height,
    };

    if line_index > span.first && line_index < span.last {
        let mut width = line.advance;
        if line.is_eof_only() || line.is_hard_break() {
            width += space;
        }
        return Some(rect(0.0, width));
    }

    if line.is_eof_only() && selection.right.is_eof() {
        return Some(rect(0.0, space));
    }

    let mut left = 0.0;
    if line_index == span.first {
        left = advance_for_chars(metrics, font_size, line.chars_to(selection.left));
    }

    let (mut width, add_space) = if line_index == span.last {
        let chars = if line.contains(selection.left) {
            line.chars_between(selection.left, selection.right)
        } else {
            line.chars_to(selection.right)
        };
        let last = chars.last()?;
        (
            advance_for_chars(metrics, font_size, chars),
            last.is_newline(),
        )
    } else {
        (
            line.advance - left,
            line.is_eof_only() || line.is_hard_break(),
        )
    };
    if add_space {
        width += space;
    }
    Some(rect(left, width))
}

/// Every line highlight of `selection`, top to bottom.
///
/// Selecting everything in an empty document yields one space-wide rect on
/// line 0 so the selection is still visible.
pub fn selection_rects<M: FontMetrics + ?Sized>(
    doc: &RichText,
    lines: &LineList,
    selection: &Selection,
    config: &LayoutConfig,
    metrics: &M,
) -> Result<Vec<LineSelection>, LayoutError> {
    let font_size = config.font_size;
    if lines.is_empty() {
        if !selection.covers_everything() {
            return Ok(Vec::new());
        }
        return Ok(vec![LineSelection {
            line: 0,
            rect: SelectionRect {
                left: 0.0,
                width: metrics.space_advance(font_size),
                height: rect_height(metrics.line_height(font_size)),
            },
        }]);
    }

    let selection = selection.resolve(doc)?;
    let Some(span) = compute_selection_span(doc, lines, &selection)? else {
        return Ok(Vec::new());
    };
    Ok((span.first..=span.last)
        .filter_map(|line| {
            compute_line_selection_rect(lines, line, &selection, span, font_size, metrics)
                .map(|rect| LineSelection { line, rect })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{flow, Margin};
    use crate::metrics::GlyphTable;
    use quire_core::ReplicaId;

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

    fn setup(text: &str, glyphs: f32) -> (RichText, LineList, Vec<CharId>) {
        let mut doc = RichText::new(ReplicaId::from_u128(1));
        let ids = doc
            .insert_str(CharId::BASE, text, &[])
            .unwrap()
            .iter()
            .map(|op| op.target())
            .collect();
        let lines = flow(&doc, &config(glyphs), &metrics());
        (doc, lines, ids)
    }

    fn widths(rects: &[LineSelection]) -> Vec<(usize, f32, f32)> {
        rects
            .iter()
            .map(|s| (s.line, s.rect.left, s.rect.width))
            .collect()
    }

    #[test]
    fn test_select_all_across_hard_break() {
        let (doc, lines, _) = setup("abc\ndef", 40.0);
        let rects =
            selection_rects(&doc, &lines, &Selection::all(), &config(40.0), &metrics()).unwrap();
        // "abc" plus a space for the break, then "def".
        assert_eq!(widths(&rects), vec![(0, 0.0, 40.0), (1, 0.0, 30.0)]);
        assert_eq!(rects[0].rect.height, 12.0);
    }

    #[test]
    fn test_select_to_last_char_matches_eof() {
        let (doc, lines, ids) = setup("abc\ndef", 40.0);
        let sel = Selection::new(CharId::BASE, ids[6]);
        let rects = selection_rects(&doc, &lines, &sel, &config(40.0), &metrics()).unwrap();
        assert_eq!(widths(&rects), vec![(0, 0.0, 40.0), (1, 0.0, 30.0)]);
    }

    #[test]
    fn test_partial_two_lines() {
        let (doc, lines, ids) = setup("abc\ndef", 40.0);
        // "bc\nde"
        let sel = Selection::new(ids[0], ids[5]);
        let rects = selection_rects(&doc, &lines, &sel, &config(40.0), &metrics()).unwrap();
        assert_eq!(widths(&rects), vec![(0, 10.0, 30.0), (1, 0.0, 20.0)]);
    }

    #[test]
    fn test_within_one_line() {
        let (doc, lines, ids) = setup("abc", 40.0);
        let sel = Selection::new(ids[0], ids[2]);
        let rects = selection_rects(&doc, &lines, &sel, &config(40.0), &metrics()).unwrap();
        assert_eq!(widths(&rects), vec![(0, 10.0, 20.0)]);
    }

    #[test]
    fn test_collapsed_selection_is_empty() {
        let (doc, lines, ids) = setup("abc", 40.0);
        let sel = Selection::new(ids[1], ids[1]);
        let rects = selection_rects(&doc, &lines, &sel, &config(40.0), &metrics()).unwrap();
        assert!(rects.is_empty());
    }

    #[test]
    fn test_right_before_left_is_empty() {
        let (doc, lines, ids) = setup("ab\ncd", 40.0);
        let sel = Selection::new(ids[3], ids[0]);
        assert_eq!(compute_selection_span(&doc, &lines, &sel).unwrap(), None);
    }

    #[test]
    fn test_empty_document_select_all() {
        let (doc, lines, _) = setup("", 40.0);
        let rects =
            selection_rects(&doc, &lines, &Selection::all(), &config(40.0), &metrics()).unwrap();
        assert_eq!(widths(&rects), vec![(0, 0.0, 10.0)]);

        let partial = Selection::new(CharId::BASE, CharId::BASE);
        assert!(selection_rects(&doc, &lines, &partial, &config(40.0), &metrics())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_trailing_newline_eof_line() {
        let (doc, lines, _) = setup("ab\n", 40.0);
        let rects =
            selection_rects(&doc, &lines, &Selection::all(), &config(40.0), &metrics()).unwrap();
        assert_eq!(widths(&rects), vec![(0, 0.0, 30.0), (1, 0.0, 10.0)]);
    }

    #[test]
    fn test_middle_lines() {
        let (doc, lines, _) = setup("a\nb\nc", 40.0);
        let rects =
            selection_rects(&doc, &lines, &Selection::all(), &config(40.0), &metrics()).unwrap();
        assert_eq!(
            widths(&rects),
            vec![(0, 0.0, 20.0), (1, 0.0, 20.0), (2, 0.0, 10.0)]
        );

        // Soft-wrapped middle lines get no extra space.
        let (doc, lines, _) = setup("aa bb cc", 3.0);
        let rects =
            selection_rects(&doc, &lines, &Selection::all(), &config(3.0), &metrics()).unwrap();
        assert_eq!(
            widths(&rects),
            vec![(0, 0.0, 30.0), (1, 0.0, 30.0), (2, 0.0, 20.0)]
        );
    }

    #[test]
    fn test_height_rounded_to_one_decimal() {
        let (doc, lines, _) = setup("abc", 40.0);
        let m = metrics().with_line_height_factor(1.234);
        let rects = selection_rects(&doc, &lines, &Selection::all(), &config(40.0), &m).unwrap();
        assert_eq!(rects[0].rect.height, 12.3);
    }

    #[test]
    fn test_outside_span_is_none() {
        let (doc, lines, ids) = setup("ab\ncd\nef", 40.0);
        let sel = Selection::new(ids[2], ids[4]);
        let span = compute_selection_span(&doc, &lines, &sel).unwrap().unwrap();
        assert_eq!(span, SelectionSpan { first: 1, last: 1 });
        assert!(compute_line_selection_rect(&lines, 0, &sel, span, 10.0, &metrics()).is_none());
        assert!(compute_line_selection_rect(&lines, 2, &sel, span, 10.0, &metrics()).is_none());
    }

    #[test]
    fn test_deleted_right_boundary_is_transient() {
        let (mut doc, lines, ids) = setup("abc", 40.0);
        doc.delete(ids[2]).unwrap();
        let sel = Selection::new(ids[0], ids[2]);
        let err = compute_selection_span(&doc, &lines, &sel).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_deleted_left_boundary_starts_after_predecessor() {
        let (mut doc, _, ids) = setup("abcdef", 40.0);
        let sel = Selection::new(ids[1], ids[5]);
        doc.delete(ids[1]).unwrap();
        let lines = flow(&doc, &config(40.0), &metrics());
        assert_eq!(doc.text(), "acdef");

        assert_eq!(sel.resolve(&doc).unwrap(), Selection::new(ids[0], ids[5]));
        let rects = selection_rects(&doc, &lines, &sel, &config(40.0), &metrics()).unwrap();
        // "cdef", after the surviving "a".
        assert_eq!(widths(&rects), vec![(0, 10.0, 40.0)]);
    }

    #[test]
    fn test_deleted_first_char_as_left_boundary() {
        let (mut doc, _, ids) = setup("ab
cd", 40.0);
        let sel = Selection::new(ids[0], ids[4]);
        doc.delete(ids[0]).unwrap();
        let lines = flow(&doc, &config(40.0), &metrics());

        assert_eq!(sel.resolve(&doc).unwrap().left, CharId::BASE);
        let rects = selection_rects(&doc, &lines, &sel, &config(40.0), &metrics()).unwrap();
        // "b\n" plus the break space, then "cd".
        assert_eq!(widths(&rects), vec![(0, 0.0, 20.0), (1, 0.0, 20.0)]);
    }

    #[test]
    fn test_origin_adds_margins() {
        let s = LineSelection {
            line: 2,
            rect: SelectionRect {
                left: 4.0,
                width: 1.0,
                height: 12.0,
            },
        };
        assert_eq!(s.origin(&config(10.0), 12.0), (24.0, 44.0));
    }
}
