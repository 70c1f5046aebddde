//! Position resolver: positions to lines, lines to caret geometry, and
//! host points back to positions.
//!
//! A position names the character to the left of the caret. On a soft wrap
//! the same position is both the end of line `i` and the start of line
//! `i + 1`; `eol_start` picks the second reading.

use quire_core::{CharId, RichText};

use crate::error::LayoutError;
use crate::flow::{LayoutConfig, LineList};
use crate::metrics::{advance_for_chars, FontMetrics};

/// Where a position falls in a [`LineList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLocation {
    pub index: usize,
    /// The position is the last character of its line.
    pub end_of_line: bool,
    /// The caret renders at the start of `index`.
    pub at_line_start: bool,
}

/// Caret origin in host pixels, margins included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaretPosition {
    pub left: f32,
    pub top: f32,
    pub line: usize,
}

/// Caret position under a host point.
///
/// Feeding `position` and `eol_start` back into [`caret_position`] puts the
/// caret on `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionHit {
    pub position: CharId,
    pub eol_start: bool,
    pub line: usize,
}

impl LineList {
    /// Find the line holding `position`.
    ///
    /// `BASE` is the start of line 0 and `EOF` the end of the last line.
    /// Tombstoned positions, and positions the lines have not caught up
    /// with yet, are [`LayoutError::Unresolved`].
    pub fn locate(
        &self,
        doc: &RichText,
        position: CharId,
        eol_start: bool,
    ) -> Result<LineLocation, LayoutError> {
        let lines = self.as_slice();
        let last = lines
            .len()
            .checked_sub(1)
            .ok_or(LayoutError::Unresolved(position))?;

        if position.is_base() {
            return Ok(LineLocation {
                index: 0,
                end_of_line: false,
                at_line_start: true,
            });
        }
        if position.is_eof() {
            return Ok(LineLocation {
                index: last,
                end_of_line: true,
                at_line_start: lines[last].is_empty(),
            });
        }

        if !doc.is_visible(position) {
            return Err(LayoutError::Unresolved(position));
        }
        let (index, slot) = self
            .find_indexed(doc, position)
            .or_else(|| self.find_scan(position))
            .ok_or(LayoutError::Unresolved(position))?;

        let end_of_line = slot + 1 == lines[index].len();
        if end_of_line && eol_start && index < last {
            return Ok(LineLocation {
                index: index + 1,
                end_of_line,
                at_line_start: true,
            });
        }
        Ok(LineLocation {
            index,
            end_of_line,
            at_line_start: false,
        })
    }

    /// Binary search over line start offsets.
    fn find_indexed(&self, doc: &RichText, position: CharId) -> Option<(usize, usize)> {
        let k = doc.visible_index(position)?;
        let lines = self.as_slice();
        let index = lines.partition_point(|l| l.start + l.len() < k);
        let line = lines.get(index)?;
        let slot = k.checked_sub(line.start + 1)?;
        match line.chars.get(slot) {
            Some(c) if c.id == position => Some((index, slot)),
            _ => None,
        }
    }

    /// Caret position nearest to the host point `(x, y)`.
    ///
    /// The line comes from `y`, clamped to the first and last line. Within
    /// the line the caret goes before the first glyph whose midpoint lies
    /// right of `x`, never after a trailing hard break. A caret at the start
    /// of line `i > 0` is the last character of line `i - 1`, with
    /// `eol_start` set when that line was soft-wrapped.
    pub fn position_at<M: FontMetrics + ?Sized>(
        &self,
        x: f32,
        y: f32,
        config: &LayoutConfig,
        metrics: &M,
    ) -> PositionHit {
        let lines = self.as_slice();
        let Some(last) = lines.len().checked_sub(1) else {
            return PositionHit {
                position: CharId::BASE,
                eol_start: false,
                line: 0,
            };
        };

        let line_height = metrics.line_height(config.font_size);
        let row = ((y - config.margin.vertical) / line_height).floor();
        let index = if row.is_nan() || row < 0.0 {
            0
        } else {
            (row as usize).min(last)
        };
        let line = &lines[index];
        let x = x - config.margin.horizontal;

        let hittable = if line.is_hard_break() {
            &line.chars[..line.len() - 1]
        } else {
            &line.chars[..]
        };
        let mut before = 0.0;
        let mut column = hittable.len();
        for i in 0..hittable.len() {
            let after = advance_for_chars(metrics, config.font_size, &hittable[..=i]);
            if x < (before + after) / 2.0 {
                column = i;
                break;
            }
            before = after;
        }

        if column > 0 {
            return PositionHit {
                position: hittable[column - 1].id,
                eol_start: false,
                line: index,
            };
        }
        match index.checked_sub(1).map(|i| &lines[i]) {
            None => PositionHit {
                position: CharId::BASE,
                eol_start: false,
                line: 0,
            },
            Some(previous) => PositionHit {
                position: previous.chars.last().map_or(CharId::BASE, |c| c.id),
                eol_start: !previous.is_hard_break(),
                line: index,
            },
        }
    }

    /// Linear fallback for lines flowed from an older document state.
    fn find_scan(&self, position: CharId) -> Option<(usize, usize)> {
        self.iter()
            .enumerate()
            .find_map(|(index, line)| line.position_of(position).map(|slot| (index, slot)))
    }
}

/// Caret origin for `position`.
///
/// An empty layout and `BASE` put the caret at the margin origin. A caret
/// after a hard break renders at the start of the next line.
pub fn caret_position<M: FontMetrics + ?Sized>(
    doc: &RichText,
    lines: &LineList,
    position: CharId,
    eol_start: bool,
    config: &LayoutConfig,
    metrics: &M,
) -> Result<CaretPosition, LayoutError> {
    let margin = config.margin;
    if position.is_base() || lines.is_empty() {
        return Ok(CaretPosition {
            left: margin.horizontal,
            top: margin.vertical,
            line: 0,
        });
    }

    let mut location = lines.locate(doc, position, eol_start)?;
    let line = lines
        .get(location.index)
        .ok_or(LayoutError::Unresolved(position))?;
    if !location.at_line_start
        && location.end_of_line
        && line.is_hard_break()
        && location.index + 1 < lines.len()
    {
        location.index += 1;
        location.at_line_start = true;
    }

    let advance = if location.at_line_start {
        0.0
    } else {
        advance_for_chars(metrics, config.font_size, line.chars_to(position))
    };
    let line_height = metrics.line_height(config.font_size);

    Ok(CaretPosition {
        left: margin.horizontal + advance,
        top: margin.vertical + line_height * location.index as f32,
        line: location.index,
    })
}
