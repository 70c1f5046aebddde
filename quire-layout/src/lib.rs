//! # quire-layout
//!
//! Turns a replicated document into lines and geometry: where each line
//! breaks, which line a position sits on, where the caret goes and which
//! rectangles a selection covers.
//!
//! ## Architecture
//!
//! ```text
//! RichText ──► flow(config, metrics) ──► LineList
//!                                          │
//!                   ┌──────────────────────┼────────────────────┐
//!                   ▼                      ▼                    ▼
//!            LineList::locate       caret_position       selection_rects
//! ```
//!
//! - **`metrics`**: `FontMetrics` seam, glyph tables, LRU run cache.
//! - **`flow`**: greedy word wrap into `Line`s.
//! - **`resolver`**: position to line lookup, caret geometry and hit testing.
//! - **`selection`**: per-line selection rectangles.

pub mod error;
pub mod flow;
pub mod metrics;
pub mod resolver;
pub mod selection;

pub use error::LayoutError;
pub use flow::{flow, LayoutConfig, Line, LineEnd, LineList, Margin};
pub use metrics::{advance_for_chars, CachedMetrics, FontMetrics, GlyphTable};
pub use resolver::{caret_position, CaretPosition, LineLocation, PositionHit};
pub use selection::{
    compute_line_selection_rect, compute_selection_span, selection_rects, LineSelection, Selection,
    SelectionRect, SelectionSpan,
};
