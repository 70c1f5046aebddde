//! Font metrics seam.
//!
//! Measuring text is the font collaborator's job. The layout code only calls
//! [`FontMetrics`], which must be pure and deterministic for a given input.
//!
//! Two implementations ship with the crate:
//!
//! - [`GlyphTable`]: per-glyph advances in font units, scaled by
//!   `font_size / units_per_em` (the shape of an OpenType `hmtx` table).
//! - [`CachedMetrics`]: an LRU cache in front of any other source, for
//!   shapers where measuring a run is expensive.

use lru::LruCache;
use quire_core::{Char, FontStyle};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;

/// Measurement interface of the font collaborator.
pub trait FontMetrics {
    /// Horizontal advance of `text` set in `style` at `font_size` pixels.
    fn advance_width(&self, font_size: f32, style: FontStyle, text: &str) -> f32;

    /// Distance between consecutive baselines at `font_size`.
    fn line_height(&self, font_size: f32) -> f32;

    /// Advance of one regular space; the width of the caret-sized blank
    /// selected after a hard line break.
    fn space_advance(&self, font_size: f32) -> f32 {
        self.advance_width(font_size, FontStyle::Regular, " ")
    }
}

impl<M: FontMetrics + ?Sized> FontMetrics for &M {
    fn advance_width(&self, font_size: f32, style: FontStyle, text: &str) -> f32 {
        (**self).advance_width(font_size, style, text)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        (**self).line_height(font_size)
    }

    fn space_advance(&self, font_size: f32) -> f32 {
        (**self).space_advance(font_size)
    }
}

/// Total advance of a character sequence.
///
/// Consecutive characters sharing a font style are measured as one run.
/// Line breaks take no horizontal space.
pub fn advance_for_chars<'a, M, I>(metrics: &M, font_size: f32, chars: I) -> f32
where
    M: FontMetrics + ?Sized,
    I: IntoIterator<Item = &'a Char>,
{
    let mut total = 0.0;
    let mut run = String::new();
    let mut run_style = FontStyle::Regular;

    for c in chars {
        if c.is_newline() {
            continue;
        }
        let style = c.font_style();
        if style != run_style && !run.is_empty() {
            total += metrics.advance_width(font_size, run_style, &run);
            run.clear();
        }
        run_style = style;
        run.push(c.ch);
    }
    if !run.is_empty() {
        total += metrics.advance_width(font_size, run_style, &run);
    }
    total
}

// ───────────────────────────────────────────────────────────────────
// GlyphTable
// ───────────────────────────────────────────────────────────────────

/// Advance-width table in font units.
///
/// Lookups fall back from the requested style to the regular face, then to
/// the table's default advance.
#[derive(Debug, Clone)]
pub struct GlyphTable {
    units_per_em: f32,
    /// Sizes below this are measured as this size.
    min_font_size: f32,
    /// Line height as a multiple of the font size.
    line_height_factor: f32,
    default_advance: u16,
    advances: FxHashMap<(FontStyle, char), u16>,
}

impl GlyphTable {
    pub fn new(units_per_em: u16, default_advance: u16) -> Self {
        Self {
            units_per_em: f32::from(units_per_em.max(1)),
            min_font_size: 1.0,
            line_height_factor: 1.2,
            default_advance,
            advances: FxHashMap::default(),
        }
    }

    /// Every glyph `advance` units wide; handy for tests and terminals.
    pub fn monospace(units_per_em: u16, advance: u16) -> Self {
        Self::new(units_per_em, advance)
    }

    pub fn with_min_font_size(mut self, min_font_size: f32) -> Self {
        self.min_font_size = min_font_size;
        self
    }

    pub fn with_line_height_factor(mut self, factor: f32) -> Self {
        self.line_height_factor = factor;
        self
    }

    pub fn with_advance(mut self, style: FontStyle, ch: char, units: u16) -> Self {
        self.set_advance(style, ch, units);
        self
    }

    pub fn set_advance(&mut self, style: FontStyle, ch: char, units: u16) {
        self.advances.insert((style, ch), units);
    }

    fn units(&self, style: FontStyle, ch: char) -> u16 {
        self.advances
            .get(&(style, ch))
            .or_else(|| self.advances.get(&(FontStyle::Regular, ch)))
            .copied()
            .unwrap_or(self.default_advance)
    }

    fn effective_size(&self, font_size: f32) -> f32 {
        font_size.max(self.min_font_size)
    }
}

impl FontMetrics for GlyphTable {
    fn advance_width(&self, font_size: f32, style: FontStyle, text: &str) -> f32 {
        let units: u32 = text.chars().map(|c| u32::from(self.units(style, c))).sum();
        units as f32 * self.effective_size(font_size) / self.units_per_em
    }

    fn line_height(&self, font_size: f32) -> f32 {
        self.effective_size(font_size) * self.line_height_factor
    }
}

// ───────────────────────────────────────────────────────────────────
// CachedMetrics
// ───────────────────────────────────────────────────────────────────

type CacheKey = (FontStyle, u32, String);

/// LRU cache of run advances in front of another metrics source.
///
/// Interior mutability keeps [`FontMetrics`] a `&self` interface; the cache
/// lives on the single layout thread.
pub struct CachedMetrics<M> {
    inner: M,
    cache: RefCell<LruCache<CacheKey, f32>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl<M: FontMetrics> CachedMetrics<M> {
    pub fn new(inner: M, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: RefCell::new(LruCache::new(capacity)),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.get(), self.misses.get())
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }
}

impl<M: FontMetrics> FontMetrics for CachedMetrics<M> {
    fn advance_width(&self, font_size: f32, style: FontStyle, text: &str) -> f32 {
        let key = (style, font_size.to_bits(), text.to_owned());
        if let Some(width) = self.cache.borrow_mut().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return *width;
        }
        self.misses.set(self.misses.get() + 1);
        let width = self.inner.advance_width(font_size, style, text);
        self.cache.borrow_mut().put(key, width);
        width
    }

    fn line_height(&self, font_size: f32) -> f32 {
        self.inner.line_height(font_size)
    }
}
