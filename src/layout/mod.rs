//! Layout reconstruction: OCR word records to translatable groups and back.

mod cluster;
mod heuristics;
mod ingest;
mod lines;
mod reflow;
mod text;

use serde::Serialize;
use std::collections::BTreeMap;

pub use cluster::split_into_columns;
pub use heuristics::{is_paragraph, is_vertical};
pub use ingest::{group_by_block, ingest_rows};
pub use lines::reconstruct_lines;
pub use reflow::{RectPx, RenderCommand, plan_group, split_into_lines};
pub use text::{
    TranslationUnit, assemble_text, assemble_units, batch_texts, normalize_for_translation, pair_translations,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBoxPx {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BBoxPx {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }

    pub fn union(&self, other: &BBoxPx) -> BBoxPx {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BBoxPx {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }
}

/// A single recognised word. `line_id` starts out as the OCR engine's guess
/// and is replaced by [`reconstruct_lines`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordRecord {
    pub text: String,
    pub bbox: BBoxPx,
    pub block_id: u32,
    pub line_id: u32,
    pub word_index: u32,
}

/// Empirical constants of the layout heuristics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutTunables {
    /// Fraction of the previous glyph height a word must drop to start a new line.
    pub line_break_ratio: f32,
    /// Widening applied to a column's span when deciding whether a word joins it.
    pub column_widen_factor: f32,
    pub paragraph_min_words: usize,
    /// Height/width ratio above which a lone word is treated as vertical text.
    pub vertical_aspect_ratio: f32,
    pub line_height_factor: f32,
    pub corner_radius_factor: f32,
}

impl Default for LayoutTunables {
    fn default() -> Self {
        Self {
            line_break_ratio: 0.5,
            column_widen_factor: 1.5,
            paragraph_min_words: 40,
            vertical_aspect_ratio: 10.0,
            line_height_factor: 1.2,
            corner_radius_factor: 0.2,
        }
    }
}

/// Words believed to form one visual unit: a block, or a column split off one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    words: Vec<WordRecord>,
}

/// The words of a group that share a reconstructed line id.
#[derive(Debug, Clone)]
pub struct Line<'a> {
    pub line_id: u32,
    pub words: Vec<&'a WordRecord>,
}

impl Group {
    pub fn new(words: Vec<WordRecord>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[WordRecord] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn lines(&self) -> Vec<Line<'_>> {
        let mut by_id: BTreeMap<u32, Vec<&WordRecord>> = BTreeMap::new();
        for word in &self.words {
            by_id.entry(word.line_id).or_default().push(word);
        }
        by_id
            .into_iter()
            .map(|(line_id, mut words)| {
                words.sort_by_key(|word| word.word_index);
                Line { line_id, words }
            })
            .collect()
    }

    /// Mean glyph height, used as the font size for measuring and drawing.
    pub fn font_size(&self) -> f32 {
        if self.words.is_empty() {
            return 0.0;
        }
        let total: f32 = self.words.iter().map(|word| word.bbox.height as f32).sum();
        total / self.words.len() as f32
    }

    pub fn bounds(&self) -> Option<BBoxPx> {
        let mut iter = self.words.iter();
        let first = iter.next()?.bbox;
        Some(iter.fold(first, |acc, word| acc.union(&word.bbox)))
    }

    pub fn text_summary(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Line<'_> {
    pub fn left(&self) -> u32 {
        self.words.iter().map(|word| word.bbox.left).min().unwrap_or(0)
    }

    pub fn right(&self) -> u32 {
        self.words
            .iter()
            .map(|word| word.bbox.right())
            .max()
            .unwrap_or(0)
    }

    pub fn top(&self) -> u32 {
        self.words.iter().map(|word| word.bbox.top).min().unwrap_or(0)
    }

    /// Width budget available to re-flowed text on this line.
    pub fn width(&self) -> u32 {
        self.right().saturating_sub(self.left())
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs line reconstruction and column splitting over every block of a page.
pub fn build_groups(records: Vec<WordRecord>, tunables: &LayoutTunables) -> Vec<Group> {
    group_by_block(records)
        .into_iter()
        .map(|block| reconstruct_lines(block, tunables.line_break_ratio))
        .flat_map(|block| split_into_columns(block, tunables.column_widen_factor))
        .collect()
}

#[cfg(test)]
pub(crate) fn word(text: &str, left: u32, top: u32, width: u32, height: u32) -> WordRecord {
    WordRecord {
        text: text.to_string(),
        bbox: BBoxPx {
            left,
            top,
            width,
            height,
        },
        block_id: 1,
        line_id: 1,
        word_index: 1,
    }
}
