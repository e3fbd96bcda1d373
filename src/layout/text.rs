use tracing::{debug, warn};

use crate::error::PipelineError;

use super::{Group, LayoutTunables, is_paragraph, is_vertical};

/// A group paired with the text sent for translation. `index` is the position
/// in the translation batch and is how the result finds its way back.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub index: usize,
    pub source: String,
    pub group: Group,
}

/// Newline-joined lines, each the space-joined words of that line.
pub fn assemble_text(group: &Group) -> String {
    group
        .lines()
        .iter()
        .map(|line| line.text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Translation services tend to add words when prose contains hard line
/// breaks, so paragraphs are flattened to a single span with hyphenated line
/// ends re-joined. Sparse text keeps its newlines.
pub fn normalize_for_translation(text: &str, paragraph_min_words: usize) -> String {
    if !is_paragraph(text, paragraph_min_words) {
        return text.to_string();
    }
    text.split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .replace("-\n", "")
        .replace('\n', " ")
}

/// Drops vertical groups and builds the ordered translation batch for a page.
pub fn assemble_units(groups: Vec<Group>, tunables: &LayoutTunables) -> (Vec<TranslationUnit>, Vec<Group>) {
    let mut units = Vec::new();
    let mut skipped = Vec::new();

    for group in groups {
        if is_vertical(group.words(), tunables.vertical_aspect_ratio) {
            warn!("ignoring vertical group '{}'", group.text_summary());
            skipped.push(group);
            continue;
        }
        let source = normalize_for_translation(&assemble_text(&group), tunables.paragraph_min_words);
        debug!(index = units.len(), "assembled group text: {:?}", source);
        units.push(TranslationUnit {
            index: units.len(),
            source,
            group,
        });
    }

    (units, skipped)
}

/// Source texts in batch order.
pub fn batch_texts(units: &[TranslationUnit]) -> Vec<String> {
    let mut ordered: Vec<&TranslationUnit> = units.iter().collect();
    ordered.sort_by_key(|unit| unit.index);
    ordered.into_iter().map(|unit| unit.source.clone()).collect()
}

/// Hands each unit the translation at its batch position.
pub fn pair_translations(
    units: Vec<TranslationUnit>,
    translations: Vec<String>,
) -> Result<Vec<(TranslationUnit, String)>, PipelineError> {
    let expected = units.len();
    let actual = translations.len();
    let mut slots: Vec<Option<String>> = translations.into_iter().map(Some).collect();
    units
        .into_iter()
        .map(|unit| {
            let translation = slots
                .get_mut(unit.index)
                .and_then(Option::take)
                .ok_or(PipelineError::TranslationBatchMismatch { expected, actual })?;
            Ok((unit, translation))
        })
        .collect()
}
