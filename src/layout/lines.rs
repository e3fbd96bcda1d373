use super::WordRecord;

/// Re-numbers the lines of one block from vertical position, overriding the
/// OCR engine's line ids, then sorts by `(line_id, word_index)`.
///
/// A word starts a new line when its top lies more than `line_break_ratio` of
/// the previous word's height below the previous word's top.
pub fn reconstruct_lines(mut block: Vec<WordRecord>, line_break_ratio: f32) -> Vec<WordRecord> {
    let Some(first) = block.first() else {
        return block;
    };
    let mut line_id = first.line_id;
    let mut prev: Option<(f32, f32)> = None;

    for record in block.iter_mut() {
        let top = record.bbox.top as f32;
        if let Some((prev_top, prev_height)) = prev
            && top > prev_top + prev_height * line_break_ratio
        {
            line_id += 1;
        }
        prev = Some((top, record.bbox.height as f32));
        record.line_id = line_id;
    }

    block.sort_by_key(|record| (record.line_id, record.word_index));
    block
}
