use super::WordRecord;

/// Long runs of prose are flattened before translation; sparse text keeps its
/// line breaks.
pub fn is_paragraph(text: &str, min_words: usize) -> bool {
    text.split_whitespace().count() >= min_words
}

/// Detects text running down the page, such as serial numbers printed along
/// a margin.
///
/// A lone word is vertical when it is much taller than wide. Otherwise the
/// median over consecutive word pairs of "moved further vertically than
/// horizontally" decides; an even split counts as vertical.
pub fn is_vertical(words: &[WordRecord], aspect_ratio: f32) -> bool {
    match words {
        [] => false,
        [only] => {
            let width = only.bbox.width as f32;
            let height = only.bbox.height as f32;
            if width == 0.0 {
                return height > 0.0;
            }
            height / width > aspect_ratio
        }
        _ => {
            let pairs = words.len() - 1;
            let vertical_steps = words
                .windows(2)
                .filter(|pair| {
                    let d_left = (pair[1].bbox.left as i64 - pair[0].bbox.left as i64).abs();
                    let d_top = (pair[1].bbox.top as i64 - pair[0].bbox.top as i64).abs();
                    d_top > d_left
                })
                .count();
            vertical_steps * 2 >= pairs
        }
    }
}
