use super::{Group, WordRecord};

struct Candidate {
    left: f32,
    right: f32,
    words: Vec<WordRecord>,
}

impl Candidate {
    fn new(record: WordRecord) -> Self {
        Self {
            left: record.bbox.left as f32,
            right: record.bbox.right() as f32,
            words: vec![record],
        }
    }

    fn accepts(&self, record: &WordRecord, widen: f32) -> bool {
        (record.bbox.left as f32) < self.left + (self.right - self.left) * widen
    }

    /// The candidate's right edge follows the word added last.
    fn push(&mut self, record: WordRecord) {
        self.right = record.bbox.right() as f32;
        self.words.push(record);
    }
}

/// Splits a line-sorted block into side-by-side columns.
///
/// OCR engines regularly merge neighbouring columns into one block. A word
/// joins the first existing column whose span, measured from its left edge to
/// the right edge of its latest word and widened by `widen`, reaches the
/// word's left edge; otherwise it opens a new column.
pub fn split_into_columns(block: Vec<WordRecord>, widen: f32) -> Vec<Group> {
    let mut candidates: Vec<Candidate> = Vec::new();

    for record in block {
        match candidates
            .iter_mut()
            .find(|candidate| candidate.accepts(&record, widen))
        {
            Some(candidate) => candidate.push(record),
            None => candidates.push(Candidate::new(record)),
        }
    }

    candidates
        .into_iter()
        .map(|candidate| Group::new(candidate.words))
        .collect()
}
