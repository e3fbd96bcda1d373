use std::collections::{BTreeMap, BTreeSet};

use crate::error::PipelineError;
use crate::ocr::RawOcrRow;

use super::{BBoxPx, WordRecord};

/// Turns the OCR engine's rows for one page into word records, dropping rows
/// with no usable text.
pub fn ingest_rows(rows: Vec<RawOcrRow>) -> Result<Vec<WordRecord>, PipelineError> {
    let pages: BTreeSet<u32> = rows.iter().map(|row| row.page_num).collect();
    if pages.len() > 1 {
        return Err(PipelineError::MultiPageAssumptionViolated { pages: pages.len() });
    }

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let text = row.text?.trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(WordRecord {
                text,
                bbox: BBoxPx {
                    left: row.left,
                    top: row.top,
                    width: row.width,
                    height: row.height,
                },
                block_id: row.block_num,
                line_id: row.line_num,
                word_index: row.word_num,
            })
        })
        .collect())
}

/// Splits records into blocks by ascending block id, keeping OCR order inside
/// each block.
pub fn group_by_block(records: Vec<WordRecord>) -> Vec<Vec<WordRecord>> {
    let mut blocks: BTreeMap<u32, Vec<WordRecord>> = BTreeMap::new();
    for record in records {
        blocks.entry(record.block_id).or_default().push(record);
    }
    blocks.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(page: u32, block: u32, text: Option<&str>) -> RawOcrRow {
        RawOcrRow {
            level: 5,
            page_num: page,
            block_num: block,
            par_num: 1,
            line_num: 1,
            word_num: 1,
            left: 10,
            top: 20,
            width: 30,
            height: 40,
            conf: 90.0,
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn drops_null_and_blank_text() {
        let rows = vec![
            row(1, 1, Some("Zoll")),
            row(1, 1, None),
            row(1, 1, Some("   ")),
            row(1, 2, Some(" Amt ")),
        ];
        let records = ingest_rows(rows).unwrap();
        let texts: Vec<_> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Zoll", "Amt"]);
        assert_eq!(records[1].block_id, 2);
        assert_eq!(records[0].bbox.height, 40);
    }

    #[test]
    fn rejects_rows_from_several_pages() {
        let rows = vec![row(1, 1, Some("a")), row(2, 1, Some("b"))];
        let err = ingest_rows(rows).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MultiPageAssumptionViolated { pages: 2 }
        ));
    }

    #[test]
    fn empty_output_is_not_an_error() {
        assert!(ingest_rows(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn blocks_follow_ascending_id() {
        let records = ingest_rows(vec![
            row(1, 3, Some("c")),
            row(1, 1, Some("a1")),
            row(1, 3, Some("c2")),
            row(1, 1, Some("a2")),
        ])
        .unwrap();
        let blocks = group_by_block(records);
        let texts: Vec<Vec<_>> = blocks
            .iter()
            .map(|block| block.iter().map(|r| r.text.as_str()).collect())
            .collect();
        assert_eq!(texts, vec![vec!["a1", "a2"], vec!["c", "c2"]]);
    }
}
