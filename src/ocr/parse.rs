use anyhow::Result;
use tracing::debug;

use super::RawOcrRow;

/// Parses tesseract's TSV output. The header row is skipped, as are rows too
/// short to carry geometry or with unparsable numbers. Structural rows (page,
/// block, paragraph, line) come through with `text: None`.
pub fn parse_tsv_rows(tsv: &str) -> Result<Vec<RawOcrRow>> {
    let mut rows = Vec::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 11 {
            continue;
        }
        match parse_row(&cols) {
            Some(parsed) => rows.push(parsed),
            None => debug!(row = idx, "skipping malformed tsv row"),
        }
    }

    Ok(rows)
}

fn parse_row(cols: &[&str]) -> Option<RawOcrRow> {
    let num = |idx: usize| cols[idx].trim().parse::<i64>().ok();
    let unsigned = |idx: usize| num(idx).map(|value| value.max(0) as u32);

    let text = cols
        .get(11)
        .map(|value| value.trim_end_matches(['\r', '\n']))
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    Some(RawOcrRow {
        level: unsigned(0)?,
        page_num: unsigned(1)?,
        block_num: unsigned(2)?,
        par_num: unsigned(3)?,
        line_num: unsigned(4)?,
        word_num: unsigned(5)?,
        left: unsigned(6)?,
        top: unsigned(7)?,
        width: unsigned(8)?,
        height: unsigned(9)?,
        conf: cols[10].trim().parse::<f32>().ok()?,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2480\t3508\t-1\t
2\t1\t1\t0\t0\t0\t378\t555\t523\t176\t-1\t
5\t1\t1\t1\t1\t1\t378\t555\t99\t32\t96.12\tZollamt
5\t1\t1\t1\t1\t2\t488\t556\t130\t32\t91\tBerlin
5\t1\t1\t1\t2\t1\t378\t603\tx\t32\t91\tkaputt
5\t1\t1\t1\t2\t2\t378\t603
";

    #[test]
    fn parses_word_and_structure_rows() {
        let rows = parse_tsv_rows(SAMPLE).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].level, 1);
        assert_eq!(rows[0].text, None);
        assert_eq!(rows[0].conf, -1.0);
        assert_eq!(rows[2].text.as_deref(), Some("Zollamt"));
        assert_eq!(rows[2].left, 378);
        assert_eq!(rows[2].height, 32);
        assert_eq!(rows[3].word_num, 2);
        assert_eq!(rows[3].conf, 91.0);
    }

    #[test]
    fn empty_output_has_no_rows() {
        assert!(parse_tsv_rows("").unwrap().is_empty());
    }
}
