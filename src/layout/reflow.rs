use serde::Serialize;

use super::{Group, LayoutTunables};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RectPx {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

/// Blank out `rect`, then draw `text` at `(x, y)`. One per original line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderCommand {
    pub rect: RectPx,
    pub radius: u32,
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

/// Wraps `words` into at most `widths.len()` lines (at least one).
///
/// Each line takes words while the measured width of the joined prefix fits
/// its budget. The last budget absorbs whatever is left, however wide. A
/// first word that alone overflows leaves its line empty and moves on.
pub fn split_into_lines<F>(widths: &[f32], words: &[&str], measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::with_capacity(widths.len().max(1));
    let mut rest = words;

    for (idx, budget) in widths.iter().enumerate() {
        if idx + 1 == widths.len() {
            break;
        }
        let overflow =
            (0..rest.len()).find(|&end| measure(rest[..=end].join(" ").as_str()) > *budget);
        match overflow {
            Some(end) => {
                lines.push(rest[..end].join(" "));
                rest = &rest[end..];
            }
            None => {
                lines.push(rest.join(" "));
                return lines;
            }
        }
    }

    lines.push(rest.join(" "));
    lines
}

/// Lays translated text over the lines of the group it was assembled from.
///
/// Lines beyond the translated text still get a blank rectangle so no
/// untranslated text stays visible. A rectangle grows to fit its text rather
/// than the text being cut.
pub fn plan_group<F>(
    group: &Group,
    translated: &str,
    tunables: &LayoutTunables,
    measure: F,
) -> Vec<RenderCommand>
where
    F: Fn(&str, f32) -> f32,
{
    let font_size = group.font_size();
    let lines = group.lines();
    let widths: Vec<f32> = lines.iter().map(|line| line.width() as f32).collect();
    let words: Vec<&str> = translated.split_whitespace().collect();
    let text_lines = split_into_lines(&widths, &words, |text| measure(text, font_size));
    let radius = (font_size * tunables.corner_radius_factor).floor().max(0.0) as u32;

    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let text = text_lines.get(idx).cloned().unwrap_or_default();
            let left = line.left() as f32;
            let top = line.top() as f32;
            let right = (line.right() as f32).max(left + measure(text.as_str(), font_size));
            RenderCommand {
                rect: RectPx {
                    left,
                    right,
                    top,
                    bottom: top + font_size * tunables.line_height_factor,
                },
                radius,
                text,
                x: left,
                y: top,
                font_size,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{WordRecord, word};

    fn ten_per_char(text: &str) -> f32 {
        text.chars().count() as f32 * 10.0
    }

    #[test]
    fn single_budget_takes_everything() {
        let lines = split_into_lines(&[100.0], &["a", "b", "c"], |_| 1_000.0);
        assert_eq!(lines, vec!["a b c"]);
    }

    #[test]
    fn no_budget_still_yields_one_line() {
        let lines = split_into_lines(&[], &["a", "b"], ten_per_char);
        assert_eq!(lines, vec!["a b"]);
    }

    #[test]
    fn wraps_at_each_budget() {
        let words = ["the", "goods", "were", "inspected", "today"];
        let lines = split_into_lines(&[100.0, 100.0, 100.0], &words, ten_per_char);
        insta::assert_snapshot!(lines.join("\n"), @r"
        the goods
        were
        inspected today
        ");
    }

    #[test]
    fn short_translation_uses_fewer_lines() {
        let lines = split_into_lines(&[200.0, 200.0, 200.0], &["kurz"], ten_per_char);
        assert_eq!(lines, vec!["kurz"]);
    }

    #[test]
    fn oversized_first_word_leaves_empty_line() {
        let lines = split_into_lines(&[30.0, 30.0], &["customs", "ok"], ten_per_char);
        assert_eq!(lines, vec!["".to_string(), "customs ok".to_string()]);
    }

    #[test]
    fn preserves_every_word_in_order() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let words: Vec<&str> = text.split_whitespace().collect();
        let budget_sets: [Vec<f32>; 4] = [
            vec![40.0],
            vec![40.0, 60.0],
            vec![80.0, 20.0, 90.0, 50.0],
            vec![5.0; 6],
        ];
        for budgets in budget_sets {
            let lines = split_into_lines(&budgets, &words, ten_per_char);
            assert!(lines.len() <= budgets.len());
            let rejoined: Vec<&str> = lines.iter().flat_map(|l| l.split_whitespace()).collect();
            assert_eq!(rejoined, words);
        }
    }

    fn line_word(text: &str, left: u32, top: u32, width: u32, line_id: u32) -> WordRecord {
        let mut record = word(text, left, top, width, 20);
        record.line_id = line_id;
        record
    }

    #[test]
    fn trailing_lines_are_blanked_without_text() {
        let group = Group::new(vec![
            line_word("Die", 100, 100, 300, 1),
            line_word("Ware", 100, 130, 300, 2),
            line_word("wurde", 100, 160, 300, 3),
        ]);
        let commands = plan_group(&group, "Goods", &LayoutTunables::default(), |t, _| {
            ten_per_char(t)
        });
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].text, "Goods");
        assert_eq!(commands[1].text, "");
        assert_eq!(commands[2].text, "");
        assert_eq!(commands[2].rect.left, 100.0);
        assert_eq!(commands[2].rect.right, 400.0);
        assert_eq!(commands[2].rect.top, 160.0);
        assert_eq!(commands[2].rect.bottom, 160.0 + 20.0 * 1.2);
        assert_eq!(commands[0].radius, 4);
        assert_eq!((commands[0].x, commands[0].y), (100.0, 100.0));
        assert_eq!(commands[0].font_size, 20.0);
    }

    #[test]
    fn last_rectangle_grows_instead_of_clipping() {
        let group = Group::new(vec![line_word("Zoll", 50, 10, 40, 1)]);
        let commands = plan_group(
            &group,
            "customs office declaration",
            &LayoutTunables::default(),
            |t, _| ten_per_char(t),
        );
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].text, "customs office declaration");
        assert_eq!(commands[0].rect.right, 50.0 + 260.0);
    }

    #[test]
    fn translated_newlines_are_ignored() {
        let group = Group::new(vec![line_word("a", 0, 0, 500, 1)]);
        let commands = plan_group(&group, "first\nsecond", &LayoutTunables::default(), |t, _| {
            ten_per_char(t)
        });
        assert_eq!(commands[0].text, "first second");
    }
}
