//! Template → grid rendering pipeline.
//!
//! Expansion picks one format variant and one option per placeholder draw at
//! random; everything after that (codec, wrap, truncation, padding) is
//! deterministic. The returned grid is always exactly rows × cols for the
//! target model.

use rand::seq::SliceRandom;
use rand::Rng;

use flap_core::Grid;

use crate::codec::{self, BoardModel};
use crate::template::{Template, Truncation, VariableMap};

/// Render a template into a board-ready grid.
pub fn render<R: Rng>(model: BoardModel, template: &Template, rng: &mut R) -> Grid {
    let lines = match template.formats.choose(rng) {
        Some(variant) => expand_format(&variant.format, &template.variables, rng),
        None => Vec::new(),
    };
    let mut rows: Vec<Vec<u8>> = Vec::new();
    for line in &lines {
        for row in wrap_line(line, model.cols(), template.truncation) {
            rows.push(codec::encode_line(&row, model.cols()));
        }
    }
    // Overflow is expected (provider output is not pre-fitted to geometry);
    // excess rows are dropped, short grids padded with blanks.
    rows.truncate(model.rows());
    rows.resize(model.rows(), vec![codec::BLANK; model.cols()]);
    Grid { codes: rows }
}

/// Expand `{variable}` placeholders in a chosen format variant.
///
/// An entry that is exactly one placeholder splices in every line of one
/// randomly chosen option. Inline placeholders take the first line of an
/// option drawn independently per occurrence, including repeated occurrences
/// of the same variable within one render.
fn expand_format<R: Rng>(format: &[String], variables: &VariableMap, rng: &mut R) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in format {
        if let Some(name) = whole_line_placeholder(entry) {
            match variables.get(name).and_then(|options| options.choose(rng)) {
                Some(option) => lines.extend(option.iter().cloned()),
                None => lines.push(String::new()),
            }
        } else {
            lines.push(expand_inline(entry, variables, rng));
        }
    }
    lines
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The variable name if the trimmed entry is exactly `{name}`.
fn whole_line_placeholder(entry: &str) -> Option<&str> {
    let trimmed = entry.trim();
    let inner = trimmed.strip_prefix('{')?.strip_suffix('}')?;
    is_word(inner).then_some(inner)
}

/// Replace every inline `{name}` with the first line of an independently
/// chosen option. Unknown variables expand to nothing; braces that do not
/// form a placeholder pass through untouched.
fn expand_inline<R: Rng>(entry: &str, variables: &VariableMap, rng: &mut R) -> String {
    let mut out = String::new();
    let mut rest = entry;
    while let Some(open) = rest.find('{') {
        let (head, tail) = rest.split_at(open);
        out.push_str(head);
        match tail[1..].find('}') {
            Some(close) if is_word(&tail[1..1 + close]) => {
                let name = &tail[1..1 + close];
                let first_line = variables
                    .get(name)
                    .and_then(|options| options.choose(rng))
                    .and_then(|option| option.first());
                if let Some(line) = first_line {
                    out.push_str(line);
                }
                rest = &tail[close + 2..];
            }
            _ => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Shorten a row to at most `max_cols` display cells.
///
/// `word` and `ellipsis` back off to the last word boundary that fits; text
/// with no boundary inside the budget falls back to a hard cut at the full
/// column width regardless of mode, so an overlong single word always fills
/// the row exactly. Color tags and the heart emoji count as one cell and are
/// never split.
pub fn truncate_line(text: &str, max_cols: usize, mode: Truncation) -> String {
    let all = codec::cells(text);
    if all.len() <= max_cols {
        return text.to_string();
    }
    let target = match mode {
        Truncation::Ellipsis => max_cols.saturating_sub(3),
        _ => max_cols,
    };
    let mut last_word_end = None;
    for (i, cell) in all.iter().take(target).enumerate() {
        if *cell == " " && mode != Truncation::Hard {
            last_word_end = Some(i);
        }
    }
    match (mode, last_word_end) {
        (Truncation::Hard, _) | (_, None) => all[..max_cols].concat(),
        (Truncation::Word, Some(end)) => all[..end].concat(),
        (Truncation::Ellipsis, Some(end)) => {
            let mut s = all[..end].concat();
            s.push_str("...");
            s
        }
    }
}

/// Greedily pack a line's words into rows of at most `cols` cells. Lines are
/// only ever split, never joined; a word that alone exceeds the width is
/// truncated via [`truncate_line`].
fn wrap_line(line: &str, cols: usize, mode: Truncation) -> Vec<String> {
    if codec::display_len(line) <= cols {
        return vec![line.to_string()];
    }
    let mut rows = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;
    for word in line.split(' ') {
        let word_len = codec::display_len(word);
        if word_len > cols {
            if !current.is_empty() {
                rows.push(current.join(" "));
                current.clear();
                current_len = 0;
            }
            rows.push(truncate_line(word, cols, mode));
            continue;
        }
        if current.is_empty() {
            current.push(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= cols {
            current.push(word);
            current_len += 1 + word_len;
        } else {
            rows.push(current.join(" "));
            current = vec![word];
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        rows.push(current.join(" "));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Format;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn template(lines: &[&str], variables: VariableMap, truncation: Truncation) -> Template {
        Template {
            formats: vec![Format {
                format: lines.iter().map(|s| s.to_string()).collect(),
            }],
            variables,
            truncation,
        }
    }

    fn vars(name: &str, options: &[&[&str]]) -> VariableMap {
        let mut m = HashMap::new();
        m.insert(
            name.to_string(),
            options
                .iter()
                .map(|o| o.iter().map(|s| s.to_string()).collect())
                .collect(),
        );
        m
    }

    fn rendered_rows(t: &Template, seed: u64) -> Vec<Vec<u8>> {
        let mut rng = StdRng::seed_from_u64(seed);
        render(BoardModel::Note, t, &mut rng).codes
    }

    #[test]
    fn test_render_without_placeholders_is_deterministic() {
        let t = template(&["HELLO", "WORLD"], HashMap::new(), Truncation::Hard);
        assert_eq!(rendered_rows(&t, 1), rendered_rows(&t, 2));
    }

    #[test]
    fn test_render_is_exact_geometry() {
        let t = template(&["HI"], HashMap::new(), Truncation::Hard);
        let grid = {
            let mut rng = StdRng::seed_from_u64(0);
            render(BoardModel::Flagship, &t, &mut rng)
        };
        assert_eq!(grid.rows(), 6);
        assert!(grid.codes.iter().all(|r| r.len() == 22));
    }

    #[test]
    fn test_exact_width_line_passes_unwrapped() {
        // 15 chars, Note width, no tags.
        let line = "ABCDEFGHIJKLMNO";
        let t = template(&[line], HashMap::new(), Truncation::Hard);
        let rows = rendered_rows(&t, 0);
        assert_eq!(rows[0], codec::encode_line(line, 15));
        assert_eq!(rows[1], vec![0; 15]);
    }

    #[test]
    fn test_whole_line_placeholder_splices_all_lines() {
        let t = template(
            &["{departures}"],
            vars("departures", &[&["LINE ONE", "LINE TWO"]]),
            Truncation::Hard,
        );
        let rows = rendered_rows(&t, 0);
        assert_eq!(rows[0], codec::encode_line("LINE ONE", 15));
        assert_eq!(rows[1], codec::encode_line("LINE TWO", 15));
    }

    #[test]
    fn test_inline_placeholder_takes_first_line() {
        let t = template(
            &["NOW: {show}"],
            vars("show", &[&["SEVERANCE", "S2E1"]]),
            Truncation::Hard,
        );
        let rows = rendered_rows(&t, 0);
        assert_eq!(rows[0], codec::encode_line("NOW: SEVERANCE", 15));
    }

    #[test]
    fn test_unknown_variable_expands_to_nothing() {
        let t = template(&["X{missing}Y"], HashMap::new(), Truncation::Hard);
        let rows = rendered_rows(&t, 0);
        assert_eq!(rows[0], codec::encode_line("XY", 15));
    }

    #[test]
    fn test_non_placeholder_braces_pass_through() {
        let t = template(&["{not a var}"], HashMap::new(), Truncation::Hard);
        let rows = rendered_rows(&t, 0);
        assert_eq!(rows[0], codec::encode_line("{not a var}", 15));
    }

    // Repeated inline occurrences of one variable draw independently per
    // occurrence. This is intentional, not an accident of implementation.
    #[test]
    fn test_inline_draws_are_independent_per_occurrence() {
        let t = template(
            &["{coin} {coin}"],
            vars("coin", &[&["H"], &["T"]]),
            Truncation::Hard,
        );
        let mixed = (0..64).any(|seed| {
            let row = &rendered_rows(&t, seed)[0];
            row[0] != row[2]
        });
        assert!(mixed, "64 renders never drew two different options");
    }

    #[test]
    fn test_wrap_packs_greedily() {
        assert_eq!(
            wrap_line("HELLO WORLD THIS IS", 15, Truncation::Hard),
            vec!["HELLO WORLD", "THIS IS"]
        );
    }

    #[test]
    fn test_wrap_does_not_join_lines() {
        let t = template(&["A", "B"], HashMap::new(), Truncation::Hard);
        let rows = rendered_rows(&t, 0);
        assert_eq!(rows[0][0], 1);
        assert_eq!(rows[1][0], 2);
    }

    #[test]
    fn test_overlong_word_is_cut_to_exact_width_in_every_mode() {
        for mode in [Truncation::Hard, Truncation::Word, Truncation::Ellipsis] {
            let rows = wrap_line("ABCDEFGHIJKLMNOPQRST", 15, mode);
            assert_eq!(rows, vec!["ABCDEFGHIJKLMNO"], "mode {mode:?}");
        }
    }

    #[test]
    fn test_excess_rows_dropped_silently() {
        let t = template(&["A", "B", "C", "D"], HashMap::new(), Truncation::Hard);
        let rows = rendered_rows(&t, 0);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][0], 3);
    }

    #[test]
    fn test_unsupported_chars_render_blank() {
        let t = template(&["A~B"], HashMap::new(), Truncation::Hard);
        let rows = rendered_rows(&t, 0);
        assert_eq!(&rows[0][..3], &[1, 0, 2]);
    }

    // truncate_line unit properties

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_line("HI", 10, Truncation::Word), "HI");
    }

    #[test]
    fn test_truncate_hard() {
        assert_eq!(truncate_line("HELLO WORLD", 7, Truncation::Hard), "HELLO W");
    }

    #[test]
    fn test_truncate_word() {
        assert_eq!(truncate_line("HELLO WORLD", 7, Truncation::Word), "HELLO");
    }

    #[test]
    fn test_truncate_ellipsis_ends_with_marker_within_budget() {
        let out = truncate_line("HELLO WORLD AGAIN", 10, Truncation::Ellipsis);
        assert_eq!(out, "HELLO...");
        assert!(codec::display_len(&out) <= 10);
    }

    #[test]
    fn test_truncate_no_boundary_falls_back_to_full_width() {
        assert_eq!(truncate_line("HELLOWORLD", 5, Truncation::Word), "HELLO");
        assert_eq!(truncate_line("HELLOWORLD", 5, Truncation::Ellipsis), "HELLO");
    }

    #[test]
    fn test_truncate_preserves_color_tag_and_heart() {
        assert_eq!(truncate_line("[G]AB", 1, Truncation::Hard), "[G]");
        assert_eq!(
            truncate_line("\u{2764}\u{fe0f}AB", 1, Truncation::Hard),
            "\u{2764}\u{fe0f}"
        );
    }
}
