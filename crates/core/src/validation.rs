//! Content-integrity comparison between an original document and its organized form.
//!
//! The report is advisory: callers attach it to their result and log its
//! warnings, they do not reject output because of it unless they opt in.

use crate::config::ValidationConfig;
use crate::models::ValidationReport;
use tracing::warn;

pub fn validate(original: &str, transformed: &str, config: &ValidationConfig) -> ValidationReport {
    let original_words = word_count(original);
    let transformed_words = word_count(transformed);
    let original_chars = non_whitespace_chars(original);
    let transformed_chars = non_whitespace_chars(transformed);
    let original_lines = non_blank_lines(original).count();
    let transformed_lines = non_blank_lines(transformed).count();

    let words_ratio = ratio(transformed_words, original_words);
    let chars_ratio = ratio(transformed_chars, original_chars);
    let lines_ratio = ratio(transformed_lines, original_lines);

    let is_valid = words_ratio >= config.min_words_ratio
        && chars_ratio >= config.min_chars_ratio
        && lines_ratio >= config.min_lines_ratio;

    let missing_last_lines: Vec<String> = tail_lines(original, config.tail_lines)
        .into_iter()
        .filter(|line| line.chars().count() > config.tail_min_chars)
        .filter(|line| !line_survives(line, transformed, config))
        .map(str::to_string)
        .collect();

    for line in &missing_last_lines {
        warn!(line = %line, "closing line of the original is missing from the organized text");
    }

    let report = ValidationReport {
        original_words,
        transformed_words,
        words_ratio,
        original_chars,
        transformed_chars,
        chars_ratio,
        original_lines,
        transformed_lines,
        lines_ratio,
        last_lines_present: missing_last_lines.is_empty(),
        missing_last_lines,
        is_valid,
    };

    if !report.passed() {
        warn!(
            words_ratio,
            chars_ratio,
            lines_ratio,
            last_lines_present = report.last_lines_present,
            "content validation flagged the organized text"
        );
    }

    report
}

/// The last `count` non-blank lines of `text`, trimmed, in document order.
pub fn tail_lines(text: &str, count: usize) -> Vec<&str> {
    let mut lines: Vec<&str> = non_blank_lines(text).map(str::trim).collect();
    let skip = lines.len().saturating_sub(count);
    lines.drain(..skip);
    lines
}

fn line_survives(line: &str, transformed: &str, config: &ValidationConfig) -> bool {
    let significant: Vec<&str> = line
        .split_whitespace()
        .filter(|word| word.chars().count() > config.tail_word_min_chars)
        .collect();
    let found = significant
        .iter()
        .filter(|word| transformed.contains(*word))
        .count();

    found as f64 >= significant.len() as f64 * config.tail_presence_ratio
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn non_whitespace_chars(text: &str) -> usize {
    text.chars().filter(|ch| !ch.is_whitespace()).count()
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').filter(|line| !line.trim().is_empty())
}

fn ratio(transformed: usize, original: usize) -> f64 {
    if original == 0 {
        return 1.0;
    }
    transformed as f64 / original as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const LESSON: &str = "Opening remarks about the weekly portion\n\n\
        The first question concerns the order of the blessings.\n\
        The answer given by the instructor was based on the earlier source.\n\
        Finally the group agreed to continue next week with chapter three.\n";

    #[test]
    fn identical_texts_validate_cleanly() {
        let report = validate(LESSON, LESSON, &ValidationConfig::default());
        assert_eq!(report.words_ratio, 1.0);
        assert_eq!(report.chars_ratio, 1.0);
        assert_eq!(report.lines_ratio, 1.0);
        assert!(report.is_valid);
        assert!(report.last_lines_present);
        assert!(report.missing_last_lines.is_empty());
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn markdown_restructuring_keeps_the_report_valid() {
        let organized = "# Weekly portion\n\nOpening remarks about the weekly portion\n\n\
            ## The blessings\n\n\
            - The first question concerns the order of the blessings.\n\
            - The answer given by the instructor was based on the earlier source.\n\n\
            Finally the group agreed to continue next week with chapter three.\n";
        let report = validate(LESSON, organized, &ValidationConfig::default());
        assert!(report.is_valid);
        assert!(report.last_lines_present);
        assert!(report.words_ratio > 1.0);
    }

    #[test]
    fn truncated_output_is_flagged_with_missing_tail() {
        let organized = "# Weekly portion\n\nOpening remarks about the weekly portion\n";
        let report = validate(LESSON, organized, &ValidationConfig::default());
        assert!(!report.is_valid);
        assert!(!report.last_lines_present);
        assert_eq!(report.missing_last_lines.len(), 3);
        assert_eq!(
            report.missing_last_lines[2],
            "Finally the group agreed to continue next week with chapter three."
        );
        assert_eq!(report.warnings().len(), 4);
    }

    #[test]
    fn partially_reworded_tail_line_still_counts_as_present() {
        let original = "intro line that is long enough\nalpha beta gamma delta epsilon";
        let organized = "intro line that is long enough\nalpha beta gamma (rest rephrased)";
        let report = validate(original, organized, &ValidationConfig::default());
        assert!(report.last_lines_present);
    }

    #[test]
    fn short_tail_lines_are_not_checked() {
        let report = validate(
            "body text that matters\nThe end.",
            "body text that matters",
            &ValidationConfig::default(),
        );
        assert!(report.last_lines_present);
    }

    #[test]
    fn empty_original_does_not_divide_by_zero() {
        let report = validate("", "", &ValidationConfig::default());
        assert_eq!(report.words_ratio, 1.0);
        assert!(report.is_valid);
    }

    #[test]
    fn tail_lines_returns_last_non_blank_lines_in_order() {
        assert_eq!(tail_lines("a\n\n b \nc\n\n", 2), vec!["b", "c"]);
        assert_eq!(tail_lines("only", 3), vec!["only"]);
    }
}
