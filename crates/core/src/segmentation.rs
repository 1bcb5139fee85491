use crate::config::SegmentationConfig;
use crate::models::{Chunk, Document, SplitMethod};
use crate::traits::HeadingClassifier;
use regex::Regex;
use std::ops::Range;

const MARKDOWN_HEADING: &str = r"^\s{0,3}#{1,6}\s";
const LONE_ENUMERATOR: &str = r"^\s*(?:\d{1,3}|\p{L}{1,2})[.)]\s*$";

/// Heading heuristic: markdown headings, keyword headings, short colon lines and
/// lone enumerators such as `3.` or `א.`.
#[derive(Debug, Clone)]
pub struct DefaultHeadingClassifier {
    markdown: Regex,
    enumerator: Regex,
    keywords: Vec<String>,
    keyword_max_chars: usize,
    colon_max_chars: usize,
}

impl DefaultHeadingClassifier {
    pub fn new(config: &SegmentationConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            markdown: Regex::new(MARKDOWN_HEADING)?,
            enumerator: Regex::new(LONE_ENUMERATOR)?,
            keywords: config
                .heading_keywords
                .iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
            keyword_max_chars: config.keyword_heading_max_chars,
            colon_max_chars: config.colon_heading_max_chars,
        })
    }

    fn is_keyword_heading(&self, trimmed: &str) -> bool {
        let lowered = trimmed.to_lowercase();
        let starts_with_keyword = self.keywords.iter().any(|keyword| {
            lowered.strip_prefix(keyword.as_str()).is_some_and(|rest| {
                rest.chars().next().map_or(true, |next| !next.is_alphabetic())
            })
        });

        starts_with_keyword
            && (trimmed.ends_with(':') || trimmed.chars().count() <= self.keyword_max_chars)
    }
}

impl HeadingClassifier for DefaultHeadingClassifier {
    fn is_heading(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }

        self.markdown.is_match(line)
            || self.is_keyword_heading(trimmed)
            || (trimmed.ends_with(':') && trimmed.chars().count() <= self.colon_max_chars)
            || self.enumerator.is_match(trimmed)
    }
}

/// Split a document into bounded chunks. Joining the chunk texts with `\n`
/// reproduces the document byte for byte.
pub fn segment(
    document: &Document,
    config: &SegmentationConfig,
    classifier: &dyn HeadingClassifier,
) -> Vec<Chunk> {
    let lines: Vec<&str> = document.lines().collect();
    let max_lines = config.max_lines.max(1);

    if lines.len() <= max_lines {
        return vec![build_chunk(0, &lines, 0..lines.len(), SplitMethod::HeaderBounded)];
    }

    let mut pieces = Vec::new();
    for range in header_ranges(&lines, config, classifier) {
        if range.len() > max_lines {
            pieces.extend(
                line_ranges(&lines, range, config, classifier)
                    .into_iter()
                    .map(|piece| (piece, SplitMethod::LineBounded)),
            );
        } else {
            pieces.push((range, SplitMethod::HeaderBounded));
        }
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, (range, method))| build_chunk(index, &lines, range, method))
        .collect()
}

/// Line-bounded split of an arbitrary text, preferring blank lines and headings as cut points.
pub fn split_by_lines(
    text: &str,
    config: &SegmentationConfig,
    classifier: &dyn HeadingClassifier,
) -> Vec<Chunk> {
    let lines: Vec<&str> = text.split('\n').collect();
    line_ranges(&lines, 0..lines.len(), config, classifier)
        .into_iter()
        .enumerate()
        .map(|(index, range)| build_chunk(index, &lines, range, SplitMethod::LineBounded))
        .collect()
}

pub fn join_chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn header_ranges(
    lines: &[&str],
    config: &SegmentationConfig,
    classifier: &dyn HeadingClassifier,
) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;

    // sections past the hard bound are cut by `line_ranges`, which looks for a clean boundary
    for (index, line) in lines.iter().enumerate() {
        if index - start > config.soft_lines && classifier.is_heading(line) {
            ranges.push(start..index);
            start = index;
        }
    }

    if start < lines.len() {
        ranges.push(start..lines.len());
    }

    ranges
}

fn line_ranges(
    lines: &[&str],
    range: Range<usize>,
    config: &SegmentationConfig,
    classifier: &dyn HeadingClassifier,
) -> Vec<Range<usize>> {
    let target_lines = config.target_lines.max(1);
    let mut ranges = Vec::new();
    let mut start = range.start;

    while range.end - start > target_lines {
        let target = start + target_lines;
        let cut = find_cut(lines, start, target, config.lookback_lines, classifier).unwrap_or(target);
        ranges.push(start..cut);
        start = cut;
    }

    if start < range.end {
        ranges.push(start..range.end);
    }

    ranges
}

fn find_cut(
    lines: &[&str],
    start: usize,
    target: usize,
    lookback: usize,
    classifier: &dyn HeadingClassifier,
) -> Option<usize> {
    let floor = target.saturating_sub(lookback).max(start + 1);

    (floor..target).rev().find_map(|index| {
        let line = lines[index];
        if line.trim().is_empty() {
            // blank line stays with the chunk it closes
            Some(index + 1)
        } else if classifier.is_cut_point(line) {
            Some(index)
        } else {
            None
        }
    })
}

fn build_chunk(index: usize, lines: &[&str], range: Range<usize>, method: SplitMethod) -> Chunk {
    Chunk {
        index,
        start_line: range.start,
        line_count: range.len(),
        text: lines[range].join("\n"),
        method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> DefaultHeadingClassifier {
        DefaultHeadingClassifier::new(&SegmentationConfig::default())
            .expect("default patterns compile")
    }

    fn prose(count: usize, prefix: &str) -> Vec<String> {
        (0..count)
            .map(|index| format!("{prefix} sentence number {index} keeps the discussion going"))
            .collect()
    }

    #[test]
    fn classifier_recognizes_heading_shapes() {
        let classifier = classifier();
        assert!(classifier.is_heading("## Background"));
        assert!(classifier.is_heading("Chapter 4"));
        assert!(classifier.is_heading("פרק ב"));
        assert!(classifier.is_heading("Things to remember:"));
        assert!(classifier.is_heading("12."));
        assert!(classifier.is_heading("א."));
        assert!(!classifier.is_heading(""));
        assert!(!classifier.is_heading("#hashtag without space"));
        assert!(!classifier.is_heading("Partial results were reported by the committee last year"));
        assert!(!classifier.is_heading("A perfectly ordinary sentence in a paragraph."));
    }

    #[test]
    fn short_documents_are_returned_whole() {
        let text = prose(80, "Short").join("\n");
        let chunks = segment(&Document::new(text.clone()), &SegmentationConfig::default(), &classifier());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].line_count, 80);
    }

    #[test]
    fn headings_after_the_soft_bound_start_new_chunks() {
        let mut lines = Vec::new();
        for section in 0..3 {
            lines.push(format!("# Section {section}"));
            lines.extend(prose(49, "Body"));
        }
        let text = lines.join("\n");

        let chunks = segment(&Document::new(text.clone()), &SegmentationConfig::default(), &classifier());

        assert_eq!(chunks.len(), 3);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.line_count, 50);
            assert_eq!(chunk.start_line, index * 50);
            assert!(chunk.text.starts_with("# Section"));
            assert_eq!(chunk.method, SplitMethod::HeaderBounded);
        }
        assert_eq!(join_chunks(&chunks), text);
    }

    #[test]
    fn headings_before_the_soft_bound_do_not_split() {
        let mut lines = Vec::new();
        for section in 0..6 {
            lines.push(format!("## Part {section}"));
            lines.extend(prose(19, "Body"));
        }
        let text = lines.join("\n");

        let chunks = segment(&Document::new(text.clone()), &SegmentationConfig::default(), &classifier());

        // headings every 20 lines only cut once the chunk holds more than 40
        assert!(chunks.iter().all(|chunk| chunk.line_count > 40));
        assert_eq!(join_chunks(&chunks), text);
    }

    #[test]
    fn heading_free_text_is_split_at_the_target_size() {
        let text = prose(200, "Plain").join("\n");
        let chunks = segment(&Document::new(text.clone()), &SegmentationConfig::default(), &classifier());

        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.line_count).collect();
        assert_eq!(sizes, vec![70, 70, 60]);
        assert!(chunks.iter().all(|chunk| chunk.method == SplitMethod::LineBounded));
        assert_eq!(join_chunks(&chunks), text);
    }

    #[test]
    fn oversized_sections_are_cut_at_a_nearby_blank_line() {
        let mut lines = vec!["# Introduction".to_string()];
        lines.extend(prose(44, "Intro"));
        lines.push("# Long discussion".to_string());
        lines.extend(prose(150, "Body"));
        // 63 lines into the second section
        lines[45 + 63] = String::new();
        let text = lines.join("\n");

        let chunks = segment(&Document::new(text.clone()), &SegmentationConfig::default(), &classifier());

        assert_eq!(chunks[0].line_count, 45);
        assert_eq!(chunks[0].method, SplitMethod::HeaderBounded);
        assert_eq!(chunks[1].start_line, 45);
        assert_eq!(chunks[1].line_count, 64);
        assert!(chunks[1].text.starts_with("# Long discussion"));
        assert_eq!(chunks[1].method, SplitMethod::LineBounded);
        assert!(chunks.iter().all(|chunk| chunk.line_count <= 80));
        assert_eq!(join_chunks(&chunks), text);
    }

    #[test]
    fn line_split_prefers_a_blank_line_near_the_target() {
        let mut lines = prose(150, "Line");
        lines[64] = String::new();
        let text = lines.join("\n");

        let chunks = split_by_lines(&text, &SegmentationConfig::default(), &classifier());

        assert_eq!(chunks[0].line_count, 65);
        assert!(chunks[0].text.ends_with('\n'));
        assert_eq!(chunks[1].start_line, 65);
        assert!(chunks.iter().all(|chunk| chunk.method == SplitMethod::LineBounded));
        assert_eq!(join_chunks(&chunks), text);
    }

    #[test]
    fn line_split_cuts_before_a_heading_near_the_target() {
        let mut lines = prose(150, "Line");
        lines[66] = "Summary:".to_string();
        let text = lines.join("\n");

        let chunks = split_by_lines(&text, &SegmentationConfig::default(), &classifier());

        assert_eq!(chunks[0].line_count, 66);
        assert!(chunks[1].text.starts_with("Summary:"));
        assert_eq!(join_chunks(&chunks), text);
    }

    #[test]
    fn line_split_falls_back_to_the_target_size() {
        let text = prose(150, "Line").join("\n");
        let chunks = split_by_lines(&text, &SegmentationConfig::default(), &classifier());

        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.line_count).collect();
        assert_eq!(sizes, vec![70, 70, 10]);
    }

    #[test]
    fn crlf_and_trailing_newlines_survive_segmentation() {
        let mut text = prose(170, "Windows").join("\r\n");
        text.push_str("\r\n\n");
        let chunks = segment(&Document::new(text.clone()), &SegmentationConfig::default(), &classifier());
        assert_eq!(join_chunks(&chunks), text);
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => "[a-zA-Z ,.]{0,120}",
            1 => Just(String::new()),
            1 => "#{1,3} [a-z ]{1,20}",
            1 => "[A-Za-z]{1,12}:",
            1 => Just("1.".to_string()),
            1 => "Chapter [0-9]{1,2}",
            1 => "[a-z]{1,10}\r",
        ]
    }

    fn document_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(line_strategy(), 0..400).prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        #[test]
        fn segmentation_is_lossless(text in document_strategy()) {
            let chunks = segment(&Document::new(text.clone()), &SegmentationConfig::default(), &classifier());
            prop_assert_eq!(join_chunks(&chunks), text);
        }

        #[test]
        fn chunks_respect_the_hard_bound(text in document_strategy()) {
            let document = Document::new(text);
            let config = SegmentationConfig::default();
            let chunks = segment(&document, &config, &classifier());

            let mut expected_start = 0;
            for chunk in &chunks {
                prop_assert!(chunk.line_count >= 1);
                prop_assert!(chunk.line_count <= config.max_lines);
                prop_assert_eq!(chunk.start_line, expected_start);
                prop_assert_eq!(chunk.text.split('\n').count(), chunk.line_count);
                expected_start += chunk.line_count;
            }
            prop_assert_eq!(expected_start, document.line_count());
        }
    }
}
