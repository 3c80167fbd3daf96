//! crates/reading_engine_core/src/formatter.rs
//!
//! Turns raw book text into a sequence of heading and paragraph blocks.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::{Block, ContentAnchor};

/// Heading heuristics, tried in order. The first match wins.
static HEADING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "Chapter 12", "PART IV: The Return", "Глава 3", "Часть 2."
        // Roman numerals are upper case only, so "Part civil war" stays prose.
        r"^(?i:chapter|part|глава|часть)\s+(?:\d+|[IVXLCDM]+)\b.{0,80}$",
        // A bare "7." line
        r"^\d{1,4}\.$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("heading pattern is valid"))
    .collect()
});

/// Text shown when a book cannot be loaded and the demo fallback is enabled.
pub const DEMO_BOOK_TEXT: &str = "\
Demo content
This is demonstration text shown because the requested book could not be loaded.
Chapter 1
Pages, highlights and reading time work as usual, but nothing in this book is saved.
Select a passage of at least five characters to try out highlights and notes.
Chapter 2
Resize the window or change the font size to see the page count recompute while your place is kept.
";

/// Formats raw text into blocks. Identical input always yields identical output.
pub fn format(raw_text: &str) -> Vec<Block> {
    raw_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if is_heading(line) {
                Block::heading(line)
            } else {
                Block::paragraph(line)
            }
        })
        .collect()
}

fn is_heading(line: &str) -> bool {
    HEADING_PATTERNS.iter().any(|pattern| pattern.is_match(line))
}

/// Immutable formatted content for one reading session, with character offsets
/// precomputed for anchoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookContent {
    blocks: Vec<Block>,
    /// Character offset at which each block starts in the concatenated text.
    block_starts: Vec<usize>,
    total_chars: usize,
}

impl BookContent {
    pub fn from_raw(raw_text: &str) -> Self {
        Self::from_blocks(format(raw_text))
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut block_starts = Vec::with_capacity(blocks.len());
        let mut total_chars = 0;
        for block in &blocks {
            block_starts.push(total_chars);
            total_chars += block.text.chars().count();
        }
        Self {
            blocks,
            block_starts,
            total_chars,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    pub fn chapter_count(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_heading()).count()
    }

    /// Character offset of an anchor from the start of the book, if it lies
    /// inside the content.
    pub fn absolute_offset(&self, anchor: ContentAnchor) -> Option<usize> {
        let block = self.blocks.get(anchor.block_index)?;
        if anchor.char_offset > block.text.chars().count() {
            return None;
        }
        Some(self.block_starts[anchor.block_index] + anchor.char_offset)
    }

    /// Fraction of the book that precedes the anchor, in `[0, 1]`.
    pub fn progress_of(&self, anchor: ContentAnchor) -> Option<f64> {
        let offset = self.absolute_offset(anchor)?;
        if self.total_chars == 0 {
            return Some(0.0);
        }
        Some(offset as f64 / self.total_chars as f64)
    }

    /// Every place the needle occurs inside a single block, in reading order.
    pub fn find_text(&self, needle: &str) -> Vec<ContentAnchor> {
        if needle.is_empty() {
            return Vec::new();
        }
        let mut anchors = Vec::new();
        for (block_index, block) in self.blocks.iter().enumerate() {
            for (byte_offset, _) in block.text.match_indices(needle) {
                anchors.push(ContentAnchor {
                    block_index,
                    char_offset: block.text[..byte_offset].chars().count(),
                });
            }
        }
        anchors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BlockKind;

    #[test]
    fn format_detects_localized_chapter_headings() {
        let raw = "Chapter 1\nIt was a dark night.\n\nГЛАВА 2\nБыл вечер.\npart IV: The Return\nЧасть 3\n";
        let kinds: Vec<BlockKind> = format(raw).into_iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading,
                BlockKind::Paragraph,
                BlockKind::Heading,
                BlockKind::Paragraph,
                BlockKind::Heading,
                BlockKind::Heading,
            ]
        );
    }

    #[test]
    fn format_treats_bare_number_line_as_heading() {
        let blocks = format("12.\nThe morning came.\n12. Not a heading on its own");
        assert!(blocks[0].is_heading());
        assert!(!blocks[1].is_heading());
        assert!(!blocks[2].is_heading());
    }

    #[test]
    fn format_drops_blank_lines_and_trims() {
        let blocks = format("  first line  \r\n\r\n   \n\tsecond line");
        assert_eq!(
            blocks,
            vec![Block::paragraph("first line"), Block::paragraph("second line")]
        );
    }

    #[test]
    fn format_of_empty_text_is_empty() {
        assert!(format("").is_empty());
        assert!(format("\n\n  \n").is_empty());
    }

    #[test]
    fn format_is_deterministic() {
        let raw = "Chapter 1\nOne.\nTwo.\n3.\nThree.";
        assert_eq!(format(raw), format(raw));
    }

    #[test]
    fn chapter_word_without_number_is_a_paragraph() {
        let blocks = format("Chapter and verse were quoted at length.");
        assert!(!blocks[0].is_heading());
    }

    #[test]
    fn lowercase_words_after_chapter_keyword_are_prose() {
        let blocks = format(
            "Part civil war, part family feud.\nChapter mild in tone, but long.\nChapter IV\nchapter 3",
        );
        assert!(!blocks[0].is_heading());
        assert!(!blocks[1].is_heading());
        assert!(blocks[2].is_heading());
        assert!(blocks[3].is_heading());
    }

    #[test]
    fn find_text_reports_char_offsets() {
        let content = BookContent::from_raw("Chapter 1\nÉté. Fear is the mind-killer.\nFear again.");
        let anchors = content.find_text("Fear");
        assert_eq!(
            anchors,
            vec![
                ContentAnchor { block_index: 1, char_offset: 5 },
                ContentAnchor { block_index: 2, char_offset: 0 },
            ]
        );
    }

    #[test]
    fn progress_of_anchor_counts_preceding_chars() {
        let content = BookContent::from_raw("aaaa\nbbbb");
        let anchor = ContentAnchor { block_index: 1, char_offset: 0 };
        assert_eq!(content.absolute_offset(anchor), Some(4));
        assert_eq!(content.progress_of(anchor), Some(0.5));
        assert_eq!(
            content.absolute_offset(ContentAnchor { block_index: 1, char_offset: 9 }),
            None
        );
        assert_eq!(content.chapter_count(), 0);
    }
}
