//! crates/reading_engine_core/src/domain.rs
//!
//! Defines the pure, core data structures for the reading engine.
//! These structs are independent of any database or transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies the single-writer record pair for one reader reading one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReaderBookKey {
    pub reader_id: Uuid,
    pub book_id: Uuid,
}

impl ReaderBookKey {
    pub fn new(reader_id: Uuid, book_id: Uuid) -> Self {
        Self { reader_id, book_id }
    }
}

impl fmt::Display for ReaderBookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reader {} / book {}", self.reader_id, self.book_id)
    }
}

/// A book stored by the content collaborator.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
}

/// How much of a book the content collaborator should hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Preview,
    #[default]
    Full,
}

//=========================================================================================
// Content
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Paragraph,
}

/// One formatted unit of book content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

impl Block {
    pub fn heading(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Heading,
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
        }
    }

    pub fn is_heading(&self) -> bool {
        self.kind == BlockKind::Heading
    }
}

/// Reader-controlled layout inputs. Any change invalidates the current pagination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayParameters {
    pub viewport_height: f64,
    pub viewport_width: f64,
    pub column_count: u32,
    pub font_size_px: f64,
    pub line_height_ratio: f64,
}

impl Default for DisplayParameters {
    fn default() -> Self {
        Self {
            viewport_height: 800.0,
            viewport_width: 600.0,
            column_count: 1,
            font_size_px: 16.0,
            line_height_ratio: 1.5,
        }
    }
}

impl DisplayParameters {
    /// Width of a single column. A zero column count is treated as one column.
    pub fn render_width(&self) -> f64 {
        self.viewport_width / f64::from(self.column_count.max(1))
    }
}

//=========================================================================================
// Reading Position
//=========================================================================================

/// Where a reader is in a book, as last reconciled against a pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPosition {
    pub reader_id: Uuid,
    pub book_id: Uuid,
    pub current_page: u32,
    pub total_pages_at_save: u32,
    pub progress_ratio: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_read_at: DateTime<Utc>,
}

impl ReadingPosition {
    /// A position for a book that has never been opened by this reader.
    pub fn first_open(key: ReaderBookKey, now: DateTime<Utc>) -> Self {
        Self {
            reader_id: key.reader_id,
            book_id: key.book_id,
            current_page: 1,
            total_pages_at_save: 1,
            progress_ratio: 0.0,
            started_at: Some(now),
            last_read_at: now,
        }
    }

    pub fn key(&self) -> ReaderBookKey {
        ReaderBookKey::new(self.reader_id, self.book_id)
    }
}

//=========================================================================================
// Annotations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Yellow,
    Green,
    Blue,
    Pink,
    Purple,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Purple => "purple",
        }
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown highlight color: {0}")]
pub struct UnknownColor(pub String);

impl FromStr for HighlightColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yellow" => Ok(HighlightColor::Yellow),
            "green" => Ok(HighlightColor::Green),
            "blue" => Ok(HighlightColor::Blue),
            "pink" => Ok(HighlightColor::Pink),
            "purple" => Ok(HighlightColor::Purple),
            _ => Err(UnknownColor(s.to_string())),
        }
    }
}

/// A location in the formatted block sequence. Unlike a page number it does not
/// move when the book is re-paginated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentAnchor {
    pub block_index: usize,
    /// Offset in characters (not bytes) from the start of the block's text.
    pub char_offset: usize,
}

/// A reader-authored highlight and/or note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    /// Page active when the selection was captured. Never renumbered.
    pub page_number: u32,
    pub selected_text: String,
    pub highlight_color: HighlightColor,
    pub note_text: String,
    pub cover_ref: Option<String>,
    pub anchor: Option<ContentAnchor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

//=========================================================================================
// Reading Time
//=========================================================================================

/// One contiguous span of measured active reading time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSegment {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// The persisted reading-time totals for one (reader, book) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingTimeRecord {
    pub total_reading_time_seconds: i64,
    pub sessions: Vec<SessionSegment>,
}

impl ReadingTimeRecord {
    /// Appends a flushed segment and merges it into the cumulative total.
    pub fn merge(&mut self, segment: SessionSegment) {
        self.total_reading_time_seconds += segment.duration_seconds;
        self.sessions.push(segment);
    }
}
