//! crates/reading_engine_core/src/annotation.rs
//!
//! Turns an in-progress text selection into a highlight/note annotation.
//!
//! An annotation carries two locations: the page number stamped at capture time
//! (never renumbered) and, when the selection can be found in the content, a
//! [`ContentAnchor`] that survives re-pagination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Annotation, ContentAnchor, HighlightColor};
use crate::formatter::BookContent;

/// Selections shorter than this (after trimming) never open the annotation flow.
pub const MIN_SELECTION_CHARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Selected text is empty")]
    EmptySelection,
    #[error("Selection has {actual} characters, at least {min} are required")]
    SelectionTooShort { min: usize, actual: usize },
    #[error("Page number must be at least 1, got {0}")]
    InvalidPageNumber(u32),
}

/// A captured selection waiting for the reader to pick a color and write a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDraft {
    pub selected_text: String,
    pub page_number: u32,
    pub anchor: Option<ContentAnchor>,
    pub cover_ref: Option<String>,
}

/// An annotation together with the page it falls on right now.
///
/// `annotation.page_number` keeps the capture-time stamp; `current_page` is
/// recomputed from the anchor each time the listing is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedAnnotation {
    #[serde(flatten)]
    pub annotation: Annotation,
    pub current_page: u32,
}

impl AnnotationDraft {
    pub fn with_cover_ref(mut self, cover_ref: impl Into<String>) -> Self {
        self.cover_ref = Some(cover_ref.into());
        self
    }
}

/// What the reader chooses when finalizing a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    pub highlight_color: HighlightColor,
    #[serde(default)]
    pub note_text: String,
}

/// Captures a selection at the page active right now.
///
/// Returns `None` for selections with fewer than [`MIN_SELECTION_CHARS`]
/// characters once surrounding whitespace is trimmed.
pub fn capture_selection(raw_selected_text: &str, current_page: u32) -> Option<AnnotationDraft> {
    let text = raw_selected_text.trim();
    if text.chars().count() < MIN_SELECTION_CHARS {
        return None;
    }
    Some(AnnotationDraft {
        selected_text: text.to_string(),
        page_number: current_page,
        anchor: None,
        cover_ref: None,
    })
}

/// Like [`capture_selection`], but also anchors the selection in `content`.
///
/// When the text occurs several times, the occurrence closest to the reader's
/// progress through the book is chosen.
pub fn capture_in(
    content: &BookContent,
    raw_selected_text: &str,
    current_page: u32,
    progress_ratio: f64,
) -> Option<AnnotationDraft> {
    let mut draft = capture_selection(raw_selected_text, current_page)?;
    draft.anchor = content
        .find_text(&draft.selected_text)
        .into_iter()
        .filter_map(|anchor| content.progress_of(anchor).map(|p| (anchor, p)))
        .min_by(|(_, a), (_, b)| {
            (a - progress_ratio)
                .abs()
                .total_cmp(&(b - progress_ratio).abs())
        })
        .map(|(anchor, _)| anchor);
    Some(draft)
}

/// Builds the annotation value. Persisting it is the caller's job.
pub fn finalize(
    draft: AnnotationDraft,
    style: AnnotationStyle,
    now: DateTime<Utc>,
) -> Result<Annotation, ValidationError> {
    let selected_text = draft.selected_text.trim();
    if selected_text.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    let length = selected_text.chars().count();
    if length < MIN_SELECTION_CHARS {
        return Err(ValidationError::SelectionTooShort {
            min: MIN_SELECTION_CHARS,
            actual: length,
        });
    }
    if draft.page_number < 1 {
        return Err(ValidationError::InvalidPageNumber(draft.page_number));
    }

    Ok(Annotation {
        id: Uuid::new_v4(),
        page_number: draft.page_number,
        selected_text: selected_text.to_string(),
        highlight_color: style.highlight_color,
        note_text: style.note_text,
        cover_ref: draft.cover_ref,
        anchor: draft.anchor,
        created_at: now,
        updated_at: None,
    })
}

impl Annotation {
    /// Replaces the note body. Concurrent edits from other devices are not
    /// merged: the last write wins.
    pub fn edit_note(&mut self, note_text: impl Into<String>, now: DateTime<Utc>) {
        self.note_text = note_text.into();
        self.updated_at = Some(now);
    }

    /// The page this annotation falls on under the current pagination.
    ///
    /// Derived from the content anchor when there is one; otherwise the stamped
    /// page, clamped into range.
    pub fn resolved_page(&self, content: &BookContent, total_pages: u32) -> u32 {
        let total = total_pages.max(1);
        match self.anchor.and_then(|anchor| content.progress_of(anchor)) {
            Some(progress) => {
                let page = (progress * f64::from(total)).floor() as u32 + 1;
                page.clamp(1, total)
            }
            None => self.page_number.clamp(1, total),
        }
    }
}
