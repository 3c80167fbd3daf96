//! crates/reading_engine_core/src/session.rs
//!
//! One reader reading one book: content, pagination, position, selection and
//! reading time wired together.
//!
//! Every method takes `&mut self`, so recomputations for the same session can
//! never overlap. Asynchronous work (measurement, persistence) completes before
//! any field is mutated, which makes it safe to drop an in-flight future when
//! the reader navigates away. Once [`ReaderSession::close`] has run, nothing is
//! written for this (reader, book) pair again.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::annotation::{self, AnnotationDraft, AnnotationStyle, PlacedAnnotation, ValidationError};
use crate::domain::{
    AccessLevel, Annotation, DisplayParameters, ReaderBookKey, ReadingPosition, ReadingTimeRecord,
    SessionSegment,
};
use crate::formatter::{BookContent, DEMO_BOOK_TEXT};
use crate::pagination::{self, PaginationResult};
use crate::position::{ReadingPositionStore, DEFAULT_WRITE_DEBOUNCE_MS};
use crate::ports::{ContentService, DatabaseService, PortError, TextMeasurer};
use crate::time_tracker::{ReadingTimeTracker, TrackerConfig};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The book text could not be loaded. Fatal to the session.
    #[error("Book content is unavailable: {0}")]
    ContentUnavailable(String),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("No text selection to annotate")]
    NoSelection,
    #[error("Persistence error: {0}")]
    Port(#[from] PortError),
    #[error("The reading session is closed")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Where the session's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentOrigin {
    Book,
    /// Labeled fallback content. Nothing is persisted for a demo session.
    Demo,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub access: AccessLevel,
    pub demo_fallback: bool,
    pub tracking_enabled: bool,
    pub position_debounce: Duration,
    pub tracker: TrackerConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            access: AccessLevel::Full,
            demo_fallback: false,
            tracking_enabled: true,
            position_debounce: Duration::milliseconds(DEFAULT_WRITE_DEBOUNCE_MS),
            tracker: TrackerConfig::default(),
        }
    }
}

/// What the reader currently sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageView {
    pub current_page: u32,
    pub total_pages: u32,
    pub offset: f64,
    pub progress_ratio: f64,
}

pub struct ReaderSession {
    key: ReaderBookKey,
    db: Arc<dyn DatabaseService>,
    measurer: Arc<dyn TextMeasurer>,
    content: BookContent,
    origin: ContentOrigin,
    display: DisplayParameters,
    pagination: PaginationResult,
    position: ReadingPositionStore,
    tracker: ReadingTimeTracker,
    selection: Option<AnnotationDraft>,
    reading_time: Option<ReadingTimeRecord>,
    closed: bool,
}

impl ReaderSession {
    /// Loads content, paginates it, restores the reader's position and starts
    /// time tracking.
    pub async fn open(
        db: Arc<dyn DatabaseService>,
        content_service: &dyn ContentService,
        measurer: Arc<dyn TextMeasurer>,
        key: ReaderBookKey,
        display: DisplayParameters,
        options: SessionOptions,
        now: DateTime<Utc>,
    ) -> SessionResult<Self> {
        let (content, origin) = match load_content(content_service, key.book_id, options.access).await
        {
            Ok(content) => (content, ContentOrigin::Book),
            Err(reason) if options.demo_fallback => {
                warn!("Falling back to demo content for {}: {}", key, reason);
                (BookContent::from_raw(DEMO_BOOK_TEXT), ContentOrigin::Demo)
            }
            Err(reason) => {
                error!("Failed to load content for {}: {}", key, reason);
                return Err(SessionError::ContentUnavailable(reason));
            }
        };

        let pagination = pagination::paginate(content.blocks(), &display, measurer.as_ref()).await;

        let position = match origin {
            ContentOrigin::Book => ReadingPositionStore::initialize(db.as_ref(), key, now).await?,
            ContentOrigin::Demo => {
                ReadingPositionStore::detached(ReadingPosition::first_open(key, now))
            }
        };
        let mut position = position.with_debounce(options.position_debounce);
        position.on_pagination_changed(pagination.total_pages());

        let mut tracker =
            ReadingTimeTracker::new(options.tracker).with_enabled(options.tracking_enabled);
        tracker.start(now);

        info!(
            "Opened {} ({} blocks, {} pages, page {})",
            key,
            content.len(),
            pagination.total_pages(),
            position.current_page()
        );

        Ok(Self {
            key,
            db,
            measurer,
            content,
            origin,
            display,
            pagination,
            position,
            tracker,
            selection: None,
            reading_time: None,
            closed: false,
        })
    }

    pub fn key(&self) -> ReaderBookKey {
        self.key
    }

    pub fn content(&self) -> &BookContent {
        &self.content
    }

    pub fn origin(&self) -> ContentOrigin {
        self.origin
    }

    pub fn display(&self) -> DisplayParameters {
        self.display
    }

    pub fn pagination(&self) -> PaginationResult {
        self.pagination
    }

    pub fn position(&self) -> &ReadingPosition {
        self.position.position()
    }

    pub fn tracker(&self) -> &ReadingTimeTracker {
        &self.tracker
    }

    pub fn selection(&self) -> Option<&AnnotationDraft> {
        self.selection.as_ref()
    }

    /// Reading time as last acknowledged by storage during this session.
    pub fn reading_time(&self) -> Option<&ReadingTimeRecord> {
        self.reading_time.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn view(&self) -> PageView {
        let current_page = self.pagination.clamp_page(self.position.current_page());
        PageView {
            current_page,
            total_pages: self.pagination.total_pages(),
            offset: self.pagination.offset_for_page(current_page),
            progress_ratio: self.position.progress_ratio(),
        }
    }

    //=====================================================================================
    // Pagination & navigation
    //=====================================================================================

    /// Re-paginates for new display parameters and reconciles the position
    /// using the progress ratio captured before the recomputation.
    pub async fn update_display(&mut self, display: DisplayParameters) -> SessionResult<PageView> {
        self.ensure_open()?;
        let pagination =
            pagination::paginate(self.content.blocks(), &display, self.measurer.as_ref()).await;

        self.display = display;
        self.pagination = pagination;
        self.position.on_pagination_changed(pagination.total_pages());
        Ok(self.view())
    }

    /// Moves to the page containing the scroll `offset`.
    pub fn scroll_to(&mut self, offset: f64, now: DateTime<Utc>) -> SessionResult<PageView> {
        let page = self.pagination.page_for_offset(offset);
        self.turn_to(page, now)
    }

    /// Moves to `page`, clamped against the current page count.
    pub fn turn_to(&mut self, page: u32, now: DateTime<Utc>) -> SessionResult<PageView> {
        self.ensure_open()?;
        self.position
            .on_page_changed(page, self.pagination.total_pages(), now);
        Ok(self.view())
    }

    pub fn next_page(&mut self, now: DateTime<Utc>) -> SessionResult<PageView> {
        let page = self.view().current_page.saturating_add(1);
        self.turn_to(page, now)
    }

    pub fn previous_page(&mut self, now: DateTime<Utc>) -> SessionResult<PageView> {
        let page = self.view().current_page.saturating_sub(1);
        self.turn_to(page, now)
    }

    /// Writes the position now if it has unsaved changes.
    pub async fn flush_position(&mut self) -> SessionResult<bool> {
        if self.closed || self.origin == ContentOrigin::Demo {
            return Ok(false);
        }
        Ok(self.position.flush(self.db.as_ref()).await?)
    }

    /// Debounced write-behind of the position.
    pub async fn flush_position_if_due(&mut self, now: DateTime<Utc>) -> SessionResult<bool> {
        if self.closed || self.origin == ContentOrigin::Demo {
            return Ok(false);
        }
        Ok(self.position.flush_if_due(self.db.as_ref(), now).await?)
    }

    //=====================================================================================
    // Selection & annotations
    //=====================================================================================

    /// Captures a selection at the current page. Too-short selections clear
    /// any pending one and return `None`.
    pub fn select(&mut self, raw_selected_text: &str) -> SessionResult<Option<&AnnotationDraft>> {
        self.ensure_open()?;
        let view = self.view();
        self.selection = annotation::capture_in(
            &self.content,
            raw_selected_text,
            view.current_page,
            view.progress_ratio,
        );
        Ok(self.selection.as_ref())
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Finalizes the pending selection and stores the annotation.
    pub async fn save_annotation(
        &mut self,
        style: AnnotationStyle,
        cover_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> SessionResult<Annotation> {
        self.ensure_open()?;
        let mut draft = self.selection.clone().ok_or(SessionError::NoSelection)?;
        if let Some(cover_ref) = cover_ref {
            draft = draft.with_cover_ref(cover_ref);
        }
        let annotation = annotation::finalize(draft, style, now)?;

        if self.origin == ContentOrigin::Book {
            self.db.save_annotation(self.key, &annotation).await?;
        }
        self.selection = None;
        debug!(
            "Saved annotation {} on page {} for {}",
            annotation.id, annotation.page_number, self.key
        );
        Ok(annotation)
    }

    /// Lists the reader's annotations, each placed on its page under the
    /// current pagination.
    pub async fn list_annotations(&self) -> SessionResult<Vec<PlacedAnnotation>> {
        if self.origin == ContentOrigin::Demo {
            return Ok(Vec::new());
        }
        let annotations = self.db.list_annotations(self.key).await?;
        Ok(annotations
            .into_iter()
            .map(|annotation| self.place(annotation))
            .collect())
    }

    pub fn place(&self, annotation: Annotation) -> PlacedAnnotation {
        let current_page = annotation.resolved_page(&self.content, self.pagination.total_pages());
        PlacedAnnotation {
            annotation,
            current_page,
        }
    }

    /// Replaces a note body. The last write wins.
    pub async fn edit_note(
        &mut self,
        annotation_id: Uuid,
        note_text: &str,
        now: DateTime<Utc>,
    ) -> SessionResult<Annotation> {
        self.ensure_open()?;
        Ok(self
            .db
            .update_annotation_note(self.key, annotation_id, note_text, now)
            .await?)
    }

    pub async fn delete_annotation(&mut self, annotation_id: Uuid) -> SessionResult<()> {
        self.ensure_open()?;
        Ok(self.db.delete_annotation(self.key, annotation_id).await?)
    }

    //=====================================================================================
    // Reading time & lifecycle
    //=====================================================================================

    pub async fn set_visible(&mut self, visible: bool, now: DateTime<Utc>) {
        if self.closed {
            return;
        }
        if visible {
            self.tracker.on_visible(now);
        } else {
            let segment = self.tracker.on_hidden(now);
            self.record_segment(segment).await;
            // Leaving the foreground is a natural point to save the place too.
            if let Err(e) = self.flush_position().await {
                warn!("Failed to save position for {} on pause: {}", self.key, e);
            }
        }
    }

    pub async fn set_tracking_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        if self.closed {
            return;
        }
        let segment = self.tracker.set_enabled(enabled, now);
        self.record_segment(segment).await;
    }

    /// Periodic checkpoint of the running reading-time segment.
    pub async fn checkpoint_time(&mut self, now: DateTime<Utc>) {
        if self.closed {
            return;
        }
        let segment = self.tracker.on_tick(now);
        self.record_segment(segment).await;
    }

    /// Final flush of time and position. Afterwards the session is inert.
    pub async fn close(&mut self, now: DateTime<Utc>) {
        if self.closed {
            return;
        }
        let segment = self.tracker.shutdown(now);
        self.record_segment(segment).await;
        if let Err(e) = self.flush_position().await {
            warn!("Failed to save final position for {}: {}", self.key, e);
        }
        self.selection = None;
        self.closed = true;
        info!("Closed reading session for {}", self.key);
    }

    /// Persists a flushed segment. A failed write is not retried: the segment
    /// is lost.
    async fn record_segment(&mut self, segment: Option<SessionSegment>) {
        let Some(segment) = segment else {
            return;
        };
        if self.closed || self.origin == ContentOrigin::Demo {
            return;
        }
        match self.db.append_reading_segment(self.key, &segment).await {
            Ok(record) => {
                debug!(
                    "Recorded {}s of reading for {} (total {}s)",
                    segment.duration_seconds, self.key, record.total_reading_time_seconds
                );
                self.reading_time = Some(record);
            }
            Err(e) => {
                warn!(
                    "Dropping {}s reading segment for {}: {}",
                    segment.duration_seconds, self.key, e
                );
            }
        }
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

async fn load_content(
    content_service: &dyn ContentService,
    book_id: Uuid,
    access: AccessLevel,
) -> Result<BookContent, String> {
    let raw = content_service
        .fetch_book_text(book_id, access)
        .await
        .map_err(|e| e.to_string())?;
    let content = BookContent::from_raw(&raw);
    if content.is_empty() {
        return Err(format!("Book {} has no readable text", book_id));
    }
    Ok(content)
}
