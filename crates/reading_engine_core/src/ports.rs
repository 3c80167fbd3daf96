//! crates/reading_engine_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's external collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific storage, content sources or layout hosts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AccessLevel, Annotation, Block, Book, ReaderBookKey, ReadingPosition, ReadingTimeRecord,
    SessionSegment,
};
use crate::pagination::MeasureRequest;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Whole-record reads and partial-field updates keyed by (reader, book).
///
/// Concurrent writers for the same key are not expected; the last write wins.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Books ---
    async fn create_book(&self, owner_id: Uuid, title: &str, full_text: &str) -> PortResult<Book>;

    // --- Reading Position ---
    async fn get_reading_position(&self, key: ReaderBookKey)
        -> PortResult<Option<ReadingPosition>>;

    async fn create_reading_position(&self, position: &ReadingPosition) -> PortResult<()>;

    async fn update_reading_position(&self, position: &ReadingPosition) -> PortResult<()>;

    // --- Annotations ---
    async fn list_annotations(&self, key: ReaderBookKey) -> PortResult<Vec<Annotation>>;

    async fn save_annotation(&self, key: ReaderBookKey, annotation: &Annotation)
        -> PortResult<()>;

    async fn update_annotation_note(
        &self,
        key: ReaderBookKey,
        annotation_id: Uuid,
        note_text: &str,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Annotation>;

    async fn delete_annotation(&self, key: ReaderBookKey, annotation_id: Uuid) -> PortResult<()>;

    // --- Reading Time ---
    async fn get_reading_time(&self, key: ReaderBookKey) -> PortResult<ReadingTimeRecord>;

    /// Appends the segment to the session list and adds its duration to the total.
    async fn append_reading_segment(
        &self,
        key: ReaderBookKey,
        segment: &SessionSegment,
    ) -> PortResult<ReadingTimeRecord>;
}

#[async_trait]
pub trait ContentService: Send + Sync {
    /// Returns the raw text of a book. The core treats the result as opaque.
    async fn fetch_book_text(&self, book_id: Uuid, access: AccessLevel) -> PortResult<String>;
}

#[async_trait]
pub trait TextMeasurer: Send + Sync {
    /// Reports the height the blocks occupy when laid out continuously with the
    /// requested width, column count and font settings.
    async fn measure(&self, blocks: &[Block], request: &MeasureRequest) -> PortResult<f64>;
}
