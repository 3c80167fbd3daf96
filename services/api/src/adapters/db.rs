//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` and `ContentService` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_engine_core::domain::{
    AccessLevel, Annotation, Book, ContentAnchor, HighlightColor, ReaderBookKey, ReadingPosition,
    ReadingTimeRecord, SessionSegment,
};
use reading_engine_core::ports::{ContentService, DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` and `ContentService` ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
    preview_fraction: f64,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            preview_fraction: 0.1,
        }
    }

    /// Sets the leading share of a book served for preview access.
    pub fn with_preview_fraction(mut self, preview_fraction: f64) -> Self {
        self.preview_fraction = preview_fraction.clamp(0.0, 1.0);
        self
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn to_page(value: i32, field: &str) -> PortResult<u32> {
    u32::try_from(value)
        .map_err(|_| PortError::Unexpected(format!("Stored {} is negative: {}", field, value)))
}

/// Narrows a page number or offset for a signed 32-bit column. Values that do
/// not fit are rejected instead of wrapping negative.
fn to_column<T>(value: T, field: &str) -> PortResult<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| {
        PortError::Unexpected(format!("{} {} does not fit in storage", field, value))
    })
}

/// Cuts the leading `fraction` of `text`, ending on a line boundary where one
/// exists so a preview never stops mid-paragraph.
pub fn preview_slice(text: &str, fraction: f64) -> &str {
    let total_chars = text.chars().count();
    let wanted = ((total_chars as f64) * fraction.clamp(0.0, 1.0)).ceil() as usize;
    if wanted >= total_chars {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(wanted)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len());
    match text[..cut].rfind('\n') {
        Some(line_end) if line_end > 0 => &text[..line_end],
        _ => &text[..cut],
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
        }
    }
}

#[derive(FromRow)]
struct PositionRecord {
    reader_id: Uuid,
    book_id: Uuid,
    current_page: i32,
    total_pages_at_save: i32,
    progress_ratio: f64,
    started_at: Option<DateTime<Utc>>,
    last_read_at: DateTime<Utc>,
}
impl PositionRecord {
    fn to_domain(self) -> PortResult<ReadingPosition> {
        Ok(ReadingPosition {
            reader_id: self.reader_id,
            book_id: self.book_id,
            current_page: to_page(self.current_page, "current_page")?.max(1),
            total_pages_at_save: to_page(self.total_pages_at_save, "total_pages_at_save")?.max(1),
            progress_ratio: self.progress_ratio.clamp(0.0, 1.0),
            started_at: self.started_at,
            last_read_at: self.last_read_at,
        })
    }
}

#[derive(FromRow)]
struct AnnotationRecord {
    id: Uuid,
    page_number: i32,
    selected_text: String,
    highlight_color: String,
    note_text: String,
    cover_ref: Option<String>,
    anchor_block: Option<i32>,
    anchor_offset: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}
impl AnnotationRecord {
    fn to_domain(self) -> PortResult<Annotation> {
        let highlight_color = self
            .highlight_color
            .parse::<HighlightColor>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let anchor = match (self.anchor_block, self.anchor_offset) {
            (Some(block), Some(offset)) if block >= 0 && offset >= 0 => Some(ContentAnchor {
                block_index: block as usize,
                char_offset: offset as usize,
            }),
            _ => None,
        };
        Ok(Annotation {
            id: self.id,
            page_number: to_page(self.page_number, "page_number")?,
            selected_text: self.selected_text,
            highlight_color,
            note_text: self.note_text,
            cover_ref: self.cover_ref,
            anchor,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SegmentRecord {
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration_seconds: i64,
}
impl SegmentRecord {
    fn to_domain(self) -> SessionSegment {
        SessionSegment {
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_seconds: self.duration_seconds,
        }
    }
}

const ANNOTATION_COLUMNS: &str = "id, page_number, selected_text, highlight_color, note_text, \
     cover_ref, anchor_block, anchor_offset, created_at, updated_at";

impl DbAdapter {
    async fn fetch_reading_time(&self, key: ReaderBookKey) -> PortResult<ReadingTimeRecord> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT total_reading_time_seconds FROM reading_time WHERE reader_id = $1 AND book_id = $2",
        )
        .bind(key.reader_id)
        .bind(key.book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        let sessions = sqlx::query_as::<_, SegmentRecord>(
            "SELECT started_at, ended_at, duration_seconds FROM reading_sessions \
             WHERE reader_id = $1 AND book_id = $2 ORDER BY started_at ASC",
        )
        .bind(key.reader_id)
        .bind(key.book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(ReadingTimeRecord {
            total_reading_time_seconds: total.unwrap_or(0),
            sessions: sessions.into_iter().map(|r| r.to_domain()).collect(),
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_book(&self, owner_id: Uuid, title: &str, full_text: &str) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(
            "INSERT INTO books (id, owner_id, title, full_text) VALUES ($1, $2, $3, $4) \
             RETURNING id, owner_id, title",
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(title)
        .bind(full_text)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_reading_position(
        &self,
        key: ReaderBookKey,
    ) -> PortResult<Option<ReadingPosition>> {
        let record = sqlx::query_as::<_, PositionRecord>(
            "SELECT reader_id, book_id, current_page, total_pages_at_save, progress_ratio, \
             started_at, last_read_at FROM reading_positions WHERE reader_id = $1 AND book_id = $2",
        )
        .bind(key.reader_id)
        .bind(key.book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(|r| r.to_domain()).transpose()
    }

    async fn create_reading_position(&self, position: &ReadingPosition) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO reading_positions \
             (reader_id, book_id, current_page, total_pages_at_save, progress_ratio, started_at, last_read_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (reader_id, book_id) DO NOTHING",
        )
        .bind(position.reader_id)
        .bind(position.book_id)
        .bind(to_column(position.current_page, "current_page")?)
        .bind(to_column(position.total_pages_at_save, "total_pages_at_save")?)
        .bind(position.progress_ratio)
        .bind(position.started_at)
        .bind(position.last_read_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn update_reading_position(&self, position: &ReadingPosition) -> PortResult<()> {
        // started_at is write-once: an existing value is never overwritten.
        let result = sqlx::query(
            "UPDATE reading_positions SET current_page = $3, total_pages_at_save = $4, \
             progress_ratio = $5, started_at = COALESCE(started_at, $6), last_read_at = $7 \
             WHERE reader_id = $1 AND book_id = $2",
        )
        .bind(position.reader_id)
        .bind(position.book_id)
        .bind(to_column(position.current_page, "current_page")?)
        .bind(to_column(position.total_pages_at_save, "total_pages_at_save")?)
        .bind(position.progress_ratio)
        .bind(position.started_at)
        .bind(position.last_read_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Reading position for {}",
                position.key()
            )));
        }
        Ok(())
    }

    async fn list_annotations(&self, key: ReaderBookKey) -> PortResult<Vec<Annotation>> {
        let records = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "SELECT {} FROM annotations WHERE reader_id = $1 AND book_id = $2 \
             ORDER BY created_at ASC",
            ANNOTATION_COLUMNS
        ))
        .bind(key.reader_id)
        .bind(key.book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn save_annotation(&self, key: ReaderBookKey, annotation: &Annotation) -> PortResult<()> {
        let page_number = to_column(annotation.page_number, "page_number")?;
        let anchor_block = annotation
            .anchor
            .map(|a| to_column(a.block_index, "anchor_block"))
            .transpose()?;
        let anchor_offset = annotation
            .anchor
            .map(|a| to_column(a.char_offset, "anchor_offset"))
            .transpose()?;
        sqlx::query(
            "INSERT INTO annotations (id, reader_id, book_id, page_number, selected_text, \
             highlight_color, note_text, cover_ref, anchor_block, anchor_offset, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(annotation.id)
        .bind(key.reader_id)
        .bind(key.book_id)
        .bind(page_number)
        .bind(&annotation.selected_text)
        .bind(annotation.highlight_color.as_str())
        .bind(&annotation.note_text)
        .bind(&annotation.cover_ref)
        .bind(anchor_block)
        .bind(anchor_offset)
        .bind(annotation.created_at)
        .bind(annotation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn update_annotation_note(
        &self,
        key: ReaderBookKey,
        annotation_id: Uuid,
        note_text: &str,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Annotation> {
        let record = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "UPDATE annotations SET note_text = $4, updated_at = $5 \
             WHERE id = $1 AND reader_id = $2 AND book_id = $3 RETURNING {}",
            ANNOTATION_COLUMNS
        ))
        .bind(annotation_id)
        .bind(key.reader_id)
        .bind(key.book_id)
        .bind(note_text)
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Annotation {} not found", annotation_id))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        record.to_domain()
    }

    async fn delete_annotation(&self, key: ReaderBookKey, annotation_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "DELETE FROM annotations WHERE id = $1 AND reader_id = $2 AND book_id = $3",
        )
        .bind(annotation_id)
        .bind(key.reader_id)
        .bind(key.book_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Annotation {} not found",
                annotation_id
            )));
        }
        Ok(())
    }

    async fn get_reading_time(&self, key: ReaderBookKey) -> PortResult<ReadingTimeRecord> {
        self.fetch_reading_time(key).await
    }

    async fn append_reading_segment(
        &self,
        key: ReaderBookKey,
        segment: &SessionSegment,
    ) -> PortResult<ReadingTimeRecord> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO reading_sessions (reader_id, book_id, started_at, ended_at, duration_seconds) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(key.reader_id)
        .bind(key.book_id)
        .bind(segment.started_at)
        .bind(segment.ended_at)
        .bind(segment.duration_seconds)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO reading_time (reader_id, book_id, total_reading_time_seconds) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (reader_id, book_id) DO UPDATE \
             SET total_reading_time_seconds = reading_time.total_reading_time_seconds \
                 + EXCLUDED.total_reading_time_seconds",
        )
        .bind(key.reader_id)
        .bind(key.book_id)
        .bind(segment.duration_seconds)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        self.fetch_reading_time(key).await
    }
}

//=========================================================================================
// `ContentService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentService for DbAdapter {
    async fn fetch_book_text(&self, book_id: Uuid, access: AccessLevel) -> PortResult<String> {
        let full_text: String =
            sqlx::query_scalar("SELECT full_text FROM books WHERE id = $1")
                .bind(book_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| match e {
                    sqlx::Error::RowNotFound => {
                        PortError::NotFound(format!("Book {} not found", book_id))
                    }
                    _ => PortError::Unexpected(e.to_string()),
                })?;

        Ok(match access {
            AccessLevel::Full => full_text,
            AccessLevel::Preview => preview_slice(&full_text, self.preview_fraction).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_stops_at_a_line_boundary() {
        let text = "first line\nsecond line\nthird line\nfourth line";
        let preview = preview_slice(text, 0.5);
        assert_eq!(preview, "first line\nsecond line");
    }

    #[test]
    fn preview_of_whole_book_is_unchanged() {
        let text = "only line";
        assert_eq!(preview_slice(text, 1.0), text);
        assert_eq!(preview_slice(text, 2.0), text);
    }

    #[test]
    fn preview_without_newline_cuts_on_a_char_boundary() {
        let text = "ééééééééé";
        let preview = preview_slice(text, 0.34);
        assert_eq!(preview, "éééé");
    }

    #[test]
    fn oversized_values_are_rejected_not_wrapped() {
        assert_eq!(to_column(42u32, "current_page").unwrap(), 42);
        assert_eq!(to_column(i32::MAX as u32, "current_page").unwrap(), i32::MAX);
        assert!(matches!(
            to_column(u32::MAX, "current_page"),
            Err(PortError::Unexpected(msg)) if msg.contains("current_page")
        ));
        assert!(to_column(usize::MAX, "anchor_offset").is_err());
    }

    #[test]
    fn empty_preview_fraction_is_empty() {
        assert_eq!(preview_slice("some\ntext", 0.0), "");
    }
}
