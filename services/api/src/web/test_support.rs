//! services/api/src/web/test_support.rs
//!
//! Port fakes shared by the web layer's tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_engine_core::{
    AccessLevel, Annotation, Block, Book, ContentService, DatabaseService, DisplayParameters,
    MeasureRequest, PortError, PortResult, ReaderBookKey, ReaderSession, ReadingPosition,
    ReadingTimeRecord, SessionOptions, SessionSegment, TextMeasurer,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Storage and content that are both unreachable.
pub struct Offline;

fn offline<T>() -> PortResult<T> {
    Err(PortError::Unexpected("offline".to_string()))
}

#[async_trait]
impl DatabaseService for Offline {
    async fn create_book(&self, _: Uuid, _: &str, _: &str) -> PortResult<Book> {
        offline()
    }
    async fn get_reading_position(&self, _: ReaderBookKey) -> PortResult<Option<ReadingPosition>> {
        offline()
    }
    async fn create_reading_position(&self, _: &ReadingPosition) -> PortResult<()> {
        offline()
    }
    async fn update_reading_position(&self, _: &ReadingPosition) -> PortResult<()> {
        offline()
    }
    async fn list_annotations(&self, _: ReaderBookKey) -> PortResult<Vec<Annotation>> {
        offline()
    }
    async fn save_annotation(&self, _: ReaderBookKey, _: &Annotation) -> PortResult<()> {
        offline()
    }
    async fn update_annotation_note(
        &self,
        _: ReaderBookKey,
        _: Uuid,
        _: &str,
        _: DateTime<Utc>,
    ) -> PortResult<Annotation> {
        offline()
    }
    async fn delete_annotation(&self, _: ReaderBookKey, _: Uuid) -> PortResult<()> {
        offline()
    }
    async fn get_reading_time(&self, _: ReaderBookKey) -> PortResult<ReadingTimeRecord> {
        offline()
    }
    async fn append_reading_segment(
        &self,
        _: ReaderBookKey,
        _: &SessionSegment,
    ) -> PortResult<ReadingTimeRecord> {
        offline()
    }
}

#[async_trait]
impl ContentService for Offline {
    async fn fetch_book_text(&self, _: Uuid, _: AccessLevel) -> PortResult<String> {
        offline()
    }
}

/// Every block is one 100px tall line.
pub struct LineMeasurer;

#[async_trait]
impl TextMeasurer for LineMeasurer {
    async fn measure(&self, blocks: &[Block], _: &MeasureRequest) -> PortResult<f64> {
        Ok(blocks.len() as f64 * 100.0)
    }
}

/// Serves one fixed text and remembers every write.
#[derive(Default)]
pub struct MemoryStore {
    text: String,
    positions: Mutex<HashMap<ReaderBookKey, ReadingPosition>>,
    annotations: Mutex<Vec<Annotation>>,
    segments: Mutex<Vec<SessionSegment>>,
}

impl MemoryStore {
    pub fn with_text(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            text: text.into(),
            ..Self::default()
        })
    }

    pub fn position(&self, key: ReaderBookKey) -> Option<ReadingPosition> {
        self.positions.lock().unwrap().get(&key).cloned()
    }

    pub fn segments(&self) -> Vec<SessionSegment> {
        self.segments.lock().unwrap().clone()
    }

    fn record(&self) -> ReadingTimeRecord {
        let mut record = ReadingTimeRecord::default();
        for segment in self.segments() {
            record.merge(segment);
        }
        record
    }
}

#[async_trait]
impl DatabaseService for MemoryStore {
    async fn create_book(&self, owner_id: Uuid, title: &str, _: &str) -> PortResult<Book> {
        Ok(Book {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_string(),
        })
    }
    async fn get_reading_position(
        &self,
        key: ReaderBookKey,
    ) -> PortResult<Option<ReadingPosition>> {
        Ok(self.position(key))
    }
    async fn create_reading_position(&self, position: &ReadingPosition) -> PortResult<()> {
        self.positions
            .lock()
            .unwrap()
            .insert(position.key(), position.clone());
        Ok(())
    }
    async fn update_reading_position(&self, position: &ReadingPosition) -> PortResult<()> {
        self.create_reading_position(position).await
    }
    async fn list_annotations(&self, _: ReaderBookKey) -> PortResult<Vec<Annotation>> {
        Ok(self.annotations.lock().unwrap().clone())
    }
    async fn save_annotation(&self, _: ReaderBookKey, annotation: &Annotation) -> PortResult<()> {
        self.annotations.lock().unwrap().push(annotation.clone());
        Ok(())
    }
    async fn update_annotation_note(
        &self,
        _: ReaderBookKey,
        annotation_id: Uuid,
        note_text: &str,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Annotation> {
        let mut annotations = self.annotations.lock().unwrap();
        let annotation = annotations
            .iter_mut()
            .find(|a| a.id == annotation_id)
            .ok_or_else(|| PortError::NotFound(annotation_id.to_string()))?;
        annotation.edit_note(note_text, updated_at);
        Ok(annotation.clone())
    }
    async fn delete_annotation(&self, _: ReaderBookKey, annotation_id: Uuid) -> PortResult<()> {
        self.annotations.lock().unwrap().retain(|a| a.id != annotation_id);
        Ok(())
    }
    async fn get_reading_time(&self, _: ReaderBookKey) -> PortResult<ReadingTimeRecord> {
        Ok(self.record())
    }
    async fn append_reading_segment(
        &self,
        _: ReaderBookKey,
        segment: &SessionSegment,
    ) -> PortResult<ReadingTimeRecord> {
        self.segments.lock().unwrap().push(segment.clone());
        Ok(self.record())
    }
}

#[async_trait]
impl ContentService for MemoryStore {
    async fn fetch_book_text(&self, _: Uuid, _: AccessLevel) -> PortResult<String> {
        Ok(self.text.clone())
    }
}

/// 100px per block in a 100px viewport: one block per page.
fn one_block_per_page() -> DisplayParameters {
    DisplayParameters {
        viewport_height: 100.0,
        ..DisplayParameters::default()
    }
}

/// A session over the built-in demo text; nothing is persisted.
pub async fn demo_session(now: DateTime<Utc>) -> ReaderSession {
    let options = SessionOptions {
        demo_fallback: true,
        ..SessionOptions::default()
    };
    ReaderSession::open(
        Arc::new(Offline),
        &Offline,
        Arc::new(LineMeasurer),
        ReaderBookKey::new(Uuid::new_v4(), Uuid::new_v4()),
        one_block_per_page(),
        options,
        now,
    )
    .await
    .unwrap()
}

/// A session over `store`'s text, persisting into `store`.
pub async fn stored_session(
    store: Arc<MemoryStore>,
    key: ReaderBookKey,
    options: SessionOptions,
    now: DateTime<Utc>,
) -> ReaderSession {
    ReaderSession::open(
        store.clone(),
        store.as_ref(),
        Arc::new(LineMeasurer),
        key,
        one_block_per_page(),
        options,
        now,
    )
    .await
    .unwrap()
}
