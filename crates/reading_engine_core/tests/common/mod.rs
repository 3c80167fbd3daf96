//! In-memory fakes for the engine's ports.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_engine_core::ports::{
    ContentService, DatabaseService, PortError, PortResult, TextMeasurer,
};
use reading_engine_core::{
    AccessLevel, Annotation, Block, Book, MeasureRequest, ReaderBookKey, ReadingPosition,
    ReadingTimeRecord, SessionSegment,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryDb {
    positions: Mutex<HashMap<ReaderBookKey, ReadingPosition>>,
    annotations: Mutex<HashMap<ReaderBookKey, Vec<Annotation>>>,
    reading_time: Mutex<HashMap<ReaderBookKey, ReadingTimeRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn position(&self, key: ReaderBookKey) -> Option<ReadingPosition> {
        self.positions.lock().unwrap().get(&key).cloned()
    }

    pub fn reading_time(&self, key: ReaderBookKey) -> ReadingTimeRecord {
        self.reading_time
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn annotations(&self, key: ReaderBookKey) -> Vec<Annotation> {
        self.annotations
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    fn check_writable(&self) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(PortError::Unexpected("storage offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_book(&self, owner_id: Uuid, title: &str, _full_text: &str) -> PortResult<Book> {
        self.check_writable()?;
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
        self.check_writable()?;
        self.positions
            .lock()
            .unwrap()
            .insert(position.key(), position.clone());
        Ok(())
    }

    async fn update_reading_position(&self, position: &ReadingPosition) -> PortResult<()> {
        self.check_writable()?;
        let mut positions = self.positions.lock().unwrap();
        match positions.get_mut(&position.key()) {
            Some(existing) => {
                *existing = position.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(position.key().to_string())),
        }
    }

    async fn list_annotations(&self, key: ReaderBookKey) -> PortResult<Vec<Annotation>> {
        Ok(self.annotations(key))
    }

    async fn save_annotation(&self, key: ReaderBookKey, annotation: &Annotation) -> PortResult<()> {
        self.check_writable()?;
        self.annotations
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(annotation.clone());
        Ok(())
    }

    async fn update_annotation_note(
        &self,
        key: ReaderBookKey,
        annotation_id: Uuid,
        note_text: &str,
        updated_at: DateTime<Utc>,
    ) -> PortResult<Annotation> {
        self.check_writable()?;
        let mut annotations = self.annotations.lock().unwrap();
        let annotation = annotations
            .get_mut(&key)
            .and_then(|list| list.iter_mut().find(|a| a.id == annotation_id))
            .ok_or_else(|| PortError::NotFound(annotation_id.to_string()))?;
        annotation.edit_note(note_text, updated_at);
        Ok(annotation.clone())
    }

    async fn delete_annotation(&self, key: ReaderBookKey, annotation_id: Uuid) -> PortResult<()> {
        self.check_writable()?;
        if let Some(list) = self.annotations.lock().unwrap().get_mut(&key) {
            list.retain(|a| a.id != annotation_id);
        }
        Ok(())
    }

    async fn get_reading_time(&self, key: ReaderBookKey) -> PortResult<ReadingTimeRecord> {
        Ok(self.reading_time(key))
    }

    async fn append_reading_segment(
        &self,
        key: ReaderBookKey,
        segment: &SessionSegment,
    ) -> PortResult<ReadingTimeRecord> {
        self.check_writable()?;
        let mut records = self.reading_time.lock().unwrap();
        let record = records.entry(key).or_default();
        record.merge(segment.clone());
        Ok(record.clone())
    }
}

/// Serves one fixed text for every book, or fails when constructed empty.
pub struct StaticContent(pub Option<String>);

#[async_trait]
impl ContentService for StaticContent {
    async fn fetch_book_text(&self, book_id: Uuid, _access: AccessLevel) -> PortResult<String> {
        self.0
            .clone()
            .ok_or_else(|| PortError::NotFound(format!("Book {}", book_id)))
    }
}

/// Lays text out with a fixed glyph width of half the font size.
pub struct CharMeasurer;

#[async_trait]
impl TextMeasurer for CharMeasurer {
    async fn measure(&self, blocks: &[Block], request: &MeasureRequest) -> PortResult<f64> {
        let glyph_width = request.font_size_px * 0.5;
        let chars_per_line = (request.render_width / glyph_width).floor().max(1.0);
        let line_height = request.font_size_px * request.line_height_ratio;
        let height: f64 = blocks
            .iter()
            .map(|block| {
                let chars = block.text.chars().count() as f64;
                let lines = (chars / chars_per_line).ceil().max(1.0);
                lines * line_height + line_height * 0.5
            })
            .sum();
        Ok(height / f64::from(request.column_count.max(1)))
    }
}

/// A book of `paragraphs` paragraphs of 300 characters, with a chapter heading
/// every 50 paragraphs and an optional marker sentence in one paragraph.
pub fn long_book(paragraphs: usize, marker: Option<(usize, &str)>) -> String {
    let mut text = String::new();
    for i in 0..paragraphs {
        if i % 50 == 0 {
            text.push_str(&format!("Chapter {}\n", i / 50 + 1));
        }
        match marker {
            Some((at, sentence)) if at == i => {
                let padding = "x".repeat(300usize.saturating_sub(sentence.len() + 1));
                text.push_str(&format!("{} {}\n", sentence, padding));
            }
            _ => {
                text.push_str(&"lorem ipsum ".repeat(25));
                text.push('\n');
            }
        }
    }
    text
}
