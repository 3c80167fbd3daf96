//! crates/reading_engine_core/src/position.rs
//!
//! Keeps a reader's place in a book across sessions and re-paginations.
//!
//! The durable, reader-facing value is the progress ratio. The page index is a
//! cache that is recomputed from the ratio whenever the page count changes, so a
//! font-size change never sends the reader to an unrelated page.
//!
//! Persistence is write-behind: page turns only mark the position dirty, and the
//! owner flushes it (debounced on a timer, unconditionally on close).

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::domain::{ReaderBookKey, ReadingPosition};
use crate::ports::{DatabaseService, PortResult};

/// Default quiet period before a page turn is written out.
pub const DEFAULT_WRITE_DEBOUNCE_MS: i64 = 2_000;

#[derive(Debug, Clone)]
pub struct ReadingPositionStore {
    position: ReadingPosition,
    /// True once the record exists in the persistence collaborator.
    persisted: bool,
    dirty: bool,
    last_change_at: Option<DateTime<Utc>>,
    debounce: Duration,
}

impl ReadingPositionStore {
    /// Loads the persisted position for `key`, or creates a fresh one.
    ///
    /// A failure to create the fresh record is not fatal: the position stays
    /// dirty and the next flush creates it.
    pub async fn initialize(
        db: &dyn DatabaseService,
        key: ReaderBookKey,
        now: DateTime<Utc>,
    ) -> PortResult<Self> {
        if let Some(position) = db.get_reading_position(key).await? {
            debug!(
                "Loaded reading position for {}: page {} of {}",
                key, position.current_page, position.total_pages_at_save
            );
            return Ok(Self::from_persisted(position));
        }

        info!("No reading position for {}, starting at page 1.", key);
        let mut store = Self::detached(ReadingPosition::first_open(key, now));
        match db.create_reading_position(&store.position).await {
            Ok(()) => store.persisted = true,
            Err(e) => {
                warn!("Failed to create reading position for {}: {}", key, e);
                store.dirty = true;
                store.last_change_at = Some(now);
            }
        }
        Ok(store)
    }

    /// Wraps a position that already exists in storage.
    pub fn from_persisted(position: ReadingPosition) -> Self {
        Self {
            position,
            persisted: true,
            dirty: false,
            last_change_at: None,
            debounce: Duration::milliseconds(DEFAULT_WRITE_DEBOUNCE_MS),
        }
    }

    /// Wraps a position that has never been written.
    pub fn detached(position: ReadingPosition) -> Self {
        Self {
            position,
            persisted: false,
            dirty: false,
            last_change_at: None,
            debounce: Duration::milliseconds(DEFAULT_WRITE_DEBOUNCE_MS),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn position(&self) -> &ReadingPosition {
        &self.position
    }

    pub fn current_page(&self) -> u32 {
        self.position.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.position.total_pages_at_save
    }

    pub fn progress_ratio(&self) -> f64 {
        self.position.progress_ratio
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Reconciles the page index after a re-pagination using the ratio captured
    /// before the new page count was known. The ratio itself is left untouched.
    pub fn on_pagination_changed(&mut self, new_total_pages: u32) -> u32 {
        let total = new_total_pages.max(1);
        let page = reconciled_page(self.position.progress_ratio, total);
        if page != self.position.current_page || total != self.position.total_pages_at_save {
            debug!(
                "Reconciled {} from page {}/{} to {}/{}",
                self.position.key(),
                self.position.current_page,
                self.position.total_pages_at_save,
                page,
                total
            );
            self.position.current_page = page;
            self.position.total_pages_at_save = total;
            self.dirty = true;
        }
        page
    }

    /// Records a page turn. The page is clamped into `[1, total_pages]`.
    pub fn on_page_changed(&mut self, page: u32, total_pages: u32, now: DateTime<Utc>) -> u32 {
        let total = total_pages.max(1);
        let page = page.clamp(1, total);
        self.position.current_page = page;
        self.position.total_pages_at_save = total;
        self.position.progress_ratio = f64::from(page) / f64::from(total);
        self.position.last_read_at = now;
        if self.position.started_at.is_none() {
            self.position.started_at = Some(now);
        }
        self.dirty = true;
        self.last_change_at = Some(now);
        page
    }

    pub fn next_page(&mut self, now: DateTime<Utc>) -> u32 {
        let total = self.total_pages();
        self.on_page_changed(self.current_page().saturating_add(1), total, now)
    }

    pub fn previous_page(&mut self, now: DateTime<Utc>) -> u32 {
        let total = self.total_pages();
        self.on_page_changed(self.current_page().saturating_sub(1), total, now)
    }

    /// Whether a pending write has been quiet for the debounce window.
    pub fn is_flush_due(&self, now: DateTime<Utc>) -> bool {
        match (self.dirty, self.last_change_at) {
            (false, _) => false,
            (true, None) => true,
            (true, Some(changed_at)) => now - changed_at >= self.debounce,
        }
    }

    /// Writes the position if it has unsaved changes. Returns whether a write
    /// happened. On failure the position stays dirty so a later flush retries.
    pub async fn flush(&mut self, db: &dyn DatabaseService) -> PortResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        if self.persisted {
            db.update_reading_position(&self.position).await?;
        } else {
            db.create_reading_position(&self.position).await?;
            self.persisted = true;
        }
        self.dirty = false;
        debug!(
            "Saved reading position for {} at page {}",
            self.position.key(),
            self.position.current_page
        );
        Ok(true)
    }

    pub async fn flush_if_due(
        &mut self,
        db: &dyn DatabaseService,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        if self.is_flush_due(now) {
            self.flush(db).await
        } else {
            Ok(false)
        }
    }
}

/// `clamp(round(ratio * total), 1, total)`.
pub fn reconciled_page(progress_ratio: f64, total_pages: u32) -> u32 {
    let total = total_pages.max(1);
    let ratio = if progress_ratio.is_finite() {
        progress_ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    ((ratio * f64::from(total)).round() as u32).clamp(1, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn key() -> ReaderBookKey {
        ReaderBookKey::new(Uuid::new_v4(), Uuid::new_v4())
    }

    fn store_at(page: u32, total: u32) -> ReadingPositionStore {
        let now = Utc::now();
        let mut store = ReadingPositionStore::detached(ReadingPosition::first_open(key(), now));
        store.on_page_changed(page, total, now);
        store
    }

    #[test]
    fn reconciled_page_preserves_ratio() {
        assert_eq!(reconciled_page(0.5, 10), 5);
        assert_eq!(reconciled_page(0.5, 7), 4);
        assert_eq!(reconciled_page(0.0, 7), 1);
        assert_eq!(reconciled_page(1.0, 7), 7);
        assert_eq!(reconciled_page(0.04, 10), 1);
        assert_eq!(reconciled_page(f64::NAN, 10), 1);
        assert_eq!(reconciled_page(0.3, 0), 1);
    }

    #[test]
    fn reconciled_page_matches_rounding_rule_everywhere() {
        for numerator in 0..=100u32 {
            let ratio = f64::from(numerator) / 100.0;
            for total in 1..=60u32 {
                let expected = ((ratio * f64::from(total)).round() as u32).clamp(1, total);
                assert_eq!(reconciled_page(ratio, total), expected);
            }
        }
    }

    #[test]
    fn pagination_change_keeps_ratio_and_moves_page() {
        let mut store = store_at(50, 100);
        assert_eq!(store.progress_ratio(), 0.5);

        let page = store.on_pagination_changed(150);
        assert_eq!(page, 75);
        assert_eq!(store.total_pages(), 150);
        assert_eq!(store.progress_ratio(), 0.5);
    }

    #[test]
    fn page_changes_clamp_into_range() {
        let now = Utc::now();
        let mut store = store_at(1, 3);
        assert_eq!(store.on_page_changed(0, 3, now), 1);
        assert_eq!(store.on_page_changed(9, 3, now), 3);
        assert_eq!(store.progress_ratio(), 1.0);
        assert!(store.current_page() <= store.total_pages());
    }

    #[test]
    fn next_and_previous_never_overrun() {
        let now = Utc::now();
        let mut store = store_at(1, 3);
        assert_eq!(store.previous_page(now), 1);
        assert_eq!(store.next_page(now), 2);
        assert_eq!(store.next_page(now), 3);
        assert_eq!(store.next_page(now), 3);
        for _ in 0..10 {
            let page = store.previous_page(now);
            assert!((1..=3).contains(&page));
        }
        assert_eq!(store.current_page(), 1);
    }

    #[test]
    fn started_at_is_write_once() {
        let then = Utc::now();
        let mut position = ReadingPosition::first_open(key(), then);
        position.started_at = None;
        let mut store = ReadingPositionStore::from_persisted(position);

        let first = then + Duration::seconds(5);
        store.on_page_changed(2, 4, first);
        assert_eq!(store.position().started_at, Some(first));

        store.on_page_changed(3, 4, first + Duration::seconds(5));
        assert_eq!(store.position().started_at, Some(first));
        assert_eq!(store.position().last_read_at, first + Duration::seconds(5));
    }

    #[test]
    fn flush_is_due_only_after_quiet_period() {
        let now = Utc::now();
        let mut store = ReadingPositionStore::from_persisted(ReadingPosition::first_open(key(), now))
            .with_debounce(Duration::seconds(2));
        assert!(!store.is_flush_due(now));

        store.on_page_changed(2, 5, now);
        assert!(!store.is_flush_due(now + Duration::seconds(1)));
        assert!(store.is_flush_due(now + Duration::seconds(2)));
    }
}
