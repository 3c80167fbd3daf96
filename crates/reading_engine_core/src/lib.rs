pub mod annotation;
pub mod domain;
pub mod formatter;
pub mod pagination;
pub mod ports;
pub mod position;
pub mod session;
pub mod time_tracker;

pub use annotation::{AnnotationDraft, AnnotationStyle, PlacedAnnotation, ValidationError};
pub use domain::{
    AccessLevel, Annotation, Block, BlockKind, Book, ContentAnchor, DisplayParameters,
    HighlightColor, ReaderBookKey, ReadingPosition, ReadingTimeRecord, SessionSegment,
};
pub use formatter::BookContent;
pub use pagination::{MeasureRequest, PaginationResult};
pub use ports::{ContentService, DatabaseService, PortError, PortResult, TextMeasurer};
pub use position::ReadingPositionStore;
pub use session::{ContentOrigin, PageView, ReaderSession, SessionError, SessionOptions};
pub use time_tracker::{ReadingTimeTracker, TrackerConfig, TrackerState};
