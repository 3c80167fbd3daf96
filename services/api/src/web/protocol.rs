//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the reader client and the API
//! server. Each connection hosts exactly one reading session.

use chrono::{DateTime, Utc};
use reading_engine_core::{
    AccessLevel, Annotation, Block, ContentOrigin, DisplayParameters, HighlightColor, PageView,
    PlacedAnnotation, ReaderSession, ReadingTimeRecord,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the reading session. This must be the first message sent on the connection.
    Init {
        book_id: Uuid,
        #[serde(default)]
        access: AccessLevel,
        #[serde(default)]
        display: DisplayParameters,
    },

    /// The viewport or typography changed; the book is re-paginated.
    Resize { display: DisplayParameters },

    TurnPage { page: u32 },
    /// The reader scrolled; moves to the page showing `offset`.
    ScrollTo { offset: f64 },
    NextPage,
    PreviousPage,

    /// The reader finished a text selection.
    SelectText { text: String },
    ClearSelection,

    /// Turns the pending selection into an annotation.
    SaveAnnotation {
        highlight_color: HighlightColor,
        #[serde(default)]
        note_text: String,
        #[serde(default)]
        cover_ref: Option<String>,
    },

    EditNote { annotation_id: Uuid, note_text: String },
    DeleteAnnotation { annotation_id: Uuid },
    ListAnnotations,

    /// The reading surface was hidden or shown (tab switch, app backgrounded).
    VisibilityChanged { visible: bool },

    /// The reader's preference for reading-time tracking.
    SetTracking { enabled: bool },

    /// The reader is leaving. Everything pending is flushed and the session closes.
    Unload,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session is open and ships the formatted content.
    SessionInitialized {
        book_id: Uuid,
        origin: ContentOrigin,
        blocks: Vec<Block>,
        chapter_count: usize,
        view: PageView,
        started_at: Option<DateTime<Utc>>,
    },

    /// Page count changed after a display update.
    Paginated { view: PageView },

    PageChanged { view: PageView },

    /// A selection long enough to annotate was captured on `page_number`.
    SelectionCaptured { page_number: u32, selected_text: String },

    /// The selection was too short and nothing is pending.
    SelectionIgnored,

    AnnotationSaved { annotation: Annotation },
    AnnotationUpdated { annotation: Annotation },
    AnnotationDeleted { annotation_id: Uuid },
    /// Each annotation with the page it falls on under the current layout.
    Annotations { annotations: Vec<PlacedAnnotation> },

    /// Reading time as last acknowledged by storage.
    ReadingTime { record: ReadingTimeRecord },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },

    /// The session has flushed everything and accepts no further messages.
    Closed,
}

impl ServerMessage {
    pub fn session_initialized(session: &ReaderSession) -> Self {
        let content = session.content();
        ServerMessage::SessionInitialized {
            book_id: session.key().book_id,
            origin: session.origin(),
            blocks: content.blocks().to_vec(),
            chapter_count: content.chapter_count(),
            view: session.view(),
            started_at: session.position().started_at,
        }
    }
}
