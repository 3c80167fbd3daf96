//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{middleware::ReaderId, state::AppState};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use reading_engine_core::{
    AccessLevel, Annotation, BookContent, PlacedAnnotation, PortError, ReaderBookKey,
    ReadingPosition, ReadingTimeRecord, SessionSegment,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_book_handler,
        get_position_handler,
        list_annotations_handler,
        edit_note_handler,
        delete_annotation_handler,
        get_reading_time_handler,
    ),
    components(
        schemas(
            UploadBookResponse,
            PositionResponse,
            AnnotationResponse,
            AnchorResponse,
            EditNoteRequest,
            ReadingTimeResponse,
            SegmentResponse
        )
    ),
    tags(
        (name = "Reading Engine API", description = "Books, reading positions, annotations and reading time.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after successfully uploading a book.
#[derive(Serialize, ToSchema)]
pub struct UploadBookResponse {
    book_id: Uuid,
    owner_id: Uuid,
    title: String,
}

#[derive(Serialize, ToSchema)]
pub struct PositionResponse {
    current_page: u32,
    total_pages_at_save: u32,
    progress_ratio: f64,
    started_at: Option<DateTime<Utc>>,
    last_read_at: DateTime<Utc>,
}

impl From<ReadingPosition> for PositionResponse {
    fn from(position: ReadingPosition) -> Self {
        Self {
            current_page: position.current_page,
            total_pages_at_save: position.total_pages_at_save,
            progress_ratio: position.progress_ratio,
            started_at: position.started_at,
            last_read_at: position.last_read_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AnchorResponse {
    block_index: usize,
    char_offset: usize,
}

#[derive(Serialize, ToSchema)]
pub struct AnnotationResponse {
    id: Uuid,
    /// The page the selection was captured on. Never renumbered.
    page_number: u32,
    /// Where the annotation falls under the reader's last saved layout.
    current_page: u32,
    selected_text: String,
    /// One of `yellow`, `green`, `blue`, `pink`, `purple`.
    highlight_color: String,
    note_text: String,
    cover_ref: Option<String>,
    anchor: Option<AnchorResponse>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<Annotation> for AnnotationResponse {
    fn from(annotation: Annotation) -> Self {
        let current_page = annotation.page_number;
        PlacedAnnotation {
            annotation,
            current_page,
        }
        .into()
    }
}

impl From<PlacedAnnotation> for AnnotationResponse {
    fn from(PlacedAnnotation { annotation, current_page }: PlacedAnnotation) -> Self {
        Self {
            id: annotation.id,
            page_number: annotation.page_number,
            current_page,
            selected_text: annotation.selected_text,
            highlight_color: annotation.highlight_color.to_string(),
            note_text: annotation.note_text,
            cover_ref: annotation.cover_ref,
            anchor: annotation.anchor.map(|anchor| AnchorResponse {
                block_index: anchor.block_index,
                char_offset: anchor.char_offset,
            }),
            created_at: annotation.created_at,
            updated_at: annotation.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct EditNoteRequest {
    pub note_text: String,
}

#[derive(Serialize, ToSchema)]
pub struct SegmentResponse {
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration_seconds: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ReadingTimeResponse {
    total_reading_time_seconds: i64,
    sessions: Vec<SegmentResponse>,
}

impl From<ReadingTimeRecord> for ReadingTimeResponse {
    fn from(record: ReadingTimeRecord) -> Self {
        Self {
            total_reading_time_seconds: record.total_reading_time_seconds,
            sessions: record
                .sessions
                .into_iter()
                .map(|SessionSegment { started_at, ended_at, duration_seconds }| SegmentResponse {
                    started_at,
                    ended_at,
                    duration_seconds,
                })
                .collect(),
        }
    }
}

/// Places annotations against a saved layout of `total_pages` pages. Without
/// content or a saved layout the stamped page is reported.
fn place_in_saved_layout(
    annotations: Vec<Annotation>,
    content: Option<&BookContent>,
    total_pages: Option<u32>,
) -> Vec<AnnotationResponse> {
    annotations
        .into_iter()
        .map(|annotation| match (content, total_pages) {
            (Some(content), Some(total_pages)) => {
                let current_page = annotation.resolved_page(content, total_pages);
                PlacedAnnotation {
                    annotation,
                    current_page,
                }
                .into()
            }
            _ => annotation.into(),
        })
        .collect()
}

type HandlerError = (StatusCode, String);

fn port_failure(context: &str, e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, what),
        PortError::Unexpected(_) => {
            error!("{}: {:?}", context, e);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload a plain-text book.
///
/// Accepts a multipart/form-data request with a single file part. The file name
/// becomes the book title.
#[utoipa::path(
    post,
    path = "/books",
    request_body(content_type = "multipart/form-data", description = "The book text to upload."),
    responses(
        (status = 201, description = "Book stored", body = UploadBookResponse),
        (status = 400, description = "Bad request (e.g., missing file or non UTF-8 text)"),
        (status = 401, description = "Missing or invalid x-reader-id header"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-reader-id" = Uuid, Header, description = "The unique ID of the reader.")
    )
)]
pub async fn upload_book_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(ReaderId(reader_id)): Extension<ReaderId>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            )
        })?;

    let title = field
        .file_name()
        .map(|name| name.trim_end_matches(".txt").to_string())
        .unwrap_or_else(|| "Untitled".to_string());
    let data = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;
    let text = String::from_utf8(data.to_vec()).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Uploaded file is not valid UTF-8 text: {}", e),
        )
    })?;

    let book = app_state
        .db
        .create_book(reader_id, &title, &text)
        .await
        .map_err(|e| port_failure("Failed to store book", e))?;
    info!("Stored book {} for reader {}", book.id, reader_id);

    Ok((
        StatusCode::CREATED,
        Json(UploadBookResponse {
            book_id: book.id,
            owner_id: book.owner_id,
            title: book.title,
        }),
    ))
}

/// Get the reader's saved position in a book.
#[utoipa::path(
    get,
    path = "/books/{book_id}/position",
    responses(
        (status = 200, description = "Saved position", body = PositionResponse),
        (status = 404, description = "The reader has never opened this book"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("book_id" = Uuid, Path, description = "The book."),
        ("x-reader-id" = Uuid, Header, description = "The unique ID of the reader.")
    )
)]
pub async fn get_position_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(ReaderId(reader_id)): Extension<ReaderId>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<PositionResponse>, HandlerError> {
    let key = ReaderBookKey::new(reader_id, book_id);
    app_state
        .db
        .get_reading_position(key)
        .await
        .map_err(|e| port_failure("Failed to load reading position", e))?
        .map(|position| Json(position.into()))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No reading position for {}", key),
            )
        })
}

/// List the reader's annotations for a book, oldest first.
///
/// Each annotation also reports the page it falls on under the reader's last
/// saved layout.
#[utoipa::path(
    get,
    path = "/books/{book_id}/annotations",
    responses(
        (status = 200, description = "Annotations", body = [AnnotationResponse]),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("book_id" = Uuid, Path, description = "The book."),
        ("x-reader-id" = Uuid, Header, description = "The unique ID of the reader.")
    )
)]
pub async fn list_annotations_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(ReaderId(reader_id)): Extension<ReaderId>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<Vec<AnnotationResponse>>, HandlerError> {
    let key = ReaderBookKey::new(reader_id, book_id);
    let annotations = app_state
        .db
        .list_annotations(key)
        .await
        .map_err(|e| port_failure("Failed to list annotations", e))?;
    if annotations.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let total_pages = app_state
        .db
        .get_reading_position(key)
        .await
        .map_err(|e| port_failure("Failed to load reading position", e))?
        .map(|position| position.total_pages_at_save);
    let content = match app_state.content.fetch_book_text(book_id, AccessLevel::Full).await {
        Ok(text) => Some(BookContent::from_raw(&text)),
        Err(e) => {
            warn!("Listing annotations for {} without content: {}", key, e);
            None
        }
    };
    Ok(Json(place_in_saved_layout(
        annotations,
        content.as_ref(),
        total_pages,
    )))
}

/// Replace an annotation's note. The last write wins.
#[utoipa::path(
    patch,
    path = "/books/{book_id}/annotations/{annotation_id}",
    request_body = EditNoteRequest,
    responses(
        (status = 200, description = "Updated annotation", body = AnnotationResponse),
        (status = 404, description = "Annotation not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("book_id" = Uuid, Path, description = "The book."),
        ("annotation_id" = Uuid, Path, description = "The annotation."),
        ("x-reader-id" = Uuid, Header, description = "The unique ID of the reader.")
    )
)]
pub async fn edit_note_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(ReaderId(reader_id)): Extension<ReaderId>,
    Path((book_id, annotation_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<EditNoteRequest>,
) -> Result<Json<AnnotationResponse>, HandlerError> {
    let annotation = app_state
        .db
        .update_annotation_note(
            ReaderBookKey::new(reader_id, book_id),
            annotation_id,
            &req.note_text,
            Utc::now(),
        )
        .await
        .map_err(|e| port_failure("Failed to update note", e))?;
    Ok(Json(annotation.into()))
}

/// Delete an annotation.
#[utoipa::path(
    delete,
    path = "/books/{book_id}/annotations/{annotation_id}",
    responses(
        (status = 204, description = "Annotation deleted"),
        (status = 404, description = "Annotation not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("book_id" = Uuid, Path, description = "The book."),
        ("annotation_id" = Uuid, Path, description = "The annotation."),
        ("x-reader-id" = Uuid, Header, description = "The unique ID of the reader.")
    )
)]
pub async fn delete_annotation_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(ReaderId(reader_id)): Extension<ReaderId>,
    Path((book_id, annotation_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, HandlerError> {
    app_state
        .db
        .delete_annotation(ReaderBookKey::new(reader_id, book_id), annotation_id)
        .await
        .map_err(|e| port_failure("Failed to delete annotation", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get accumulated reading time and the flushed segments behind it.
#[utoipa::path(
    get,
    path = "/books/{book_id}/reading-time",
    responses(
        (status = 200, description = "Reading time", body = ReadingTimeResponse),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("book_id" = Uuid, Path, description = "The book."),
        ("x-reader-id" = Uuid, Header, description = "The unique ID of the reader.")
    )
)]
pub async fn get_reading_time_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(ReaderId(reader_id)): Extension<ReaderId>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<ReadingTimeResponse>, HandlerError> {
    let record = app_state
        .db
        .get_reading_time(ReaderBookKey::new(reader_id, book_id))
        .await
        .map_err(|e| port_failure("Failed to load reading time", e))?;
    Ok(Json(record.into()))
}
