//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! One connection hosts one `ReaderSession`; client messages are applied to it
//! one at a time, and a background task keeps its persisted state fresh.

use crate::web::{
    middleware::ReaderId,
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
    tracking_task::tracking_process,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use chrono::{DateTime, Utc};
use futures::{
    stream::{SplitSink, StreamExt},
    Sink, SinkExt,
};
use reading_engine_core::{
    AnnotationStyle, ReaderBookKey, ReaderSession, SessionError, SessionOptions,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The sending half of a socket, shared between the control loop and the tracking task.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Serializes and sends one server message. Returns `false` once the client is gone.
pub async fn send_message<S>(ws_sender: &Arc<Mutex<S>>, msg: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    if ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await
        .is_err()
    {
        warn!("Failed to send message to client.");
        return false;
    }
    true
}

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(ReaderId(reader_id)): Extension<ReaderId>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, reader_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, reader_id: uuid::Uuid) {
    info!("New WebSocket connection established for reader: {}", reader_id);

    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // --- 1. Initialization Phase ---
    let session_lock = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(&init_json) {
                Ok(ClientMessage::Init {
                    book_id,
                    access,
                    display,
                }) => {
                    let key = ReaderBookKey::new(reader_id, book_id);
                    info!("Opening reading session for {}", key);
                    let options = SessionOptions {
                        access,
                        ..app_state.config.session_options()
                    };
                    match ReaderSession::open(
                        app_state.db.clone(),
                        app_state.content.as_ref(),
                        app_state.measurer.clone(),
                        key,
                        display,
                        options,
                        Utc::now(),
                    )
                    .await
                    {
                        Ok(session) => {
                            let init_msg = ServerMessage::session_initialized(&session);
                            if !send_message(&ws_sender, &init_msg).await {
                                return;
                            }
                            Arc::new(Mutex::new(session))
                        }
                        Err(e) => {
                            error!("Failed to open reading session for {}: {}", key, e);
                            let err_msg = ServerMessage::Error {
                                message: e.to_string(),
                            };
                            send_message(&ws_sender, &err_msg).await;
                            return;
                        }
                    }
                }
                _ => {
                    error!("First message was not a valid Init message.");
                    let err_msg = ServerMessage::Error {
                        message: "The first message must be init.".to_string(),
                    };
                    send_message(&ws_sender, &err_msg).await;
                    return;
                }
            }
        }
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    // --- 2. Background Tracking ---
    let cancellation_token = CancellationToken::new();
    let tracking_handle = {
        let session_lock = session_lock.clone();
        let ws_sender = ws_sender.clone();
        let token = cancellation_token.clone();
        let poll_interval = app_state.config.position_poll_interval();
        tokio::spawn(async move {
            tracking_process(session_lock, ws_sender, poll_interval, token).await
        })
    };

    // --- 3. Main Message Loop ---
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                let (reply, closed) = {
                    let mut session = session_lock.lock().await;
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => dispatch(&mut session, msg, Utc::now()).await,
                        Err(e) => {
                            warn!("Failed to deserialize client message: {}", e);
                            Some(ServerMessage::Error {
                                message: format!("Unrecognized message: {}", e),
                            })
                        }
                    };
                    (reply, session.is_closed())
                };
                if let Some(reply) = reply {
                    if !send_message(&ws_sender, &reply).await {
                        break;
                    }
                }
                if closed {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    // Stop the tracker first so the final flush below is the last write.
    cancellation_token.cancel();
    if let Err(e) = tracking_handle.await {
        error!("Tracking task failed: {:?}", e);
    }
    session_lock.lock().await.close(Utc::now()).await;
    info!("WebSocket connection closed.");
}

/// Applies one client message to the session and returns the reply, if any.
pub async fn dispatch(
    session: &mut ReaderSession,
    msg: ClientMessage,
    now: DateTime<Utc>,
) -> Option<ServerMessage> {
    let result: Result<Option<ServerMessage>, SessionError> = match msg {
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
            Ok(None)
        }
        ClientMessage::Resize { display } => session
            .update_display(display)
            .await
            .map(|view| Some(ServerMessage::Paginated { view })),
        ClientMessage::TurnPage { page } => session
            .turn_to(page, now)
            .map(|view| Some(ServerMessage::PageChanged { view })),
        ClientMessage::ScrollTo { offset } => session
            .scroll_to(offset, now)
            .map(|view| Some(ServerMessage::PageChanged { view })),
        ClientMessage::NextPage => session
            .next_page(now)
            .map(|view| Some(ServerMessage::PageChanged { view })),
        ClientMessage::PreviousPage => session
            .previous_page(now)
            .map(|view| Some(ServerMessage::PageChanged { view })),
        ClientMessage::SelectText { text } => session.select(&text).map(|draft| {
            Some(match draft {
                Some(draft) => ServerMessage::SelectionCaptured {
                    page_number: draft.page_number,
                    selected_text: draft.selected_text.clone(),
                },
                None => ServerMessage::SelectionIgnored,
            })
        }),
        ClientMessage::ClearSelection => {
            session.clear_selection();
            Ok(None)
        }
        ClientMessage::SaveAnnotation {
            highlight_color,
            note_text,
            cover_ref,
        } => session
            .save_annotation(
                AnnotationStyle {
                    highlight_color,
                    note_text,
                },
                cover_ref,
                now,
            )
            .await
            .map(|annotation| Some(ServerMessage::AnnotationSaved { annotation })),
        ClientMessage::EditNote {
            annotation_id,
            note_text,
        } => session
            .edit_note(annotation_id, &note_text, now)
            .await
            .map(|annotation| Some(ServerMessage::AnnotationUpdated { annotation })),
        ClientMessage::DeleteAnnotation { annotation_id } => session
            .delete_annotation(annotation_id)
            .await
            .map(|_| Some(ServerMessage::AnnotationDeleted { annotation_id })),
        ClientMessage::ListAnnotations => session
            .list_annotations()
            .await
            .map(|annotations| Some(ServerMessage::Annotations { annotations })),
        ClientMessage::VisibilityChanged { visible } => {
            session.set_visible(visible, now).await;
            Ok(session
                .reading_time()
                .filter(|_| !visible)
                .map(|record| ServerMessage::ReadingTime {
                    record: record.clone(),
                }))
        }
        ClientMessage::SetTracking { enabled } => {
            session.set_tracking_enabled(enabled, now).await;
            Ok(None)
        }
        ClientMessage::Unload => {
            info!("Unload received for {}", session.key());
            session.close(now).await;
            Ok(Some(ServerMessage::Closed))
        }
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Request failed for {}: {}", session.key(), e);
            Some(ServerMessage::Error {
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{demo_session, stored_session, MemoryStore};
    use chrono::Duration;
    use reading_engine_core::{ContentOrigin, HighlightColor};
    use uuid::Uuid;

    #[tokio::test]
    async fn page_messages_move_the_reader() {
        let now = Utc::now();
        let mut session = demo_session(now).await;
        assert_eq!(session.origin(), ContentOrigin::Demo);
        assert!(session.view().total_pages > 2);

        let reply = dispatch(&mut session, ClientMessage::NextPage, now).await;
        assert!(matches!(
            reply,
            Some(ServerMessage::PageChanged { view }) if view.current_page == 2
        ));

        let reply = dispatch(&mut session, ClientMessage::TurnPage { page: 0 }, now).await;
        assert!(matches!(
            reply,
            Some(ServerMessage::PageChanged { view }) if view.current_page == 1
        ));
    }

    #[tokio::test]
    async fn selection_flow_reports_captured_and_ignored() {
        let now = Utc::now();
        let mut session = demo_session(now).await;

        let reply = dispatch(
            &mut session,
            ClientMessage::SelectText { text: "ab".to_string() },
            now,
        )
        .await;
        assert!(matches!(reply, Some(ServerMessage::SelectionIgnored)));

        let reply = dispatch(
            &mut session,
            ClientMessage::SaveAnnotation {
                highlight_color: HighlightColor::Yellow,
                note_text: String::new(),
                cover_ref: None,
            },
            now,
        )
        .await;
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));

        let reply = dispatch(
            &mut session,
            ClientMessage::SelectText {
                text: "  a longer selection  ".to_string(),
            },
            now,
        )
        .await;
        assert!(matches!(
            reply,
            Some(ServerMessage::SelectionCaptured { page_number: 1, ref selected_text })
                if selected_text == "a longer selection"
        ));
    }

    #[tokio::test]
    async fn unload_closes_the_session() {
        let now = Utc::now();
        let mut session = demo_session(now).await;

        let reply = dispatch(&mut session, ClientMessage::Unload, now + Duration::seconds(9)).await;
        assert!(matches!(reply, Some(ServerMessage::Closed)));
        assert!(session.is_closed());

        let reply = dispatch(&mut session, ClientMessage::NextPage, now).await;
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
    }

    #[tokio::test]
    async fn init_message_reports_chapters_and_view() {
        let now = Utc::now();
        let session = demo_session(now).await;

        let json = serde_json::to_value(ServerMessage::session_initialized(&session)).unwrap();
        assert_eq!(json["type"], "session_initialized");
        assert_eq!(json["origin"], "demo");
        assert_eq!(json["chapter_count"], 2);
        assert_eq!(json["blocks"].as_array().unwrap().len(), 7);
        assert_eq!(json["view"]["current_page"], 1);
    }

    #[tokio::test]
    async fn scroll_to_lands_on_the_page_at_that_offset() {
        let now = Utc::now();
        let mut session = demo_session(now).await;

        let reply = dispatch(&mut session, ClientMessage::ScrollTo { offset: 450.0 }, now).await;
        assert!(matches!(
            reply,
            Some(ServerMessage::PageChanged { view }) if view.current_page == 5
        ));
    }

    #[tokio::test]
    async fn listed_annotations_carry_their_live_page() {
        let now = Utc::now();
        let store = MemoryStore::with_text(
            "Chapter 1\nfirst page\nsecond page\nthird page\nthe marked passage\nlast page",
        );
        let key = ReaderBookKey::new(Uuid::new_v4(), Uuid::new_v4());
        let mut session = stored_session(store, key, SessionOptions::default(), now).await;

        dispatch(&mut session, ClientMessage::TurnPage { page: 2 }, now).await;
        dispatch(
            &mut session,
            ClientMessage::SelectText {
                text: "the marked passage".to_string(),
            },
            now,
        )
        .await;
        dispatch(
            &mut session,
            ClientMessage::SaveAnnotation {
                highlight_color: HighlightColor::Green,
                note_text: String::new(),
                cover_ref: None,
            },
            now,
        )
        .await;

        let reply = dispatch(&mut session, ClientMessage::ListAnnotations, now).await;
        let annotations = match reply {
            Some(ServerMessage::Annotations { annotations }) => annotations,
            other => panic!("expected an annotation listing, got {other:?}"),
        };
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].annotation.page_number, 2);
        // 40 of 67 characters precede the passage: page 4 of 6.
        assert_eq!(annotations[0].current_page, 4);
    }
}
