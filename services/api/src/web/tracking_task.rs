//! services/api/src/web/tracking_task.rs
//!
//! This module contains the background "worker" that keeps a session's
//! persisted state fresh while the connection is open: it checkpoints reading
//! time on the tracker's flush interval and writes out debounced page turns.

use crate::web::{protocol::ServerMessage, ws_handler::send_message};
use axum::extract::ws::Message;
use chrono::Utc;
use futures::Sink;
use reading_engine_core::{time_tracker::FLUSH_INTERVAL_SECONDS, ReaderSession};
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::Mutex, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs until `cancellation_token` is cancelled or the session closes.
pub async fn tracking_process<S>(
    session_lock: Arc<Mutex<ReaderSession>>,
    ws_sender: Arc<Mutex<S>>,
    position_poll_interval: Duration,
    cancellation_token: CancellationToken,
) where
    S: Sink<Message> + Unpin + Send,
{
    let flush_interval = {
        let session = session_lock.lock().await;
        session
            .tracker()
            .config()
            .flush_interval
            .to_std()
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(Duration::from_secs(FLUSH_INTERVAL_SECONDS as u64))
    };
    info!("Tracking process started, checkpointing every {:?}.", flush_interval);

    let mut checkpoint = tokio::time::interval(flush_interval);
    checkpoint.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing has been read yet.
    checkpoint.tick().await;

    let mut position_poll = tokio::time::interval(position_poll_interval);
    position_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Tracking process cancelled.");
                return;
            }
            _ = checkpoint.tick() => {
                let update = {
                    let mut session = session_lock.lock().await;
                    if session.is_closed() {
                        return;
                    }
                    let before = session.reading_time().cloned();
                    session.checkpoint_time(Utc::now()).await;
                    session
                        .reading_time()
                        .filter(|record| Some(*record) != before.as_ref())
                        .cloned()
                };
                if let Some(record) = update {
                    debug!("Checkpointed reading time: {}s total", record.total_reading_time_seconds);
                    if !send_message(&ws_sender, &ServerMessage::ReadingTime { record }).await {
                        return;
                    }
                }
            }
            _ = position_poll.tick() => {
                let mut session = session_lock.lock().await;
                if session.is_closed() {
                    return;
                }
                if let Err(e) = session.flush_position_if_due(Utc::now()).await {
                    // The position stays dirty and is retried on the next poll.
                    warn!("Failed to save reading position for {}: {}", session.key(), e);
                }
            }
        }
    }
}
