//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use reading_engine_core::ports::{ContentService, DatabaseService, TextMeasurer};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub content: Arc<dyn ContentService>,
    pub measurer: Arc<dyn TextMeasurer>,
    pub config: Arc<Config>,
}
