pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod tracking_task;
pub mod ws_handler;

#[cfg(test)]
mod test_support;

// Re-export the handlers the binary wires into the router.
pub use middleware::require_reader;
pub use rest::{
    delete_annotation_handler, edit_note_handler, get_position_handler,
    get_reading_time_handler, list_annotations_handler, upload_book_handler,
};
pub use ws_handler::ws_handler;
