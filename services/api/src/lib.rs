//! services/api/src/lib.rs
//!
//! The `api` service hosts the reading engine behind a WebSocket session
//! protocol and a small REST surface.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
