//! HTTP and WebSocket request handlers.
//!
//! This module contains all handlers organized by domain.

pub mod devices;
pub mod health;
pub mod helmet;
pub mod rides;
pub mod websocket;

// Re-export common handler utilities
pub use health::health_check;
