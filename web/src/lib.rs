//! HTTP and WebSocket surface for the ride coordination service.
//!
//! Handlers stay thin: extract the caller and the request, call the
//! [`LifecycleController`] or the registry, map the result to a response.
//! All business rules live in `rideshare-core`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Axum shell                 │  ← JSON, bearer auth, CORS
//! │  - Request parsing                      │  ← Correlation ids, tracing
//! │  - Response / error mapping             │  ← WebSocket upgrade
//! ├─────────────────────────────────────────┤
//! │         rideshare-core / runtime        │
//! │  - Lifecycle transitions                │  ← Atomic per ride
//! │  - Proximity search                     │
//! │  - Registry + broadcast                 │  ← Fan-out to subscribers
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rideshare_web::{build_router, AppState, Identity, RealtimeSettings};
//!
//! let state = AppState::in_memory(identity, clock, metrics, RealtimeSettings::default());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, build_router(state)).await?;
//! ```
//!
//! [`LifecycleController`]: rideshare_core::lifecycle::LifecycleController

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{AppJson, AppQuery, BearerToken, CurrentUser};
pub use middleware::CORRELATION_ID_HEADER;
pub use router::build_router;
pub use state::{AppState, Identity, RealtimeSettings};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
