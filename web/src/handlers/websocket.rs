//! Real-time ride updates over WebSocket.
//!
//! # Connection
//!
//! ```text
//! ws://localhost:8080/api/ws/<credential>
//! ```
//!
//! The credential in the path is verified after the upgrade. If it is
//! rejected the server closes the socket with code 1008 (policy violation)
//! and the user is never registered.
//!
//! # Message Format
//!
//! **Client → Server:**
//! ```json
//! {"type": "subscribe_ride", "ride_id": 42}
//! {"type": "unsubscribe_ride", "ride_id": 42}
//! {"type": "location_update", "ride_id": 42, "location": {"lat": 12.9, "lng": 77.6}}
//! {"type": "emergency_alert", "ride_id": 42, "location": {"lat": 12.9, "lng": 77.6}}
//! {"type": "ping"}
//! ```
//!
//! **Server → Client:**
//! ```json
//! {"type": "ride_status_update", "ride_id": 42, "new_status": "ongoing", "ride_data": {...}, "timestamp": "..."}
//! {"type": "error", "message": "Unknown message type: teleport", "timestamp": "..."}
//! ```
//!
//! ## Connection Limits
//!
//! - One connection per user; a new one closes the old one
//! - Idle timeout and ping interval come from [`RealtimeSettings`]
//! - Outbound frames are buffered per connection up to the channel capacity;
//!   a client that falls further behind is disconnected
//!
//! [`RealtimeSettings`]: crate::state::RealtimeSettings

#![allow(clippy::cognitive_complexity)] // WebSocket event loops are naturally complex

use crate::extractors::authenticate;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    Json,
};
use futures::{stream::StreamExt, SinkExt};
use rideshare_core::envelope::{Envelope, EnvelopeBody};
use rideshare_core::transport::{CloseReason, Transport, TransportError};
use rideshare_runtime::RegistryStats;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

// ============================================================================
// Transport
// ============================================================================

/// [`Transport`] feeding one socket's writer loop.
///
/// Frames go through a bounded channel; a full channel is reported as
/// [`TransportError::Backlogged`]. Close requests travel on a separate watch
/// channel so they are never stuck behind a full frame buffer.
pub struct ChannelTransport {
    frames: mpsc::Sender<String>,
    close: watch::Sender<Option<CloseReason>>,
}

/// Receiving half of a [`ChannelTransport`].
pub struct ChannelReceiver {
    frames: mpsc::Receiver<String>,
    close: watch::Receiver<Option<CloseReason>>,
}

impl ChannelTransport {
    /// Creates a transport buffering up to `capacity` frames.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, ChannelReceiver) {
        let (frames_tx, frames_rx) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = watch::channel(None);
        (
            Self {
                frames: frames_tx,
                close: close_tx,
            },
            ChannelReceiver {
                frames: frames_rx,
                close: close_rx,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.close.borrow().is_some() {
            return Err(TransportError::Closed);
        }
        let json = envelope
            .to_json()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.frames.try_send(json).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backlogged,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self, reason: CloseReason) {
        self.close.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Upgrades to the real-time channel for the user behind `credential`.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn ride_updates(
    ws: WebSocketUpgrade,
    Path(credential): Path<String>,
    State(state): State<AppState>,
) -> Response {
    debug!("WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, credential, state))
}

/// Registry counters.
///
/// ```text
/// GET /api/ws/status
/// ```
pub async fn connection_status(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.registry.stats().await)
}

// ============================================================================
// Socket Handler
// ============================================================================

fn close_frame(code: u16, reason: impl Into<String>) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into().into(),
    }))
}

const fn close_code_for(reason: CloseReason) -> u16 {
    match reason {
        CloseReason::Superseded | CloseReason::Shutdown => close_code::AWAY,
        CloseReason::Idle => close_code::NORMAL,
        CloseReason::SendFailed => close_code::POLICY,
    }
}

async fn handle_socket(mut socket: WebSocket, credential: String, state: AppState) {
    let user = match authenticate(&state.identity, &credential).await {
        Ok(user) => user,
        Err(error) => {
            warn!(error = %error, "WebSocket authentication failed");
            let _ = socket
                .send(close_frame(close_code::POLICY, "Authentication failed"))
                .await;
            return;
        }
    };

    let settings = state.settings;
    let (transport, mut outbound) = ChannelTransport::new(settings.channel_capacity);
    let handle = state.registry.connect(user.id, Arc::new(transport)).await;
    info!(user_id = %user.id, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    let mut ping = interval(settings.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping.reset();

    let idle = tokio::time::sleep(settings.idle_timeout);
    tokio::pin!(idle);

    loop {
        // The registry drops the transport right after closing it, so both
        // halves can be ready at once; the close request must win.
        tokio::select! {
            biased;

            _ = outbound.close.changed() => {
                let reason = *outbound.close.borrow();
                if let Some(reason) = reason {
                    info!(user_id = %user.id, reason = %reason, "Closing WebSocket");
                    let _ = sender.send(close_frame(close_code_for(reason), reason.to_string())).await;
                }
                break;
            }
            frame = outbound.frames.recv() => {
                let Some(text) = frame else {
                    let reason = *outbound.close.borrow();
                    if let Some(reason) = reason {
                        let _ = sender.send(close_frame(close_code_for(reason), reason.to_string())).await;
                    }
                    break;
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    debug!(user_id = %user.id, "Client went away during send");
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        idle.as_mut().reset(Instant::now() + settings.idle_timeout);
                        state.registry.touch(handle).await;
                        let _ = state.dispatcher.handle_inbound(user.id, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        idle.as_mut().reset(Instant::now() + settings.idle_timeout);
                        state.registry.touch(handle).await;
                        state
                            .registry
                            .send_to(user.id, EnvelopeBody::error("Binary frames are not supported"))
                            .await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        idle.as_mut().reset(Instant::now() + settings.idle_timeout);
                        state.registry.touch(handle).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(user_id = %user.id, "Client closed connection");
                        break;
                    }
                    Some(Err(error)) => {
                        debug!(user_id = %user.id, error = %error, "WebSocket receive error");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            () = &mut idle => {
                info!(user_id = %user.id, "WebSocket idle timeout");
                let _ = sender.send(close_frame(close_code::NORMAL, CloseReason::Idle.to_string())).await;
                break;
            }
        }
    }

    state.registry.release(handle).await;
    info!(user_id = %user.id, "WebSocket connection closed");
}
