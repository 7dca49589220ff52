//! Fan-out of lifecycle events and handling of inbound client frames.
//!
//! [`BroadcastDispatcher::publish`] turns a [`RideEvent`] into exactly one
//! envelope per current subscriber. [`BroadcastDispatcher::handle_inbound`]
//! routes one text frame from a client through the exhaustive
//! [`ClientMessage`] enum; anything unparseable becomes an `error` envelope
//! for the sender only.
//!
//! Neither path queues for offline users: an envelope reaches whoever is
//! connected and subscribed at the moment of delivery, and nobody else.

use crate::registry::{ConnectionRegistry, DeliveryReport};
use rideshare_core::envelope::{ClientMessage, EnvelopeBody, InboundError, parse_client_message};
use rideshare_core::environment::Clock;
use rideshare_core::event::RideEvent;
use rideshare_core::notify::{EmergencyAlert, Notifier};
use rideshare_core::types::UserId;
use std::sync::Arc;

/// Text attached to relayed SOS envelopes.
pub const EMERGENCY_MESSAGE: &str = "EMERGENCY: SOS alert triggered";

/// Maps events and client frames onto registry deliveries.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl BroadcastDispatcher {
    /// Creates a dispatcher delivering through `registry`.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            notifier,
            clock,
        }
    }

    /// The registry deliveries go through.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Delivers `event` to the ride's current subscribers.
    ///
    /// Dead transports are disconnected; the publish itself never fails.
    pub async fn publish(&self, event: &RideEvent) -> DeliveryReport {
        let body = EnvelopeBody::from_event(event);
        let kind = body.kind();
        let report = self.registry.broadcast(event.ride_id(), body).await;

        tracing::debug!(
            ride_id = %event.ride_id(),
            event = event.name(),
            envelope = kind,
            delivered = report.delivered,
            pruned = report.pruned.len(),
            "Event broadcast"
        );
        report
    }

    /// Handles one inbound text frame from `user`.
    ///
    /// Returns the parsed message, or the rejection that was reported back to
    /// the sender.
    ///
    /// # Errors
    ///
    /// Returns the [`InboundError`] for a frame that could not be parsed. The
    /// sender has already been told; the connection stays open.
    pub async fn handle_inbound(
        &self,
        user: UserId,
        text: &str,
    ) -> Result<ClientMessage, InboundError> {
        let message = match parse_client_message(text) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(user_id = %user, error = %error, "Rejected inbound frame");
                self.registry
                    .send_to(user, EnvelopeBody::error(error.to_string()))
                    .await;
                return Err(error);
            }
        };

        match &message {
            ClientMessage::SubscribeRide { ride_id } => {
                self.registry.subscribe(user, *ride_id).await;
            }
            ClientMessage::UnsubscribeRide { ride_id } => {
                self.registry.unsubscribe(user, *ride_id).await;
            }
            ClientMessage::LocationUpdate { ride_id, location } => {
                let report = self
                    .registry
                    .broadcast(
                        *ride_id,
                        EnvelopeBody::LocationUpdate {
                            ride_id: *ride_id,
                            user_id: user,
                            location: *location,
                        },
                    )
                    .await;
                tracing::trace!(ride_id = %ride_id, user_id = %user, delivered = report.delivered, "Location relayed");
            }
            ClientMessage::EmergencyAlert { ride_id, location } => {
                tracing::warn!(ride_id = %ride_id, user_id = %user, "Emergency alert received");
                self.registry
                    .broadcast(
                        *ride_id,
                        EnvelopeBody::EmergencyAlert {
                            ride_id: *ride_id,
                            user_id: user,
                            location: *location,
                            message: EMERGENCY_MESSAGE.to_string(),
                        },
                    )
                    .await;

                let alert = EmergencyAlert {
                    ride_id: *ride_id,
                    user_id: user,
                    location: *location,
                    raised_at: self.clock.now(),
                };
                let notifier = Arc::clone(&self.notifier);
                tokio::spawn(async move { notifier.emergency(alert).await });
            }
            ClientMessage::Ping => {
                self.registry.send_to(user, EnvelopeBody::Pong).await;
            }
        }

        Ok(message)
    }
}
