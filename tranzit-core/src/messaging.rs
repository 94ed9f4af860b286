use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;
use tranzit_shared::Masked;
use crate::booking::{booking_reference, BookingStatus};

/// Customer-facing status messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    DriverAccepted,
    TripStarted,
    TripCompleted,
    BookingCancelled,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::DriverAccepted => "driver_accepted",
            TemplateKind::TripStarted => "trip_started",
            TemplateKind::TripCompleted => "trip_completed",
            TemplateKind::BookingCancelled => "booking_cancelled",
        }
    }

    pub fn render(&self, payload: &MessagePayload) -> String {
        let reference = booking_reference(payload.booking_number);
        match self {
            TemplateKind::DriverAccepted => {
                let mut text = format!("Booking {}: your driver has accepted the transfer.", reference);
                if let Some(driver) = &payload.driver_name {
                    text.push_str(&format!("\nDriver: {}", driver));
                }
                if let Some(plate) = &payload.vehicle_plate {
                    text.push_str(&format!("\nVehicle: {}", plate));
                }
                text
            }
            TemplateKind::TripStarted => format!("Booking {}: your trip has started.", reference),
            TemplateKind::TripCompleted => {
                format!("Booking {}: your trip is complete. Thank you for travelling with us.", reference)
            }
            TemplateKind::BookingCancelled => format!("Booking {} has been cancelled.", reference),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub booking_id: Uuid,
    pub booking_number: i64,
    pub status: BookingStatus,
    pub driver_name: Option<String>,
    pub vehicle_plate: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Messaging service unreachable: {0}")]
    Unreachable(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Messaging service rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Malformed message payload: {0}")]
    Malformed(String),
}

/// External messaging collaborator.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(
        &self,
        recipient_id: &str,
        kind: TemplateKind,
        payload: &MessagePayload,
    ) -> Result<(), MessagingError>;
}

/// Writes messages to the log instead of delivering them. Used when no messaging
/// platform is configured.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_message(
        &self,
        recipient_id: &str,
        kind: TemplateKind,
        payload: &MessagePayload,
    ) -> Result<(), MessagingError> {
        tracing::info!(
            "[log-messenger] {} -> {}: {}",
            kind,
            Masked(recipient_id),
            kind.render(payload)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> MessagePayload {
        MessagePayload {
            booking_id: Uuid::new_v4(),
            booking_number: 42,
            status: BookingStatus::Confirmed,
            driver_name: Some("Ivan Petrov".to_string()),
            vehicle_plate: Some("A123BC".to_string()),
        }
    }

    #[test]
    fn test_render_driver_accepted() {
        let text = TemplateKind::DriverAccepted.render(&payload());
        assert!(text.starts_with("Booking TR-000042"));
        assert!(text.contains("Driver: Ivan Petrov"));
        assert!(text.contains("Vehicle: A123BC"));
    }

    #[test]
    fn test_rendered_reference_matches_booking() {
        let booking = crate::Booking::new(42, Uuid::new_v4());
        let text = TemplateKind::TripStarted.render(&payload());
        assert!(text.contains(&booking.reference()));
    }

    #[test]
    fn test_render_without_optional_fields() {
        let mut p = payload();
        p.driver_name = None;
        p.vehicle_plate = None;
        let text = TemplateKind::DriverAccepted.render(&p);
        assert!(!text.contains("Driver:"));
    }

    #[tokio::test]
    async fn test_log_messenger_always_succeeds() {
        let result = LogMessenger
            .send_message("123456", TemplateKind::TripCompleted, &payload())
            .await;
        assert!(result.is_ok());
    }
}
