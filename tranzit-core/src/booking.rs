use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use crate::CoreError;

/// One transport request, tracked from creation to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub booking_number: i64,
    pub customer_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `TR-000042` style reference for a booking number.
pub fn booking_reference(booking_number: i64) -> String {
    format!("TR-{:06}", booking_number)
}

impl Booking {
    pub fn new(booking_number: i64, customer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_number,
            customer_id,
            driver_id: None,
            vehicle_id: None,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Driver and vehicle must both be set from VEHICLE_ASSIGNED until the booking closes.
    pub fn is_assignment_consistent(&self) -> bool {
        match self.status {
            BookingStatus::VehicleAssigned | BookingStatus::Confirmed | BookingStatus::InProgress => {
                self.driver_id.is_some() && self.vehicle_id.is_some()
            }
            _ => true,
        }
    }

    /// Human-readable reference shown to customers and drivers.
    pub fn reference(&self) -> String {
        booking_reference(self.booking_number)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    VehicleAssigned,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that still claim a driver and vehicle.
    pub const ACTIVE: [BookingStatus; 3] = [
        BookingStatus::VehicleAssigned,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
    ];

    pub const NON_TERMINAL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::VehicleAssigned,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::VehicleAssigned => "VEHICLE_ASSIGNED",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// The legal edges of the booking lifecycle.
    ///
    /// ```text
    /// PENDING -> VEHICLE_ASSIGNED -> CONFIRMED -> IN_PROGRESS -> COMPLETED
    ///    \______________\_______________\_____________\______-> CANCELLED
    /// ```
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;

        match (self, next) {
            (Pending, VehicleAssigned) => true,
            (VehicleAssigned, Confirmed) => true,
            (Confirmed, InProgress) => true,
            (InProgress, Completed) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "VEHICLE_ASSIGNED" => Ok(BookingStatus::VehicleAssigned),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "IN_PROGRESS" => Ok(BookingStatus::InProgress),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::UnknownStatus { kind: "booking", value: other.to_string() }),
        }
    }
}
