use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use crate::CoreError;

/// A dispatchable driver. `vehicle_id` is a reference only; vehicles can be
/// reassigned by an administrator outside the dispatch flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Driver {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub vehicle_id: Option<Uuid>,
    pub status: DriverStatus,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(full_name: impl Into<String>, vehicle_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            phone: None,
            vehicle_id,
            status: DriverStatus::Available,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

impl DriverStatus {
    pub const ALL: [DriverStatus; 3] = [DriverStatus::Available, DriverStatus::Busy, DriverStatus::Offline];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Available => "AVAILABLE",
            DriverStatus::Busy => "BUSY",
            DriverStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(DriverStatus::Available),
            "BUSY" => Ok(DriverStatus::Busy),
            "OFFLINE" => Ok(DriverStatus::Offline),
            other => Err(CoreError::UnknownStatus { kind: "driver", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate_number: String,
    pub model: Option<String>,
    pub status: VehicleStatus,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(plate_number: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plate_number: plate_number.into(),
            model: None,
            status: VehicleStatus::Available,
            updated_at: Utc::now(),
        }
    }
}

/// `Maintenance` is set by administrators and is never cleared by dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Available,
    Busy,
    Maintenance,
}

impl VehicleStatus {
    /// Statuses the synchronizer is allowed to overwrite.
    pub const DISPATCHABLE: [VehicleStatus; 2] = [VehicleStatus::Available, VehicleStatus::Busy];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "AVAILABLE",
            VehicleStatus::Busy => "BUSY",
            VehicleStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(VehicleStatus::Available),
            "BUSY" => Ok(VehicleStatus::Busy),
            "MAINTENANCE" => Ok(VehicleStatus::Maintenance),
            other => Err(CoreError::UnknownStatus { kind: "vehicle", value: other.to_string() }),
        }
    }
}
