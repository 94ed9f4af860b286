pub mod booking;
pub mod fleet;
pub mod customer;
pub mod repository;
pub mod messaging;

pub use booking::{Booking, BookingStatus};
pub use customer::Customer;
pub use fleet::{Driver, DriverStatus, Vehicle, VehicleStatus};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CoreError {
    #[error("Unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: String },
}
