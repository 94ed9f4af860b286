use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::booking::{Booking, BookingStatus};
use crate::customer::Customer;
use crate::fleet::{Driver, DriverStatus, Vehicle, VehicleStatus};
use crate::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Stored record is corrupt: {0}")]
    Corrupt(#[from] CoreError),
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Predicate a booking row must satisfy at write time for a conditional update to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingGuard {
    pub status: BookingStatus,
    pub driver_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

impl BookingGuard {
    pub fn status(status: BookingStatus) -> Self {
        Self { status, driver_id: None, customer_id: None }
    }

    pub fn with_driver(mut self, driver_id: Uuid) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        booking.status == self.status
            && self.driver_id.map_or(true, |d| booking.driver_id == Some(d))
            && self.customer_id.map_or(true, |c| booking.customer_id == c)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
}

/// New values written by a conditional booking update.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingUpdate {
    pub status: BookingStatus,
    pub assignment: Option<Assignment>,
    pub updated_at: DateTime<Utc>,
}

impl BookingUpdate {
    pub fn status(status: BookingStatus) -> Self {
        Self { status, assignment: None, updated_at: Utc::now() }
    }

    pub fn assign(driver_id: Uuid, vehicle_id: Uuid) -> Self {
        Self {
            status: BookingStatus::VehicleAssigned,
            assignment: Some(Assignment { driver_id, vehicle_id }),
            updated_at: Utc::now(),
        }
    }

    pub fn apply_to(&self, booking: &mut Booking) {
        booking.status = self.status;
        if let Some(assignment) = self.assignment {
            booking.driver_id = Some(assignment.driver_id);
            booking.vehicle_id = Some(assignment.vehicle_id);
        }
        booking.updated_at = self.updated_at;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    /// Empty means any status.
    pub statuses: Vec<BookingStatus>,
}

impl BookingFilter {
    pub fn active_for_driver(driver_id: Uuid) -> Self {
        Self {
            driver_id: Some(driver_id),
            vehicle_id: None,
            statuses: BookingStatus::ACTIVE.to_vec(),
        }
    }

    pub fn in_progress_for_vehicle(vehicle_id: Uuid) -> Self {
        Self {
            driver_id: None,
            vehicle_id: Some(vehicle_id),
            statuses: vec![BookingStatus::InProgress],
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.driver_id.map_or(true, |d| booking.driver_id == Some(d))
            && self.vehicle_id.map_or(true, |v| booking.vehicle_id == Some(v))
            && (self.statuses.is_empty() || self.statuses.contains(&booking.status))
    }
}

/// Predicate for a driver/vehicle status write: the current status must be one of
/// `statuses`, and no booking in `without_bookings_in` may reference the resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePredicate<S> {
    pub statuses: Vec<S>,
    pub without_bookings_in: Vec<BookingStatus>,
}

impl<S: PartialEq + Copy> ResourcePredicate<S> {
    pub fn any_of(statuses: &[S]) -> Self {
        Self { statuses: statuses.to_vec(), without_bookings_in: Vec::new() }
    }

    pub fn idle(mut self, statuses: &[BookingStatus]) -> Self {
        self.without_bookings_in = statuses.to_vec();
        self
    }

    pub fn allows(&self, current: S) -> bool {
        self.statuses.contains(&current)
    }
}

/// Transactional record store holding bookings, drivers, vehicles and customers.
///
/// Every `update_*_if` call is a single atomic conditional write and returns the
/// number of rows it changed (0 or 1).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn update_booking_if(
        &self,
        id: Uuid,
        guard: &BookingGuard,
        update: &BookingUpdate,
    ) -> StoreResult<u64>;

    async fn query_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>>;

    async fn count_bookings(&self, filter: &BookingFilter) -> StoreResult<u64> {
        Ok(self.query_bookings(filter).await?.len() as u64)
    }

    async fn find_driver(&self, id: Uuid) -> StoreResult<Option<Driver>>;

    async fn update_driver_if(
        &self,
        id: Uuid,
        predicate: &ResourcePredicate<DriverStatus>,
        status: DriverStatus,
    ) -> StoreResult<u64>;

    async fn find_vehicle(&self, id: Uuid) -> StoreResult<Option<Vehicle>>;

    async fn update_vehicle_if(
        &self,
        id: Uuid,
        predicate: &ResourcePredicate<VehicleStatus>,
        status: VehicleStatus,
    ) -> StoreResult<u64>;

    async fn find_customer(&self, id: Uuid) -> StoreResult<Option<Customer>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_matches_status_and_driver() {
        let driver = Uuid::new_v4();
        let mut booking = Booking::new(1, Uuid::new_v4());
        booking.status = BookingStatus::VehicleAssigned;
        booking.driver_id = Some(driver);

        assert!(BookingGuard::status(BookingStatus::VehicleAssigned).with_driver(driver).matches(&booking));
        assert!(!BookingGuard::status(BookingStatus::Confirmed).with_driver(driver).matches(&booking));
        assert!(!BookingGuard::status(BookingStatus::VehicleAssigned).with_driver(Uuid::new_v4()).matches(&booking));
        assert!(!BookingGuard::status(BookingStatus::VehicleAssigned).with_customer(Uuid::new_v4()).matches(&booking));
    }

    #[test]
    fn test_filter_for_active_driver_bookings() {
        let driver = Uuid::new_v4();
        let filter = BookingFilter::active_for_driver(driver);
        let mut booking = Booking::new(2, Uuid::new_v4());
        booking.driver_id = Some(driver);

        assert!(!filter.matches(&booking));
        booking.status = BookingStatus::InProgress;
        assert!(filter.matches(&booking));
        booking.status = BookingStatus::Completed;
        assert!(!filter.matches(&booking));
    }

    #[test]
    fn test_assign_update_sets_references() {
        let (driver, vehicle) = (Uuid::new_v4(), Uuid::new_v4());
        let mut booking = Booking::new(3, Uuid::new_v4());
        BookingUpdate::assign(driver, vehicle).apply_to(&mut booking);

        assert_eq!(booking.status, BookingStatus::VehicleAssigned);
        assert_eq!(booking.driver_id, Some(driver));
        assert_eq!(booking.vehicle_id, Some(vehicle));
        assert!(booking.is_assignment_consistent());
    }
}
