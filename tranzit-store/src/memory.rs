use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use chrono::Utc;
use uuid::Uuid;
use tranzit_core::repository::{
    BookingFilter, BookingGuard, BookingUpdate, RecordStore, ResourcePredicate, StoreResult,
};
use tranzit_core::{Booking, Customer, Driver, DriverStatus, Vehicle, VehicleStatus};

#[derive(Default)]
struct Tables {
    bookings: HashMap<Uuid, Booking>,
    drivers: HashMap<Uuid, Driver>,
    vehicles: HashMap<Uuid, Vehicle>,
    customers: HashMap<Uuid, Customer>,
    last_booking_number: i64,
}

impl Tables {
    fn references(&self, statuses: &[tranzit_core::BookingStatus], matches: impl Fn(&Booking) -> bool) -> bool {
        !statuses.is_empty()
            && self
                .bookings
                .values()
                .any(|b| statuses.contains(&b.status) && matches(b))
    }
}

/// In-process record store. All tables sit behind one lock, so each conditional
/// update observes and writes a consistent snapshot. The lock is never held
/// across an `.await`.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_customer(&self, customer: Customer) -> Customer {
        self.tables().customers.insert(customer.id, customer.clone());
        customer
    }

    pub fn insert_driver(&self, driver: Driver) -> Driver {
        self.tables().drivers.insert(driver.id, driver.clone());
        driver
    }

    pub fn insert_vehicle(&self, vehicle: Vehicle) -> Vehicle {
        self.tables().vehicles.insert(vehicle.id, vehicle.clone());
        vehicle
    }

    /// Creates a PENDING booking with the next sequential booking number.
    pub fn create_booking(&self, customer_id: Uuid) -> Booking {
        let mut tables = self.tables();
        tables.last_booking_number += 1;
        let booking = Booking::new(tables.last_booking_number, customer_id);
        tables.bookings.insert(booking.id, booking.clone());
        booking
    }

    /// Stores a booking as-is, e.g. one already assigned or in progress.
    pub fn insert_booking(&self, booking: Booking) -> Booking {
        let mut tables = self.tables();
        tables.last_booking_number = tables.last_booking_number.max(booking.booking_number);
        tables.bookings.insert(booking.id, booking.clone());
        booking
    }

    /// Administrative override, bypassing dispatch.
    pub fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> bool {
        match self.tables().drivers.get_mut(&id) {
            Some(driver) => {
                driver.status = status;
                driver.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Administrative override, bypassing dispatch.
    pub fn set_vehicle_status(&self, id: Uuid, status: VehicleStatus) -> bool {
        match self.tables().vehicles.get_mut(&id) {
            Some(vehicle) => {
                vehicle.status = status;
                vehicle.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables().bookings.get(&id).cloned())
    }

    async fn update_booking_if(
        &self,
        id: Uuid,
        guard: &BookingGuard,
        update: &BookingUpdate,
    ) -> StoreResult<u64> {
        let mut tables = self.tables();
        match tables.bookings.get_mut(&id) {
            Some(booking) if guard.matches(booking) => {
                update.apply_to(booking);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn query_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .tables()
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.booking_number);
        Ok(bookings)
    }

    async fn find_driver(&self, id: Uuid) -> StoreResult<Option<Driver>> {
        Ok(self.tables().drivers.get(&id).cloned())
    }

    async fn update_driver_if(
        &self,
        id: Uuid,
        predicate: &ResourcePredicate<DriverStatus>,
        status: DriverStatus,
    ) -> StoreResult<u64> {
        let mut tables = self.tables();
        let referenced = tables.references(&predicate.without_bookings_in, |b| b.driver_id == Some(id));
        match tables.drivers.get_mut(&id) {
            Some(driver) if predicate.allows(driver.status) && !referenced => {
                driver.status = status;
                driver.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_vehicle(&self, id: Uuid) -> StoreResult<Option<Vehicle>> {
        Ok(self.tables().vehicles.get(&id).cloned())
    }

    async fn update_vehicle_if(
        &self,
        id: Uuid,
        predicate: &ResourcePredicate<VehicleStatus>,
        status: VehicleStatus,
    ) -> StoreResult<u64> {
        let mut tables = self.tables();
        let referenced = tables.references(&predicate.without_bookings_in, |b| b.vehicle_id == Some(id));
        match tables.vehicles.get_mut(&id) {
            Some(vehicle) if predicate.allows(vehicle.status) && !referenced => {
                vehicle.status = status;
                vehicle.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        Ok(self.tables().customers.get(&id).cloned())
    }
}
