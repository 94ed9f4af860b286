use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use tranzit_core::repository::{BookingFilter, RecordStore, ResourcePredicate};
use tranzit_core::{BookingStatus, DriverStatus, VehicleStatus};
use crate::error::{Entity, SynchronizationFailure};

/// Keeps driver and vehicle status in line with the set of active bookings.
///
/// Status on the resource rows is treated as a cache of the booking set: each
/// write is a conditional update whose predicate re-checks the bookings, so a
/// concurrent activation can never be overwritten by a stale release. Booking
/// rows are only read here, never written.
#[derive(Clone)]
pub struct ResourceSynchronizer {
    store: Arc<dyn RecordStore>,
}

impl ResourceSynchronizer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Accept: the driver is now committed to a booking.
    pub async fn on_booking_activated(&self, driver_id: Uuid) -> Result<(), SynchronizationFailure> {
        let rows = self
            .store
            .update_driver_if(driver_id, &ResourcePredicate::any_of(&DriverStatus::ALL), DriverStatus::Busy)
            .await?;

        if rows == 0 {
            return Err(SynchronizationFailure::MissingResource { entity: Entity::Driver, id: driver_id });
        }
        debug!("Driver {} marked BUSY", driver_id);

        // A cancel may have closed the booking between its commit and this write,
        // releasing a driver that was not yet BUSY.
        let active = self
            .store
            .count_bookings(&BookingFilter::active_for_driver(driver_id))
            .await?;
        if active == 0 {
            warn!("Driver {} has no active booking after activation; releasing", driver_id);
            return self.release_driver(driver_id).await;
        }
        Ok(())
    }

    /// Start: the vehicle is on the road.
    pub async fn on_trip_started(&self, vehicle_id: Uuid) -> Result<(), SynchronizationFailure> {
        let rows = self
            .store
            .update_vehicle_if(
                vehicle_id,
                &ResourcePredicate::any_of(&VehicleStatus::DISPATCHABLE),
                VehicleStatus::Busy,
            )
            .await?;

        if rows == 0 {
            match self.store.find_vehicle(vehicle_id).await? {
                None => {
                    return Err(SynchronizationFailure::MissingResource { entity: Entity::Vehicle, id: vehicle_id })
                }
                Some(vehicle) => {
                    warn!("Vehicle {} started a trip while {}; status left unchanged", vehicle_id, vehicle.status)
                }
            }
        } else {
            debug!("Vehicle {} marked BUSY", vehicle_id);
        }
        Ok(())
    }

    /// Complete or cancel: release whatever the booking was holding. Both resources
    /// are attempted even if the first one fails; the first failure is returned.
    pub async fn on_booking_closed(
        &self,
        driver_id: Option<Uuid>,
        vehicle_id: Option<Uuid>,
    ) -> Result<(), SynchronizationFailure> {
        let vehicle_result = match vehicle_id {
            Some(id) => self.release_vehicle(id).await,
            None => Ok(()),
        };
        let driver_result = match driver_id {
            Some(id) => self.release_driver(id).await,
            None => Ok(()),
        };
        vehicle_result.and(driver_result)
    }

    /// Restores AVAILABLE once no IN_PROGRESS booking references the vehicle.
    /// MAINTENANCE is never overwritten.
    pub async fn release_vehicle(&self, vehicle_id: Uuid) -> Result<(), SynchronizationFailure> {
        let in_use = self
            .store
            .count_bookings(&BookingFilter::in_progress_for_vehicle(vehicle_id))
            .await?;
        if in_use > 0 {
            debug!("Vehicle {} still serves {} trip(s); leaving BUSY", vehicle_id, in_use);
            return Ok(());
        }

        let predicate = ResourcePredicate::any_of(&VehicleStatus::DISPATCHABLE).idle(&[BookingStatus::InProgress]);
        let rows = self
            .store
            .update_vehicle_if(vehicle_id, &predicate, VehicleStatus::Available)
            .await?;

        if rows == 0 {
            match self.store.find_vehicle(vehicle_id).await? {
                None => {
                    return Err(SynchronizationFailure::MissingResource { entity: Entity::Vehicle, id: vehicle_id })
                }
                Some(vehicle) => debug!("Vehicle {} left {}", vehicle_id, vehicle.status),
            }
        } else {
            debug!("Vehicle {} marked AVAILABLE", vehicle_id);
        }
        Ok(())
    }

    /// Restores AVAILABLE for a BUSY driver once the active-booking count is zero.
    /// AVAILABLE and OFFLINE are left alone.
    pub async fn release_driver(&self, driver_id: Uuid) -> Result<(), SynchronizationFailure> {
        let active = self
            .store
            .count_bookings(&BookingFilter::active_for_driver(driver_id))
            .await?;
        if active > 0 {
            debug!("Driver {} still holds {} active booking(s); leaving status", driver_id, active);
            return Ok(());
        }

        let predicate = ResourcePredicate::any_of(&[DriverStatus::Busy]).idle(&BookingStatus::ACTIVE);
        let rows = self
            .store
            .update_driver_if(driver_id, &predicate, DriverStatus::Available)
            .await?;

        if rows == 0 {
            match self.store.find_driver(driver_id).await? {
                None => {
                    return Err(SynchronizationFailure::MissingResource { entity: Entity::Driver, id: driver_id })
                }
                Some(driver) => debug!("Driver {} left {}", driver_id, driver.status),
            }
        } else {
            debug!("Driver {} marked AVAILABLE", driver_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tranzit_core::{Booking, Driver, Vehicle};
    use tranzit_store::MemoryRecordStore;

    fn setup() -> (Arc<MemoryRecordStore>, ResourceSynchronizer) {
        let store = Arc::new(MemoryRecordStore::new());
        let sync = ResourceSynchronizer::new(store.clone());
        (store, sync)
    }

    fn active_booking(store: &MemoryRecordStore, driver: Uuid, vehicle: Uuid, status: BookingStatus) -> Booking {
        let mut booking = Booking::new(0, Uuid::new_v4());
        booking.driver_id = Some(driver);
        booking.vehicle_id = Some(vehicle);
        booking.status = status;
        store.insert_booking(booking)
    }

    #[tokio::test]
    async fn test_activation_marks_driver_busy() {
        let (store, sync) = setup();
        let driver = store.insert_driver(Driver::new("Oleg", None));
        active_booking(&store, driver.id, Uuid::new_v4(), BookingStatus::Confirmed);

        sync.on_booking_activated(driver.id).await.unwrap();

        let stored = store.find_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DriverStatus::Busy);
    }

    #[tokio::test]
    async fn test_activation_after_close_releases_again() {
        let (store, sync) = setup();
        let driver = store.insert_driver(Driver::new("Oleg", None));
        active_booking(&store, driver.id, Uuid::new_v4(), BookingStatus::Cancelled);

        sync.on_booking_activated(driver.id).await.unwrap();

        let stored = store.find_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DriverStatus::Available);
    }

    #[tokio::test]
    async fn test_activation_of_missing_driver_fails() {
        let (_store, sync) = setup();
        let err = sync.on_booking_activated(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SynchronizationFailure::MissingResource { entity: Entity::Driver, .. }));
    }

    #[tokio::test]
    async fn test_trip_start_keeps_maintenance() {
        let (store, sync) = setup();
        let vehicle = store.insert_vehicle(Vehicle::new("C001AA"));
        store.set_vehicle_status(vehicle.id, VehicleStatus::Maintenance);

        sync.on_trip_started(vehicle.id).await.unwrap();

        let stored = store.find_vehicle(vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VehicleStatus::Maintenance);
    }

    #[tokio::test]
    async fn test_release_driver_with_remaining_booking() {
        let (store, sync) = setup();
        let driver = store.insert_driver(Driver::new("Maria", None));
        store.set_driver_status(driver.id, DriverStatus::Busy);
        active_booking(&store, driver.id, Uuid::new_v4(), BookingStatus::VehicleAssigned);

        sync.release_driver(driver.id).await.unwrap();

        let stored = store.find_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DriverStatus::Busy);
    }

    #[tokio::test]
    async fn test_release_driver_keeps_offline() {
        let (store, sync) = setup();
        let driver = store.insert_driver(Driver::new("Pavel", None));
        store.set_driver_status(driver.id, DriverStatus::Offline);

        sync.release_driver(driver.id).await.unwrap();

        let stored = store.find_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DriverStatus::Offline);
    }

    #[tokio::test]
    async fn test_release_vehicle_shared_by_running_trip() {
        let (store, sync) = setup();
        let vehicle = store.insert_vehicle(Vehicle::new("E555KX"));
        store.set_vehicle_status(vehicle.id, VehicleStatus::Busy);
        active_booking(&store, Uuid::new_v4(), vehicle.id, BookingStatus::InProgress);

        sync.release_vehicle(vehicle.id).await.unwrap();

        let stored = store.find_vehicle(vehicle.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VehicleStatus::Busy);
    }

    #[tokio::test]
    async fn test_closed_reports_missing_vehicle_but_releases_driver() {
        let (store, sync) = setup();
        let driver = store.insert_driver(Driver::new("Nina", None));
        store.set_driver_status(driver.id, DriverStatus::Busy);

        let err = sync
            .on_booking_closed(Some(driver.id), Some(Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, SynchronizationFailure::MissingResource { entity: Entity::Vehicle, .. }));
        let stored = store.find_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DriverStatus::Available);
    }
}
