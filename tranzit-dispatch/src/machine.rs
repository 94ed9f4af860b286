use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;
use tranzit_core::messaging::Messenger;
use tranzit_core::repository::{BookingGuard, BookingUpdate, RecordStore};
use tranzit_core::{Booking, BookingStatus, DriverStatus, VehicleStatus};
use tranzit_shared::BookingTransitionedEvent;
use crate::error::{ConflictReason, DispatchError, DispatchResult, Entity, SynchronizationFailure};
use crate::metrics::DispatchMetrics;
use crate::notifier::NotificationDispatcher;
use crate::request::{ensure_valid, Actor};
use crate::synchronizer::ResourceSynchronizer;
use crate::transition::Transition;

const EVENT_BUFFER: usize = 256;

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub booking: Booking,
    pub transition: Transition,
    pub previous_status: BookingStatus,
    /// False when the booking moved but driver/vehicle status could not be
    /// synchronized. The failure has been logged and counted.
    pub resources_synchronized: bool,
}

/// Owns the legal booking transitions and their side effects.
///
/// Each transition is one conditional update against the record store. The
/// predicate carries the status observed on read plus the requester, so of two
/// racing requests at most one can match; the loser gets a conflict and no side
/// effects run for it.
pub struct BookingStateMachine {
    store: Arc<dyn RecordStore>,
    synchronizer: ResourceSynchronizer,
    notifier: NotificationDispatcher,
    metrics: DispatchMetrics,
    events: broadcast::Sender<BookingTransitionedEvent>,
}

impl BookingStateMachine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        messenger: Arc<dyn Messenger>,
        notification_timeout: Duration,
        metrics: DispatchMetrics,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            synchronizer: ResourceSynchronizer::new(store.clone()),
            notifier: NotificationDispatcher::new(store.clone(), messenger, notification_timeout)
                .with_metrics(metrics.clone()),
            store,
            metrics,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingTransitionedEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> DispatchResult<Booking> {
        let booking_id = ensure_valid("booking_id", booking_id)?;
        self.load(booking_id).await
    }

    /// PENDING -> VEHICLE_ASSIGNED. Writes the driver and vehicle references in the
    /// same statement; neither resource changes status yet.
    pub async fn assign(
        &self,
        booking_id: Uuid,
        driver_id: Uuid,
        vehicle_id: Uuid,
        dispatcher_id: Uuid,
    ) -> DispatchResult<TransitionOutcome> {
        let result = self.assign_inner(booking_id, driver_id, vehicle_id, dispatcher_id).await;
        self.observe(Transition::Assign, &result);
        result
    }

    /// VEHICLE_ASSIGNED -> CONFIRMED, by the assigned driver.
    pub async fn accept(&self, booking_id: Uuid, driver_id: Uuid) -> DispatchResult<TransitionOutcome> {
        let result = self.driver_transition(Transition::Accept, booking_id, driver_id).await;
        self.observe(Transition::Accept, &result);
        result
    }

    /// CONFIRMED -> IN_PROGRESS, by the assigned driver.
    pub async fn start(&self, booking_id: Uuid, driver_id: Uuid) -> DispatchResult<TransitionOutcome> {
        let result = self.driver_transition(Transition::Start, booking_id, driver_id).await;
        self.observe(Transition::Start, &result);
        result
    }

    /// IN_PROGRESS -> COMPLETED, by the assigned driver.
    pub async fn complete(&self, booking_id: Uuid, driver_id: Uuid) -> DispatchResult<TransitionOutcome> {
        let result = self.driver_transition(Transition::Complete, booking_id, driver_id).await;
        self.observe(Transition::Complete, &result);
        result
    }

    /// Any non-terminal status -> CANCELLED.
    pub async fn cancel(&self, booking_id: Uuid, actor: Actor) -> DispatchResult<TransitionOutcome> {
        let result = self.cancel_inner(booking_id, actor).await;
        self.observe(Transition::Cancel, &result);
        result
    }

    async fn assign_inner(
        &self,
        booking_id: Uuid,
        driver_id: Uuid,
        vehicle_id: Uuid,
        dispatcher_id: Uuid,
    ) -> DispatchResult<TransitionOutcome> {
        let transition = Transition::Assign;
        let booking_id = ensure_valid("booking_id", booking_id)?;
        let driver_id = ensure_valid("driver_id", driver_id)?;
        let vehicle_id = ensure_valid("vehicle_id", vehicle_id)?;
        ensure_valid("dispatcher_id", dispatcher_id)?;

        let booking = self.load(booking_id).await?;
        check_source(&booking, transition)?;

        let driver = self
            .store
            .find_driver(driver_id)
            .await?
            .ok_or(DispatchError::NotFound { entity: Entity::Driver, id: driver_id })?;
        if driver.status == DriverStatus::Offline {
            return Err(DispatchError::conflict(
                booking_id,
                transition,
                ConflictReason::ResourceUnavailable(format!("driver {} is OFFLINE", driver_id)),
            ));
        }

        let vehicle = self
            .store
            .find_vehicle(vehicle_id)
            .await?
            .ok_or(DispatchError::NotFound { entity: Entity::Vehicle, id: vehicle_id })?;
        if vehicle.status == VehicleStatus::Maintenance {
            return Err(DispatchError::conflict(
                booking_id,
                transition,
                ConflictReason::ResourceUnavailable(format!("vehicle {} is in MAINTENANCE", vehicle_id)),
            ));
        }

        let guard = BookingGuard::status(booking.status);
        let updated = self
            .commit(&booking, transition, &guard, BookingUpdate::assign(driver_id, vehicle_id))
            .await?;

        info!("Dispatcher {} assigned driver {} / vehicle {} to booking {}", dispatcher_id, driver_id, vehicle_id, updated.reference());
        // The booking row itself is the reference; resource status moves at accept.
        Ok(self.finish(transition, booking.status, updated, Ok(())))
    }

    async fn driver_transition(
        &self,
        transition: Transition,
        booking_id: Uuid,
        driver_id: Uuid,
    ) -> DispatchResult<TransitionOutcome> {
        let booking_id = ensure_valid("booking_id", booking_id)?;
        let driver_id = ensure_valid("driver_id", driver_id)?;

        let booking = self.load(booking_id).await?;
        check_source(&booking, transition)?;
        if transition.requires_assigned_driver() && booking.driver_id != Some(driver_id) {
            return Err(DispatchError::conflict(booking_id, transition, ConflictReason::NotAssignedDriver));
        }

        let guard = BookingGuard::status(booking.status).with_driver(driver_id);
        let updated = self
            .commit(&booking, transition, &guard, BookingUpdate::status(transition.target()))
            .await?;

        let sync = match transition {
            Transition::Accept => self.synchronizer.on_booking_activated(driver_id).await,
            Transition::Start => match updated.vehicle_id {
                Some(vehicle_id) => self.synchronizer.on_trip_started(vehicle_id).await,
                None => Ok(()),
            },
            Transition::Complete => {
                self.synchronizer
                    .on_booking_closed(updated.driver_id, updated.vehicle_id)
                    .await
            }
            Transition::Assign | Transition::Cancel => Ok(()),
        };

        Ok(self.finish(transition, booking.status, updated, sync))
    }

    async fn cancel_inner(&self, booking_id: Uuid, actor: Actor) -> DispatchResult<TransitionOutcome> {
        let transition = Transition::Cancel;
        let booking_id = ensure_valid("booking_id", booking_id)?;
        ensure_valid("actor id", actor.id())?;

        let booking = self.load(booking_id).await?;
        check_source(&booking, transition)?;

        let guard = match actor {
            Actor::Customer(id) => {
                if booking.customer_id != id {
                    return Err(DispatchError::conflict(booking_id, transition, ConflictReason::NotOwner));
                }
                BookingGuard::status(booking.status).with_customer(id)
            }
            Actor::Driver(id) => {
                if booking.driver_id != Some(id) {
                    return Err(DispatchError::conflict(booking_id, transition, ConflictReason::NotAssignedDriver));
                }
                BookingGuard::status(booking.status).with_driver(id)
            }
            Actor::Dispatcher(_) => BookingGuard::status(booking.status),
        };

        let updated = self
            .commit(&booking, transition, &guard, BookingUpdate::status(transition.target()))
            .await?;

        let sync = if booking.status == BookingStatus::Pending {
            Ok(())
        } else {
            self.synchronizer
                .on_booking_closed(updated.driver_id, updated.vehicle_id)
                .await
        };

        info!("Booking {} cancelled by {:?}", updated.reference(), actor);
        Ok(self.finish(transition, booking.status, updated, sync))
    }

    async fn load(&self, booking_id: Uuid) -> DispatchResult<Booking> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or(DispatchError::NotFound { entity: Entity::Booking, id: booking_id })
    }

    /// Applies the conditional update. Zero rows means the row vanished or another
    /// request moved it after we read it.
    async fn commit(
        &self,
        booking: &Booking,
        transition: Transition,
        guard: &BookingGuard,
        mut update: BookingUpdate,
    ) -> DispatchResult<Booking> {
        update.updated_at = Utc::now();
        let rows = self.store.update_booking_if(booking.id, guard, &update).await?;

        if rows == 0 {
            return match self.store.find_booking(booking.id).await? {
                None => Err(DispatchError::NotFound { entity: Entity::Booking, id: booking.id }),
                Some(_) => Err(DispatchError::conflict(booking.id, transition, ConflictReason::LostRace)),
            };
        }

        let mut updated = booking.clone();
        update.apply_to(&mut updated);
        Ok(updated)
    }

    /// Post-commit: record sync result, publish the event, fire the notification.
    /// Nothing here can fail the transition.
    fn finish(
        &self,
        transition: Transition,
        previous_status: BookingStatus,
        booking: Booking,
        sync: Result<(), SynchronizationFailure>,
    ) -> TransitionOutcome {
        let resources_synchronized = match sync {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "SYNC FAILURE: booking {} moved {} -> {} but resources were not updated: {}",
                    booking.id, previous_status, booking.status, e
                );
                self.metrics.record_sync_failure(transition.as_str());
                false
            }
        };

        info!("Booking {} {}: {} -> {}", booking.reference(), transition, previous_status, booking.status);

        // No subscribers is fine
        let _ = self.events.send(BookingTransitionedEvent {
            booking_id: booking.id,
            booking_number: booking.booking_number,
            transition: transition.as_str().to_string(),
            from_status: previous_status.as_str().to_string(),
            to_status: booking.status.as_str().to_string(),
            driver_id: booking.driver_id,
            vehicle_id: booking.vehicle_id,
            resources_synchronized,
            timestamp: booking.updated_at.timestamp(),
        });

        if let Some(kind) = transition.template() {
            self.notifier.dispatch(booking.clone(), kind);
        }

        TransitionOutcome { booking, transition, previous_status, resources_synchronized }
    }

    fn observe(&self, transition: Transition, result: &DispatchResult<TransitionOutcome>) {
        let outcome = match result {
            Ok(_) => "committed",
            Err(DispatchError::Conflict { booking_id, reason, .. }) => {
                warn!("Rejected {} on booking {}: {}", transition, booking_id, reason);
                "conflict"
            }
            Err(DispatchError::NotFound { entity, id }) => {
                warn!("Rejected {}: {} {} not found", transition, entity, id);
                "not_found"
            }
            Err(DispatchError::InvalidRequest(msg)) => {
                warn!("Rejected {}: {}", transition, msg);
                "invalid"
            }
            Err(DispatchError::Store(e)) => {
                error!("{} failed on the record store: {}", transition, e);
                "error"
            }
        };
        self.metrics.record_transition(transition.as_str(), outcome);
    }
}

fn check_source(booking: &Booking, transition: Transition) -> DispatchResult<()> {
    if transition.sources().contains(&booking.status) {
        return Ok(());
    }
    let reason = if booking.status.is_terminal() {
        ConflictReason::Terminal(booking.status)
    } else {
        ConflictReason::UnexpectedStatus {
            expected: transition.sources().to_vec(),
            actual: booking.status,
        }
    };
    Err(DispatchError::conflict(booking.id, transition, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tranzit_core::messaging::LogMessenger;
    use tranzit_core::{Customer, Driver, Vehicle};
    use tranzit_store::MemoryRecordStore;

    fn machine(store: Arc<MemoryRecordStore>) -> BookingStateMachine {
        BookingStateMachine::new(
            store,
            Arc::new(LogMessenger),
            Duration::from_secs(1),
            DispatchMetrics::new().unwrap(),
        )
    }

    #[test]
    fn test_check_source_classifies_terminal() {
        let mut booking = Booking::new(1, Uuid::new_v4());
        booking.status = BookingStatus::Completed;
        let err = check_source(&booking, Transition::Cancel).unwrap_err();
        assert_eq!(err.conflict_reason(), Some(&ConflictReason::Terminal(BookingStatus::Completed)));
    }

    #[test]
    fn test_check_source_classifies_wrong_status() {
        let booking = Booking::new(1, Uuid::new_v4());
        let err = check_source(&booking, Transition::Start).unwrap_err();
        assert_eq!(
            err.conflict_reason(),
            Some(&ConflictReason::UnexpectedStatus {
                expected: vec![BookingStatus::Confirmed],
                actual: BookingStatus::Pending,
            })
        );
    }

    #[tokio::test]
    async fn test_nil_ids_rejected_before_storage() {
        let store = Arc::new(MemoryRecordStore::new());
        let machine = machine(store);
        let err = machine.accept(Uuid::nil(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
        assert_eq!(machine.metrics().transition_count("accept", "invalid"), 1);
    }

    #[tokio::test]
    async fn test_assign_rejects_offline_driver_and_maintenance_vehicle() {
        let store = Arc::new(MemoryRecordStore::new());
        let customer = store.insert_customer(Customer::new("Olga", None));
        let vehicle = store.insert_vehicle(Vehicle::new("M001MM"));
        let driver = store.insert_driver(Driver::new("Igor", Some(vehicle.id)));
        let booking = store.create_booking(customer.id);
        let machine = machine(store.clone());

        store.set_driver_status(driver.id, DriverStatus::Offline);
        let err = machine.assign(booking.id, driver.id, vehicle.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err.conflict_reason(), Some(ConflictReason::ResourceUnavailable(_))));

        store.set_driver_status(driver.id, DriverStatus::Available);
        store.set_vehicle_status(vehicle.id, VehicleStatus::Maintenance);
        let err = machine.assign(booking.id, driver.id, vehicle.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err.conflict_reason(), Some(ConflictReason::ResourceUnavailable(_))));

        let stored = store.find_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_assign_unknown_driver_is_not_found() {
        let store = Arc::new(MemoryRecordStore::new());
        let booking = store.create_booking(Uuid::new_v4());
        let vehicle = store.insert_vehicle(Vehicle::new("H404HH"));
        let machine = machine(store);

        let err = machine.assign(booking.id, Uuid::new_v4(), vehicle.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { entity: Entity::Driver, .. }));
    }

    #[tokio::test]
    async fn test_transitions_are_broadcast() {
        let store = Arc::new(MemoryRecordStore::new());
        let customer = store.insert_customer(Customer::new("Olga", None));
        let vehicle = store.insert_vehicle(Vehicle::new("M002MM"));
        let driver = store.insert_driver(Driver::new("Igor", Some(vehicle.id)));
        let booking = store.create_booking(customer.id);
        let machine = machine(store);
        let mut events = machine.subscribe();

        machine.assign(booking.id, driver.id, vehicle.id, Uuid::new_v4()).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.booking_id, booking.id);
        assert_eq!(event.transition, "assign");
        assert_eq!(event.from_status, "PENDING");
        assert_eq!(event.to_status, "VEHICLE_ASSIGNED");
        assert!(event.resources_synchronized);
    }
}
