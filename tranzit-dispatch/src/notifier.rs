use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tranzit_core::messaging::{MessagePayload, Messenger, TemplateKind};
use tranzit_core::repository::RecordStore;
use tranzit_core::Booking;
use tranzit_shared::Masked;
use crate::error::NotificationFailure;
use crate::metrics::DispatchMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The customer has no messaging identity on file.
    NoRecipient,
}

/// Best-effort customer notifications. Runs after a transition has been
/// committed; nothing it does can change the transition's result.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn RecordStore>,
    messenger: Arc<dyn Messenger>,
    timeout: Duration,
    metrics: Option<DispatchMetrics>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn RecordStore>, messenger: Arc<dyn Messenger>, timeout: Duration) -> Self {
        Self { store, messenger, timeout, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fire-and-forget: the notification runs on its own task. Dropping the
    /// returned handle detaches it.
    pub fn dispatch(&self, booking: Booking, kind: TemplateKind) -> JoinHandle<Option<Delivery>> {
        let this = self.clone();
        tokio::spawn(async move { this.notify(&booking, kind).await })
    }

    /// Delivers within the configured timeout. Failures are logged and counted,
    /// never returned.
    pub async fn notify(&self, booking: &Booking, kind: TemplateKind) -> Option<Delivery> {
        let result = match tokio::time::timeout(self.timeout, self.deliver(booking, kind)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationFailure::Timeout(self.timeout)),
        };

        match result {
            Ok(delivery) => {
                debug!("Notification {} for booking {}: {:?}", kind, booking.id, delivery);
                Some(delivery)
            }
            Err(e) => {
                warn!("Notification {} for booking {} failed: {}", kind, booking.id, e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_notification_failure(kind.as_str());
                }
                None
            }
        }
    }

    pub async fn deliver(&self, booking: &Booking, kind: TemplateKind) -> Result<Delivery, NotificationFailure> {
        let customer = self
            .store
            .find_customer(booking.customer_id)
            .await?
            .ok_or(NotificationFailure::MissingCustomer(booking.customer_id))?;

        let recipient = match customer.messaging_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => return Ok(Delivery::NoRecipient),
        };

        let driver_name = match booking.driver_id {
            Some(id) => self.store.find_driver(id).await?.map(|d| d.full_name),
            None => None,
        };
        let vehicle_plate = match booking.vehicle_id {
            Some(id) => self.store.find_vehicle(id).await?.map(|v| v.plate_number),
            None => None,
        };

        let payload = MessagePayload {
            booking_id: booking.id,
            booking_number: booking.booking_number,
            status: booking.status,
            driver_name,
            vehicle_plate,
        };

        self.messenger.send_message(&recipient, kind, &payload).await?;
        info!("Sent {} for booking {} to {}", kind, booking.reference(), Masked(&recipient));
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tranzit_core::messaging::MessagingError;
    use tranzit_core::{BookingStatus, Customer, Driver, Vehicle};
    use tranzit_store::MemoryRecordStore;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, TemplateKind, MessagePayload)>>,
    }

    #[async_trait]
    impl Messenger for Recorder {
        async fn send_message(&self, recipient_id: &str, kind: TemplateKind, payload: &MessagePayload) -> Result<(), MessagingError> {
            self.sent.lock().unwrap().push((recipient_id.to_string(), kind, payload.clone()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Messenger for Failing {
        async fn send_message(&self, _: &str, _: TemplateKind, _: &MessagePayload) -> Result<(), MessagingError> {
            Err(MessagingError::Unreachable("connection refused".to_string()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Messenger for Stalled {
        async fn send_message(&self, _: &str, _: TemplateKind, _: &MessagePayload) -> Result<(), MessagingError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn assigned_booking(store: &MemoryRecordStore, messaging_id: Option<&str>) -> Booking {
        let customer = store.insert_customer(Customer::new("Elena", messaging_id.map(String::from)));
        let vehicle = store.insert_vehicle(Vehicle::new("K321MM"));
        let driver = store.insert_driver(Driver::new("Sergei Ivanov", Some(vehicle.id)));
        let mut booking = store.create_booking(customer.id);
        booking.driver_id = Some(driver.id);
        booking.vehicle_id = Some(vehicle.id);
        booking.status = BookingStatus::Confirmed;
        store.insert_booking(booking)
    }

    #[tokio::test]
    async fn test_payload_includes_driver_and_vehicle() {
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = Arc::new(Recorder::default());
        let booking = assigned_booking(&store, Some("777001"));
        let notifier = NotificationDispatcher::new(store, recorder.clone(), Duration::from_secs(1));

        let delivery = notifier.notify(&booking, TemplateKind::DriverAccepted).await;

        assert_eq!(delivery, Some(Delivery::Sent));
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "777001");
        assert_eq!(sent[0].2.driver_name.as_deref(), Some("Sergei Ivanov"));
        assert_eq!(sent[0].2.vehicle_plate.as_deref(), Some("K321MM"));
    }

    #[tokio::test]
    async fn test_customer_without_messaging_id_is_skipped() {
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = Arc::new(Recorder::default());
        let booking = assigned_booking(&store, None);
        let notifier = NotificationDispatcher::new(store, recorder.clone(), Duration::from_secs(1));

        assert_eq!(notifier.notify(&booking, TemplateKind::TripStarted).await, Some(Delivery::NoRecipient));
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_swallowed_and_counted() {
        let store = Arc::new(MemoryRecordStore::new());
        let booking = assigned_booking(&store, Some("777002"));
        let metrics = DispatchMetrics::new().unwrap();
        let notifier = NotificationDispatcher::new(store, Arc::new(Failing), Duration::from_secs(1))
            .with_metrics(metrics.clone());

        assert_eq!(notifier.notify(&booking, TemplateKind::TripCompleted).await, None);
        assert_eq!(metrics.notification_failure_count("trip_completed"), 1);
    }

    #[tokio::test]
    async fn test_stalled_messenger_times_out() {
        let store = Arc::new(MemoryRecordStore::new());
        let booking = assigned_booking(&store, Some("777003"));
        let notifier = NotificationDispatcher::new(store, Arc::new(Stalled), Duration::from_millis(200));

        let delivery = tokio::time::timeout(Duration::from_secs(5), notifier.notify(&booking, TemplateKind::TripStarted))
            .await
            .expect("notify must be bounded by its own timeout");
        assert_eq!(delivery, None);
    }

    #[tokio::test]
    async fn test_dispatch_runs_detached() {
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = Arc::new(Recorder::default());
        let booking = assigned_booking(&store, Some("777004"));
        let notifier = NotificationDispatcher::new(store, recorder.clone(), Duration::from_secs(1));

        let handle = notifier.dispatch(booking, TemplateKind::TripStarted);
        assert_eq!(handle.await.unwrap(), Some(Delivery::Sent));
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }
}
