use uuid::Uuid;

/// Published once per committed booking transition.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingTransitionedEvent {
    pub booking_id: Uuid,
    pub booking_number: i64,
    pub transition: String,
    pub from_status: String,
    pub to_status: String,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub resources_synchronized: bool,
    pub timestamp: i64,
}
