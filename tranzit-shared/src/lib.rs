pub mod pii;
pub mod models;

pub use models::events::BookingTransitionedEvent;
pub use pii::Masked;
