pub mod error;
pub mod request;
pub mod transition;
pub mod synchronizer;
pub mod notifier;
pub mod metrics;
pub mod machine;

pub use error::{ConflictReason, DispatchError, Entity, NotificationFailure, SynchronizationFailure};
pub use machine::{BookingStateMachine, TransitionOutcome};
pub use metrics::DispatchMetrics;
pub use notifier::NotificationDispatcher;
pub use request::Actor;
pub use synchronizer::ResourceSynchronizer;
pub use transition::Transition;
