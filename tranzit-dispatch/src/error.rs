use std::fmt;
use std::time::Duration;
use uuid::Uuid;
use tranzit_core::messaging::MessagingError;
use tranzit_core::repository::StoreError;
use tranzit_core::BookingStatus;
use crate::transition::Transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Booking,
    Driver,
    Vehicle,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Booking => "booking",
            Entity::Driver => "driver",
            Entity::Vehicle => "vehicle",
        };
        f.write_str(name)
    }
}

/// Why a transition's precondition did not hold. Only used for logs and tests;
/// callers see a plain conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    UnexpectedStatus { expected: Vec<BookingStatus>, actual: BookingStatus },
    Terminal(BookingStatus),
    NotAssignedDriver,
    NotOwner,
    ResourceUnavailable(String),
    /// The precondition held when read but another request changed the row first.
    LostRace,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::UnexpectedStatus { expected, actual } => {
                let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
                write!(f, "status is {}, expected {}", actual, expected.join("|"))
            }
            ConflictReason::Terminal(status) => write!(f, "booking is already {}", status),
            ConflictReason::NotAssignedDriver => f.write_str("requester is not the assigned driver"),
            ConflictReason::NotOwner => f.write_str("requester does not own the booking"),
            ConflictReason::ResourceUnavailable(detail) => write!(f, "resource unavailable: {}", detail),
            ConflictReason::LostRace => f.write_str("booking changed concurrently"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Uuid },

    #[error("Cannot {transition} booking {booking_id}: {reason}")]
    Conflict {
        booking_id: Uuid,
        transition: Transition,
        reason: ConflictReason,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DispatchError::Conflict { .. })
    }

    pub fn conflict_reason(&self) -> Option<&ConflictReason> {
        match self {
            DispatchError::Conflict { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub(crate) fn conflict(booking_id: Uuid, transition: Transition, reason: ConflictReason) -> Self {
        DispatchError::Conflict { booking_id, transition, reason }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Driver/vehicle status could not be brought in line with a committed booking
/// transition. The transition stands; operators must reconcile.
#[derive(Debug, thiserror::Error)]
pub enum SynchronizationFailure {
    #[error("{entity} {id} referenced by the booking does not exist")]
    MissingResource { entity: Entity, id: Uuid },

    #[error("Record store error while synchronizing: {0}")]
    Store(#[from] StoreError),
}

/// A customer notification was not delivered. Logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum NotificationFailure {
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not load notification context: {0}")]
    Store(#[from] StoreError),

    #[error("Customer {0} not found")]
    MissingCustomer(Uuid),
}
