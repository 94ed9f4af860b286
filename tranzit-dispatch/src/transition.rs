use std::fmt;
use tranzit_core::messaging::TemplateKind;
use tranzit_core::BookingStatus;

/// A named edge of the booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Assign,
    Accept,
    Start,
    Complete,
    Cancel,
}

impl Transition {
    pub const ALL: [Transition; 5] = [
        Transition::Assign,
        Transition::Accept,
        Transition::Start,
        Transition::Complete,
        Transition::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Assign => "assign",
            Transition::Accept => "accept",
            Transition::Start => "start",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
        }
    }

    /// Statuses this transition may start from.
    pub fn sources(&self) -> &'static [BookingStatus] {
        match self {
            Transition::Assign => &[BookingStatus::Pending],
            Transition::Accept => &[BookingStatus::VehicleAssigned],
            Transition::Start => &[BookingStatus::Confirmed],
            Transition::Complete => &[BookingStatus::InProgress],
            Transition::Cancel => &BookingStatus::NON_TERMINAL,
        }
    }

    pub fn target(&self) -> BookingStatus {
        match self {
            Transition::Assign => BookingStatus::VehicleAssigned,
            Transition::Accept => BookingStatus::Confirmed,
            Transition::Start => BookingStatus::InProgress,
            Transition::Complete => BookingStatus::Completed,
            Transition::Cancel => BookingStatus::Cancelled,
        }
    }

    /// Driver-initiated transitions are only legal for the assigned driver.
    pub fn requires_assigned_driver(&self) -> bool {
        matches!(self, Transition::Accept | Transition::Start | Transition::Complete)
    }

    pub fn template(&self) -> Option<TemplateKind> {
        match self {
            Transition::Assign => None,
            Transition::Accept => Some(TemplateKind::DriverAccepted),
            Transition::Start => Some(TemplateKind::TripStarted),
            Transition::Complete => Some(TemplateKind::TripCompleted),
            Transition::Cancel => Some(TemplateKind::BookingCancelled),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_edge_is_a_legal_status_transition() {
        for transition in Transition::ALL {
            for source in transition.sources() {
                assert!(
                    source.can_transition_to(transition.target()),
                    "{} from {} is not a lifecycle edge",
                    transition,
                    source
                );
            }
        }
    }

    #[test]
    fn test_no_transition_leaves_a_terminal_status() {
        for transition in Transition::ALL {
            assert!(transition.sources().iter().all(|s| !s.is_terminal()));
        }
    }

    #[test]
    fn test_only_driver_steps_require_the_assigned_driver() {
        let driver_steps: Vec<_> = Transition::ALL
            .into_iter()
            .filter(|t| t.requires_assigned_driver())
            .collect();
        assert_eq!(driver_steps, vec![Transition::Accept, Transition::Start, Transition::Complete]);
    }

    #[test]
    fn test_assign_sends_no_notification() {
        assert_eq!(Transition::Assign.template(), None);
        assert_eq!(Transition::Complete.template(), Some(TemplateKind::TripCompleted));
    }
}
