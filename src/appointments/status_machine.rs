use crate::appointments::models::AppointmentStatus;

/// Status rules for partial updates.
///
/// `cancel` and `reschedule` are explicit operations and set their state
/// directly; this machine only governs a `status` field sent to update.
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status change through update is valid
    ///
    /// # Valid Transitions
    /// - Pending → Completed, Cancelled, Rescheduled
    /// - Rescheduled → Completed, Cancelled
    /// - Completed, Cancelled → (none)
    /// - Any status → Same status (idempotent)
    pub fn is_valid_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
        if from == to {
            return true;
        }

        match (from, to) {
            (_, AppointmentStatus::Pending) => false,

            (AppointmentStatus::Pending, _) => true,

            (AppointmentStatus::Rescheduled, AppointmentStatus::Completed) => true,
            (AppointmentStatus::Rescheduled, AppointmentStatus::Cancelled) => true,

            // Completed and Cancelled are final for update
            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    pub fn transition(
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<AppointmentStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!(
                "Cannot change appointment status from {} to {}",
                from, to
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn test_pending_moves_anywhere_forward() {
        assert!(StatusMachine::is_valid_transition(Pending, Completed));
        assert!(StatusMachine::is_valid_transition(Pending, Cancelled));
        assert!(StatusMachine::is_valid_transition(Pending, Rescheduled));
    }

    #[test]
    fn test_rescheduled_can_finish_or_cancel() {
        assert!(StatusMachine::is_valid_transition(Rescheduled, Completed));
        assert!(StatusMachine::is_valid_transition(Rescheduled, Cancelled));
    }

    #[test]
    fn test_nothing_returns_to_pending() {
        assert!(!StatusMachine::is_valid_transition(Completed, Pending));
        assert!(!StatusMachine::is_valid_transition(Cancelled, Pending));
        assert!(!StatusMachine::is_valid_transition(Rescheduled, Pending));
    }

    #[test]
    fn test_cancelled_is_not_resurrected() {
        assert!(!StatusMachine::is_valid_transition(Cancelled, Completed));
        assert!(!StatusMachine::is_valid_transition(Cancelled, Rescheduled));
    }

    #[test]
    fn test_completed_is_final() {
        assert!(!StatusMachine::is_valid_transition(Completed, Cancelled));
        assert!(!StatusMachine::is_valid_transition(Completed, Rescheduled));
    }

    #[test]
    fn test_transition_valid() {
        assert_eq!(StatusMachine::transition(Pending, Completed), Ok(Completed));
    }

    #[test]
    fn test_transition_invalid() {
        let result = StatusMachine::transition(Cancelled, Completed);
        assert!(result.unwrap_err().contains("from cancelled to completed"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn status_strategy() -> impl Strategy<Value = AppointmentStatus> {
        prop_oneof![
            Just(AppointmentStatus::Pending),
            Just(AppointmentStatus::Completed),
            Just(AppointmentStatus::Cancelled),
            Just(AppointmentStatus::Rescheduled),
        ]
    }

    proptest! {
        /// Same status transitions are always valid (idempotent)
        #[test]
        fn prop_same_status_is_valid(status in status_strategy()) {
            prop_assert!(StatusMachine::is_valid_transition(status, status));
        }

        /// Only Pending itself may be "moved" to Pending
        #[test]
        fn prop_pending_is_never_reentered(from in status_strategy()) {
            prop_assert_eq!(
                StatusMachine::is_valid_transition(from, AppointmentStatus::Pending),
                from == AppointmentStatus::Pending
            );
        }

        /// Terminal states accept nothing but themselves
        #[test]
        fn prop_terminal_states(to in status_strategy()) {
            for terminal in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
                prop_assert_eq!(StatusMachine::is_valid_transition(terminal, to), terminal == to);
            }
        }

        /// transition() and is_valid_transition() agree
        #[test]
        fn prop_transition_consistency(from in status_strategy(), to in status_strategy()) {
            let valid = StatusMachine::is_valid_transition(from, to);
            match StatusMachine::transition(from, to) {
                Ok(next) => {
                    prop_assert!(valid);
                    prop_assert_eq!(next, to);
                }
                Err(_) => prop_assert!(!valid),
            }
        }
    }
}
