//! Donation payment lifecycle state machine
//!
//! All status decisions live in one I/O-free transition function so the
//! webhook and retry paths cannot disagree about what a callback means.

use serde::{Deserialize, Serialize};

// ============================================================================
// Donation Status
// ============================================================================

/// Donation payment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    /// Awaiting payment, or awaiting a fresh attempt
    Pending,
    /// Payment confirmed by the gateway; receipt issued
    Completed,
    /// Last attempt failed; donor may retry
    Failed,
    /// Money returned to the donor
    Refunded,
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DonationStatus::Pending => write!(f, "pending"),
            DonationStatus::Completed => write!(f, "completed"),
            DonationStatus::Failed => write!(f, "failed"),
            DonationStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl DonationStatus {
    /// Terminal states absorb every later callback without side effects.
    /// `Failed` is not terminal: a late success callback or a donor retry may
    /// still move it forward.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DonationStatus::Completed | DonationStatus::Refunded)
    }

    /// Whether a donor-initiated retry is permitted from this state.
    pub fn allows_retry(&self) -> bool {
        matches!(self, DonationStatus::Pending | DonationStatus::Failed)
    }

    /// Convert from database status string
    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "pending" => Some(DonationStatus::Pending),
            "completed" => Some(DonationStatus::Completed),
            "failed" => Some(DonationStatus::Failed),
            "refunded" => Some(DonationStatus::Refunded),
            _ => None,
        }
    }

    /// Convert to database status string
    pub fn to_db_status(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Completed => "completed",
            DonationStatus::Failed => "failed",
            DonationStatus::Refunded => "refunded",
        }
    }
}

// ============================================================================
// Lifecycle Events and Transitions
// ============================================================================

/// An external occurrence the lifecycle must react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Gateway callback mapped to a successful payment
    CallbackCompleted,
    /// Gateway callback mapped to a failed payment
    CallbackFailed,
    /// Gateway callback with an in-progress or unknown status
    CallbackPending,
    /// Donor asked for a fresh payment attempt
    RetryInitiated,
}

/// Consequences the caller must carry out after a transition.
///
/// `AssignReceiptNumber` and `RecordFailureReason` shape the row update
/// itself; the remaining effects run after the donation is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Stamp the completion time and issue a receipt number
    AssignReceiptNumber,
    /// Store the donor-presentable failure reason
    RecordFailureReason,
    /// Clear failure state and bind the new bill for a fresh attempt
    ResetForRetry,
    /// Add the donation amount to the project's raised total
    IncrementProjectTotal,
    /// Notify the admin channel about the completed donation
    NotifyAdmin,
    /// Render and email the donor's receipt
    SendReceiptEmail,
}

/// Outcome of applying an event to a status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: DonationStatus,
    pub effects: Vec<SideEffect>,
}

impl Transition {
    fn absorbed(current: DonationStatus) -> Self {
        Self {
            next: current,
            effects: vec![],
        }
    }
}

/// Applies one lifecycle event to the current status.
///
/// Terminal states absorb every event: the status stays put and no side
/// effects are produced, which is what makes duplicate success callbacks
/// harmless. Completion side effects are produced exactly once, on the
/// transition into `Completed`.
pub fn transition(current: DonationStatus, event: LifecycleEvent) -> Transition {
    if current.is_terminal() {
        return Transition::absorbed(current);
    }

    match event {
        LifecycleEvent::CallbackCompleted => Transition {
            next: DonationStatus::Completed,
            effects: vec![
                SideEffect::AssignReceiptNumber,
                SideEffect::IncrementProjectTotal,
                SideEffect::NotifyAdmin,
                SideEffect::SendReceiptEmail,
            ],
        },
        LifecycleEvent::CallbackFailed => Transition {
            next: DonationStatus::Failed,
            effects: vec![SideEffect::RecordFailureReason],
        },
        // In-progress callbacks park the donation back at pending even if
        // the previous attempt had failed; the newest gateway word wins.
        LifecycleEvent::CallbackPending => Transition {
            next: DonationStatus::Pending,
            effects: vec![],
        },
        LifecycleEvent::RetryInitiated => Transition {
            next: DonationStatus::Pending,
            effects: vec![SideEffect::ResetForRetry],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_absorbs_every_event() {
        for event in [
            LifecycleEvent::CallbackCompleted,
            LifecycleEvent::CallbackFailed,
            LifecycleEvent::CallbackPending,
            LifecycleEvent::RetryInitiated,
        ] {
            let t = transition(DonationStatus::Completed, event);
            assert_eq!(t.next, DonationStatus::Completed);
            assert!(t.effects.is_empty());
        }
    }

    #[test]
    fn refunded_absorbs_every_event() {
        for event in [
            LifecycleEvent::CallbackCompleted,
            LifecycleEvent::CallbackFailed,
            LifecycleEvent::CallbackPending,
            LifecycleEvent::RetryInitiated,
        ] {
            let t = transition(DonationStatus::Refunded, event);
            assert_eq!(t.next, DonationStatus::Refunded);
            assert!(t.effects.is_empty());
        }
    }

    #[test]
    fn completion_carries_all_side_effects_in_order() {
        let t = transition(DonationStatus::Pending, LifecycleEvent::CallbackCompleted);
        assert_eq!(t.next, DonationStatus::Completed);
        assert_eq!(
            t.effects,
            vec![
                SideEffect::AssignReceiptNumber,
                SideEffect::IncrementProjectTotal,
                SideEffect::NotifyAdmin,
                SideEffect::SendReceiptEmail,
            ]
        );
    }

    #[test]
    fn failed_donation_can_still_complete() {
        let t = transition(DonationStatus::Failed, LifecycleEvent::CallbackCompleted);
        assert_eq!(t.next, DonationStatus::Completed);
        assert!(t.effects.contains(&SideEffect::AssignReceiptNumber));
    }

    #[test]
    fn failure_records_a_reason() {
        let t = transition(DonationStatus::Pending, LifecycleEvent::CallbackFailed);
        assert_eq!(t.next, DonationStatus::Failed);
        assert_eq!(t.effects, vec![SideEffect::RecordFailureReason]);
    }

    #[test]
    fn pending_callback_parks_failed_donation_back_at_pending() {
        let t = transition(DonationStatus::Failed, LifecycleEvent::CallbackPending);
        assert_eq!(t.next, DonationStatus::Pending);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn retry_resets_for_a_fresh_attempt() {
        let t = transition(DonationStatus::Failed, LifecycleEvent::RetryInitiated);
        assert_eq!(t.next, DonationStatus::Pending);
        assert_eq!(t.effects, vec![SideEffect::ResetForRetry]);
    }

    #[test]
    fn terminal_flags_are_correct() {
        assert!(DonationStatus::Completed.is_terminal());
        assert!(DonationStatus::Refunded.is_terminal());
        assert!(!DonationStatus::Pending.is_terminal());
        assert!(!DonationStatus::Failed.is_terminal());
    }

    #[test]
    fn retry_is_allowed_only_from_open_states() {
        assert!(DonationStatus::Pending.allows_retry());
        assert!(DonationStatus::Failed.allows_retry());
        assert!(!DonationStatus::Completed.allows_retry());
        assert!(!DonationStatus::Refunded.allows_retry());
    }

    #[test]
    fn db_status_roundtrip() {
        for status in [
            DonationStatus::Pending,
            DonationStatus::Completed,
            DonationStatus::Failed,
            DonationStatus::Refunded,
        ] {
            assert_eq!(
                DonationStatus::from_db_status(status.to_db_status()),
                Some(status)
            );
        }
        assert_eq!(DonationStatus::from_db_status("unknown"), None);
    }
}
