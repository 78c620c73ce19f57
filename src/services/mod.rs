//! Services module for donation lifecycle business logic

pub mod callback;
pub mod category;
pub mod intent;
pub mod lifecycle;
pub mod mailer;
pub mod notification;
pub mod receipt;
pub mod reconciliation;
pub mod retry;

// Re-export lifecycle types for convenience
pub use crate::services::lifecycle::{
    transition, DonationStatus, LifecycleEvent, SideEffect, Transition,
};

// Re-export the service entry points the API layer wires together
pub use crate::services::intent::{DonationIntent, IntentError, IntentOutcome, IntentService};
pub use crate::services::receipt::{ReceiptError, ReceiptService, RenderedReceipt};
pub use crate::services::reconciliation::{
    CallbackOutcome, ReconciliationError, ReconciliationService,
};
pub use crate::services::retry::{RetryError, RetryOutcome, RetryService};
