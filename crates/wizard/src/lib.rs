//! Assign-plan wizard: talks to the Tenant Subscription Service, submits the
//! final selection, and drives the wizard step through
//! `Idle → Selecting → Submitting → Completed`, where a failed submission
//! goes back to `Selecting`.

pub mod client;
pub mod error;
pub mod session;
pub mod submitter;

pub use client::{HttpSubscriptionClient, InMemorySubscriptionService, SubscriptionService};
pub use error::{ServiceError, SubmitError, WizardError};
pub use session::{WizardSession, WizardState};
pub use submitter::AssignmentSubmitter;
