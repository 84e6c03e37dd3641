//! Local notification inbox with optimistic mutations.

mod models;
mod pending;
mod service;
mod store;

pub use models::{EventParseError, Notification, NotificationType, PushEvent};
pub use pending::{MutationError, MutationId, MutationKind, PendingMutation};
pub use service::{Confirmation, InboxStatus, NotificationService};
pub use store::{NotificationStore, PushOutcome};
