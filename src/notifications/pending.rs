//! Pending (optimistic, unconfirmed) mutation records.

use thiserror::Error;

use crate::api::ApiError;

use super::models::Notification;

/// Identifies one in-flight optimistic mutation.
///
/// Ids increase monotonically within a store, so ordering by id is
/// ordering by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    MarkRead,
    MarkAllRead,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::MarkRead => "mark_read",
            MutationKind::MarkAllRead => "mark_all_read",
            MutationKind::Delete => "delete",
        }
    }
}

/// State captured before the optimistic change, used for rollback.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PriorState {
    ReadFlag { id: String, was_read: bool },
    Removed(Notification),
}

#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: MutationId,
    pub kind: MutationKind,
    pub(crate) prior: Vec<PriorState>,
}

impl PendingMutation {
    /// True if this mutation owns the read flag of `notification_id`.
    pub(crate) fn holds_read_flag(&self, notification_id: &str) -> bool {
        self.prior.iter().any(|p| match p {
            PriorState::ReadFlag { id, .. } => id == notification_id,
            PriorState::Removed(_) => false,
        })
    }

    pub(crate) fn prior_read_mut(&mut self, notification_id: &str) -> Option<&mut bool> {
        self.prior.iter_mut().find_map(|p| match p {
            PriorState::ReadFlag { id, was_read } if id == notification_id => Some(was_read),
            _ => None,
        })
    }

    /// The saved copy of a notification hidden by this (delete) mutation.
    pub(crate) fn removed_mut(&mut self, notification_id: &str) -> Option<&mut Notification> {
        self.prior.iter_mut().find_map(|p| match p {
            PriorState::Removed(n) if n.id == notification_id => Some(n),
            _ => None,
        })
    }

    /// Number of notifications this mutation touched.
    pub fn affected(&self) -> usize {
        self.prior.len()
    }
}

/// Errors surfaced to the caller of a mutation entry point.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Server rejected the change: {0}")]
    Rejected(#[source] ApiError),

    #[error("Session expired")]
    SessionExpired,

    #[error("Confirmation task did not complete: {0}")]
    Interrupted(String),
}

impl MutationError {
    pub(crate) fn from_api(err: ApiError) -> Self {
        if err.is_auth() {
            MutationError::SessionExpired
        } else {
            MutationError::Rejected(err)
        }
    }
}
