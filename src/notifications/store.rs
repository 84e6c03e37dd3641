//! Notification store.
//!
//! Single writer of the notification inbox. Folds REST snapshots, push
//! events and optimistic local mutations into one ordered, de-duplicated
//! collection. Every operation is synchronous; callers that need to wait on
//! the network do so outside the store and come back with `commit`/`revert`.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info};

use super::models::{Notification, PushEvent};
use super::pending::{MutationError, MutationId, MutationKind, PendingMutation, PriorState};

/// Newest first, ties broken by id.
type OrderKey = (Reverse<i64>, String);

fn order_key(notification: &Notification) -> OrderKey {
    (Reverse(notification.created_at), notification.id.clone())
}

/// What `apply_push` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The id was new to the store.
    Inserted,
    /// The event carried a newer version of a known id.
    Updated,
    /// Same or older version of a known id; nothing changed.
    Duplicate,
    /// The id is deleted (or being deleted) locally.
    Suppressed,
}

impl PushOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushOutcome::Inserted => "inserted",
            PushOutcome::Updated => "updated",
            PushOutcome::Duplicate => "duplicate",
            PushOutcome::Suppressed => "suppressed",
        }
    }
}

#[derive(Debug, Default)]
pub struct NotificationStore {
    entries: BTreeMap<OrderKey, Notification>,
    /// id -> created_at, to rebuild the order key from an id.
    created_at_by_id: HashMap<String, i64>,
    unread: usize,
    /// REST listings currently in flight.
    refreshing: usize,
    pending: BTreeMap<MutationId, PendingMutation>,
    next_mutation_id: u64,
    /// Ids whose deletion the server confirmed. An id is forgotten once a
    /// listing no longer carries it.
    tombstones: HashSet<String>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications in display order.
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        let created_at = *self.created_at_by_id.get(id)?;
        self.entries.get(&(Reverse(created_at), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// True while at least one listing is in flight.
    pub fn is_loading(&self) -> bool {
        self.refreshing > 0
    }

    pub fn begin_refresh(&mut self) {
        self.refreshing += 1;
    }

    pub fn end_refresh(&mut self) {
        self.refreshing = self.refreshing.saturating_sub(1);
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self, mutation_id: MutationId) -> Option<&PendingMutation> {
        self.pending.get(&mutation_id)
    }

    /// Merge a full REST listing into the store.
    ///
    /// Union by id. For ids already present the listing wins, except for the
    /// read flag of a notification under a pending mutation, which keeps its
    /// optimistic value. Returns how many entries were inserted or changed.
    pub fn hydrate(&mut self, snapshot: Vec<Notification>) -> usize {
        let mut changed = 0;

        if !self.tombstones.is_empty() {
            let listed: HashSet<&str> = snapshot.iter().map(|n| n.id.as_str()).collect();
            let before = self.tombstones.len();
            self.tombstones.retain(|id| listed.contains(id.as_str()));
            if self.tombstones.len() < before {
                debug!("Forgot {} tombstones", before - self.tombstones.len());
            }
        }

        for incoming in snapshot {
            if self.tombstones.contains(&incoming.id) {
                debug!("Skipping deleted notification {} in listing", incoming.id);
                continue;
            }

            if let Some(saved_is_read) = self.pending_delete_mut(&incoming.id).map(|n| n.is_read) {
                let merged = self.reconcile(incoming, saved_is_read);
                if let Some(saved) = self.pending_delete_mut(&merged.id) {
                    *saved = merged;
                }
                continue;
            }

            match self.get(&incoming.id).map(|n| n.is_read) {
                Some(current_is_read) => {
                    let merged = self.reconcile(incoming, current_is_read);
                    if self.get(&merged.id) != Some(&merged) {
                        self.replace_entry(merged);
                        changed += 1;
                    }
                }
                None => {
                    self.insert_entry(incoming);
                    changed += 1;
                }
            }
        }

        changed
    }

    /// Fold one push event into the store.
    ///
    /// A known id is only replaced when the event's version is strictly
    /// newer; arrival order never decides. An event that carries no read
    /// state leaves the stored flag alone.
    pub fn apply_push(&mut self, event: PushEvent) -> PushOutcome {
        let carries_read = event.is_read.is_some();
        let incoming: Notification = event.into();

        if self.tombstones.contains(&incoming.id) {
            return PushOutcome::Suppressed;
        }

        if let Some((saved_version, saved_is_read)) = self
            .pending_delete_mut(&incoming.id)
            .map(|n| (n.version(), n.is_read))
        {
            if incoming.version() > saved_version {
                let merged = self.reconcile_push(incoming, carries_read, saved_is_read);
                if let Some(saved) = self.pending_delete_mut(&merged.id) {
                    *saved = merged;
                }
            }
            return PushOutcome::Suppressed;
        }

        match self.get(&incoming.id).map(|n| (n.version(), n.is_read)) {
            Some((version, _)) if incoming.version() <= version => PushOutcome::Duplicate,
            Some((_, current_is_read)) => {
                let merged = self.reconcile_push(incoming, carries_read, current_is_read);
                self.replace_entry(merged);
                PushOutcome::Updated
            }
            None => {
                self.insert_entry(incoming);
                PushOutcome::Inserted
            }
        }
    }

    /// Optimistically mark one notification as read.
    pub fn begin_mark_read(&mut self, id: &str) -> Result<MutationId, MutationError> {
        let was_read = self
            .set_read(id, true)
            .ok_or_else(|| MutationError::NotFound(id.to_string()))?;

        Ok(self.push_pending(
            MutationKind::MarkRead,
            vec![PriorState::ReadFlag {
                id: id.to_string(),
                was_read,
            }],
        ))
    }

    /// Optimistically mark every notification currently unread as read.
    ///
    /// Only the ids unread at this instant are captured, so anything folded
    /// in afterwards keeps its own read flag whatever the outcome.
    pub fn begin_mark_all_read(&mut self) -> MutationId {
        let unread_ids: Vec<String> = self
            .entries
            .values()
            .filter(|n| !n.is_read)
            .map(|n| n.id.clone())
            .collect();

        let prior = unread_ids
            .into_iter()
            .map(|id| {
                self.set_read(&id, true);
                PriorState::ReadFlag {
                    id,
                    was_read: false,
                }
            })
            .collect();

        self.push_pending(MutationKind::MarkAllRead, prior)
    }

    /// Optimistically remove one notification.
    pub fn begin_delete(&mut self, id: &str) -> Result<MutationId, MutationError> {
        let removed = self
            .remove_entry(id)
            .ok_or_else(|| MutationError::NotFound(id.to_string()))?;

        Ok(self.push_pending(
            MutationKind::Delete,
            vec![PriorState::Removed(removed)],
        ))
    }

    /// The server confirmed the mutation: drop its rollback record.
    ///
    /// Returns false if the mutation is unknown (already resolved).
    pub fn commit(&mut self, mutation_id: MutationId) -> bool {
        let Some(mutation) = self.pending.remove(&mutation_id) else {
            return false;
        };
        debug!(
            "Committed {} ({} notifications)",
            mutation.kind.as_str(),
            mutation.affected()
        );

        for prior in mutation.prior {
            if let PriorState::Removed(notification) = prior {
                self.tombstones.insert(notification.id);
            }
        }
        true
    }

    /// The server refused the mutation: restore the captured state.
    ///
    /// A reverted delete goes back to its original position. Returns false if
    /// the mutation is unknown (already resolved).
    pub fn revert(&mut self, mutation_id: MutationId) -> bool {
        let Some(mutation) = self.pending.remove(&mutation_id) else {
            return false;
        };
        info!(
            "Reverting {} ({} notifications)",
            mutation.kind.as_str(),
            mutation.affected()
        );

        for prior in mutation.prior.into_iter().rev() {
            match prior {
                PriorState::ReadFlag { id, was_read } => {
                    self.restore_read_flag(mutation_id, &id, was_read)
                }
                PriorState::Removed(notification) => {
                    if self.get(&notification.id).is_none() {
                        self.insert_entry(notification);
                    }
                }
            }
        }
        true
    }

    fn restore_read_flag(&mut self, reverted: MutationId, id: &str, was_read: bool) {
        // A newer mutation on the same id owns the flag now; it inherits our
        // prior value so its own rollback lands on the original state.
        if let Some(later_prior) = self
            .pending
            .range_mut(reverted..)
            .find_map(|(_, m)| m.prior_read_mut(id))
        {
            *later_prior = was_read;
            return;
        }

        if self.set_read(id, was_read).is_none() {
            if let Some(saved) = self.pending_delete_mut(id) {
                saved.is_read = was_read;
            }
        }
    }

    /// Applies the pending-mutation override to a server-authoritative copy.
    fn reconcile(&mut self, mut incoming: Notification, current_is_read: bool) -> Notification {
        if self.pending.values().any(|m| m.holds_read_flag(&incoming.id)) {
            if let Some(prior) = self
                .pending
                .values_mut()
                .find_map(|m| m.prior_read_mut(&incoming.id))
            {
                *prior = incoming.is_read;
            }
            incoming.is_read = current_is_read;
        }
        incoming
    }

    /// Push-side variant of [`Self::reconcile`]: an event without a read
    /// flag keeps `current_is_read` and leaves rollback records untouched.
    fn reconcile_push(
        &mut self,
        mut incoming: Notification,
        carries_read: bool,
        current_is_read: bool,
    ) -> Notification {
        if carries_read {
            return self.reconcile(incoming, current_is_read);
        }
        incoming.is_read = current_is_read;
        incoming
    }

    fn push_pending(&mut self, kind: MutationKind, prior: Vec<PriorState>) -> MutationId {
        self.next_mutation_id += 1;
        let id = MutationId(self.next_mutation_id);
        self.pending.insert(id, PendingMutation { id, kind, prior });
        id
    }

    fn pending_delete_mut(&mut self, id: &str) -> Option<&mut Notification> {
        self.pending.values_mut().find_map(|m| m.removed_mut(id))
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Notification> {
        let created_at = *self.created_at_by_id.get(id)?;
        self.entries.get_mut(&(Reverse(created_at), id.to_string()))
    }

    fn insert_entry(&mut self, notification: Notification) {
        if !notification.is_read {
            self.unread += 1;
        }
        self.created_at_by_id
            .insert(notification.id.clone(), notification.created_at);
        self.entries.insert(order_key(&notification), notification);
    }

    fn remove_entry(&mut self, id: &str) -> Option<Notification> {
        let created_at = self.created_at_by_id.remove(id)?;
        let removed = self.entries.remove(&(Reverse(created_at), id.to_string()))?;
        if !removed.is_read {
            self.unread -= 1;
        }
        Some(removed)
    }

    fn replace_entry(&mut self, notification: Notification) {
        self.remove_entry(&notification.id);
        self.insert_entry(notification);
    }

    /// Sets the read flag of a live entry, returning its previous value.
    fn set_read(&mut self, id: &str, is_read: bool) -> Option<bool> {
        let notification = self.get_mut(id)?;
        let was_read = notification.is_read;
        notification.is_read = is_read;
        match (was_read, is_read) {
            (false, true) => self.unread -= 1,
            (true, false) => self.unread += 1,
            _ => {}
        }
        Some(was_read)
    }
}
