//! Notification service: the store wired to the REST and push boundaries.
//!
//! Mutation entry points apply their optimistic change before returning and
//! hand back a [`Confirmation`] that resolves once the server has answered.
//! The REST round-trip runs on its own task, so dropping the confirmation
//! does not cancel it. Tasks and push handlers only hold a weak reference
//! to the store; once the service is dropped their writes are discarded.

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::models::{Notification, PushEvent};
use super::pending::{MutationError, MutationId, MutationKind};
use super::store::{NotificationStore, PushOutcome};
use crate::api::{ApiError, NotificationsApi};
use crate::metrics;
use crate::push::ConnectionManager;

/// Resolves when the server confirmed or refused an optimistic mutation.
pub type Confirmation = BoxFuture<'static, Result<(), MutationError>>;

/// Summary published to subscribers after every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InboxStatus {
    pub unread_count: usize,
    pub total: usize,
    pub loading: bool,
    pub pending: usize,
}

impl InboxStatus {
    fn of(store: &NotificationStore) -> Self {
        Self {
            unread_count: store.unread_count(),
            total: store.len(),
            loading: store.is_loading(),
            pending: store.pending_count(),
        }
    }
}

struct Shared {
    store: Mutex<NotificationStore>,
    status: watch::Sender<InboxStatus>,
}

impl Shared {
    /// Run `f` against the store, then publish the resulting status.
    fn with_store<R>(&self, f: impl FnOnce(&mut NotificationStore) -> R) -> R {
        let (result, status) = {
            let mut store = self.store.lock().unwrap();
            let result = f(&mut store);
            (result, InboxStatus::of(&store))
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        result
    }

    fn read<R>(&self, f: impl FnOnce(&NotificationStore) -> R) -> R {
        f(&self.store.lock().unwrap())
    }

    fn apply_push(&self, event: PushEvent) -> PushOutcome {
        let id = event.id.clone();
        let outcome = self.with_store(|store| store.apply_push(event));
        debug!("Push event {} {}", id, outcome.as_str());
        metrics::record_push_event(outcome.as_str());
        outcome
    }
}

pub struct NotificationService {
    shared: Arc<Shared>,
    api: Arc<dyn NotificationsApi>,
}

impl NotificationService {
    pub fn new(api: Arc<dyn NotificationsApi>) -> Self {
        let (status, _) = watch::channel(InboxStatus::default());
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(NotificationStore::new()),
                status,
            }),
            api,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<InboxStatus> {
        self.shared.status.subscribe()
    }

    pub fn status(&self) -> InboxStatus {
        *self.shared.status.borrow()
    }

    /// Notifications in display order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared.read(|store| store.snapshot())
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.shared.read(|store| store.get(id).cloned())
    }

    pub fn unread_count(&self) -> usize {
        self.shared.read(|store| store.unread_count())
    }

    pub fn is_loading(&self) -> bool {
        self.shared.read(|store| store.is_loading())
    }

    pub fn hydrate(&self, snapshot: Vec<Notification>) -> usize {
        self.shared.with_store(|store| store.hydrate(snapshot))
    }

    pub fn apply_push(&self, event: PushEvent) -> PushOutcome {
        self.shared.apply_push(event)
    }

    /// Fetch the full list and merge it in.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        refresh(&self.shared, self.api.as_ref()).await
    }

    /// Feed push events into the store and refresh after every (re)connect,
    /// so events missed while disconnected are recovered.
    pub fn attach(&self, connection: &ConnectionManager) {
        let shared = Arc::downgrade(&self.shared);
        connection.on_event(move |event| match shared.upgrade() {
            Some(shared) => {
                shared.apply_push(event.clone());
            }
            None => debug!("Dropping push event {}: store is gone", event.id),
        });

        let shared = Arc::downgrade(&self.shared);
        let api = self.api.clone();
        connection.on_connected(move || {
            let shared = shared.clone();
            let api = api.clone();
            tokio::spawn(async move {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                if let Err(e) = refresh(&shared, api.as_ref()).await {
                    warn!("Refresh after connect failed: {}", e);
                }
            });
        });
    }

    pub fn mark_read(&self, id: &str) -> Result<Confirmation, MutationError> {
        let mutation = self
            .shared
            .with_store(|store| store.begin_mark_read(id))
            .inspect_err(|_| metrics::record_mutation(MutationKind::MarkRead.as_str(), "rejected"))?;

        let api = self.api.clone();
        let id = id.to_string();
        Ok(self.confirm(MutationKind::MarkRead, mutation, async move {
            api.mark_read(&id).await
        }))
    }

    pub fn mark_all_read(&self) -> Confirmation {
        let mutation = self.shared.with_store(|store| store.begin_mark_all_read());

        let api = self.api.clone();
        self.confirm(MutationKind::MarkAllRead, mutation, async move {
            api.mark_all_read().await
        })
    }

    pub fn delete(&self, id: &str) -> Result<Confirmation, MutationError> {
        let mutation = self
            .shared
            .with_store(|store| store.begin_delete(id))
            .inspect_err(|_| metrics::record_mutation(MutationKind::Delete.as_str(), "rejected"))?;

        let api = self.api.clone();
        let id = id.to_string();
        Ok(self.confirm(MutationKind::Delete, mutation, async move {
            api.delete(&id).await
        }))
    }

    fn confirm(
        &self,
        kind: MutationKind,
        mutation: MutationId,
        request: impl Future<Output = Result<(), ApiError>> + Send + 'static,
    ) -> Confirmation {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(resolve(shared, kind, mutation, request))
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(MutationError::Interrupted(e.to_string())),
            })
            .boxed()
    }
}

async fn resolve(
    shared: Weak<Shared>,
    kind: MutationKind,
    mutation: MutationId,
    request: impl Future<Output = Result<(), ApiError>>,
) -> Result<(), MutationError> {
    let result = request.await;

    let Some(shared) = shared.upgrade() else {
        debug!("{} resolved after the store was dropped", kind.as_str());
        return result.map_err(MutationError::from_api);
    };

    match result {
        Ok(()) => {
            shared.with_store(|store| store.commit(mutation));
            metrics::record_mutation(kind.as_str(), "confirmed");
            Ok(())
        }
        Err(e) => {
            warn!("{} failed, reverting: {}", kind.as_str(), e);
            shared.with_store(|store| store.revert(mutation));
            metrics::record_mutation(kind.as_str(), "reverted");
            Err(MutationError::from_api(e))
        }
    }
}

/// Overlapping refreshes each hold the loading flag until they finish.
async fn refresh(shared: &Shared, api: &dyn NotificationsApi) -> Result<usize, ApiError> {
    shared.with_store(|store| store.begin_refresh());

    match api.list().await {
        Ok(snapshot) => {
            let count = snapshot.len();
            let changed = shared.with_store(|store| {
                let changed = store.hydrate(snapshot);
                store.end_refresh();
                changed
            });
            info!("Hydrated {} notifications ({} changed)", count, changed);
            Ok(changed)
        }
        Err(e) => {
            shared.with_store(|store| store.end_refresh());
            Err(e)
        }
    }
}
