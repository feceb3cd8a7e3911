//! Non-blocking front end over the identity, session and paste flows
//!
//! Every call on [`Dispatcher`] returns immediately after spawning a task.
//! The task sends exactly one [`Event`] on completion; failures are events
//! too, nothing propagates to the caller.

mod events;
mod ops;
mod pending;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use common::cipher::{PasteBody, PasteCipher};
use common::crypto::SecretKey;
use common::keystore::KeyStore;
use common::session::SessionHandle;

use crate::api::ApiClient;

pub use events::{CreatePasteError, Event, FetchPasteError};
pub use ops::{is_valid_paste_id, MAX_PASTE_ID_LEN};
pub use pending::{PendingCreation, PendingCreations};

/// Everything a dispatched operation may touch
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub api: ApiClient,
    pub cipher: PasteCipher,
    pub identity: SecretKey,
    pub session: SessionHandle,
    pub pending: PendingCreations,
}

impl ClientContext {
    pub fn new(api: ApiClient, keys: KeyStore, identity: SecretKey) -> Self {
        Self {
            api,
            cipher: PasteCipher::new(keys),
            identity,
            session: SessionHandle::new(),
            pending: PendingCreations::new(),
        }
    }

    pub fn keys(&self) -> &KeyStore {
        self.cipher.keys()
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: Arc<ClientContext>,
    tx: flume::Sender<Event>,
}

impl Dispatcher {
    pub fn new(ctx: ClientContext) -> (Self, EventReceiver) {
        let (tx, rx) = flume::unbounded();
        (
            Self {
                ctx: Arc::new(ctx),
                tx,
            },
            EventReceiver { rx },
        )
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    pub fn register(&self) {
        self.spawn("register", |ctx| async move { ops::register(&ctx).await });
    }

    pub fn authenticate(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        self.spawn("authenticate", move |ctx| async move {
            ops::authenticate(&ctx, user_id).await
        });
    }

    /// Returns the `temp_id` the eventual `PasteCreated` or
    /// `PasteCreationFailed` will carry.
    pub fn create_paste(&self, body: PasteBody, expires_in: Option<u64>) -> Uuid {
        let temp_id = self.ctx.pending.issue(body.title.clone());
        self.spawn("create_paste", move |ctx| async move {
            ops::create_paste(&ctx, temp_id, body, expires_in).await
        });
        temp_id
    }

    pub fn list_pastes(&self) {
        self.spawn("list_pastes", |ctx| async move { ops::list_pastes(&ctx).await });
    }

    pub fn fetch_paste(&self, id: impl Into<String>) {
        let id = id.into();
        self.spawn("fetch_paste", move |ctx| async move {
            ops::fetch_paste(&ctx, id).await
        });
    }

    /// Forget creations older than `ttl`. Their events still arrive.
    pub fn purge_pending(&self, ttl: Duration) -> Vec<Uuid> {
        self.ctx.pending.purge_expired(ttl)
    }

    fn spawn<F, Fut>(&self, op: &'static str, f: F)
    where
        F: FnOnce(Arc<ClientContext>) -> Fut,
        Fut: Future<Output = Event> + Send + 'static,
    {
        let tx = self.tx.clone();
        let fut = f(self.ctx.clone());
        tokio::spawn(async move {
            let event = fut.await;
            if event.is_failure() {
                tracing::warn!("DISPATCH: {} finished with {}", op, event.name());
            } else {
                tracing::debug!("DISPATCH: {} finished with {}", op, event.name());
            }
            if tx.send_async(event).await.is_err() {
                tracing::warn!("DISPATCH: {} result dropped, receiver is gone", op);
            }
        });
    }
}

/// Receiving half of the event stream
#[derive(Debug)]
pub struct EventReceiver {
    rx: flume::Receiver<Event>,
}

impl EventReceiver {
    /// `None` once every dispatcher handle is dropped and the queue is drained
    pub async fn recv(&self) -> Option<Event> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}
