//! The session middleware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use async_trait::async_trait;

use crate::context::Context;
use crate::middleware::{Chain, Middleware};
use crate::response::{ResponseWriter, Stage};
use crate::session::store::{GcScheduler, MemoryStore, SessionStore, SharedStore};
use crate::session::{cookie_header, sign, SessionConfig, StoreKind, TamperPolicy};

/// Attaches a session to every dynamic-route request and finalizes it when
/// the response header is written.
///
/// Clones share the store and config, so the same instance can be installed
/// globally or per mount point and still hand out a [`GcScheduler`] over the
/// same store.
#[derive(Clone)]
pub struct SessionMiddleware {
    config: Arc<SessionConfig>,
    store: SharedStore,
}

impl SessionMiddleware {
    /// Builds the middleware with the store selected by `config.store`.
    ///
    /// # Panics
    ///
    /// Panics on an empty signing secret; a guessable MAC key would silently
    /// void the tamper protection.
    pub fn new(config: SessionConfig) -> Self {
        let store: Box<dyn SessionStore> = match config.store {
            StoreKind::Memory => Box::new(MemoryStore::new()),
        };
        Self::with_store(config, store)
    }

    /// Builds the middleware around a custom store implementation.
    pub fn with_store(config: SessionConfig, store: Box<dyn SessionStore>) -> Self {
        assert!(!config.secret.is_empty(), "session secret must not be empty");
        Self {
            config: Arc::new(config),
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// The shared store handle (same lock the request path uses).
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// A sweeper over this middleware's store, configured from
    /// `gc_interval`/`lifetime`. Call [`GcScheduler::start`] to arm it.
    pub fn gc_scheduler(&self) -> GcScheduler {
        GcScheduler::new(Arc::clone(&self.store), self.config.gc_interval, self.config.lifetime)
    }

    fn lock_store(&self) -> MutexGuard<'_, Box<dyn SessionStore>> {
        // A store-error panic on the request path unwinds with this lock
        // held and poisons it. The map itself stays consistent across those
        // unwinds, so recover the guard rather than wedging every later
        // session for one failed request.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(&self, w: &mut ResponseWriter, ctx: &mut Context, chain: &mut Chain) {
        // Static routes carry no identity.
        if !ctx.is_dynamic_route() {
            return chain.next(w, ctx).await;
        }
        // Requests outside the cookie's path scope are not served sessions,
        // and not forwarded either.
        if !ctx.request.path().starts_with(&self.config.cookie_path) {
            return;
        }

        // Validate the cookie before taking the store lock: rejection
        // panics, and a panic with the lock held would poison it for every
        // later request. Signature checking needs no store anyway.
        let cookie_id = match ctx.request.cookie(&self.config.cookie_name) {
            None => None,
            Some(raw) => match sign::validate(raw, &self.config.secret) {
                Ok(id) => Some(id),
                Err(e) => match self.config.tamper_policy {
                    TamperPolicy::Reject => panic!("session cookie rejected: {e}"),
                    TamperPolicy::IgnoreCookie => None,
                },
            },
        };

        let session = {
            let mut store = self.lock_store();
            let existing = match &cookie_id {
                None => None,
                Some(id) => store
                    .load(id)
                    .unwrap_or_else(|e| panic!("session store: {e}")),
            };
            let mut session = match existing {
                Some(session) => session,
                None => store
                    .create(&self.config.secret)
                    .unwrap_or_else(|e| panic!("session store: {e}")),
            };
            session.touch();
            session
        };

        let session = Arc::new(Mutex::new(session));
        ctx.session = Some(Arc::clone(&session));

        // Finalize when the header is committed: the response is buffered, so
        // the cookie issued here still reaches the wire.
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        w.on_stage(Stage::AfterWriteHeader, move |w| {
            // This runs synchronously inside the header commit, on the same
            // thread as the handler. A handler still holding the context's
            // session guard across the write would block this lock forever,
            // so fail loudly into the dispatch boundary instead of hanging.
            let session = match session.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(e)) => e.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    panic!("session finalize: the session guard is still held; drop it before writing the response")
                }
            };
            let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
            let signed = sign::sign(session.id(), &config.secret);
            if session.killed() {
                store
                    .delete(session.id())
                    .unwrap_or_else(|e| panic!("session store: {e}"));
                w.header("set-cookie", &cookie_header(&config, &signed, true));
            } else {
                store
                    .save(session.clone())
                    .unwrap_or_else(|e| panic!("session store: {e}"));
                w.header("set-cookie", &cookie_header(&config, &signed, false));
            }
        });

        chain.next(w, ctx).await;
    }
}
