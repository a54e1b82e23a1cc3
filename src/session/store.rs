//! Session storage and garbage collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha1::{Digest, Sha1};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::Error;
use crate::session::Session;

/// Storage backend contract.
///
/// Implementations never synchronize internally: the middleware wraps every
/// store in one coarse [`Mutex`] ([`SharedStore`]) spanning lookup, create,
/// save, delete and GC, so no two operations interleave destructively.
/// Persistence operations return `Result` so backend failures reach the
/// dispatch panic path instead of being swallowed.
pub trait SessionStore: Send + 'static {
    fn exists(&self, id: &str) -> bool;

    /// Creates and persists a session under a fresh, collision-free id.
    fn create(&mut self, secret: &str) -> Result<Session, Error>;

    /// The session stored under `id`, or `None`. A missing id is an explicit
    /// outcome here; deciding to start a fresh session is the middleware's
    /// call, not the store's.
    fn load(&mut self, id: &str) -> Result<Option<Session>, Error>;

    fn save(&mut self, session: Session) -> Result<(), Error>;

    fn delete(&mut self, id: &str) -> Result<(), Error>;

    /// Removes sessions idle longer than `lifetime`; returns how many.
    fn gc(&mut self, lifetime: Duration) -> Result<usize, Error>;

    fn count(&self) -> usize;
}

/// The one coarse lock every session operation goes through.
pub type SharedStore = Arc<Mutex<Box<dyn SessionStore>>>;

/// In-process session store.
#[derive(Default)]
pub struct MemoryStore {
    sessions: HashMap<String, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes time, randomness and the signing secret; retries on the
    /// (vanishingly unlikely) collision until the id is free.
    fn generate_id(&self, secret: &str) -> String {
        loop {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            let nonce: u128 = rand::random();
            let id = hex::encode(Sha1::digest(format!("{now}{nonce}{secret}")));
            if !self.exists(&id) {
                return id;
            }
        }
    }
}

impl SessionStore for MemoryStore {
    fn exists(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    fn create(&mut self, secret: &str) -> Result<Session, Error> {
        let session = Session::new(self.generate_id(secret));
        self.sessions.insert(session.id().to_owned(), session.clone());
        Ok(session)
    }

    fn load(&mut self, id: &str) -> Result<Option<Session>, Error> {
        Ok(self.sessions.get(id).cloned())
    }

    fn save(&mut self, session: Session) -> Result<(), Error> {
        self.sessions.insert(session.id().to_owned(), session);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), Error> {
        self.sessions.remove(id);
        Ok(())
    }

    fn gc(&mut self, lifetime: Duration) -> Result<usize, Error> {
        let now = SystemTime::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            now.duration_since(session.last_access())
                .map_or(true, |idle| idle <= lifetime)
        });
        Ok(before - self.sessions.len())
    }

    fn count(&self) -> usize {
        self.sessions.len()
    }
}

/// Periodic session sweeper with explicit start/stop.
///
/// Each sweep takes the same store lock as request-path operations, so a
/// sweep never races a save. The next sweep is scheduled only after the
/// previous one completes; under load the period drifts rather than piling
/// up.
pub struct GcScheduler {
    store: SharedStore,
    interval: Duration,
    lifetime: Duration,
    task: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl GcScheduler {
    pub(crate) fn new(store: SharedStore, interval: Duration, lifetime: Duration) -> Self {
        Self { store, interval, lifetime, task: None }
    }

    /// Spawns the sweep loop. Idempotent while running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let store = Arc::clone(&self.store);
        let interval = self.interval;
        let lifetime = self.lifetime;
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        // A request-path panic may have poisoned the lock;
                        // the map is still consistent, so sweep anyway.
                        let swept = store
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .gc(lifetime);
                        match swept {
                            Ok(0) => {}
                            Ok(n) => debug!(removed = n, "session gc sweep"),
                            Err(e) => error!("session gc failed: {e}"),
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });
        self.task = Some((tx, handle));
    }

    /// Signals the loop to exit and waits for it. A sweep in progress
    /// finishes first.
    pub async fn stop(&mut self) {
        if let Some((tx, handle)) = self.task.take() {
            let _ = tx.send(true);
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "secret";

    #[test]
    fn created_ids_are_unique_and_present() {
        let mut store = MemoryStore::new();
        let a = store.create(SECRET).unwrap();
        let b = store.create(SECRET).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(store.exists(a.id()));
        assert!(store.exists(b.id()));
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn load_distinguishes_missing_from_found() {
        let mut store = MemoryStore::new();
        let s = store.create(SECRET).unwrap();
        assert!(store.load(s.id()).unwrap().is_some());
        assert!(store.load("no-such-id").unwrap().is_none());
    }

    #[test]
    fn save_persists_mutations() {
        let mut store = MemoryStore::new();
        let mut s = store.create(SECRET).unwrap();
        s.set("user", "alice");
        store.save(s.clone()).unwrap();
        let loaded = store.load(s.id()).unwrap().unwrap();
        assert_eq!(loaded.get("user").and_then(serde_json::Value::as_str), Some("alice"));
    }

    #[test]
    fn gc_sweeps_idle_sessions_only() {
        let lifetime = Duration::from_secs(30 * 60);
        let mut store = MemoryStore::new();

        let mut stale = store.create(SECRET).unwrap();
        stale.set_last_access(SystemTime::now() - lifetime * 2);
        store.save(stale.clone()).unwrap();
        let fresh = store.create(SECRET).unwrap();

        assert_eq!(store.gc(lifetime).unwrap(), 1);
        assert!(!store.exists(stale.id()));
        assert!(store.exists(fresh.id()));
    }

    #[tokio::test]
    async fn scheduler_sweeps_and_stops() {
        let mut store = MemoryStore::new();
        let mut stale = store.create(SECRET).unwrap();
        stale.set_last_access(SystemTime::now() - Duration::from_secs(120));
        store.save(stale.clone()).unwrap();

        let shared: SharedStore = Arc::new(Mutex::new(Box::new(store)));
        let mut gc = GcScheduler::new(
            Arc::clone(&shared),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        gc.start();
        assert!(gc.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        gc.stop().await;
        assert!(!gc.is_running());
        assert_eq!(shared.lock().unwrap().count(), 0);
    }
}
