//! Per-request context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::request::Request;
use crate::router::Route;
use crate::session::Session;

/// Per-request state threaded through hooks, middlewares and the handler.
///
/// Created at request entry, dropped at exit. The `vars` bag lets middlewares
/// share values with downstream links and the handler.
pub struct Context {
    /// Unique, time-derived, monotonically-sequenced request id.
    pub id: String,
    pub request: Request,
    /// Captured path parameters, in pattern declaration order.
    pub params: Vec<(String, String)>,
    /// The matched route, if any.
    pub route: Option<Arc<Route>>,
    /// Attached by the session middleware; `None` on static routes and on
    /// apps that don't use sessions.
    pub session: Option<Arc<Mutex<Session>>>,
    /// Free-form per-request values shared between middlewares.
    pub vars: HashMap<String, Value>,
    pub started_at: Instant,
    /// Elapsed time, recorded by the dispatcher just before `end_request`.
    pub response_time: Option<Duration>,
}

impl Context {
    pub(crate) fn new(id: String, request: Request) -> Self {
        Self {
            id,
            request,
            params: Vec::new(),
            route: None,
            session: None,
            vars: HashMap::new(),
            started_at: Instant::now(),
            response_time: None,
        }
    }

    /// First value of the named path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// True if a route matched and it is not a static-file route.
    pub fn is_dynamic_route(&self) -> bool {
        self.route.as_ref().is_some_and(|r| !r.is_static)
    }

    /// Locks and returns the attached session.
    ///
    /// # Panics
    ///
    /// Panics when no session middleware ran for this request. Do not hold
    /// the guard across an `.await`, and drop it before writing to the
    /// response: the session finalize hook runs inside the first write and
    /// needs this same lock.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session
            .as_ref()
            .expect("no session attached; is SessionMiddleware installed?")
            .lock()
            .expect("session lock poisoned")
    }
}
