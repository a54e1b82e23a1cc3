//! Signed-cookie sessions.
//!
//! The subsystem is one middleware plus a store behind a single coarse lock.
//! Per request: validate the cookie signature, load or create a session under
//! the lock, attach it to the context, and register a response-tracker hook
//! that finalizes under the lock again — killed sessions are deleted and
//! their cookie expired immediately, live ones are persisted and re-issued.
//! Static routes skip all of it.
//!
//! Garbage collection is a separate [`GcScheduler`] sweeping the same store
//! on an explicit, cancellable timer.

mod middleware;
pub mod sign;
mod store;

pub use middleware::SessionMiddleware;
pub use store::{GcScheduler, MemoryStore, SessionStore, SharedStore};

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use serde_json::Value;

/// What to do with a cookie that fails signature validation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TamperPolicy {
    /// Fail the request through the dispatch panic path (500 by default).
    #[default]
    Reject,
    /// Treat the cookie as absent and start a fresh session.
    IgnoreCookie,
}

/// Which store the middleware constructs at startup. Custom stores bypass
/// this via [`SessionMiddleware::with_store`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
}

/// Session middleware configuration. The core consumes plain values; load
/// them from wherever you like (the struct derives `Deserialize`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub cookie_domain: String,
    pub cookie_path: String,
    pub cookie_secure: bool,
    pub cookie_http_only: bool,
    /// When set to a positive duration, issued cookies carry an `Expires`
    /// attribute that far in the future; otherwise they are session cookies.
    pub cookie_expires: Option<Duration>,
    /// HMAC key for cookie signing. Must not be empty.
    pub secret: String,
    pub store: StoreKind,
    pub gc_interval: Duration,
    /// Sessions idle longer than this are swept by GC.
    pub lifetime: Duration,
    pub tamper_policy: TamperPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sidrasessionid".to_owned(),
            cookie_domain: String::new(),
            cookie_path: String::new(),
            cookie_secure: false,
            cookie_http_only: true,
            cookie_expires: None,
            secret: String::new(),
            store: StoreKind::Memory,
            gc_interval: Duration::from_secs(30 * 60),
            lifetime: Duration::from_secs(30 * 60),
            tamper_policy: TamperPolicy::Reject,
        }
    }
}

/// Formats a `set-cookie` header value. `kill` expires the cookie at once.
fn cookie_header(config: &SessionConfig, value: &str, kill: bool) -> String {
    let mut cookie = format!("{}={value}", config.cookie_name);
    if !config.cookie_domain.is_empty() {
        cookie.push_str("; Domain=");
        cookie.push_str(&config.cookie_domain);
    }
    if !config.cookie_path.is_empty() {
        cookie.push_str("; Path=");
        cookie.push_str(&config.cookie_path);
    }
    if kill {
        cookie.push_str("; Max-Age=-1");
    } else if let Some(expires) = config.cookie_expires {
        let duration = chrono::Duration::from_std(expires).unwrap_or(chrono::Duration::zero());
        let when = chrono::Utc::now() + duration;
        cookie.push_str(&format!("; Expires={}", when.format("%a, %d %b %Y %H:%M:%S GMT")));
    }
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    if config.cookie_http_only {
        cookie.push_str("; HttpOnly");
    }
    cookie
}

/// One visitor's session: identity, value bag, flash messages, kill flag.
#[derive(Clone, Debug)]
pub struct Session {
    id: String,
    last_access: SystemTime,
    values: HashMap<String, Value>,
    flash: HashMap<String, Vec<String>>,
    killed: bool,
}

impl Session {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            last_access: SystemTime::now(),
            values: HashMap::new(),
            flash: HashMap::new(),
            killed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn last_access(&self) -> SystemTime {
        self.last_access
    }

    pub(crate) fn touch(&mut self) {
        self.last_access = SystemTime::now();
    }

    #[cfg(test)]
    pub(crate) fn set_last_access(&mut self, at: SystemTime) {
        self.last_access = at;
    }

    /// Marks the session for deletion at response finalize; the cookie is
    /// expired immediately.
    pub fn kill(&mut self) {
        self.killed = true;
    }

    pub fn killed(&self) -> bool {
        self.killed
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_owned(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Appends a flash message under `category`.
    pub fn add_flash(&mut self, category: &str, message: &str) {
        self.flash
            .entry(category.to_owned())
            .or_default()
            .push(message.to_owned());
    }

    /// Reads and clears the messages of one category.
    pub fn flash(&mut self, category: &str) -> Vec<String> {
        self.flash.remove(category).unwrap_or_default()
    }

    /// Reads and clears every category in one atomic step.
    pub fn flashes(&mut self) -> HashMap<String, Vec<String>> {
        std::mem::take(&mut self.flash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_category_reads_once() {
        let mut s = Session::new("id".into());
        s.add_flash("info", "a");
        s.add_flash("info", "b");
        s.add_flash("error", "oops");

        assert_eq!(s.flash("info"), vec!["a", "b"]);
        assert!(s.flash("info").is_empty());
        assert_eq!(s.flash("error"), vec!["oops"]);
    }

    #[test]
    fn flashes_drains_everything_atomically() {
        let mut s = Session::new("id".into());
        s.add_flash("info", "a");
        s.add_flash("info", "b");

        let all = s.flashes();
        assert_eq!(all.len(), 1);
        assert_eq!(all["info"], vec!["a", "b"]);
        assert!(s.flashes().is_empty());
    }

    #[test]
    fn value_bag_round_trip() {
        let mut s = Session::new("id".into());
        s.set("user", "alice");
        s.set("visits", 3);
        assert_eq!(s.get("user").and_then(Value::as_str), Some("alice"));
        assert_eq!(s.remove("visits"), Some(Value::from(3)));
        assert!(s.get("visits").is_none());
    }

    #[test]
    fn cookie_attributes() {
        let config = SessionConfig {
            cookie_name: "sid".into(),
            cookie_domain: "example.com".into(),
            cookie_path: "/app".into(),
            cookie_secure: true,
            ..SessionConfig::default()
        };
        let header = cookie_header(&config, "v", false);
        assert!(header.starts_with("sid=v"));
        assert!(header.contains("Domain=example.com"));
        assert!(header.contains("Path=/app"));
        assert!(header.contains("Secure"));
        assert!(header.contains("HttpOnly"));
        assert!(!header.contains("Expires="));
        assert!(!header.contains("Max-Age"));

        let killed = cookie_header(&config, "v", true);
        assert!(killed.contains("Max-Age=-1"));

        let expiring = SessionConfig {
            cookie_expires: Some(Duration::from_secs(3600)),
            ..SessionConfig::default()
        };
        assert!(cookie_header(&expiring, "v", false).contains("Expires="));
    }
}
