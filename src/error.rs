//! Unified error type.
//!
//! Application-level outcomes (404, 500, redirects) are expressed as response
//! writes, never as `Error`s. This type surfaces infrastructure failures:
//! binding a port, compiling templates, talking to a session store, or a
//! session cookie that fails signature validation.

use thiserror::Error;

/// The error type returned by sidra's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    /// A signed cookie whose MAC does not match its payload.
    #[error("signed value has been tampered with")]
    Tampered,

    /// Failure inside a [`SessionStore`](crate::session::SessionStore)
    /// implementation. The session middleware never swallows these; they are
    /// raised through the dispatch panic path.
    #[error("session store: {0}")]
    Store(String),

    /// Renderer warm-up failure, reported from `Renderer::compile`.
    #[error("renderer: {0}")]
    Render(String),
}
