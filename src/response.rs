//! Buffered response tracker.
//!
//! Every request gets a [`ResponseWriter`] wrapping the outgoing response. It
//! records the status (0 until the first write), the cumulative body length,
//! and carries a private set of write-time hooks:
//!
//! - [`Stage::BeforeWriteHeader`] — just before the status line is committed
//! - [`Stage::AfterWriteHeader`] — just after
//! - [`Stage::BeforeWriteContent`] — before the first body byte
//!
//! Stage hooks are scoped to one response and fire at most once, back-to-front.
//! Attaching a hook after its stage has already passed never fires it — that
//! is intentional, not a bug: a stage marks a moment, and the moment is gone.
//!
//! The body is buffered; nothing reaches the wire until the dispatcher calls
//! [`ResponseWriter::finish`], so hooks may still add headers (for example a
//! `set-cookie`) at `AfterWriteHeader`.

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use http_body_util::Full;

/// A write-time hook point on a single response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    BeforeWriteHeader,
    AfterWriteHeader,
    BeforeWriteContent,
}

impl Stage {
    fn idx(self) -> usize {
        match self {
            Self::BeforeWriteHeader => 0,
            Self::AfterWriteHeader => 1,
            Self::BeforeWriteContent => 2,
        }
    }
}

type StageHook = Box<dyn FnOnce(&mut ResponseWriter) + Send>;

/// Tracks one outgoing response: status, headers, buffered body, stage hooks.
pub struct ResponseWriter {
    status: u16,
    headers: Vec<(String, String)>,
    body: BytesMut,
    header_written: bool,
    stage_hooks: [Vec<StageHook>; 3],
    stage_passed: [bool; 3],
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: BytesMut::new(),
            header_written: false,
            stage_hooks: [Vec::new(), Vec::new(), Vec::new()],
            stage_passed: [false; 3],
        }
    }

    /// Current status code; `0` until a status is set or the first write.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Bytes written to the body so far.
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// The buffered body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Records a status without committing the header. The first write will
    /// commit it.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status.as_u16();
    }

    /// Appends a header.
    pub fn header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_ascii_lowercase(), value.to_owned()));
    }

    /// Replaces every occurrence of `name`, then appends.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(k, _)| *k != name);
        self.headers.push((name, value.to_owned()));
    }

    /// First value of `name`, case-insensitive.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attaches a one-shot hook to `stage`. Dropped silently if the stage has
    /// already passed.
    pub fn on_stage<F>(&mut self, stage: Stage, hook: F)
    where
        F: FnOnce(&mut ResponseWriter) + Send + 'static,
    {
        if self.stage_passed[stage.idx()] {
            return;
        }
        self.stage_hooks[stage.idx()].push(Box::new(hook));
    }

    /// Commits the status line: fires `BeforeWriteHeader`, records the status,
    /// fires `AfterWriteHeader`. Idempotent — only the first call commits, so
    /// an explicit call followed by the implicit one on first write cannot
    /// double-fire the hooks.
    pub fn write_header(&mut self, status: u16) {
        if self.header_written {
            return;
        }
        self.fire(Stage::BeforeWriteHeader);
        self.status = status;
        self.header_written = true;
        self.fire(Stage::AfterWriteHeader);
    }

    /// Appends body bytes. The first write commits the header (status 200 if
    /// none was set) and fires `BeforeWriteContent`.
    pub fn write(&mut self, b: &[u8]) {
        if self.body.is_empty() && !self.stage_passed[Stage::BeforeWriteContent.idx()] {
            if self.status == 0 {
                self.status = 200;
            }
            let status = self.status;
            self.write_header(status);
            self.fire(Stage::BeforeWriteContent);
        }
        self.body.extend_from_slice(b);
    }

    /// `write` for text.
    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    fn fire(&mut self, stage: Stage) {
        self.stage_passed[stage.idx()] = true;
        let hooks = std::mem::take(&mut self.stage_hooks[stage.idx()]);
        for hook in hooks.into_iter().rev() {
            hook(self);
        }
    }

    /// Commits the header if nothing ever wrote to this response. The
    /// dispatcher calls this before finalizing so that stage hooks (session
    /// persistence among them) run even for bodiless responses.
    pub(crate) fn finish_headers(&mut self) {
        if !self.header_written {
            let status = if self.status == 0 { 200 } else { self.status };
            self.write_header(status);
        }
    }

    /// Converts the tracked state into a transport response.
    pub(crate) fn finish(mut self) -> http::Response<Full<Bytes>> {
        self.finish_headers();
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = http::Response::builder().status(status);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder
            .body(Full::new(self.body.freeze()))
            .unwrap_or_else(|_| {
                // A malformed header name/value from user code; degrade to a
                // bare 500 rather than tearing down the connection.
                http::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::new()))
                    .unwrap()
            })
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}
