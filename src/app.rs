//! Application object and the request-dispatch lifecycle.
//!
//! Per request the dispatcher runs a fixed state machine:
//!
//! ```text
//! created → start_request hooks → routed
//!         → (not_found | start_action hooks → chain → end_action hooks)
//!         → end_request hooks (always, panic or not)
//! ```
//!
//! "Entering" hooks run forward, "leaving" hooks run reverse, mirroring the
//! middleware chain's own LIFO nesting. A panic anywhere inside hooks, chain
//! or handler is caught exactly once at this boundary and routed to the
//! panic handler; latency recording and `end_request` hooks run on every
//! exit path.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use http::{Method, StatusCode};
use http_body_util::Full;
use serde::Deserialize;

use crate::context::Context;
use crate::error::Error;
use crate::hooks::{HookDirection, Hooks};
use crate::middleware::{Handler, Middleware};
use crate::render::Renderer;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::router::{Route, RouteTable};

/// Server and dispatch configuration. Plain values only; load them from
/// wherever you like (the struct derives `Deserialize`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listen address, `host:port`.
    pub addr: String,
    /// Panic responses include the payload and a backtrace when set. Never
    /// enable in production.
    pub debug: bool,
    /// Honor a `_method` form field as the effective HTTP verb.
    pub allow_method_override: bool,
    /// Applied as the connection's header read-timeout.
    pub read_timeout: Duration,
    pub keep_alive: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_owned(),
            debug: false,
            allow_method_override: true,
            read_timeout: Duration::from_secs(180),
            keep_alive: false,
        }
    }
}

type PanicHandler = Box<dyn Fn(&mut ResponseWriter, &mut Context, &(dyn Any + Send)) + Send + Sync>;
type NotFoundHandler = Box<dyn Fn(&mut ResponseWriter, &mut Context) + Send + Sync>;

/// The web application: route table, global middlewares, lifecycle hooks,
/// and the dispatch engine.
///
/// Hook points fired by the engine: `start_request`, `start_action`,
/// `end_action`, `end_request`. Register routes through [`App::mount`];
/// everything is meant to be wired up before [`App::serve`], after which the
/// table and registries are read-only.
pub struct App {
    pub config: AppConfig,
    pub hooks: Hooks,
    routes: RouteTable,
    middlewares: Vec<Arc<dyn Middleware>>,
    on_panic: Option<PanicHandler>,
    on_not_found: Option<NotFoundHandler>,
    renderer: Option<Box<dyn Renderer>>,
    id_seq: AtomicU32,
    setup_done: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            hooks: Hooks::new(),
            routes: RouteTable::new(),
            middlewares: Vec::new(),
            on_panic: None,
            on_not_found: None,
            renderer: None,
            id_seq: AtomicU32::new(0),
            setup_done: false,
        }
    }

    /// Appends a middleware applied to every mount point created afterwards.
    pub fn use_middleware(&mut self, middleware: impl Middleware) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// A route group under `path`. The mount point snapshots the app-level
    /// middlewares registered so far and applies them, plus its own, to every
    /// route registered through it.
    pub fn mount(&mut self, path: &str) -> MountPoint<'_> {
        let path = format!("{}/", path.trim_end_matches('/'));
        let middlewares = self.middlewares.clone();
        MountPoint { app: self, path, middlewares }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Reverse URL for a named route. Panics on unknown names or arity
    /// mismatch; see [`RouteTable::build_url`].
    pub fn build_url(&self, name: &str, args: &[&str]) -> String {
        self.routes.build_url(name, args)
    }

    /// Replaces the default panic responder (500, details only in debug).
    pub fn on_panic<F>(&mut self, handler: F)
    where
        F: Fn(&mut ResponseWriter, &mut Context, &(dyn Any + Send)) + Send + Sync + 'static,
    {
        self.on_panic = Some(Box::new(handler));
    }

    /// Replaces the default not-found responder (minimal 404 body).
    pub fn on_not_found<F>(&mut self, handler: F)
    where
        F: Fn(&mut ResponseWriter, &mut Context) + Send + Sync + 'static,
    {
        self.on_not_found = Some(Box::new(handler));
    }

    pub fn set_renderer(&mut self, renderer: impl Renderer + 'static) {
        self.renderer = Some(Box::new(renderer));
    }

    pub fn renderer(&self) -> Option<&dyn Renderer> {
        self.renderer.as_deref()
    }

    /// One-time warm-up: compiles the renderer and installs the access-log
    /// hook. Called by [`App::serve`]; call it yourself when driving
    /// [`App::handle`] directly. Idempotent.
    pub fn setup(&mut self) -> Result<(), Error> {
        if self.setup_done {
            return Ok(());
        }
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.compile()?;
        }
        self.hooks.add("end_request", |w, ctx| {
            tracing::info!(
                id = %ctx.id,
                method = %ctx.request.method(),
                path = %ctx.request.path(),
                status = w.status(),
                length = w.content_length(),
                elapsed_us = ctx.response_time.unwrap_or_default().as_micros() as u64,
                "request"
            );
        });
        self.setup_done = true;
        Ok(())
    }

    /// Runs setup and serves until a shutdown signal drains the listener.
    pub async fn serve(mut self) -> Result<(), Error> {
        self.setup()?;
        crate::server::serve(self).await
    }

    /// Dispatches one request through the full lifecycle and finalizes the
    /// tracked response. This is the whole engine; the server is just a loop
    /// feeding it.
    pub async fn handle(&self, request: Request) -> http::Response<Full<Bytes>> {
        let mut w = ResponseWriter::new();
        let mut ctx = Context::new(self.next_context_id(), request);

        let outcome = std::panic::AssertUnwindSafe(self.run(&mut w, &mut ctx))
            .catch_unwind()
            .await;
        if let Err(payload) = outcome {
            match &self.on_panic {
                Some(handler) => handler(&mut w, &mut ctx, payload.as_ref()),
                None => default_on_panic(self.config.debug, &mut w, payload.as_ref()),
            }
        }

        ctx.response_time = Some(ctx.started_at.elapsed());
        self.hooks.run("end_request", HookDirection::Reverse, &mut w, &mut ctx);
        w.finish()
    }

    async fn run(&self, w: &mut ResponseWriter, ctx: &mut Context) {
        self.hooks.run("start_request", HookDirection::Forward, w, ctx);

        let mut method = ctx.request.method().as_str().to_owned();
        if self.config.allow_method_override {
            if let Some(overridden) = ctx.request.form_value("_method") {
                if !overridden.is_empty() {
                    method = overridden;
                }
            }
        }

        let path = ctx.request.path().to_owned();
        match self.routes.match_path(&method, &path) {
            None => match &self.on_not_found {
                Some(handler) => handler(w, ctx),
                None => default_not_found(w),
            },
            Some((route, params)) => {
                ctx.params = params;
                ctx.route = Some(Arc::clone(&route));

                self.hooks.run("start_action", HookDirection::Forward, w, ctx);
                let mut chain = route.chain.fork();
                chain.next(w, ctx).await;
                self.hooks.run("end_action", HookDirection::Reverse, w, ctx);
            }
        }

        // Commit the header while still inside the caught region, so stage
        // hooks (session persistence) run even for bodiless responses and
        // their failures reach the panic handler.
        w.finish_headers();
    }

    fn next_context_id(&self) -> String {
        let seq = self.id_seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        format!("{}{seq:010}", chrono::Utc::now().format("%Y%m%d%H%M"))
    }
}

/// Extracts a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

fn default_on_panic(debug: bool, w: &mut ResponseWriter, payload: &(dyn Any + Send)) {
    w.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    if debug {
        let backtrace = std::backtrace::Backtrace::force_capture();
        w.write_str(&format!("{}\n\n{backtrace}", panic_message(payload)));
    } else {
        w.write_str("Internal Server Error");
    }
}

fn default_not_found(w: &mut ResponseWriter) {
    w.set_status(StatusCode::NOT_FOUND);
    w.set_header("content-type", "text/plain; charset=utf-8");
    w.write_str("404 page not found\n");
}

/// A URL prefix with an associated middleware set applied to all routes
/// registered beneath it.
pub struct MountPoint<'app> {
    app: &'app mut App,
    path: String,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MountPoint<'_> {
    /// Appends a middleware applied to routes registered afterwards on this
    /// mount point.
    pub fn use_middleware(&mut self, middleware: impl Middleware) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Registers a route. `pattern` is appended to the mount prefix and
    /// anchored; `middlewares` run after the mount point's own.
    pub fn route(
        &mut self,
        name: &str,
        pattern: &str,
        method: Method,
        is_static: bool,
        handler: impl Handler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Arc<Route> {
        let mut links = self.middlewares.clone();
        links.extend(middlewares);
        let route = Route::new(
            name,
            &format!("{}{pattern}", self.path),
            method,
            is_static,
            Arc::new(handler),
            links,
        );
        self.app.routes.insert(route)
    }

    pub fn get(&mut self, name: &str, pattern: &str, handler: impl Handler) -> Arc<Route> {
        self.route(name, pattern, Method::GET, false, handler, Vec::new())
    }

    pub fn post(&mut self, name: &str, pattern: &str, handler: impl Handler) -> Arc<Route> {
        self.route(name, pattern, Method::POST, false, handler, Vec::new())
    }

    pub fn put(&mut self, name: &str, pattern: &str, handler: impl Handler) -> Arc<Route> {
        self.route(name, pattern, Method::PUT, false, handler, Vec::new())
    }

    pub fn delete(&mut self, name: &str, pattern: &str, handler: impl Handler) -> Arc<Route> {
        self.route(name, pattern, Method::DELETE, false, handler, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ids_are_unique_and_sequenced() {
        let app = App::new(AppConfig::default());
        let a = app.next_context_id();
        let b = app.next_context_id();
        assert_ne!(a, b);
        assert!(a.len() > 10);
        assert!(a < b || a[..12] != b[..12]);
    }

    #[test]
    fn mount_points_snapshot_prefixes() {
        let mut app = App::new(AppConfig::default());
        let mut p1 = app.mount("/p1");
        p1.get("page1", "page1/(?P<param1>[^/]+)", empty);
        assert_eq!(app.build_url("page1", &["value"]), "/p1/page1/value");
    }

    async fn empty(_w: &mut ResponseWriter, _ctx: &mut Context) {}
}
