//! # sidra
//!
//! A small HTTP framework built around three ideas:
//!
//! - **Onion middleware chains.** Each route compiles one ordered chain
//!   (global + mount-point + per-route middlewares, then the handler). A
//!   link calls [`Chain::next`] explicitly and may act before and after it;
//!   a link that never calls it short-circuits the rest. Every request gets
//!   its own cursor over the shared chain.
//! - **Lifecycle hooks.** Named extension points (`start_request`,
//!   `start_action`, `end_action`, `end_request`) plus write-time hooks on
//!   the response tracker itself. Entering points run forward, leaving
//!   points reverse.
//! - **Signed-cookie sessions.** HMAC-SHA1 tamper-evident cookies, a
//!   pluggable store behind one coarse lock, flash messages, and a
//!   cancellable GC sweeper.
//!
//! Routes are named regex patterns with captured parameters, and names
//! reverse back into URLs via [`App::build_url`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sidra::{App, AppConfig, Context, ResponseWriter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = App::new(AppConfig::default());
//!     let mut root = app.mount("/");
//!     root.get("hello", "hello/(?P<name>[^/]+)", hello);
//!
//!     app.serve().await.unwrap();
//! }
//!
//! async fn hello(w: &mut ResponseWriter, ctx: &mut Context) {
//!     let name = ctx.param("name").unwrap_or("world");
//!     w.write_str(&format!("hello, {name}"));
//! }
//! ```
//!
//! Rendering engines, config-file loading and static file serving live
//! outside this crate; the core consumes the [`Renderer`] trait and plain
//! config values and never cares where either came from.

mod app;
mod context;
mod error;
mod hooks;
mod middleware;
mod render;
mod request;
mod response;
mod router;
mod server;

pub mod session;

pub use app::{App, AppConfig, MountPoint, panic_message};
pub use context::Context;
pub use error::Error;
pub use hooks::{Hook, HookDirection, Hooks};
pub use middleware::{Chain, Handler, Middleware, MiddlewareFn, middleware_fn};
pub use render::Renderer;
pub use request::Request;
pub use response::{ResponseWriter, Stage};
pub use router::{Route, RouteTable};
