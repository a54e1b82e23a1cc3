//! Middleware chain with explicit continuation.
//!
//! A route's chain is compiled once at registration: global middlewares,
//! mount-point middlewares, per-route middlewares, the handler, and a
//! terminal no-op sentinel. The link list is immutable and shared; each
//! request [`fork`](Chain::fork)s its own cursor over it. Sharing a cursor
//! across concurrent requests would be a correctness bug, so the template
//! chain is never run directly.
//!
//! A link may act before and after awaiting [`Chain::next`], which yields
//! nested (onion) control flow:
//!
//! ```text
//! pre1 → pre2 → pre3 → handler → post3 → post2 → post1
//! ```
//!
//! A link that never calls `next` short-circuits everything after it. The
//! sentinel does nothing, so the last real link's `next` call is always
//! in-bounds.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::Context;
use crate::response::ResponseWriter;

/// A link in the request-processing chain.
///
/// Implementations call `chain.next(w, ctx).await` to yield to the rest of
/// the chain, and may write to the response before and after doing so.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, w: &mut ResponseWriter, ctx: &mut Context, chain: &mut Chain);
}

/// An immutable, shared link list plus one request's cursor over it.
pub struct Chain {
    links: Arc<[Arc<dyn Middleware>]>,
    cursor: usize,
}

impl Chain {
    pub(crate) fn new(links: Vec<Arc<dyn Middleware>>) -> Self {
        Self { links: links.into(), cursor: 0 }
    }

    /// An independent cursor over the same link list.
    pub(crate) fn fork(&self) -> Self {
        Self { links: Arc::clone(&self.links), cursor: 0 }
    }

    /// Invokes the next link in the chain.
    pub async fn next(&mut self, w: &mut ResponseWriter, ctx: &mut Context) {
        let link = Arc::clone(&self.links[self.cursor]);
        self.cursor += 1;
        link.handle(w, ctx, self).await;
    }
}

/// The terminal no-op link appended to every compiled chain.
pub(crate) struct Sentinel;

#[async_trait]
impl Middleware for Sentinel {
    async fn handle(&self, _w: &mut ResponseWriter, _ctx: &mut Context, _chain: &mut Chain) {}
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// A route endpoint.
///
/// Satisfied by any `async fn(&mut ResponseWriter, &mut Context)` through the
/// blanket impl below; implement it directly for stateful handlers.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, ctx: &'a mut Context) -> BoxFuture<'a, ()>;
}

/// Helper trait tying a handler fn's future to its borrows, so the blanket
/// `Handler` impl can quantify over the call lifetime.
pub trait HandlerFn<'a>: Fn(&'a mut ResponseWriter, &'a mut Context) -> Self::Fut + Send + Sync {
    type Fut: Future<Output = ()> + Send + 'a;
}

impl<'a, F, Fut> HandlerFn<'a> for F
where
    F: Fn(&'a mut ResponseWriter, &'a mut Context) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'a,
{
    type Fut = Fut;
}

impl<F> Handler for F
where
    F: for<'a> HandlerFn<'a> + 'static,
{
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(self(w, ctx))
    }
}

/// Adapts the handler at the end of a chain into a link that ignores the
/// continuation.
pub(crate) struct HandlerLink(pub(crate) Arc<dyn Handler>);

#[async_trait]
impl Middleware for HandlerLink {
    async fn handle(&self, w: &mut ResponseWriter, ctx: &mut Context, _chain: &mut Chain) {
        self.0.call(w, ctx).await;
    }
}

// ── Function middlewares ──────────────────────────────────────────────────────

/// Wraps a function returning a boxed future as a [`Middleware`].
///
/// ```rust,ignore
/// fn trace<'a>(w: &'a mut ResponseWriter, ctx: &'a mut Context, chain: &'a mut Chain)
///     -> BoxFuture<'a, ()>
/// {
///     Box::pin(async move {
///         chain.next(w, ctx).await;
///         tracing::debug!(status = w.status(), "handled");
///     })
/// }
/// app.use_middleware(middleware_fn(trace));
/// ```
pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut ResponseWriter, &'a mut Context, &'a mut Chain) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    MiddlewareFn(f)
}

pub struct MiddlewareFn<F>(F);

#[async_trait]
impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut ResponseWriter, &'a mut Context, &'a mut Chain) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    async fn handle(&self, w: &mut ResponseWriter, ctx: &mut Context, chain: &mut Chain) {
        (self.0)(&mut *w, &mut *ctx, &mut *chain).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, w: &mut ResponseWriter, ctx: &mut Context, chain: &mut Chain) {
            w.write_str(&format!("pre{} ", self.0));
            chain.next(w, ctx).await;
            w.write_str(&format!("post{} ", self.0));
        }
    }

    struct Blocker;

    #[async_trait]
    impl Middleware for Blocker {
        async fn handle(&self, w: &mut ResponseWriter, _ctx: &mut Context, _chain: &mut Chain) {
            w.write_str("blocked");
        }
    }

    async fn hello(w: &mut ResponseWriter, _ctx: &mut Context) {
        w.write_str("H ");
    }

    fn compile(mut links: Vec<Arc<dyn Middleware>>) -> Chain {
        links.push(Arc::new(HandlerLink(Arc::new(hello))));
        links.push(Arc::new(Sentinel));
        Chain::new(links)
    }

    fn body(w: &ResponseWriter) -> String {
        String::from_utf8_lossy(w.body()).into_owned()
    }

    #[tokio::test]
    async fn onion_ordering() {
        let template = compile(vec![Arc::new(Tag("1")), Arc::new(Tag("2")), Arc::new(Tag("3"))]);
        let mut w = ResponseWriter::new();
        let mut ctx = Context::new("t".into(), Request::new(http::Method::GET, "/"));
        let mut chain = template.fork();
        chain.next(&mut w, &mut ctx).await;
        assert_eq!(body(&w), "pre1 pre2 pre3 H post3 post2 post1 ");
    }

    #[tokio::test]
    async fn skipping_next_short_circuits() {
        let template = compile(vec![Arc::new(Tag("1")), Arc::new(Blocker), Arc::new(Tag("3"))]);
        let mut w = ResponseWriter::new();
        let mut ctx = Context::new("t".into(), Request::new(http::Method::GET, "/"));
        let mut chain = template.fork();
        chain.next(&mut w, &mut ctx).await;
        assert_eq!(body(&w), "pre1 blockedpost1 ");
    }

    #[tokio::test]
    async fn forks_do_not_share_cursors() {
        let template = compile(vec![Arc::new(Tag("1"))]);
        for _ in 0..2 {
            let mut w = ResponseWriter::new();
            let mut ctx = Context::new("t".into(), Request::new(http::Method::GET, "/"));
            let mut chain = template.fork();
            chain.next(&mut w, &mut ctx).await;
            assert_eq!(body(&w), "pre1 H post1 ");
        }
    }

    #[tokio::test]
    async fn middleware_fn_adapter() {
        fn tag<'a>(
            w: &'a mut ResponseWriter,
            ctx: &'a mut Context,
            chain: &'a mut Chain,
        ) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                w.write_str("fn-pre ");
                chain.next(w, ctx).await;
                w.write_str("fn-post");
            })
        }

        let template = compile(vec![Arc::new(middleware_fn(tag))]);
        let mut w = ResponseWriter::new();
        let mut ctx = Context::new("t".into(), Request::new(http::Method::GET, "/"));
        let mut chain = template.fork();
        chain.next(&mut w, &mut ctx).await;
        assert_eq!(body(&w), "fn-pre H fn-post");
    }
}
