//! Transport: TCP accept loop, connection tasks, graceful shutdown.
//!
//! No wire-level HTTP parsing lives here; hyper owns the protocol. This
//! module's job is to feed buffered [`Request`]s into [`App::handle`] and
//! to drain in-flight connections when the process receives SIGTERM or
//! Ctrl-C.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::App;
use crate::error::Error;
use crate::request::Request;

/// Binds `app.config.addr` and serves until a shutdown signal, then drains.
pub(crate) async fn serve(app: App) -> Result<(), Error> {
    let addr: SocketAddr = app.config.addr.parse()?;
    let listener = TcpListener::bind(addr).await?;

    // Shared across connection tasks; the route table and hook registries
    // are read-only from here on.
    let app = Arc::new(app);

    info!(addr = %addr, "sidra listening");

    // Every connection task is tracked so shutdown can wait for all of them.
    let mut tasks = tokio::task::JoinSet::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Check shutdown first so a signal stops accepting immediately,
            // even with connections queued.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let app = Arc::clone(&app);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = service_fn({
                        let app = Arc::clone(&app);
                        move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req).await }
                        }
                    });

                    // Negotiates HTTP/1.1 or HTTP/2 per client.
                    let mut builder = ConnBuilder::new(TokioExecutor::new());
                    builder
                        .http1()
                        .timer(TokioTimer::new())
                        .header_read_timeout(app.config.read_timeout)
                        .keep_alive(app.config.keep_alive);

                    if let Err(e) = builder.serve_connection(io, svc).await {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished tasks so the JoinSet stays bounded.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("sidra stopped");
    Ok(())
}

/// Buffers one request and runs it through the dispatch engine. All failures
/// become responses; hyper never sees an error.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("request body error: {e}");
            let resp = http::Response::builder()
                .status(http::StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::new()))
                .expect("static response");
            return Ok(resp);
        }
    };

    let request = Request::from_parts(parts.method, parts.uri.path().to_owned(), parts.headers, body);
    Ok(app.handle(request).await)
}

/// Resolves on the first shutdown signal: SIGTERM or Ctrl-C on Unix, Ctrl-C
/// elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
