//! HTTP/1 server loop

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::router::{self, AppState, HttpResponse};

/// Upper bound for request bodies in bytes
pub const MAX_BODY_SIZE: usize = 64 << 20;

/// Accept connections on `listener` until `shutdown` completes
///
/// Every connection is served on its own task. Connections still open when
/// `shutdown` completes are not awaited.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    tokio::pin!(shutdown);
    info!(addr = %listener.local_addr()?, "server started");

    loop {
        let (stream, peer) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(%err, "failed to accept connection");
                    continue;
                }
            },
            () = &mut shutdown => break,
        };

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req));
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, %err, "connection closed with error");
            }
        });
    }

    info!("server stopped");
    Ok(())
}

async fn handle(state: Arc<AppState>, req: Request<Incoming>) -> Result<HttpResponse, Infallible> {
    let start = Instant::now();
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, MAX_BODY_SIZE).collect().await {
        Ok(body) => body.to_bytes(),
        Err(err) => {
            warn!(method = %parts.method, uri = %parts.uri, %err, "could not read request body");
            return Ok(router::error_response(
                StatusCode::BAD_REQUEST,
                &format!("could not read request body: {err}"),
            ));
        }
    };

    let method = parts.method.clone();
    let uri = parts.uri.clone();
    // the store does blocking file I/O
    let res = tokio::task::spawn_blocking(move || router::route(&state, &method, &uri, &body))
        .await
        .unwrap_or_else(|err| {
            error!(%err, "request handler panicked");
            router::error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        });

    debug!(
        method = %parts.method,
        uri = %parts.uri,
        status = res.status().as_u16(),
        elapsed = ?start.elapsed(),
        "handled request"
    );
    Ok(res)
}
