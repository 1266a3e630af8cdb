use crate::proxy::Body;
use anyhow::Result;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request, Response};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};

/// Serves the gateway over plaintext HTTP/1 until shutdown, then drains open connections.
#[instrument(skip_all, fields(port = %addr.port()))]
pub(crate) async fn serve<S>(addr: SocketAddr, svc: S, drain: drain::Watch) -> Result<()>
where
    S: tower::Service<Request<Incoming>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Gateway server listening");

    loop {
        let (stream, client) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
            _ = drain.clone().signaled() => {
                info!("Gateway server shutting down");
                return Ok(());
            }
        };

        let svc = svc.clone();
        let drain = drain.clone();
        tokio::spawn(
            async move {
                let svc = service_fn(move |req| svc.clone().oneshot(req));
                let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), svc);
                tokio::pin!(conn);

                let res = tokio::select! {
                    res = &mut conn => res,
                    handle = drain.signaled() => {
                        conn.as_mut().graceful_shutdown();
                        handle.release_after(conn).await
                    }
                };
                if let Err(error) = res {
                    debug!(%error, "Connection closed");
                }
            }
            .instrument(debug_span!("conn", %client)),
        );
    }
}
