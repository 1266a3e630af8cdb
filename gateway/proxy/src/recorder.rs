use crate::{MatchedProxy, CORRELATION_ID};
use futures::{future, FutureExt};
use http::{Request, Response};
use std::task::{Context, Poll};
use tokio::time;
use tracing::{info, info_span, Instrument};

/// Wraps each request in a span and logs its outcome.
#[derive(Clone, Debug, Default)]
pub struct RecordLayer(());

#[derive(Clone, Debug)]
pub struct Record<S> {
    inner: S,
}

impl<S> tower::Layer<S> for RecordLayer {
    type Service = Record<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Record { inner }
    }
}

impl<S, B, RB> tower::Service<Request<B>> for Record<S>
where
    S: tower::Service<Request<B>, Response = Response<RB>>,
    S::Future: Send + 'static,
{
    type Response = Response<RB>;
    type Error = S::Error;
    type Future = future::BoxFuture<'static, Result<Response<RB>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let span = info_span!("request", method = %req.method(), path = %req.uri().path());
        let start = time::Instant::now();
        let fut = {
            let _enter = span.enter();
            self.inner.call(req)
        };
        fut.map(move |res| {
            if let Ok(rsp) = &res {
                let proxy = rsp.extensions().get::<MatchedProxy>().map(|p| &p.0);
                let correlation_id = rsp
                    .headers()
                    .get(&CORRELATION_ID)
                    .and_then(|v| v.to_str().ok());
                info!(
                    status = rsp.status().as_u16(),
                    proxy = proxy.map(tracing::field::display),
                    correlation_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request completed"
                );
            }
            res
        })
        .instrument(span)
        .boxed()
    }
}
