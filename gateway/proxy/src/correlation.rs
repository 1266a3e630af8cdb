use futures::{future, FutureExt};
use http::{HeaderName, HeaderValue, Request, Response};
use std::task::{Context, Poll};

pub const CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// The correlation ID assigned to a request, available as a request extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub HeaderValue);

/// Ensures every request carries a correlation ID, and echoes it on the response.
#[derive(Clone, Debug, Default)]
pub struct CorrelationLayer(());

#[derive(Clone, Debug)]
pub struct Correlate<S> {
    inner: S,
}

// === impl CorrelationLayer ===

impl<S> tower::Layer<S> for CorrelationLayer {
    type Service = Correlate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Correlate { inner }
    }
}

// === impl Correlate ===

impl<S, B, RB> tower::Service<Request<B>> for Correlate<S>
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

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let id = match req.headers().get(&CORRELATION_ID) {
            Some(id) if !id.is_empty() => id.clone(),
            _ => generate(),
        };
        req.headers_mut().insert(CORRELATION_ID, id.clone());
        req.extensions_mut().insert(CorrelationId(id.clone()));

        self.inner
            .call(req)
            .map(move |res| {
                res.map(|mut rsp| {
                    rsp.headers_mut().insert(CORRELATION_ID, id);
                    rsp
                })
            })
            .boxed()
    }
}

fn generate() -> HeaderValue {
    HeaderValue::try_from(uuid::Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::{Layer, ServiceExt};

    async fn call(req: Request<()>) -> Response<Option<HeaderValue>> {
        let svc = CorrelationLayer::default().layer(tower::service_fn(|req: Request<()>| async move {
            let seen = req.extensions().get::<CorrelationId>().map(|id| id.0.clone());
            assert_eq!(seen.as_ref(), req.headers().get(&CORRELATION_ID));
            Ok::<_, Infallible>(Response::new(seen))
        }));
        svc.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn generates_missing_ids() {
        let rsp = call(Request::new(())).await;
        let id = rsp.headers().get(&CORRELATION_ID).expect("must be set");
        assert_eq!(Some(id), rsp.body().as_ref());
        assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn propagates_existing_ids() {
        let req = Request::builder()
            .header(CORRELATION_ID, "abc-123")
            .body(())
            .unwrap();
        let rsp = call(req).await;
        assert_eq!(rsp.headers()[CORRELATION_ID], "abc-123");
        assert_eq!(rsp.body().as_ref().unwrap(), "abc-123");
    }
}
