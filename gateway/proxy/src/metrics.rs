use crate::MatchedProxy;
use futures::{future, FutureExt};
use http::{Request, Response};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::task::{Context, Poll};
use tokio::time;

#[derive(Clone, Debug)]
pub struct GatewayMetrics {
    requests: Family<RequestLabels, Counter>,
    latency: Family<ProxyLabels, Histogram>,
}

#[derive(Clone, Debug)]
pub struct MetricsLayer(GatewayMetrics);

#[derive(Clone, Debug)]
pub struct Measure<S> {
    inner: S,
    metrics: GatewayMetrics,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    proxy: String,
    method: String,
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ProxyLabels {
    proxy: String,
}

// === impl GatewayMetrics ===

impl GatewayMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        reg.register(
            "requests",
            "Total number of requests handled by the gateway",
            requests.clone(),
        );

        let latency = Family::<ProxyLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
        });
        reg.register_with_unit(
            "response_latency",
            "Histogram of the time taken to produce a response",
            Unit::Seconds,
            latency.clone(),
        );

        Self { requests, latency }
    }

    pub fn layer(&self) -> MetricsLayer {
        MetricsLayer(self.clone())
    }

    fn record(&self, method: &http::Method, proxy: Option<&MatchedProxy>, status: u16, secs: f64) {
        let proxy = proxy.map(|p| p.0.to_string()).unwrap_or_default();
        self.requests
            .get_or_create(&RequestLabels {
                proxy: proxy.clone(),
                method: method.to_string(),
                status: status.to_string(),
            })
            .inc();
        self.latency.get_or_create(&ProxyLabels { proxy }).observe(secs);
    }
}

// === impl MetricsLayer ===

impl<S> tower::Layer<S> for MetricsLayer {
    type Service = Measure<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Measure {
            inner,
            metrics: self.0.clone(),
        }
    }
}

// === impl Measure ===

impl<S, B, RB> tower::Service<Request<B>> for Measure<S>
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
        let start = time::Instant::now();
        let method = req.method().clone();
        let metrics = self.metrics.clone();
        self.inner
            .call(req)
            .map(move |res| {
                if let Ok(rsp) = &res {
                    metrics.record(
                        &method,
                        rsp.extensions().get::<MatchedProxy>(),
                        rsp.status().as_u16(),
                        start.elapsed().as_secs_f64(),
                    );
                }
                res
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanali_gateway_core::ResourceId;
    use std::convert::Infallible;
    use tower::{Layer, ServiceExt};

    #[tokio::test]
    async fn counts_requests_by_proxy() {
        let mut prom = Registry::default();
        let metrics = GatewayMetrics::register(prom.sub_registry_with_prefix("gateway"));

        let svc = metrics.layer().layer(tower::service_fn(|_: Request<()>| async {
            let mut rsp = Response::new(());
            rsp.extensions_mut()
                .insert(MatchedProxy(ResourceId::new("ns-0", "proxy-0")));
            Ok::<_, Infallible>(rsp)
        }));
        for _ in 0..2 {
            svc.clone().oneshot(Request::new(())).await.unwrap();
        }

        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &prom).unwrap();
        assert!(
            text.contains(
                r#"gateway_requests_total{proxy="ns-0/proxy-0",method="GET",status="200"} 2"#
            ),
            "{text}"
        );
        assert!(
            text.contains(r#"gateway_response_latency_seconds_count{proxy="ns-0/proxy-0"} 2"#),
            "{text}"
        );
    }
}
