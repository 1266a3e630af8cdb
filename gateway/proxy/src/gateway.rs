use crate::{
    body::{self, ReadError},
    error,
    plugin::{Context, Registry},
    Body, HttpUpstream, Upstream,
};
use bytes::Bytes;
use futures::future;
use http::{header, uri, Request, Response, Uri};
use kanali_gateway_core::{
    path, route, Backend, BoxError, Error, ProxyRoute, ResourceId, ServiceBackend,
};
use kanali_gateway_k8s_index::Stores;
use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct Config {
    /// DNS suffix of cluster services, e.g. `cluster.local`.
    pub cluster_domain: String,
    /// Requests with larger bodies are refused.
    pub max_body_bytes: usize,
}

/// Serves requests on behalf of the proxies in the index.
#[derive(Clone, Debug)]
pub struct Gateway<U = HttpUpstream> {
    inner: Arc<Inner<U>>,
}

#[derive(Debug)]
struct Inner<U> {
    stores: Stores,
    plugins: Registry,
    upstream: U,
    config: Config,
}

/// Identifies the proxy that handled a request. Set as a response extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedProxy(pub ResourceId);

// === impl Gateway ===

impl<U: Upstream> Gateway<U> {
    pub fn new(stores: Stores, plugins: Registry, upstream: U, config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                stores,
                plugins,
                upstream,
                config,
            }),
        }
    }

    async fn handle(self, req: Request<Bytes>) -> Response<Body> {
        let route = {
            let host = request_host(&req);
            let routes = self.inner.stores.routes.read();
            route::resolve(routes.iter(), host.as_deref(), req.uri().path())
        };

        let Some(route) = route else {
            debug!(path = %req.uri().path(), "No proxy matches");
            return error::respond(&Error::NoRoute);
        };

        let mut rsp = match self.proxy(&route, req).await {
            Ok(rsp) => rsp.map(Body::new),
            Err(error) => {
                let status = error.status();
                if status.is_server_error() {
                    warn!(proxy = %route.id, %status, error = %ErrorChain(&error), "Request failed");
                } else {
                    info!(proxy = %route.id, %status, %error, "Request rejected");
                }
                error::respond(&error)
            }
        };
        rsp.extensions_mut().insert(MatchedProxy(route.id.clone()));
        rsp
    }

    /// Runs `route`'s plugins around a dispatch to its backend.
    async fn proxy(
        &self,
        route: &ProxyRoute,
        mut req: Request<Bytes>,
    ) -> Result<Response<Bytes>, Error> {
        let steps = self.inner.plugins.resolve(&route.plugins)?;

        for step in &steps {
            let ctx = Context {
                route,
                config: step.config,
            };
            step.plugin.on_request(&ctx, &mut req).await?;
        }

        let mut rsp = self.dispatch(route, req).await?;

        for step in &steps {
            let ctx = Context {
                route,
                config: step.config,
            };
            step.plugin.on_response(&ctx, &mut rsp).await?;
        }
        Ok(rsp)
    }

    async fn dispatch(
        &self,
        route: &ProxyRoute,
        mut req: Request<Bytes>,
    ) -> Result<Response<Bytes>, Error> {
        let rewritten = route.rewrite(req.uri().path());
        let query = req.uri().query().map(str::to_string);

        let uri = match &route.target.backend {
            Backend::Mock { target } => {
                let id = ResourceId::new(&route.id.namespace, target);
                let mock = self
                    .inner
                    .stores
                    .mocks
                    .read()
                    .get(&id)
                    .ok_or_else(|| Error::Selection(format!("mock target {id} does not exist")))?;
                let found = mock
                    .find(req.method(), &rewritten)
                    .ok_or_else(|| Error::NoMockRoute {
                        method: req.method().clone(),
                        path: rewritten.clone(),
                    })?;
                debug!(mock = %id, path = %rewritten, "Serving mock response");
                return Ok(found.to_response());
            }

            Backend::Endpoint(base) => {
                let path = path::join(&path::normalize_prefix(base.path()), &rewritten);
                let scheme = base.scheme().cloned().unwrap_or(uri::Scheme::HTTP);
                let authority = base
                    .authority()
                    .ok_or_else(|| Error::Selection(format!("endpoint {base} has no authority")))?;
                build_uri(scheme, authority.as_str(), &path, query.as_deref())?
            }

            Backend::Service(backend) => {
                let authority = self.service_authority(route, backend, &req)?;
                build_uri(uri::Scheme::HTTP, &authority, &rewritten, query.as_deref())?
            }
        };

        *req.uri_mut() = uri;
        self.inner.upstream.forward(req).await
    }

    fn service_authority(
        &self,
        route: &ProxyRoute,
        backend: &ServiceBackend,
        req: &Request<Bytes>,
    ) -> Result<String, Error> {
        let namespace = &route.id.namespace;
        let services = self.inner.stores.services.read();
        let svc = backend.select(namespace, services.iter_in(namespace), req.headers())?;
        Ok(backend.authority(&svc, &self.inner.config.cluster_domain))
    }
}

impl<B, U> tower::Service<Request<B>> for Gateway<U>
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    U: Upstream,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let gateway = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let limit = gateway.inner.config.max_body_bytes;
            let body = match body::read_limited(body, limit).await {
                Ok(body) => body,
                Err(ReadError::TooLarge { limit }) => {
                    debug!(limit, "Request body too large");
                    return Ok(error::respond(&Error::PayloadTooLarge { limit }));
                }
                Err(ReadError::Read(error)) => {
                    let error = Error::BadRequest(format!("failed to read request body: {error}"));
                    return Ok(error::respond(&error));
                }
            };
            Ok(gateway.handle(Request::from_parts(parts, body)).await)
        })
    }
}

/// The request's host without its port, from the `Host` header or the request target.
fn request_host<B>(req: &Request<B>) -> Option<String> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())?;
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    };
    Some(host.to_ascii_lowercase())
}

fn build_uri(
    scheme: uri::Scheme,
    authority: &str,
    path: &str,
    query: Option<&str>,
) -> Result<Uri, Error> {
    let path_and_query = match query {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| Error::Selection(format!("invalid upstream address: {e}")))
}

/// Formats an error with its sources.
struct ErrorChain<'e>(&'e Error);

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = std::error::Error::source(self.0);
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = std::error::Error::source(error);
        }
        Ok(())
    }
}
