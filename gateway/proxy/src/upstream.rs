use crate::{
    body::{self, ReadError},
    Body,
};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use kanali_gateway_core::Error;
use std::time::Duration;
use tracing::debug;

/// Sends requests to backends outside the gateway.
#[async_trait::async_trait]
pub trait Upstream: Clone + Send + Sync + 'static {
    /// Sends `req`, whose URI is absolute, and buffers the response.
    async fn forward(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

/// Forwards requests over HTTP/1, in plaintext or over TLS as the request's scheme requires.
#[derive(Clone, Debug)]
pub struct HttpUpstream {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Duration,
    max_body_bytes: usize,
}

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [header::HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HeaderName::from_static("keep-alive"),
];

// === impl HttpUpstream ===

impl HttpUpstream {
    /// Upstream certificates are verified against the webpki root store. Responses larger than
    /// `max_body_bytes` are discarded.
    pub fn new(timeout: Duration, max_body_bytes: usize) -> Result<Self, rustls::Error> {
        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self {
            client,
            timeout,
            max_body_bytes,
        })
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let (mut parts, body) = req.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        if let Some(authority) = parts.uri.authority() {
            let host = HeaderValue::from_str(authority.as_str()).map_err(Error::upstream)?;
            parts.headers.insert(header::HOST, host);
        }
        debug!(uri = %parts.uri, "Forwarding request");

        let req = Request::from_parts(parts, Body::new(body));
        let rsp = match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(Ok(rsp)) => rsp,
            Ok(Err(error)) => return Err(Error::upstream(error)),
            Err(_) => {
                return Err(Error::upstream(format!(
                    "no response within {:?}",
                    self.timeout
                )))
            }
        };

        let (mut parts, body) = rsp.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        let body = match body::read_limited(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(ReadError::TooLarge { limit }) => {
                return Err(Error::upstream(format!(
                    "response body exceeds {limit} bytes"
                )))
            }
            Err(ReadError::Read(error)) => return Err(Error::Upstream(error)),
        };
        Ok(Response::from_parts(parts, body))
    }
}

/// Removes hop-by-hop headers, including any named by the `Connection` header.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| header::HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect::<Vec<_>>();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
