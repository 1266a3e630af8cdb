use crate::plugin::{Context, Plugin};
use bytes::Bytes;
use chrono::Utc;
use http::{uri::PathAndQuery, HeaderName, Request, Uri};
use kanali_gateway_core::{
    ApiKey, ApiKeyBinding, AuthnFailure, DecryptionKey, Error, KeyBinding, RateKey, RateLimiter,
    ResourceId,
};
use kanali_gateway_k8s_index::{SharedStore, Stores};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_HEADER: HeaderName = HeaderName::from_static("apikey");
pub const DEFAULT_QUERY_PARAM: &str = "apikey";

/// Pins the binding consulted for a proxy, by name within the proxy's namespace.
const BINDING_NAME: &str = "bindingName";

/// Authenticates, authorizes and rate limits requests by API key.
///
/// Callers present `<key name>:<secret>` in a header or, failing that, in a query parameter. The
/// secret must match the key's active revision. The key must then be bound in the proxy's
/// namespace with a rule that permits the request, and within its binding's quota.
#[derive(Clone, Debug)]
pub struct ApiKeyPlugin {
    api_keys: SharedStore<ApiKey>,
    bindings: SharedStore<ApiKeyBinding>,
    decryption_key: DecryptionKey,
    limiter: Arc<RateLimiter>,
    header: HeaderName,
    query_param: String,
}

struct Credential {
    key: String,
    secret: String,
}

// === impl ApiKeyPlugin ===

impl ApiKeyPlugin {
    pub fn new(stores: &Stores, decryption_key: DecryptionKey, limiter: Arc<RateLimiter>) -> Self {
        Self {
            api_keys: stores.api_keys.clone(),
            bindings: stores.bindings.clone(),
            decryption_key,
            limiter,
            header: DEFAULT_HEADER,
            query_param: DEFAULT_QUERY_PARAM.to_string(),
        }
    }

    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    pub fn with_query_param(mut self, param: impl ToString) -> Self {
        self.query_param = param.to_string();
        self
    }

    fn credential<B>(&self, req: &Request<B>) -> Option<Credential> {
        let from_header = req
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let presented = from_header.or_else(|| {
            url::form_urlencoded::parse(req.uri().query()?.as_bytes())
                .find(|(name, _)| *name == self.query_param)
                .map(|(_, value)| value.into_owned())
        })?;
        let (key, secret) = presented.trim().split_once(':')?;
        if key.is_empty() {
            return None;
        }
        Some(Credential {
            key: key.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Verifies the credential against the key's active revision and records its use.
    fn authenticate(&self, cred: &Credential) -> Result<(), AuthnFailure> {
        let data = {
            let key = self
                .api_keys
                .read()
                .get(&cred.key)
                .ok_or_else(|| AuthnFailure::UnknownKey(cred.key.clone()))?;
            let (_, revision) = key
                .active_revision()
                .ok_or_else(|| AuthnFailure::NoActiveRevision(cred.key.clone()))?;
            revision.data.clone()
        };

        match self.decryption_key.verify(&data, cred.secret.as_bytes()) {
            Ok(true) => {}
            Ok(false) => return Err(AuthnFailure::Mismatch(cred.key.clone())),
            Err(error) => {
                warn!(key = %cred.key, %error, "Failed to decrypt active revision");
                return Err(AuthnFailure::Decrypt(cred.key.clone()));
            }
        }

        if let Err(error) = self.api_keys.write().touch(&cred.key, &data, Utc::now()) {
            debug!(%error, "API key changed while in use");
        }
        Ok(())
    }

    /// Removes the credential so that it is never forwarded.
    fn strip_credential<B>(&self, req: &mut Request<B>) -> Result<(), Error> {
        req.headers_mut().remove(&self.header);
        if let Some(uri) = self.without_query_param(req.uri())? {
            *req.uri_mut() = uri;
        }
        Ok(())
    }

    /// Returns `uri` without the credential query parameter, or `None` if it has none.
    fn without_query_param(&self, uri: &Uri) -> Result<Option<Uri>, Error> {
        let Some(query) = uri.query() else {
            return Ok(None);
        };
        let params = url::form_urlencoded::parse(query.as_bytes());
        if !params.clone().any(|(name, _)| name == self.query_param) {
            return Ok(None);
        }

        let mut kept = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in params.filter(|(name, _)| *name != self.query_param) {
            kept.append_pair(&name, &value);
        }
        let kept = kept.finish();
        let path_and_query = if kept.is_empty() {
            PathAndQuery::try_from(uri.path())
        } else {
            PathAndQuery::try_from(format!("{}?{kept}", uri.path()))
        }
        .map_err(|e| Error::BadRequest(format!("invalid request target: {e}")))?;

        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(path_and_query);
        Uri::from_parts(parts)
            .map(Some)
            .map_err(|e| Error::BadRequest(format!("invalid request target: {e}")))
    }

    /// Finds the binding for `key` among the bindings in `namespace`.
    fn binding(
        &self,
        namespace: &str,
        pinned: Option<&str>,
        key: &str,
    ) -> Option<(ResourceId, KeyBinding)> {
        let bindings = self.bindings.read();
        if let Some(name) = pinned {
            let id = ResourceId::new(namespace, name);
            let binding = bindings.get(&id)?;
            return binding.key(key).map(|kb| (id, kb.clone()));
        }

        let mut candidates = bindings.iter_in(namespace).collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.id.name.cmp(&b.id.name));
        candidates
            .into_iter()
            .find_map(|b| b.key(key).map(|kb| (b.id.clone(), kb.clone())))
    }
}

#[async_trait::async_trait]
impl Plugin for ApiKeyPlugin {
    fn name(&self) -> &str {
        "apikey"
    }

    fn version(&self) -> &str {
        "v1"
    }

    async fn on_request(&self, ctx: &Context<'_>, req: &mut Request<Bytes>) -> Result<(), Error> {
        let cred = self.credential(req).ok_or(AuthnFailure::Missing);
        let cred = match cred.and_then(|cred| self.authenticate(&cred).map(|()| cred)) {
            Ok(cred) => cred,
            Err(failure) => {
                info!(proxy = %ctx.route.id, reason = %failure, "Rejected API key");
                return Err(failure.into());
            }
        };

        let pinned = ctx.config.get(BINDING_NAME).map(String::as_str);
        let Some((binding, grant)) = self.binding(&ctx.route.id.namespace, pinned, &cred.key)
        else {
            info!(proxy = %ctx.route.id, key = %cred.key, "API key is not bound");
            return Err(Error::Forbidden);
        };

        let subpath = ctx.route.subpath(req.uri().path());
        if !grant.permits(req.method(), subpath) {
            info!(
                proxy = %ctx.route.id,
                key = %cred.key,
                %binding,
                method = %req.method(),
                subpath,
                "API key is not permitted"
            );
            return Err(Error::Forbidden);
        }

        if let Some(rate) = grant.rate {
            let rate_key = RateKey {
                binding,
                key: cred.key.clone(),
            };
            if let Err(exceeded) = self.limiter.check(&rate_key, rate) {
                info!(key = %cred.key, binding = %rate_key.binding, "API key exceeded its quota");
                return Err(Error::RateLimited {
                    retry_after: exceeded.retry_after,
                });
            }
        }

        self.strip_credential(req)
    }
}
