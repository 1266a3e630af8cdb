use crate::sync::FromResource;
use anyhow::{bail, ensure, Context, Result};
use kanali_gateway_core::{
    path, Backend, HeaderName, LabelMatch, LabelValue, PluginRef, ProxyRoute, ResourceId,
    ServiceBackend, Source, Target,
};
use kanali_gateway_k8s_api::{api_proxy as api, ApiProxy, ApiProxySpec, ResourceExt};
use std::num::NonZeroU16;

impl FromResource<ApiProxy> for ProxyRoute {
    fn from_resource(proxy: ApiProxy) -> Result<Self> {
        let namespace = proxy.namespace().unwrap_or_default();
        decode(&namespace, &proxy.name_unchecked(), proxy.spec)
    }
}

/// Decodes an `ApiProxy` spec, rejecting routes that could never be served.
pub fn decode(namespace: &str, name: &str, spec: ApiProxySpec) -> Result<ProxyRoute> {
    let ApiProxySpec {
        source,
        target,
        plugins,
    } = spec;

    ensure!(
        !source.path.trim().is_empty(),
        "source path must not be empty"
    );
    let source = Source {
        virtual_host: source
            .virtual_host
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty()),
        path: path::normalize_prefix(&source.path),
    };

    let target = Target {
        path: path::normalize_prefix(target.path.as_deref().unwrap_or_default()),
        backend: backend(target.backend)?,
    };

    let plugins = plugins
        .into_iter()
        .map(|p| {
            ensure!(!p.name.is_empty(), "plugin name must not be empty");
            Ok(PluginRef {
                name: p.name,
                version: p.version.filter(|v| !v.is_empty()),
                config: p.config,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ProxyRoute {
        id: ResourceId::new(namespace, name),
        source,
        target,
        plugins,
    })
}

fn backend(backend: api::Backend) -> Result<Backend> {
    match backend {
        api::Backend {
            endpoint: Some(endpoint),
            mock: None,
            service: None,
        } => endpoint_uri(&endpoint).map(Backend::Endpoint),

        api::Backend {
            endpoint: None,
            mock: Some(mock),
            service: None,
        } => {
            ensure!(
                !mock.mock_target_name.is_empty(),
                "mock target name must not be empty"
            );
            Ok(Backend::Mock {
                target: mock.mock_target_name,
            })
        }

        api::Backend {
            endpoint: None,
            mock: None,
            service: Some(service),
        } => service_backend(service).map(Backend::Service),

        api::Backend {
            endpoint,
            mock,
            service,
        } => {
            let set = [endpoint.is_some(), mock.is_some(), service.is_some()]
                .into_iter()
                .filter(|s| *s)
                .count();
            bail!("backend must set exactly one of endpoint, mock, or service; {set} are set")
        }
    }
}

fn endpoint_uri(endpoint: &str) -> Result<http::Uri> {
    let uri = endpoint
        .parse::<http::Uri>()
        .with_context(|| format!("invalid endpoint: {endpoint}"))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => bail!("unsupported endpoint scheme: {scheme}"),
        None => bail!("endpoint must be an absolute URL: {endpoint}"),
    }
    ensure!(
        uri.authority().is_some(),
        "endpoint must include a host: {endpoint}"
    );
    Ok(uri)
}

fn service_backend(service: api::ServiceRef) -> Result<ServiceBackend> {
    let port = u16::try_from(service.port)
        .ok()
        .and_then(NonZeroU16::new)
        .with_context(|| format!("invalid service port: {}", service.port))?;
    let name = service.name.filter(|n| !n.is_empty());
    let labels = service
        .labels
        .into_iter()
        .map(label_match)
        .collect::<Result<Vec<_>>>()?;
    ensure!(
        name.is_some() || !labels.is_empty(),
        "service backend must set a name or labels"
    );
    Ok(ServiceBackend { name, port, labels })
}

fn label_match(label: api::Label) -> Result<LabelMatch> {
    ensure!(!label.name.is_empty(), "label name must not be empty");
    let value = match (label.header, label.value) {
        (Some(header), None) => LabelValue::Header(
            HeaderName::from_bytes(header.as_bytes())
                .with_context(|| format!("invalid header name: {header}"))?,
        ),
        (None, Some(value)) => LabelValue::Literal(value),
        _ => bail!(
            "label {} must set exactly one of header or value",
            label.name
        ),
    };
    Ok(LabelMatch {
        label: label.name,
        value,
    })
}
