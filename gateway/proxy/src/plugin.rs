use ahash::AHashMap as HashMap;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use kanali_gateway_core::{Error, PluginRef, ProxyRoute};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A request-processing step that a proxy may declare.
///
/// Steps run strictly in the order a proxy declares them. Any step may abort the request by
/// returning an error, in which case no further steps run and the error is rendered to the client.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    async fn on_request(
        &self,
        _ctx: &Context<'_>,
        _req: &mut Request<Bytes>,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn on_response(
        &self,
        _ctx: &Context<'_>,
        _rsp: &mut Response<Bytes>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// What a plugin knows about the request it is processing.
#[derive(Copy, Clone, Debug)]
pub struct Context<'a> {
    pub route: &'a ProxyRoute,
    pub config: &'a BTreeMap<String, String>,
}

/// Plugins available to proxies, by name and version.
#[derive(Clone, Default)]
pub struct Registry {
    plugins: HashMap<String, Vec<Arc<dyn Plugin>>>,
}

/// A plugin resolved for a particular proxy, along with the proxy's configuration for it.
#[derive(Clone)]
pub(crate) struct Step<'r> {
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) config: &'r BTreeMap<String, String>,
}

// === impl Registry ===

impl Registry {
    pub fn register(&mut self, plugin: impl Plugin) -> &mut Self {
        self.plugins
            .entry(plugin.name().to_string())
            .or_default()
            .push(Arc::new(plugin));
        self
    }

    /// Looks up a plugin. Without a version, the most recently registered version is returned.
    pub fn get(&self, name: &str, version: Option<&str>) -> Option<Arc<dyn Plugin>> {
        let versions = self.plugins.get(name)?;
        let plugin = match version {
            Some(version) => versions.iter().rev().find(|p| p.version() == version),
            None => versions.last(),
        };
        plugin.cloned()
    }

    pub(crate) fn resolve<'r>(&self, refs: &'r [PluginRef]) -> Result<Vec<Step<'r>>, Error> {
        refs.iter()
            .map(|r| {
                let plugin = self.get(&r.name, r.version.as_deref()).ok_or_else(|| {
                    let version = r.version.as_deref().unwrap_or("latest");
                    Error::Plugin {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        message: format!("plugin {}@{version} is not available", r.name),
                    }
                })?;
                Ok(Step {
                    plugin,
                    config: &r.config,
                })
            })
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = f.debug_map();
        for (name, versions) in &self.plugins {
            names.entry(name, &versions.iter().map(|p| p.version()).collect::<Vec<_>>());
        }
        names.finish()
    }
}
