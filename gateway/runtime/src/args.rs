use crate::{
    admission::Admission,
    core::{Backoff, DecryptionKey, RateLimiter},
    crds,
    index::{IndexMetrics, Stores},
    k8s::{self, Api, CustomResourceDefinition},
    proxy::{
        ApiKeyPlugin, Config, CorrelationLayer, Gateway, GatewayMetrics, HttpUpstream,
        RecordLayer, Registry,
    },
    server,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use http::HeaderName;
use kube::runtime::watcher;
use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, sync::Arc};
use tokio::time::{self, Duration};
use tracing::{debug, info_span, Instrument};

const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[clap(name = "kanali", about = "A cluster-native API gateway")]
pub struct Args {
    #[clap(long, default_value = "kanali=info,warn", env = "KANALI_GATEWAY_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    #[clap(long, default_value = "0.0.0.0:8080")]
    gateway_addr: SocketAddr,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// Path to the hex-encoded 256-bit key that opens API key revisions.
    #[clap(long, env = "KANALI_DECRYPTION_KEY_FILE")]
    decryption_key_file: PathBuf,

    /// Header in which callers present `<key>:<secret>`.
    #[clap(long, default_value = "apikey")]
    apikey_header: HeaderName,

    /// Query parameter consulted when the API key header is absent.
    #[clap(long, default_value = "apikey")]
    apikey_query_param: String,

    /// Number of times each CustomResourceDefinition is checked before startup fails.
    #[clap(long, default_value = "5")]
    crd_ready_attempts: NonZeroU32,

    #[clap(long, default_value = "500")]
    crd_ready_interval_ms: u64,

    #[clap(long, default_value = "30000")]
    upstream_timeout_ms: u64,

    /// Largest request or upstream response body the gateway buffers.
    #[clap(long, default_value = "10485760")]
    max_body_bytes: usize,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            gateway_addr,
            cluster_domain,
            decryption_key_file,
            apikey_header,
            apikey_query_param,
            crd_ready_attempts,
            crd_ready_interval_ms,
            upstream_timeout_ms,
            max_body_bytes,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        // Fail before connecting to the cluster if API keys can't be verified.
        let decryption_key = DecryptionKey::load(&decryption_key_file)
            .context("failed to load the decryption key")?;

        let stores = Stores::default();

        let mut prom = <prometheus_client::registry::Registry>::default();
        let index_metrics = IndexMetrics::register(prom.sub_registry_with_prefix("index"));
        let gateway_metrics = GatewayMetrics::register(prom.sub_registry_with_prefix("gateway"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        // The watches below fail until the API server serves each resource kind.
        let backoff = Backoff {
            interval: Duration::from_millis(crd_ready_interval_ms),
            attempts: crd_ready_attempts,
            ..Default::default()
        };
        crds::register(
            &Api::<CustomResourceDefinition>::all(runtime.client()),
            &k8s::crds(),
            &backoff,
            runtime.shutdown_handle(),
        )
        .await?;

        // Spawn resource watches.

        let proxies = runtime.watch_all::<k8s::ApiProxy>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(IndexMetrics::instrument(&index_metrics, stores.routes.clone()), proxies)
                .instrument(info_span!("apiproxies")),
        );

        let mocks = runtime.watch_all::<k8s::MockTarget>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(IndexMetrics::instrument(&index_metrics, stores.mocks.clone()), mocks)
                .instrument(info_span!("mocktargets")),
        );

        let api_keys = runtime.watch_all::<k8s::ApiKey>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(IndexMetrics::instrument(&index_metrics, stores.api_keys.clone()), api_keys)
                .instrument(info_span!("apikeys")),
        );

        let bindings = runtime.watch_all::<k8s::ApiKeyBinding>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(IndexMetrics::instrument(&index_metrics, stores.bindings.clone()), bindings)
                .instrument(info_span!("apikeybindings")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(IndexMetrics::instrument(&index_metrics, stores.services.clone()), services)
                .instrument(info_span!("services")),
        );

        let limiter = Arc::new(RateLimiter::default());
        tokio::spawn(
            purge_rate_limits(limiter.clone(), runtime.shutdown_handle())
                .instrument(info_span!("ratelimits")),
        );

        let mut plugins = Registry::default();
        plugins.register(
            ApiKeyPlugin::new(&stores, decryption_key, limiter)
                .with_header(apikey_header)
                .with_query_param(apikey_query_param),
        );

        let upstream = HttpUpstream::new(Duration::from_millis(upstream_timeout_ms), max_body_bytes)
            .context("failed to configure upstream TLS")?;
        let gateway = Gateway::new(
            stores,
            plugins,
            upstream,
            Config {
                cluster_domain,
                max_body_bytes,
            },
        );
        let svc = tower::ServiceBuilder::new()
            .layer(RecordLayer::default())
            .layer(CorrelationLayer::default())
            .layer(gateway_metrics.layer())
            .service(gateway);
        tokio::spawn(server::serve(gateway_addr, svc, runtime.shutdown_handle()));

        let runtime = runtime.spawn_server(Admission::default);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn purge_rate_limits(limiter: Arc<RateLimiter>, drain: drain::Watch) {
    let mut interval = time::interval(RATE_LIMIT_PURGE_INTERVAL);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let shutdown = drain.signaled();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let purged = limiter.purge_idle();
                debug!(purged, remaining = limiter.len(), "Purged rate limit windows");
            }
            _ = &mut shutdown => return,
        }
    }
}
