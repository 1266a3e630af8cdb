use super::*;
use chrono::{TimeZone, Utc};
use kanali_gateway_core::{Backend, ResourceId};
use kanali_gateway_k8s_api::{self as k8s, ObjectMeta};
use kubert::index::{IndexClusterResource, IndexNamespacedResource};
use prometheus_client::registry::Registry;

fn trace_init() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish(),
    )
}

fn mk_proxy(ns: &str, name: &str, spec: serde_json::Value) -> k8s::ApiProxy {
    let mut proxy = k8s::ApiProxy::new(
        name,
        serde_json::from_value(spec).expect("spec must deserialize"),
    );
    proxy.metadata.namespace = Some(ns.to_string());
    proxy
}

fn endpoint_proxy(ns: &str, name: &str, path: &str) -> k8s::ApiProxy {
    mk_proxy(
        ns,
        name,
        serde_json::json!({
            "source": { "path": path },
            "target": { "backend": { "endpoint": "http://upstream.example.com" } },
        }),
    )
}

/// The decoded form of the revision data in [`mk_api_key`].
const REVISION: [u8; 2] = [0x00, 0xff];

fn mk_api_key(name: &str, last_used: Option<&str>) -> k8s::ApiKey {
    k8s::ApiKey::new(
        name,
        serde_json::from_value(serde_json::json!({
            "revisions": [{ "data": "00ff", "status": "Active", "lastUsed": last_used }],
        }))
        .expect("spec must deserialize"),
    )
}

#[test]
fn applies_notifications_in_order() {
    let _tracing = trace_init();
    let mut store = Store::<ProxyRoute>::default();

    IndexNamespacedResource::apply(&mut store, endpoint_proxy("ns-0", "proxy-0", "/a"));
    IndexNamespacedResource::apply(&mut store, endpoint_proxy("ns-0", "proxy-1", "/c"));
    IndexNamespacedResource::apply(&mut store, endpoint_proxy("ns-0", "proxy-0", "/b"));
    IndexNamespacedResource::<k8s::ApiProxy>::delete(
        &mut store,
        "ns-0".to_string(),
        "proxy-1".to_string(),
    );

    let routes = store.list();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].id, ResourceId::new("ns-0", "proxy-0"));
    assert_eq!(routes[0].source.path, "/b");
}

#[test]
fn deleting_unknown_resources_is_harmless() {
    let _tracing = trace_init();
    let mut store = Store::<ProxyRoute>::default();
    IndexNamespacedResource::apply(&mut store, endpoint_proxy("ns-0", "proxy-0", "/a"));

    IndexNamespacedResource::<k8s::ApiProxy>::delete(
        &mut store,
        "ns-0".to_string(),
        "proxy-9".to_string(),
    );
    IndexNamespacedResource::<k8s::ApiProxy>::delete(
        &mut store,
        "ns-1".to_string(),
        "proxy-0".to_string(),
    );

    assert_eq!(store.len(), 1);
    assert!(store.get(&ResourceId::new("ns-0", "proxy-0")).is_some());
}

#[test]
fn invalid_resources_are_dropped() {
    let _tracing = trace_init();
    let mut store = Store::<ProxyRoute>::default();
    IndexNamespacedResource::apply(&mut store, endpoint_proxy("ns-0", "proxy-0", "/a"));

    let ambiguous = mk_proxy(
        "ns-0",
        "proxy-0",
        serde_json::json!({
            "source": { "path": "/b" },
            "target": { "backend": {
                "endpoint": "http://upstream.example.com",
                "mock": { "mockTargetName": "mock-0" },
            } },
        }),
    );
    IndexNamespacedResource::apply(&mut store, ambiguous);
    let empty = mk_proxy("ns-0", "proxy-1", serde_json::json!({ "source": { "path": "/c" } }));
    IndexNamespacedResource::apply(&mut store, empty);

    assert_eq!(store.len(), 1);
    let route = store
        .get(&ResourceId::new("ns-0", "proxy-0"))
        .expect("original route must be retained");
    assert_eq!(route.source.path, "/a");
    assert!(matches!(route.target.backend, Backend::Endpoint(_)));
}

#[test]
fn api_key_usage_survives_cluster_updates() {
    let _tracing = trace_init();
    let mut store = Store::<ApiKey>::default();
    IndexClusterResource::apply(&mut store, mk_api_key("key-0", Some("2018-03-01T10:00:00Z")));

    let used = Utc.with_ymd_and_hms(2018, 3, 2, 0, 0, 0).unwrap();
    store.touch("key-0", &REVISION, used).expect("key must exist");
    IndexClusterResource::apply(&mut store, mk_api_key("key-0", Some("2018-03-01T10:00:00Z")));
    let key = store.get(&"key-0".to_string()).expect("key must exist");
    assert_eq!(key.revisions[0].last_used, Some(used));

    let later = "2018-03-03T00:00:00Z";
    IndexClusterResource::apply(&mut store, mk_api_key("key-0", Some(later)));
    let key = store.get(&"key-0".to_string()).expect("key must exist");
    assert_eq!(
        key.revisions[0].last_used,
        Some(Utc.with_ymd_and_hms(2018, 3, 3, 0, 0, 0).unwrap())
    );

    IndexClusterResource::<k8s::ApiKey>::delete(&mut store, "key-0".to_string());
    assert!(store.is_empty());
    assert!(store.touch("key-0", &REVISION, used).is_err());
}

#[test]
fn services_are_indexed_with_labels() {
    let mut store = Store::<ClusterService>::default();
    let svc = k8s::Service {
        metadata: ObjectMeta {
            namespace: Some("ns-0".to_string()),
            name: Some("api".to_string()),
            labels: Some(maplit::btreemap! { "app".to_string() => "api".to_string() }),
            ..Default::default()
        },
        ..Default::default()
    };
    IndexNamespacedResource::apply(&mut store, svc);

    let svc = store
        .get(&ResourceId::new("ns-0", "api"))
        .expect("service must be indexed");
    assert_eq!(svc.labels["app"], "api");
}

#[test]
fn instrumented_stores_record_metrics() {
    let _tracing = trace_init();
    let mut prom = Registry::default();
    let metrics = IndexMetrics::register(&mut prom);
    let stores = Stores::default();
    let index = metrics.instrument(stores.routes.clone());

    IndexNamespacedResource::apply(&mut *index.write(), endpoint_proxy("ns-0", "proxy-0", "/a"));
    IndexNamespacedResource::apply(&mut *index.write(), endpoint_proxy("ns-0", "proxy-1", "/b"));
    IndexNamespacedResource::<k8s::ApiProxy>::delete(
        &mut *index.write(),
        "ns-0".to_string(),
        "proxy-0".to_string(),
    );
    assert_eq!(stores.routes.read().len(), 1);

    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, &prom).expect("metrics must encode");
    assert!(text.contains(r#"index_applies_total{kind="ApiProxy"} 2"#), "{text}");
    assert!(text.contains(r#"index_deletes_total{kind="ApiProxy"} 1"#), "{text}");
    assert!(text.contains(r#"index_size{kind="ApiProxy"} 1"#), "{text}");
}
