pub mod fullhybrid;

use self::fullhybrid::converter::{
    ApiConverter, DummyConverter, ServiceConverter, ServiceConverterKind,
};
use self::fullhybrid::filter::WatchFilter;
use self::fullhybrid::reconciler::GatewayApiHybridReconciler;
use crate::kubernetes::cache::{CachedCluster, ObjectCache};
use crate::kubernetes::index::{
    BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX, DynamicIndex, GATEWAYS_ON_HTTP_ROUTE_INDEX,
    http_route_indexes, namespaced_key,
};
use crate::kubernetes::{KubeCluster, from_dynamic};
use crate::options::Options;
use futures::{StreamExt, TryStreamExt};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use getset::{CloneGetters, CopyGetters, Getters};
use itertools::Itertools;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Service;
use ko_api::configuration::KongService;
use ko_api::gateway_operator::GatewayConfiguration;
use ko_api::konnect::KonnectExtension;
use ko_core::task::Builder as TaskBuilder;
use kube::api::ApiResource;
use kube::runtime::reflector::ObjectRef as ReflectorRef;
use kube::runtime::{Controller, WatchStreamExt, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::info;
use typed_builder::TypedBuilder;

#[derive(TypedBuilder, Getters, CloneGetters, CopyGetters)]
pub struct SpawnControllersParams {
    #[getset(get_clone = "pub")]
    options: Arc<Options>,

    #[getset(get_clone = "pub")]
    client: Client,

    #[getset(get = "pub")]
    #[builder(default, setter(into))]
    watch_namespace: Option<String>,

    #[getset(get_copy = "pub")]
    #[builder(default)]
    service_converter: ServiceConverterKind,
}

fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    }
}

/// Services a route sends traffic to; route edits reconcile them.
fn services_for_http_route(route: HTTPRoute) -> Vec<ReflectorRef<Service>> {
    BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX
        .extract(&route)
        .into_iter()
        .filter_map(|key| {
            key.split_once('/')
                .map(|(namespace, name)| ReflectorRef::new(name).within(namespace))
        })
        .collect()
}

/// Services behind the routes attached to a Gateway; listener edits change
/// their hostnames.
fn services_for_gateway(cluster: &CachedCluster, gateway: &Gateway) -> Vec<ReflectorRef<Service>> {
    let Some(namespace) = gateway.namespace() else {
        return vec![];
    };

    cluster
        .lookup(
            &ApiResource::erase::<HTTPRoute>(&()),
            Some(&namespace),
            GATEWAYS_ON_HTTP_ROUTE_INDEX.name(),
            &namespaced_key(&namespace, &gateway.name_any()),
        )
        .unwrap_or_default()
        .into_iter()
        .filter_map(|route| from_dynamic::<HTTPRoute>(route).ok())
        .flat_map(services_for_http_route)
        .unique()
        .collect()
}

fn spawn_cache<K>(
    task_builder: &TaskBuilder,
    name: &'static str,
    client: Client,
    namespace: Option<&str>,
    indexes: Vec<DynamicIndex>,
    cluster: CachedCluster,
) -> CachedCluster
where
    K: Resource<DynamicType = ()>,
{
    let (cache, driver) = ObjectCache::watch::<K>(client, namespace, indexes);
    task_builder.new_task(name).spawn(driver);
    cluster.with_cache(cache)
}

pub fn spawn_controllers(task_builder: &TaskBuilder, params: SpawnControllersParams) {
    let client = params.client();
    let namespace = params.watch_namespace().as_deref();
    let cluster = CachedCluster::new(Arc::new(KubeCluster::new(client.clone())));
    let cluster = spawn_cache::<HTTPRoute>(
        task_builder,
        "http_route_cache",
        client.clone(),
        namespace,
        http_route_indexes(),
        cluster,
    );

    match params.service_converter() {
        ServiceConverterKind::Service => {
            let cluster = spawn_cache::<Gateway>(
                task_builder,
                "gateway_cache",
                client.clone(),
                namespace,
                vec![],
                cluster,
            );
            let cluster = spawn_cache::<GatewayClass>(
                task_builder,
                "gateway_class_cache",
                client.clone(),
                None,
                vec![],
                cluster,
            );
            let cluster = spawn_cache::<GatewayConfiguration>(
                task_builder,
                "gateway_configuration_cache",
                client.clone(),
                namespace,
                vec![],
                cluster,
            );
            let cluster = spawn_cache::<KonnectExtension>(
                task_builder,
                "konnect_extension_cache",
                client,
                namespace,
                vec![],
                cluster,
            );
            let cluster = Arc::new(cluster);
            let filter = WatchFilter::new(cluster.clone());
            spawn_service_controller::<ServiceConverter>(
                task_builder,
                &params,
                cluster,
                Some(filter),
            );
        }
        ServiceConverterKind::Dummy => {
            spawn_service_controller::<DummyConverter>(
                task_builder,
                &params,
                Arc::new(cluster),
                None,
            );
        }
    }
}

fn spawn_service_controller<C>(
    task_builder: &TaskBuilder,
    params: &SpawnControllersParams,
    cluster: Arc<CachedCluster>,
    filter: Option<WatchFilter>,
) where
    C: ApiConverter<Service> + Default + 'static,
{
    let client = params.client();
    let options = params.options();
    let namespace = params.watch_namespace().clone();

    info!(
        "Spawning Service controller; converter={} namespace={:?}",
        params.service_converter(),
        namespace
    );

    task_builder
        .new_task("service_controller")
        .spawn(async move {
            cluster.wait_until_ready().await;
            let namespace = namespace.as_deref();
            let (reader, writer) = reflector::store();
            let services = watcher(
                api::<Service>(client.clone(), namespace),
                watcher::Config::default(),
            )
            .default_backoff()
            .reflect(writer)
            .applied_objects()
            .try_filter(move |service| {
                let filter = filter.clone();
                let service = service.clone();
                async move {
                    match filter {
                        Some(filter) => filter.is_relevant(&service).await,
                        None => true,
                    }
                }
            })
            .boxed();

            let controller = Controller::for_stream(services, reader)
                .owns(
                    api::<KongService>(client.clone(), namespace),
                    watcher::Config::default(),
                )
                .watches(
                    api::<HTTPRoute>(client.clone(), namespace),
                    watcher::Config::default(),
                    services_for_http_route,
                )
                .watches(
                    api::<Gateway>(client, namespace),
                    watcher::Config::default(),
                    {
                        let cluster = cluster.clone();
                        move |gateway| services_for_gateway(&cluster, &gateway)
                    },
                );

            GatewayApiHybridReconciler::<Service, C>::new(cluster, options)
                .run(controller)
                .await;
            info!("Service controller stopped");
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::testing::{FakeCluster, cached, http_route};
    use serde_json::json;

    #[test]
    fn test_services_for_http_route() {
        let route = http_route(
            "default",
            "route",
            json!({
                "rules": [{ "backendRefs": [
                    { "name": "echo", "port": 80 },
                    { "name": "other", "namespace": "apps", "port": 80 }
                ] }]
            }),
        );

        let refs = services_for_http_route(route);

        assert_eq!(
            refs,
            vec![
                ReflectorRef::new("echo").within("default"),
                ReflectorRef::new("other").within("apps"),
            ]
        );
    }

    #[test]
    fn test_services_for_gateway() {
        let cluster = Arc::new(FakeCluster::default());
        cluster.insert(&http_route(
            "default",
            "attached",
            json!({
                "parentRefs": [{ "name": "gw" }],
                "rules": [{ "backendRefs": [{ "name": "echo", "port": 80 }, { "name": "echo", "port": 81 }] }]
            }),
        ));
        cluster.insert(&http_route(
            "default",
            "elsewhere",
            json!({
                "parentRefs": [{ "name": "other-gw" }],
                "rules": [{ "backendRefs": [{ "name": "unrelated", "port": 80 }] }]
            }),
        ));
        let gateway = crate::kubernetes::testing::gateway("default", "gw", "kong", json!([]));

        let refs = services_for_gateway(&cached(&cluster), &gateway);

        assert_eq!(refs, vec![ReflectorRef::new("echo").within("default")]);
        assert_eq!(cluster.reads(), 0);
    }
}
