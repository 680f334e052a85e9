use crate::kubernetes::cache::{CachedCluster, ObjectCache};
use crate::kubernetes::index::{DynamicIndex, http_route_indexes};
use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::{Cluster, ClusterError, to_dynamic};
use async_trait::async_trait;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use ko_api::gateway_operator::GatewayConfiguration;
use ko_api::konnect::KonnectExtension;
use kube::Resource;
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::watcher;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

type Key = (String, String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, DynamicObject>,
    counter: u64,
    reads: usize,
    lists: Vec<(String, Option<String>)>,
    created: Vec<ObjectRef>,
    deleted: Vec<ObjectRef>,
    failing_deletes: HashSet<String>,
    failing_lists: HashSet<String>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn key(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Key {
    (
        api_version.to_string(),
        kind.to_string(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn object_key(object: &DynamicObject) -> Key {
    let types = object.types.clone().expect("object has type metadata");
    key(
        &types.api_version,
        &types.kind,
        object.metadata.namespace.as_deref(),
        object.metadata.name.as_deref().expect("object has a name"),
    )
}

fn timestamp(counter: u64) -> Time {
    let value = format!(
        "2024-01-01T{:02}:{:02}:{:02}Z",
        counter / 3600,
        (counter / 60) % 60,
        counter % 60
    );
    serde_json::from_value(json!(value)).expect("valid timestamp")
}

fn matches_selector(object: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = object.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

fn injected_failure(message: &str) -> ClusterError {
    ClusterError::Api(kube::Error::Service(message.to_string().into()))
}

impl FakeCluster {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster lock")
    }

    /// Stores an object as if it already existed, filling in the fields the
    /// API server would have assigned.
    pub fn insert<K>(&self, object: &K) -> DynamicObject
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let object = to_dynamic(object).expect("object converts");
        self.insert_dynamic(object)
    }

    pub fn insert_dynamic(&self, mut object: DynamicObject) -> DynamicObject {
        let mut state = self.state();
        state.counter += 1;
        let counter = state.counter;
        object
            .metadata
            .uid
            .get_or_insert_with(|| format!("uid-{counter}"));
        object
            .metadata
            .creation_timestamp
            .get_or_insert_with(|| timestamp(counter));
        state.objects.insert(object_key(&object), object.clone());
        object
    }

    pub fn get_typed<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let resource = ApiResource::erase::<K>(&());
        let state = self.state();
        state
            .objects
            .get(&key(&resource.api_version, &resource.kind, namespace, name))
            .map(|object| {
                serde_json::from_value(serde_json::to_value(object).expect("serializes"))
                    .expect("deserializes")
            })
    }

    pub fn objects_of(&self, resource: &ApiResource) -> Vec<DynamicObject> {
        self.state()
            .objects
            .values()
            .filter(|object| {
                object.types.as_ref().is_some_and(|types| {
                    types.api_version == resource.api_version && types.kind == resource.kind
                })
            })
            .cloned()
            .collect()
    }

    pub fn created(&self) -> Vec<ObjectRef> {
        self.state().created.clone()
    }

    pub fn deleted(&self) -> Vec<ObjectRef> {
        self.state().deleted.clone()
    }

    /// Number of get and list calls served since the last [`Self::clear_calls`].
    pub fn reads(&self) -> usize {
        self.state().reads
    }

    /// Kind and namespace of every list call since the last [`Self::clear_calls`].
    pub fn lists(&self) -> Vec<(String, Option<String>)> {
        self.state().lists.clone()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state();
        state.reads = 0;
        state.lists.clear();
        state.created.clear();
        state.deleted.clear();
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.state().failing_deletes.insert(name.to_string());
    }

    pub fn fail_list_of(&self, kind: &str) {
        self.state().failing_lists.insert(kind.to_string());
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        let mut state = self.state();
        state.reads += 1;
        Ok(state
            .objects
            .get(&key(&resource.api_version, &resource.kind, namespace, name))
            .cloned())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        {
            let mut state = self.state();
            state.reads += 1;
            state
                .lists
                .push((resource.kind.clone(), namespace.map(ToString::to_string)));
            if state.failing_lists.contains(&resource.kind) {
                return Err(injected_failure("injected list failure"));
            }
        }

        Ok(self
            .objects_of(resource)
            .into_iter()
            .filter(|object| {
                namespace.is_none_or(|ns| object.metadata.namespace.as_deref() == Some(ns))
            })
            .filter(|object| matches_selector(object, label_selector))
            .collect())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let mut object = object.clone();
        object.types.get_or_insert_with(|| kube::api::TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });

        let counter = {
            let mut state = self.state();
            state.counter += 1;
            state.counter
        };
        if object.metadata.name.is_none() {
            let prefix = object
                .metadata
                .generate_name
                .clone()
                .ok_or(ClusterError::MissingName)?;
            object.metadata.name = Some(format!("{prefix}{counter:05x}"));
        }

        let object_key = object_key(&object);
        if self.state().objects.contains_key(&object_key) {
            return Err(ClusterError::AlreadyExists(object_key.3));
        }

        let object = self.insert_dynamic(object);
        let object_ref = ObjectRef::for_dynamic(&object).expect("object has a reference");
        self.state().created.push(object_ref);
        Ok(object)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.state();
        if state.failing_deletes.contains(name) {
            return Err(injected_failure("injected delete failure"));
        }

        if let Some(object) =
            state
                .objects
                .remove(&key(&resource.api_version, &resource.kind, namespace, name))
        {
            let object_ref = ObjectRef::for_dynamic(&object).expect("object has a reference");
            state.deleted.push(object_ref);
        }
        Ok(())
    }

    /// Served by scanning the stored objects, which stand in for a watch cache.
    async fn list_indexed(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        index: &DynamicIndex,
        value: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        Ok(self
            .list(resource, namespace, None)
            .await?
            .into_iter()
            .filter(|object| index.extract(object).iter().any(|key| key == value))
            .collect())
    }
}

/// A view of `cluster` whose watch caches hold everything stored in it, with
/// the call counters cleared.
pub fn cached(cluster: &Arc<FakeCluster>) -> CachedCluster {
    let caches = [
        (ApiResource::erase::<HTTPRoute>(&()), http_route_indexes()),
        (ApiResource::erase::<Gateway>(&()), vec![]),
        (ApiResource::erase::<GatewayClass>(&()), vec![]),
        (ApiResource::erase::<GatewayConfiguration>(&()), vec![]),
        (ApiResource::erase::<KonnectExtension>(&()), vec![]),
    ];

    let mut cached = CachedCluster::new(cluster.clone());
    for (resource, indexes) in caches {
        let (cache, mut writer) = ObjectCache::new(resource.clone(), None, indexes);
        writer.apply(&watcher::Event::Init);
        for object in cluster.objects_of(&resource) {
            writer.apply(&watcher::Event::InitApply(object));
        }
        writer.apply(&watcher::Event::InitDone);
        cached = cached.with_cache(cache);
    }
    cluster.clear_calls();
    cached
}

pub fn service(namespace: &str, name: &str, ports: &[i32]) -> Service {
    let ports: Vec<Value> = ports.iter().map(|port| json!({ "port": port })).collect();
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": namespace, "uid": format!("{namespace}-{name}-uid") },
        "spec": { "ports": ports }
    }))
    .expect("valid Service")
}

pub fn http_route(namespace: &str, name: &str, spec: Value) -> HTTPRoute {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "HTTPRoute",
        "metadata": { "name": name, "namespace": namespace },
        "spec": spec
    }))
    .expect("valid HTTPRoute")
}

pub fn gateway(namespace: &str, name: &str, class_name: &str, listeners: Value) -> Gateway {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "gatewayClassName": class_name, "listeners": listeners }
    }))
    .expect("valid Gateway")
}

pub fn gateway_class(name: &str, parameters_ref: Option<Value>) -> GatewayClass {
    let mut spec = json!({ "controllerName": "konghq.com/gateway-operator" });
    if let Some(parameters_ref) = parameters_ref {
        spec["parametersRef"] = parameters_ref;
    }
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": { "name": name },
        "spec": spec
    }))
    .expect("valid GatewayClass")
}

pub fn gateway_configuration(namespace: &str, name: &str, extensions: Value) -> GatewayConfiguration {
    serde_json::from_value(json!({
        "apiVersion": "gateway-operator.konghq.com/v2beta1",
        "kind": "GatewayConfiguration",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "extensions": extensions }
    }))
    .expect("valid GatewayConfiguration")
}

pub fn konnect_extension(namespace: &str, name: &str, control_plane_ref: Value) -> KonnectExtension {
    serde_json::from_value(json!({
        "apiVersion": "konnect.konghq.com/v1alpha2",
        "kind": "KonnectExtension",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "konnect": { "controlPlane": { "ref": control_plane_ref } } }
    }))
    .expect("valid KonnectExtension")
}

/// Seeds the full Gateway → GatewayClass → GatewayConfiguration →
/// KonnectExtension chain in `namespace`, ending in control plane `cp`.
pub fn seed_konnect_chain(cluster: &FakeCluster, namespace: &str, listeners: Value) {
    cluster.insert(&gateway(namespace, "gw", "kong", listeners));
    cluster.insert(&gateway_class(
        "kong",
        Some(json!({
            "group": "gateway-operator.konghq.com",
            "kind": "GatewayConfiguration",
            "name": "config",
            "namespace": namespace
        })),
    ));
    cluster.insert(&gateway_configuration(
        namespace,
        "config",
        json!([{ "group": "konnect.konghq.com", "kind": "KonnectExtension", "name": "konnect" }]),
    ));
    cluster.insert(&konnect_extension(
        namespace,
        "konnect",
        json!({ "type": "konnectNamespacedRef", "konnectNamespacedRef": { "name": "cp" } }),
    ));
}
