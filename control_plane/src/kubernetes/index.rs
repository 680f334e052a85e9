use crate::kubernetes::{Cluster, ClusterError, from_dynamic};
use gateway_api::apis::standard::httproutes::HTTPRoute;
use itertools::Itertools;
use ko_api::constants::{GATEWAY_API_GROUP, GATEWAY_KIND, SERVICE_KIND};
use kube::Resource;
use kube::api::{ApiResource, DynamicObject};
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

pub struct IndexDefinition<K> {
    name: &'static str,
    extract: fn(&K) -> Vec<String>,
}

impl<K> IndexDefinition<K> {
    pub const fn new(name: &'static str, extract: fn(&K) -> Vec<String>) -> Self {
        Self { name, extract }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn extract(&self, object: &K) -> Vec<String> {
        (self.extract)(object)
    }
}

impl<K> IndexDefinition<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned + 'static,
{
    /// The same index over schema-erased objects. Objects that do not
    /// deserialize as `K` have no keys.
    pub fn erase(&self) -> DynamicIndex {
        let extract = self.extract;
        DynamicIndex {
            name: self.name,
            extract: Arc::new(move |object: &DynamicObject| {
                from_dynamic::<K>(object.clone())
                    .map(|typed| extract(&typed))
                    .unwrap_or_default()
            }),
        }
    }
}

type DynamicExtractFn = dyn Fn(&DynamicObject) -> Vec<String> + Send + Sync;

#[derive(Clone)]
pub struct DynamicIndex {
    name: &'static str,
    extract: Arc<DynamicExtractFn>,
}

impl DynamicIndex {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn extract(&self, object: &DynamicObject) -> Vec<String> {
        (self.extract)(object)
    }
}

impl Debug for DynamicIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicIndex")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub const BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX: IndexDefinition<HTTPRoute> = IndexDefinition::new(
    "BackendServicesOnHTTPRouteIndex",
    backend_services_on_http_route,
);

pub const GATEWAYS_ON_HTTP_ROUTE_INDEX: IndexDefinition<HTTPRoute> =
    IndexDefinition::new("GatewaysOnHTTPRouteIndex", gateways_on_http_route);

/// The indexes kept over watched HTTPRoutes.
pub fn http_route_indexes() -> Vec<DynamicIndex> {
    vec![
        BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX.erase(),
        GATEWAYS_ON_HTTP_ROUTE_INDEX.erase(),
    ]
}

pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// A backendRef points at a Service when it names no group and no kind other
/// than `Service`.
pub fn is_service_ref(group: Option<&str>, kind: Option<&str>) -> bool {
    matches!(group, None | Some("")) && kind.is_none_or(|kind| kind == SERVICE_KIND)
}

pub fn is_gateway_ref(group: Option<&str>, kind: Option<&str>) -> bool {
    group.is_none_or(|group| group == GATEWAY_API_GROUP)
        && kind.is_none_or(|kind| kind == GATEWAY_KIND)
}

fn backend_services_on_http_route(route: &HTTPRoute) -> Vec<String> {
    let Some(route_namespace) = route.meta().namespace.as_deref() else {
        return vec![];
    };

    route
        .spec
        .rules
        .iter()
        .flatten()
        .flat_map(|rule| rule.backend_refs.iter().flatten())
        .filter(|backend_ref| {
            is_service_ref(backend_ref.group.as_deref(), backend_ref.kind.as_deref())
        })
        .map(|backend_ref| {
            namespaced_key(
                backend_ref.namespace.as_deref().unwrap_or(route_namespace),
                &backend_ref.name,
            )
        })
        .unique()
        .collect()
}

fn gateways_on_http_route(route: &HTTPRoute) -> Vec<String> {
    let Some(route_namespace) = route.meta().namespace.as_deref() else {
        return vec![];
    };

    route
        .spec
        .parent_refs
        .iter()
        .flatten()
        .filter(|parent_ref| is_gateway_ref(parent_ref.group.as_deref(), parent_ref.kind.as_deref()))
        .map(|parent_ref| {
            namespaced_key(
                parent_ref.namespace.as_deref().unwrap_or(route_namespace),
                &parent_ref.name,
            )
        })
        .unique()
        .collect()
}

pub async fn list_by_index<K>(
    cluster: &dyn Cluster,
    namespace: Option<&str>,
    index: &IndexDefinition<K>,
    value: &str,
) -> Result<Vec<K>, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned + 'static,
{
    let resource = ApiResource::erase::<K>(&());
    cluster
        .list_indexed(&resource, namespace, &index.erase(), value)
        .await?
        .into_iter()
        .map(from_dynamic)
        .collect()
}
