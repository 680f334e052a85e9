use crate::controllers::fullhybrid::refs::{RefsError, by_http_route};
use crate::kubernetes::Cluster;
use crate::kubernetes::index::{BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX, list_by_index, namespaced_key};
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a Service event is worth a reconcile: only Services routed
/// to by an HTTPRoute that resolves to a Konnect control plane are.
///
/// Any failure to decide lets the event through.
#[derive(Clone)]
pub struct WatchFilter {
    cluster: Arc<dyn Cluster>,
}

impl WatchFilter {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }

    pub async fn is_relevant(&self, service: &Service) -> bool {
        match self.resolve(service).await {
            Ok(relevant) => relevant,
            Err(err) => {
                warn!(
                    "Failed to filter Service {}/{}, reconciling anyway: {}",
                    service.namespace().unwrap_or_default(),
                    service.name_any(),
                    err
                );
                true
            }
        }
    }

    async fn resolve(&self, service: &Service) -> Result<bool, RefsError> {
        let Some(namespace) = service.namespace() else {
            return Ok(true);
        };
        let name = service.name_any();
        let cluster = self.cluster.as_ref();

        let routes = list_by_index::<HTTPRoute>(
            cluster,
            Some(&namespace),
            &BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX,
            &namespaced_key(&namespace, &name),
        )
        .await?;

        for route in &routes {
            if !by_http_route(cluster, route).await?.is_empty() {
                return Ok(true);
            }
        }

        debug!(
            "Service {}/{} has no route to a Konnect control plane",
            namespace, name
        );
        Ok(false)
    }
}
