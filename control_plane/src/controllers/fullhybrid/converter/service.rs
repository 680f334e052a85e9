use super::hostnames::resolve_hostnames;
use super::{ApiConverter, ConverterError, matching_backend_ports};
use crate::controllers::fullhybrid::metadata::{hash_label, managed_by_selector, stamp_metadata};
use crate::controllers::fullhybrid::reduce::{ReduceFn, keep_programmed, keep_youngest};
use crate::controllers::fullhybrid::refs::{by_parents, gateways_for_http_route};
use crate::kubernetes::index::{BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX, list_by_index, namespaced_key};
use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::{Cluster, to_dynamic};
use async_trait::async_trait;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use k8s_openapi::api::core::v1::Service;
use ko_api::configuration::{KongService, KongServiceSpec};
use ko_api::constants::{CLUSTER_DOMAIN, CONFIGURATION_GROUP, KONG_SERVICE_KIND};
use ko_api::konnect::ControlPlaneRef;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};
use std::collections::HashSet;
use tracing::debug;

/// What one HTTPRoute contributes to the translation of a Service.
#[derive(Clone, Debug)]
struct RouteBinding {
    route: Option<ObjectRef>,
    ports: Vec<i32>,
    control_plane_refs: Vec<ControlPlaneRef>,
    hostnames: Vec<String>,
}

/// Translates a `Service` into one `KongService` per routed port, Konnect
/// control plane and hostname.
#[derive(Default)]
pub struct ServiceConverter {
    root: Option<Service>,
    store: Vec<RouteBinding>,
    output: Vec<DynamicObject>,
}

impl ServiceConverter {
    fn identity(&self) -> Result<(String, String), ConverterError> {
        let root = self.root_object()?;
        let namespace = root
            .metadata
            .namespace
            .clone()
            .ok_or(ConverterError::MissingRootField("namespace"))?;
        let name = root
            .metadata
            .name
            .clone()
            .ok_or(ConverterError::MissingRootField("name"))?;
        Ok((namespace, name))
    }

    fn service_ports(&self) -> Result<Vec<i32>, ConverterError> {
        let root = self.root_object()?;
        Ok(root
            .spec
            .iter()
            .flat_map(|spec| spec.ports.iter().flatten())
            .map(|port| port.port)
            .collect())
    }
}

#[async_trait]
impl ApiConverter<Service> for ServiceConverter {
    fn set_root_object(&mut self, root: Service) {
        self.root = Some(root);
        self.store.clear();
        self.output.clear();
    }

    fn root_object(&self) -> Result<&Service, ConverterError> {
        self.root.as_ref().ok_or(ConverterError::RootObjectNotSet)
    }

    async fn load_store(&mut self, cluster: &dyn Cluster) -> Result<(), ConverterError> {
        let (namespace, name) = self.identity()?;
        let service_ports = self.service_ports()?;
        let fallback_hostname = format!("{name}.{namespace}.{CLUSTER_DOMAIN}");

        let routes = list_by_index::<HTTPRoute>(
            cluster,
            Some(&namespace),
            &BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX,
            &namespaced_key(&namespace, &name),
        )
        .await?;

        let mut store = vec![];
        for route in routes {
            let ports = matching_backend_ports(&route, &namespace, &name, &service_ports);
            let route_ref = ObjectRef::for_object(&route).ok();
            if ports.is_empty() {
                debug!(
                    "HTTPRoute references no port of Service {}/{}; route.ref={:?}",
                    namespace, name, route_ref
                );
                continue;
            }

            let parents = gateways_for_http_route(cluster, &route).await?;
            let control_plane_refs = by_parents(cluster, &parents).await?;
            let route_hostnames = route.spec.hostnames.clone().unwrap_or_default();
            let hostnames = resolve_hostnames(&parents, &route_hostnames, &fallback_hostname);

            store.push(RouteBinding {
                route: route_ref,
                ports,
                control_plane_refs,
                hostnames,
            });
        }

        self.store = store;
        Ok(())
    }

    fn translate(&mut self) -> Result<(), ConverterError> {
        let (_, name) = self.identity()?;
        let root = self.root_object()?;

        let mut output = vec![];
        let mut seen = HashSet::new();
        for binding in &self.store {
            if binding.control_plane_refs.is_empty() {
                debug!("No Konnect control plane for route.ref={:?}", binding.route);
            }

            for port in &binding.ports {
                for control_plane_ref in &binding.control_plane_refs {
                    for hostname in &binding.hostnames {
                        let kong_service = KongService {
                            metadata: ObjectMeta {
                                generate_name: Some(format!("{name}-{port}-")),
                                ..Default::default()
                            },
                            spec: KongServiceSpec {
                                control_plane_ref: Some(control_plane_ref.clone()),
                                name: Some(format!("{name}-{port}")),
                                host: hostname.clone(),
                                port: i64::from(*port),
                                protocol: Some("http".to_string()),
                                path: None,
                            },
                            status: None,
                        };

                        let mut object = to_dynamic(&kong_service)?;
                        stamp_metadata(root, &mut object)?;
                        if seen.insert(hash_label(&object).map(ToString::to_string)) {
                            output.push(object);
                        }
                    }
                }
            }
        }

        self.output = output;
        Ok(())
    }

    async fn list_existing_objects(
        &self,
        cluster: &dyn Cluster,
    ) -> Result<Vec<DynamicObject>, ConverterError> {
        let (namespace, _) = self.identity()?;
        let selector = managed_by_selector(self.root_object()?)?;
        let resource = ApiResource::erase::<KongService>(&());
        Ok(cluster
            .list(&resource, Some(&namespace), Some(&selector))
            .await?)
    }

    fn get_output_store(&self) -> Result<Vec<DynamicObject>, ConverterError> {
        self.root_object()?;
        Ok(self.output.clone())
    }

    fn reduce(&self, object: &DynamicObject) -> Vec<ReduceFn> {
        let is_kong_service = object.types.as_ref().is_some_and(|types| {
            types.kind == KONG_SERVICE_KIND
                && types
                    .api_version
                    .split_once('/')
                    .is_some_and(|(group, _)| group == CONFIGURATION_GROUP)
        });

        if is_kong_service {
            vec![keep_programmed, keep_youngest]
        } else {
            vec![keep_youngest]
        }
    }
}
