use super::{ApiConverter, ConverterError, matching_backend_ports};
use crate::controllers::fullhybrid::metadata::{managed_by_selector, stamp_metadata};
use crate::controllers::fullhybrid::reduce::{ReduceFn, keep_youngest};
use crate::kubernetes::index::{BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX, list_by_index, namespaced_key};
use crate::kubernetes::{Cluster, to_dynamic};
use async_trait::async_trait;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use itertools::Itertools;
use k8s_openapi::api::core::v1::Service;
use ko_api::configuration::{KongService, KongServiceSpec};
use kube::ResourceExt;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};

/// Minimal Service translation: one `KongService` per routed port, named
/// after the Service, with no Konnect control plane. Useful for exercising
/// enforcement against a cluster without Konnect resources.
#[derive(Default)]
pub struct DummyConverter {
    root: Option<Service>,
    ports: Vec<i32>,
    output: Vec<DynamicObject>,
}

#[async_trait]
impl ApiConverter<Service> for DummyConverter {
    fn set_root_object(&mut self, root: Service) {
        self.root = Some(root);
        self.ports.clear();
        self.output.clear();
    }

    fn root_object(&self) -> Result<&Service, ConverterError> {
        self.root.as_ref().ok_or(ConverterError::RootObjectNotSet)
    }

    async fn load_store(&mut self, cluster: &dyn Cluster) -> Result<(), ConverterError> {
        let root = self.root_object()?;
        let namespace = root
            .namespace()
            .ok_or(ConverterError::MissingRootField("namespace"))?;
        let name = root.name_any();
        let service_ports: Vec<i32> = root
            .spec
            .iter()
            .flat_map(|spec| spec.ports.iter().flatten())
            .map(|port| port.port)
            .collect();

        let routes = list_by_index::<HTTPRoute>(
            cluster,
            Some(&namespace),
            &BACKEND_SERVICES_ON_HTTP_ROUTE_INDEX,
            &namespaced_key(&namespace, &name),
        )
        .await?;

        self.ports = routes
            .iter()
            .flat_map(|route| matching_backend_ports(route, &namespace, &name, &service_ports))
            .sorted()
            .dedup()
            .collect();
        Ok(())
    }

    fn translate(&mut self) -> Result<(), ConverterError> {
        let root = self.root_object()?;
        let namespace = root
            .namespace()
            .ok_or(ConverterError::MissingRootField("namespace"))?;
        let name = root.name_any();

        let mut output = vec![];
        for port in &self.ports {
            let kong_service = KongService {
                metadata: ObjectMeta {
                    name: Some(format!("{name}-{port}")),
                    ..Default::default()
                },
                spec: KongServiceSpec {
                    host: format!("{name}.{namespace}.svc"),
                    port: i64::from(*port),
                    protocol: Some("http".to_string()),
                    ..Default::default()
                },
                status: None,
            };

            let mut object = to_dynamic(&kong_service)?;
            stamp_metadata(root, &mut object)?;
            output.push(object);
        }

        self.output = output;
        Ok(())
    }

    async fn list_existing_objects(
        &self,
        cluster: &dyn Cluster,
    ) -> Result<Vec<DynamicObject>, ConverterError> {
        let root = self.root_object()?;
        let selector = managed_by_selector(root)?;
        let resource = ApiResource::erase::<KongService>(&());
        Ok(cluster
            .list(&resource, root.namespace().as_deref(), Some(&selector))
            .await?)
    }

    fn get_output_store(&self) -> Result<Vec<DynamicObject>, ConverterError> {
        self.root_object()?;
        Ok(self.output.clone())
    }

    fn reduce(&self, _object: &DynamicObject) -> Vec<ReduceFn> {
        vec![keep_youngest]
    }
}
