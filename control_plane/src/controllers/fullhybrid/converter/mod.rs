mod dummy;
mod hostnames;
mod service;

pub use self::dummy::DummyConverter;
pub use self::service::ServiceConverter;

use crate::controllers::fullhybrid::RootObject;
use crate::controllers::fullhybrid::metadata::MetadataError;
use crate::controllers::fullhybrid::reduce::ReduceFn;
use crate::controllers::fullhybrid::refs::RefsError;
use crate::kubernetes::index::is_service_ref;
use crate::kubernetes::{Cluster, ClusterError};
use async_trait::async_trait;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use itertools::Itertools;
use kube::api::DynamicObject;
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("Converter has no root object")]
    RootObjectNotSet,
    #[error("Root object is missing its {0}")]
    MissingRootField(&'static str),
    #[error("Failed to read cluster state: {0}")]
    Cluster(#[from] ClusterError),
    #[error("Failed to resolve references: {0}")]
    Refs(#[from] RefsError),
    #[error("Failed to stamp object metadata: {0}")]
    Metadata(#[from] MetadataError),
}

/// Translates the cluster state around one root object into the objects that
/// should exist for it.
///
/// `set_root_object` binds the converter; every other operation fails with
/// [`ConverterError::RootObjectNotSet`] until it has been called.
#[async_trait]
pub trait ApiConverter<T: RootObject>: Send + Sync {
    fn set_root_object(&mut self, root: T);

    fn root_object(&self) -> Result<&T, ConverterError>;

    /// Reads the objects translation depends on. Only read calls are made.
    async fn load_store(&mut self, cluster: &dyn Cluster) -> Result<(), ConverterError>;

    /// Builds the desired objects from the loaded store without touching the
    /// cluster.
    fn translate(&mut self) -> Result<(), ConverterError>;

    /// Objects of the output kind currently labelled as managed by the root.
    async fn list_existing_objects(
        &self,
        cluster: &dyn Cluster,
    ) -> Result<Vec<DynamicObject>, ConverterError>;

    fn get_output_store(&self) -> Result<Vec<DynamicObject>, ConverterError>;

    /// Tie-breakers, in order, for existing objects of `object`'s kind that
    /// share a spec hash.
    fn reduce(&self, object: &DynamicObject) -> Vec<ReduceFn>;
}

/// Which converter the Service controller runs.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceConverterKind {
    #[default]
    Service,
    Dummy,
}

/// Ports of the Service `namespace/name` that `route` sends traffic to.
fn matching_backend_ports(
    route: &HTTPRoute,
    namespace: &str,
    name: &str,
    service_ports: &[i32],
) -> Vec<i32> {
    let route_namespace = route.metadata.namespace.as_deref().unwrap_or(namespace);

    route
        .spec
        .rules
        .iter()
        .flatten()
        .flat_map(|rule| rule.backend_refs.iter().flatten())
        .filter(|backend_ref| {
            is_service_ref(backend_ref.group.as_deref(), backend_ref.kind.as_deref())
                && backend_ref.name == name
                && backend_ref.namespace.as_deref().unwrap_or(route_namespace) == namespace
        })
        .filter_map(|backend_ref| backend_ref.port)
        .filter(|port| service_ports.contains(port))
        .sorted()
        .dedup()
        .collect()
}
