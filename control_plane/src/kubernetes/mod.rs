pub mod cache;
pub mod index;
pub mod objects;
#[cfg(test)]
pub mod testing;

use crate::kubernetes::index::DynamicIndex;
use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams,
    TypeMeta,
};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Once;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Kubernetes API request failed: {0}")]
    Api(#[from] kube::Error),
    #[error("Object {0} already exists")]
    AlreadyExists(String),
    #[error("Failed to convert object: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Object is missing its apiVersion and kind")]
    MissingTypeMeta,
    #[error("Object has neither a name nor a generateName")]
    MissingName,
    #[error("No {index} index is kept for {kind} objects")]
    Unindexed { kind: String, index: &'static str },
}

impl ClusterError {
    fn is_status(err: &kube::Error, code: u16) -> bool {
        matches!(err, kube::Error::Api(response) if response.code == code)
    }
}

/// The slice of the Kubernetes API the hybrid controllers depend on.
///
/// Everything is expressed over [`DynamicObject`] so the same calls serve
/// every kind; typed access goes through [`get_object`] and
/// [`index::list_by_index`].
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Returns `None` when the object does not exist.
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError>;

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError>;

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Deleting an object that is already gone succeeds.
    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError>;

    /// Objects whose keys under `index` include `value`. Only answered from
    /// an index kept up to date by a watch.
    async fn list_indexed(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        index: &DynamicIndex,
        value: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError>;
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        let object = self.api(resource, namespace).get_opt(name).await?;
        Ok(object.map(|object| with_type_meta(resource, object)))
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let mut params = ListParams::default();
        if let Some(label_selector) = label_selector {
            params = params.labels(label_selector);
        }

        let objects = self.api(resource, namespace).list(&params).await?;
        Ok(objects
            .items
            .into_iter()
            .map(|object| with_type_meta(resource, object))
            .collect())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        if object.metadata.name.is_none() && object.metadata.generate_name.is_none() {
            return Err(ClusterError::MissingName);
        }

        let api = self.api(resource, object.metadata.namespace.as_deref());
        match api.create(&PostParams::default(), object).await {
            Ok(created) => Ok(with_type_meta(resource, created)),
            Err(err) if ClusterError::is_status(&err, 409) => Err(ClusterError::AlreadyExists(
                object.metadata.name.clone().unwrap_or_default(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if ClusterError::is_status(&err, 404) => {
                debug!("Object {}/{} already deleted", resource.kind, name);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_indexed(
        &self,
        resource: &ApiResource,
        _namespace: Option<&str>,
        index: &DynamicIndex,
        _value: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        Err(ClusterError::Unindexed {
            kind: resource.kind.clone(),
            index: index.name(),
        })
    }
}

static INIT_CRYPTO: Once = Once::new();

pub async fn start_kubernetes_client() -> Result<Client, ClusterError> {
    INIT_CRYPTO.call_once(|| {
        // Another provider may already be installed; either one serves the client
        let _ = rustls::crypto::ring::default_provider().install_default();
    });

    let client = Client::try_default().await?;
    info!("Kubernetes client created");
    Ok(client)
}

/// List responses omit `apiVersion` and `kind` on their items.
fn with_type_meta(resource: &ApiResource, mut object: DynamicObject) -> DynamicObject {
    if object.types.is_none() {
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    object
}

/// Describes the kind of an object from its own `apiVersion` and `kind`.
pub fn resource_for(object: &DynamicObject) -> Result<ApiResource, ClusterError> {
    let types = object.types.as_ref().ok_or(ClusterError::MissingTypeMeta)?;
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    let gvk = GroupVersionKind::gvk(group, version, &types.kind);
    Ok(ApiResource::from_gvk(&gvk))
}

pub fn to_dynamic<K>(object: &K) -> Result<DynamicObject, ClusterError>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let resource = ApiResource::erase::<K>(&());
    let object: DynamicObject = serde_json::from_value(serde_json::to_value(object)?)?;
    Ok(with_type_meta(&resource, object))
}

pub fn from_dynamic<K>(object: DynamicObject) -> Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    let object = with_type_meta(&resource, object);
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

pub async fn get_object<K>(
    cluster: &dyn Cluster,
    namespace: Option<&str>,
    name: &str,
) -> Result<Option<K>, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    cluster
        .get(&resource, namespace, name)
        .await?
        .map(from_dynamic)
        .transpose()
}
