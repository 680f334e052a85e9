pub mod converter;
pub mod enforce;
pub mod filter;
pub mod metadata;
pub mod reconciler;
pub mod reduce;
pub mod refs;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Service;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Objects the hybrid controllers translate from.
pub trait RootObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl RootObject for Service {}
