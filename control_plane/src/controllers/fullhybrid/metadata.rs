use crate::controllers::fullhybrid::RootObject;
use ko_api::constants::{
    HASH_SPEC_LABEL, MANAGED_BY_LABEL, MANAGED_BY_NAME_LABEL, MANAGED_BY_NAMESPACE_LABEL,
    MANAGED_BY_VALUE,
};
use ko_core::hash::{HashError, hash};
use kube::api::DynamicObject;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Root object is missing its {0}")]
    MissingRootField(&'static str),
    #[error("Failed to hash object spec: {0}")]
    Hash(#[from] HashError),
}

fn root_identity<T: RootObject>(root: &T) -> Result<(&str, &str), MetadataError> {
    let meta = root.meta();
    let name = meta
        .name
        .as_deref()
        .ok_or(MetadataError::MissingRootField("name"))?;
    let namespace = meta
        .namespace
        .as_deref()
        .ok_or(MetadataError::MissingRootField("namespace"))?;
    Ok((namespace, name))
}

/// Places `object` in the root's namespace, makes the root its controller and
/// labels it with the managing root and the hash of its spec.
pub fn stamp_metadata<T: RootObject>(
    root: &T,
    object: &mut DynamicObject,
) -> Result<(), MetadataError> {
    let (namespace, name) = root_identity(root)?;
    let mut owner_reference = root
        .controller_owner_ref(&())
        .ok_or(MetadataError::MissingRootField("uid"))?;
    owner_reference.block_owner_deletion = Some(true);
    let spec_hash = hash(object.data.get("spec").unwrap_or(&Value::Null))?;

    object.metadata.namespace = Some(namespace.to_string());
    object.metadata.owner_references = Some(vec![owner_reference]);

    let labels = object.metadata.labels.get_or_insert_with(Default::default);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(MANAGED_BY_NAME_LABEL.to_string(), name.to_string());
    labels.insert(
        MANAGED_BY_NAMESPACE_LABEL.to_string(),
        namespace.to_string(),
    );
    labels.insert(HASH_SPEC_LABEL.to_string(), spec_hash);

    Ok(())
}

/// Label selector matching every object stamped for `root`.
pub fn managed_by_selector<T: RootObject>(root: &T) -> Result<String, MetadataError> {
    let (namespace, name) = root_identity(root)?;
    Ok(format!(
        "{MANAGED_BY_LABEL}={MANAGED_BY_VALUE},{MANAGED_BY_NAME_LABEL}={name},{MANAGED_BY_NAMESPACE_LABEL}={namespace}"
    ))
}

pub fn is_owned_by<T: RootObject>(object: &DynamicObject, root: &T) -> bool {
    let meta = root.meta();
    let (Some(uid), Some(name)) = (meta.uid.as_deref(), meta.name.as_deref()) else {
        return false;
    };
    let kind = T::kind(&());

    object
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.uid == uid && owner.kind == kind && owner.name == name)
}

pub fn hash_label(object: &DynamicObject) -> Option<&str> {
    object
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(HASH_SPEC_LABEL))
        .map(String::as_str)
}
