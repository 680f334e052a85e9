use crate::controllers::fullhybrid::RootObject;
use crate::controllers::fullhybrid::converter::{ApiConverter, ConverterError};
use crate::controllers::fullhybrid::metadata::{hash_label, is_owned_by};
use crate::controllers::fullhybrid::reduce::apply_reducers;
use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::{Cluster, ClusterError, resource_for};
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EnforceError {
    #[error("Failed to compute desired state: {0}")]
    Converter(#[from] ConverterError),
    #[error("Failed to create {object}: {source}")]
    Create {
        object: String,
        #[source]
        source: ClusterError,
    },
    #[error("Failed to delete {object}: {source}")]
    Delete {
        object: String,
        #[source]
        source: ClusterError,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnforceOutcome {
    pub created: usize,
    pub deleted: usize,
    pub requeue: bool,
}

/// Existing objects sharing one spec hash, and how many desired objects
/// matched it.
#[derive(Default)]
struct ResourceGroup {
    hits: usize,
    objects: Vec<DynamicObject>,
}

fn describe(object: &DynamicObject) -> String {
    ObjectRef::for_dynamic(object).map_or_else(
        |_| object.metadata.name.clone().unwrap_or_default(),
        |object_ref| object_ref.to_string(),
    )
}

async fn create(cluster: &dyn Cluster, object: &DynamicObject) -> Result<(), EnforceError> {
    let describe_err = |source| EnforceError::Create {
        object: describe(object),
        source,
    };
    let resource = resource_for(object).map_err(describe_err)?;
    let created = cluster
        .create(&resource, object)
        .await
        .map_err(describe_err)?;
    info!("Created object; object.ref={}", describe(&created));
    Ok(())
}

async fn delete(cluster: &dyn Cluster, object: &DynamicObject) -> Result<(), EnforceError> {
    let describe_err = |source| EnforceError::Delete {
        object: describe(object),
        source,
    };
    let resource = resource_for(object).map_err(describe_err)?;
    let name = object
        .metadata
        .name
        .as_deref()
        .ok_or(ClusterError::MissingName)
        .map_err(describe_err)?;
    cluster
        .delete(&resource, object.metadata.namespace.as_deref(), name)
        .await
        .map_err(describe_err)?;
    info!("Deleted object; object.ref={}", describe(object));
    Ok(())
}

/// Creates every desired object whose spec hash has no owned counterpart, then
/// deletes owned objects whose hash is no longer desired and the duplicates the
/// converter's reducers reject.
pub async fn enforce_state<T, C>(
    cluster: &dyn Cluster,
    converter: &C,
) -> Result<EnforceOutcome, EnforceError>
where
    T: RootObject,
    C: ApiConverter<T>,
{
    let root = converter.root_object()?;
    let desired = converter.get_output_store()?;
    let existing = converter.list_existing_objects(cluster).await?;

    let mut groups: BTreeMap<String, ResourceGroup> = BTreeMap::new();
    let mut unhashed = vec![];
    for object in existing {
        if !is_owned_by(&object, root) {
            debug!(
                "Ignoring object not owned by the root; object.ref={}",
                describe(&object)
            );
            continue;
        }
        match hash_label(&object) {
            Some(hash) => groups
                .entry(hash.to_string())
                .or_default()
                .objects
                .push(object),
            None => unhashed.push(object),
        }
    }

    let mut outcome = EnforceOutcome::default();
    for object in &desired {
        if let Some(group) = hash_label(object).and_then(|hash| groups.get_mut(hash)) {
            group.hits += 1;
            continue;
        }
        create(cluster, object).await?;
        outcome.created += 1;
    }

    let mut to_delete = unhashed;
    for (hash, group) in groups {
        if group.hits == 0 {
            debug!("No desired object has hash {}; deleting {} objects", hash, group.objects.len());
            to_delete.extend(group.objects);
        } else if group.objects.len() > 1 {
            let reducers = converter.reduce(&group.objects[0]);
            to_delete.extend(apply_reducers(group.objects, &reducers));
        }
    }

    for object in &to_delete {
        delete(cluster, object).await?;
        outcome.deleted += 1;
    }

    outcome.requeue = outcome.created > 0 || outcome.deleted > 0;
    Ok(outcome)
}
