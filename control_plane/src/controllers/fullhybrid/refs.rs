use crate::kubernetes::index::is_gateway_ref;
use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::{Cluster, ClusterError, get_object};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use ko_api::constants::{
    GATEWAY_CONFIGURATION_KIND, GATEWAY_OPERATOR_GROUP, KONNECT_EXTENSION_KIND, KONNECT_GROUP,
};
use ko_api::gateway_operator::GatewayConfiguration;
use ko_api::konnect::{ControlPlaneRef, ControlPlaneRefType, KonnectExtension};
use kube::ResourceExt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RefsError {
    #[error("Failed to look up referenced object: {0}")]
    Cluster(#[from] ClusterError),
    #[error(
        "cross-namespace references between KonnectExtension {extension} and its control plane in namespace {control_plane_namespace} are not supported"
    )]
    CrossNamespace {
        extension: String,
        control_plane_namespace: String,
    },
}

/// A Gateway an HTTPRoute attaches to, with the listener it selects.
#[derive(Clone, Debug)]
pub struct ResolvedParent {
    pub gateway: Gateway,
    pub section_name: Option<String>,
}

/// Same-namespace Gateways named in the route's parentRefs.
pub async fn gateways_for_http_route(
    cluster: &dyn Cluster,
    route: &HTTPRoute,
) -> Result<Vec<ResolvedParent>, RefsError> {
    let Some(namespace) = route.namespace() else {
        return Ok(vec![]);
    };

    let mut parents = vec![];
    for parent_ref in route.spec.parent_refs.iter().flatten() {
        if !is_gateway_ref(parent_ref.group.as_deref(), parent_ref.kind.as_deref()) {
            continue;
        }
        if parent_ref
            .namespace
            .as_deref()
            .is_some_and(|parent_namespace| parent_namespace != namespace)
        {
            debug!(
                "Skipping cross-namespace parentRef {}/{} of HTTPRoute {}/{}",
                parent_ref.namespace.as_deref().unwrap_or_default(),
                parent_ref.name,
                namespace,
                route.name_any()
            );
            continue;
        }

        if let Some(gateway) =
            get_object::<Gateway>(cluster, Some(&namespace), &parent_ref.name).await?
        {
            parents.push(ResolvedParent {
                gateway,
                section_name: parent_ref.section_name.clone(),
            });
        }
    }

    Ok(parents)
}

pub async fn by_gateway(
    cluster: &dyn Cluster,
    gateway: &Gateway,
) -> Result<Option<GatewayClass>, RefsError> {
    Ok(get_object::<GatewayClass>(cluster, None, &gateway.spec.gateway_class_name).await?)
}

/// `gateway_namespace` is used when the parametersRef names no namespace.
pub async fn by_gateway_class(
    cluster: &dyn Cluster,
    gateway_class: &GatewayClass,
    gateway_namespace: &str,
) -> Result<Option<GatewayConfiguration>, RefsError> {
    let Some(parameters_ref) = &gateway_class.spec.parameters_ref else {
        return Ok(None);
    };
    if parameters_ref.group != GATEWAY_OPERATOR_GROUP
        || parameters_ref.kind != GATEWAY_CONFIGURATION_KIND
    {
        debug!(
            "GatewayClass {} parametersRef {}/{} is not a GatewayConfiguration",
            gateway_class.name_any(),
            parameters_ref.group,
            parameters_ref.kind
        );
        return Ok(None);
    }

    let namespace = parameters_ref
        .namespace
        .as_deref()
        .unwrap_or(gateway_namespace);
    Ok(get_object::<GatewayConfiguration>(cluster, Some(namespace), &parameters_ref.name).await?)
}

pub async fn by_gateway_configuration(
    cluster: &dyn Cluster,
    gateway_configuration: &GatewayConfiguration,
) -> Result<Option<KonnectExtension>, RefsError> {
    let Some(extension_ref) = gateway_configuration
        .spec
        .extensions
        .iter()
        .find(|extension| {
            extension.group == KONNECT_GROUP && extension.kind == KONNECT_EXTENSION_KIND
        })
    else {
        return Ok(None);
    };

    let configuration_namespace = gateway_configuration.namespace().unwrap_or_default();
    let namespace = extension_ref
        .namespace
        .as_deref()
        .unwrap_or(&configuration_namespace);
    Ok(get_object::<KonnectExtension>(cluster, Some(namespace), &extension_ref.name).await?)
}

/// Only namespaced references are followed, and only within the extension's
/// own namespace. The returned reference always names that namespace.
pub fn by_konnect_extension(
    extension: &KonnectExtension,
) -> Result<Option<ControlPlaneRef>, RefsError> {
    let Some(konnect) = &extension.spec.konnect else {
        return Ok(None);
    };
    let control_plane_ref = &konnect.control_plane.control_plane_ref;
    if control_plane_ref.ref_type != ControlPlaneRefType::KonnectNamespacedRef {
        return Ok(None);
    }
    let Some(namespaced_ref) = &control_plane_ref.konnect_namespaced_ref else {
        return Ok(None);
    };

    let extension_namespace = extension.namespace().unwrap_or_default();
    if let Some(namespace) = namespaced_ref
        .namespace
        .as_ref()
        .filter(|namespace| !namespace.is_empty() && **namespace != extension_namespace)
    {
        let extension = ObjectRef::for_object(extension)
            .map_or_else(|_| extension.name_any(), |object_ref| object_ref.to_string());
        return Err(RefsError::CrossNamespace {
            extension,
            control_plane_namespace: namespace.clone(),
        });
    }

    Ok(Some(ControlPlaneRef::namespaced(
        namespaced_ref.name.clone(),
        Some(extension_namespace),
    )))
}

pub async fn control_plane_ref_for_gateway(
    cluster: &dyn Cluster,
    gateway: &Gateway,
) -> Result<Option<ControlPlaneRef>, RefsError> {
    let Some(gateway_class) = by_gateway(cluster, gateway).await? else {
        return Ok(None);
    };
    let gateway_namespace = gateway.namespace().unwrap_or_default();
    let Some(gateway_configuration) =
        by_gateway_class(cluster, &gateway_class, &gateway_namespace).await?
    else {
        return Ok(None);
    };
    let Some(extension) = by_gateway_configuration(cluster, &gateway_configuration).await? else {
        return Ok(None);
    };
    by_konnect_extension(&extension)
}

/// Control plane references reachable from the given Gateways, in order and
/// without repeats.
pub async fn by_parents(
    cluster: &dyn Cluster,
    parents: &[ResolvedParent],
) -> Result<Vec<ControlPlaneRef>, RefsError> {
    let mut control_plane_refs = vec![];
    for parent in parents {
        let Some(control_plane_ref) = control_plane_ref_for_gateway(cluster, &parent.gateway).await?
        else {
            continue;
        };
        if !control_plane_refs.contains(&control_plane_ref) {
            control_plane_refs.push(control_plane_ref);
        }
    }

    Ok(control_plane_refs)
}

/// Control planes reached through HTTPRoute → Gateway → GatewayClass →
/// GatewayConfiguration → KonnectExtension. Missing links contribute nothing.
pub async fn by_http_route(
    cluster: &dyn Cluster,
    route: &HTTPRoute,
) -> Result<Vec<ControlPlaneRef>, RefsError> {
    let parents = gateways_for_http_route(cluster, route).await?;
    by_parents(cluster, &parents).await
}
