use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

#[derive(
    Default,
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    JsonSchema,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    IntoStaticStr,
)]
pub enum ControlPlaneRefType {
    #[default]
    #[serde(rename = "konnectNamespacedRef")]
    #[strum(serialize = "konnectNamespacedRef")]
    KonnectNamespacedRef,
    #[serde(rename = "konnectID")]
    #[strum(serialize = "konnectID")]
    KonnectId,
}

#[derive(
    Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "camelCase")]
pub struct KonnectNamespacedRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Reference from a Konnect entity to the control plane it belongs to.
#[derive(
    Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneRef {
    #[serde(rename = "type")]
    pub ref_type: ControlPlaneRefType,
    #[serde(rename = "konnectID", default, skip_serializing_if = "Option::is_none")]
    pub konnect_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub konnect_namespaced_ref: Option<KonnectNamespacedRef>,
}

impl ControlPlaneRef {
    pub fn namespaced<N: Into<String>, S: Into<String>>(name: N, namespace: Option<S>) -> Self {
        Self {
            ref_type: ControlPlaneRefType::KonnectNamespacedRef,
            konnect_id: None,
            konnect_namespaced_ref: Some(KonnectNamespacedRef {
                name: name.into(),
                namespace: namespace.map(Into::into),
            }),
        }
    }
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KonnectExtensionControlPlane {
    #[serde(rename = "ref")]
    pub control_plane_ref: ControlPlaneRef,
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KonnectExtensionKonnect {
    pub control_plane: KonnectExtensionControlPlane,
}

/// Attaches data plane deployments to a Konnect control plane.
#[derive(Default, CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    kind = "KonnectExtension",
    group = "konnect.konghq.com",
    version = "v1alpha2",
    namespaced,
    singular = "konnectextension",
    plural = "konnectextensions"
)]
#[kube(derive = "Default")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct KonnectExtensionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub konnect: Option<KonnectExtensionKonnect>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::assert_ok;
    use serde_json::json;

    #[test]
    fn test_control_plane_ref_wire_format() {
        let cp_ref = ControlPlaneRef::namespaced("cp", Some("default"));
        let value = assert_ok!(serde_json::to_value(&cp_ref));
        assert_eq!(
            value,
            json!({
                "type": "konnectNamespacedRef",
                "konnectNamespacedRef": { "name": "cp", "namespace": "default" }
            })
        );
    }

    #[test]
    fn test_konnect_extension_deserializes_control_plane_ref() {
        let extension: KonnectExtension = assert_ok!(serde_json::from_value(json!({
            "apiVersion": "konnect.konghq.com/v1alpha2",
            "kind": "KonnectExtension",
            "metadata": { "name": "ext", "namespace": "default" },
            "spec": {
                "konnect": {
                    "controlPlane": {
                        "ref": { "type": "konnectID", "konnectID": "abc-123" }
                    }
                }
            }
        })));

        let cp_ref = extension
            .spec
            .konnect
            .map(|k| k.control_plane.control_plane_ref);
        assert_eq!(
            cp_ref,
            Some(ControlPlaneRef {
                ref_type: ControlPlaneRefType::KonnectId,
                konnect_id: Some("abc-123".to_string()),
                konnect_namespaced_ref: None,
            })
        );
    }
}
