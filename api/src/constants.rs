pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kong-operator";

pub const MANAGED_BY_NAME_LABEL: &str = "gateway-operator.konghq.com/managed-by-name";
pub const MANAGED_BY_NAMESPACE_LABEL: &str = "gateway-operator.konghq.com/managed-by-namespace";

pub const HASH_SPEC_LABEL: &str = "gateway-operator.konghq.com/hash-spec";

pub const GATEWAY_OPERATOR_GROUP: &str = "gateway-operator.konghq.com";
pub const KONNECT_GROUP: &str = "konnect.konghq.com";
pub const CONFIGURATION_GROUP: &str = "configuration.konghq.com";
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

pub const GATEWAY_KIND: &str = "Gateway";
pub const SERVICE_KIND: &str = "Service";
pub const GATEWAY_CONFIGURATION_KIND: &str = "GatewayConfiguration";
pub const KONNECT_EXTENSION_KIND: &str = "KonnectExtension";
pub const KONG_SERVICE_KIND: &str = "KongService";

pub const PROGRAMMED_CONDITION: &str = "Programmed";
pub const CONDITION_STATUS_TRUE: &str = "True";

pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";
