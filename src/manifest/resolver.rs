//! Resolve `apiVersion` + `kind` into the group/version/resource triple
//! used to address the generic object API.

use kube::api::GroupVersionKind;
use kube::discovery::ApiResource;
use std::fmt;

/// Kinds whose resource name is not `lowercase(kind) + "s"`
///
/// Kubernetes resource naming is not regular, so every exception is listed
/// explicitly. Add new kinds here rather than guessing from the suffix.
const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    // Core and built-in API groups
    ("endpoints", "endpoints"),
    ("componentstatus", "componentstatuses"),
    ("ingress", "ingresses"),
    ("ingressclass", "ingressclasses"),
    ("networkpolicy", "networkpolicies"),
    ("podsecuritypolicy", "podsecuritypolicies"),
    ("storageclass", "storageclasses"),
    ("priorityclass", "priorityclasses"),
    ("runtimeclass", "runtimeclasses"),
    ("volumeattributesclass", "volumeattributesclasses"),
    ("csistoragecapacity", "csistoragecapacities"),
    ("ipaddress", "ipaddresses"),
    ("validatingadmissionpolicy", "validatingadmissionpolicies"),
    ("mutatingadmissionpolicy", "mutatingadmissionpolicies"),
    ("securitycontextconstraints", "securitycontextconstraints"),
    // Gateway API
    ("gatewayclass", "gatewayclasses"),
    ("backendtlspolicy", "backendtlspolicies"),
    // Mesh add-ons (Istio, SMI, Linkerd)
    ("serviceentry", "serviceentries"),
    ("authorizationpolicy", "authorizationpolicies"),
    ("meshpolicy", "meshpolicies"),
    ("telemetry", "telemetries"),
    ("serverauthorization", "serverauthorizations"),
    // Cluster API
    ("clusterclass", "clusterclasses"),
];

/// Group/version/resource triple for a generic API endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    /// Lower-case plural resource name (e.g. "deployments")
    pub resource: String,
}

impl ResourceAddress {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// The `apiVersion` string this address was resolved from
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// kube-rs resource descriptor for `Api<DynamicObject>`
    pub fn api_resource(&self, kind: &str) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.resource)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Split an `apiVersion` into (group, version)
///
/// A bare version belongs to the core group, which is the empty string.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Plural resource name for a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    IRREGULAR_PLURALS
        .iter()
        .find(|(singular, _)| *singular == lower)
        .map(|(_, plural)| (*plural).to_string())
        .unwrap_or_else(|| format!("{}s", lower))
}

/// Resolve an object's declared type into its resource address
pub fn resolve(api_version: &str, kind: &str) -> ResourceAddress {
    let (group, version) = parse_api_version(api_version);
    ResourceAddress {
        group,
        version,
        resource: pluralize_kind(kind),
    }
}
