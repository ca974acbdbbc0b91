//! Operation catalog

use serde::Serialize;

pub const MESH_OPERATION: &str = "network_service_mesh";
pub const CUSTOM_OPERATION: &str = "custom";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Install,
    SampleApplication,
    Custom,
}

/// Where an operation's manifest comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "name")]
pub enum ManifestSource {
    /// The configured mesh chart
    MeshChart,
    /// A chart from the configured repository
    Chart(&'static str),
    /// A file in the template directory
    Template(&'static str),
    /// A published manifest fetched over HTTP
    Url(&'static str),
    /// The request body
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub name: &'static str,
    pub description: &'static str,
    /// Human name used in event summaries
    pub service_name: &'static str,
    pub category: OperationCategory,
    pub source: ManifestSource,
}

pub const OPERATIONS: &[Operation] = &[
    Operation {
        name: MESH_OPERATION,
        description: "NSM",
        service_name: "NSM service mesh",
        category: OperationCategory::Install,
        source: ManifestSource::MeshChart,
    },
    Operation {
        name: "nsm-icmp-responder-sample-app",
        description: "ICMP Responder",
        service_name: "ICMP Responder",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Chart("icmp-responder"),
    },
    Operation {
        name: "nsm-vpp-icmp-responder-sample-app",
        description: "VPP ICMP Responder",
        service_name: "VPP ICMP Responder",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Chart("vpp-icmp-responder"),
    },
    Operation {
        name: "nsm-vpn-sample-app",
        description: "VPN",
        service_name: "VPN",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Chart("vpn"),
    },
    Operation {
        name: "hello-nsm-app",
        description: "Hello NSM Application",
        service_name: "Hello NSM",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Template("hello-nsm-sample-application.yaml"),
    },
    Operation {
        name: "bookinfo",
        description: "BookInfo Application",
        service_name: "BookInfo",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Url(
            "https://raw.githubusercontent.com/istio/istio/master/samples/bookinfo/platform/kube/bookinfo.yaml",
        ),
    },
    Operation {
        name: "httpbin",
        description: "HTTPBin Application",
        service_name: "HTTPBin",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Url(
            "https://raw.githubusercontent.com/istio/istio/master/samples/httpbin/httpbin.yaml",
        ),
    },
    Operation {
        name: "imagehub",
        description: "Image Hub Application",
        service_name: "Image Hub",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Url(
            "https://raw.githubusercontent.com/layer5io/image-hub/master/deployment.yaml",
        ),
    },
    Operation {
        name: "emojivoto",
        description: "Emojivoto Application",
        service_name: "Emojivoto",
        category: OperationCategory::SampleApplication,
        source: ManifestSource::Url("https://run.linkerd.io/emojivoto.yml"),
    },
    Operation {
        name: CUSTOM_OPERATION,
        description: "Custom YAML",
        service_name: "Custom YAML",
        category: OperationCategory::Custom,
        source: ManifestSource::Custom,
    },
];

pub fn find_operation(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.name == name)
}
