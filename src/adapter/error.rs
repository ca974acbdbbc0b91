//! Operation errors and the codes reported on error events

use super::cluster::ConnectError;
use super::render::RenderError;
use crate::manifest::{AggregateError, ManifestError};
use std::time::Duration;
use thiserror::Error;

pub const ERR_APPLY_HELM_CHART: &str = "1008";
pub const ERR_SAMPLE_APP: &str = "1011";
pub const ERR_CUSTOM_OPERATION: &str = "1012";
pub const ERR_INVALID_OPERATION: &str = "1013";
pub const ERR_LOAD_NAMESPACE: &str = "1014";
pub const ERR_OPERATION_TIMEOUT: &str = "1015";
pub const ERR_RENDER_MANIFEST: &str = "1016";

/// Failure on one target cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster {index}: {source}")]
    Connect {
        index: usize,
        #[source]
        source: ConnectError,
    },

    #[error("cluster {index}: {source}")]
    Apply {
        index: usize,
        #[source]
        source: ManifestError,
    },

    #[error("cluster {index}: apply task failed: {message}")]
    Panicked { index: usize, message: String },
}

impl ClusterError {
    /// Position of the cluster in the request's kubeconfig list
    pub fn index(&self) -> usize {
        match self {
            ClusterError::Connect { index, .. }
            | ClusterError::Apply { index, .. }
            | ClusterError::Panicked { index, .. } => *index,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("operation {0:?} is not supported by the adapter")]
    InvalidOperation(String),

    #[error("error applying the mesh Helm chart: {0}")]
    ApplyHelmChart(#[source] Box<AdapterError>),

    #[error("error with sample app operation: {0}")]
    SampleApp(#[source] Box<AdapterError>),

    #[error("error with custom operation: {0}")]
    CustomOperation(#[source] Box<AdapterError>),

    #[error("failed to apply manifest in namespace {namespace:?}:\n{source}")]
    LoadNamespace {
        namespace: String,
        #[source]
        source: AggregateError<ClusterError>,
    },

    #[error("failed to render manifest: {0}")]
    Render(#[from] RenderError),

    #[error("operation did not finish within {0:?}")]
    Timeout(Duration),
}

impl AdapterError {
    /// Code carried on the error event
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::InvalidOperation(_) => ERR_INVALID_OPERATION,
            AdapterError::ApplyHelmChart(_) => ERR_APPLY_HELM_CHART,
            AdapterError::SampleApp(_) => ERR_SAMPLE_APP,
            AdapterError::CustomOperation(_) => ERR_CUSTOM_OPERATION,
            AdapterError::LoadNamespace { .. } => ERR_LOAD_NAMESPACE,
            AdapterError::Render(_) => ERR_RENDER_MANIFEST,
            AdapterError::Timeout(_) => ERR_OPERATION_TIMEOUT,
        }
    }

    pub fn probable_cause(&self) -> String {
        match self {
            AdapterError::InvalidOperation(_) => {
                "The requested operation is not in the adapter's catalog".to_string()
            }
            AdapterError::ApplyHelmChart(inner)
            | AdapterError::SampleApp(inner)
            | AdapterError::CustomOperation(inner) => inner.probable_cause(),
            AdapterError::LoadNamespace { source, .. } => format!(
                "{} of the target clusters rejected the manifest",
                source.len()
            ),
            AdapterError::Render(_) => "The chart or template could not be rendered".to_string(),
            AdapterError::Timeout(_) => "The cluster did not respond in time".to_string(),
        }
    }

    pub fn remedy(&self) -> String {
        match self {
            AdapterError::InvalidOperation(_) => {
                "Use one of the operations advertised by the adapter".to_string()
            }
            AdapterError::ApplyHelmChart(inner)
            | AdapterError::SampleApp(inner)
            | AdapterError::CustomOperation(inner) => inner.remedy(),
            AdapterError::LoadNamespace { .. } => {
                "Check the kubeconfig, the namespace and the manifest objects listed in the details"
                    .to_string()
            }
            AdapterError::Render(_) => {
                "Check that helm is installed and the chart repository is reachable".to_string()
            }
            AdapterError::Timeout(_) => {
                "Check cluster connectivity or raise NSM_ADAPTER_OPERATION_TIMEOUT_SECS".to_string()
            }
        }
    }
}
