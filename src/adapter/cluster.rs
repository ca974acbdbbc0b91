//! Connecting to target clusters
//!
//! Each request carries zero or more kubeconfigs. Every kubeconfig yields its
//! own `DynamicClient`; an empty list means the adapter's ambient cluster.

use crate::manifest::{DynamicClient, KubeDynamicClient};
use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("failed to create kubernetes client: {0}")]
    Client(String),
}

#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Client for the cluster described by `kubeconfig`
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn DynamicClient>, ConnectError>;

    /// Client for the cluster the adapter itself runs against
    async fn connect_default(&self) -> Result<Arc<dyn DynamicClient>, ConnectError>;
}

/// Connector producing kube-rs backed clients
pub struct KubeConnector {
    insecure_skip_tls_verify: bool,
}

impl KubeConnector {
    pub fn new(insecure_skip_tls_verify: bool) -> Self {
        Self {
            insecure_skip_tls_verify,
        }
    }

    fn client(&self, mut config: Config) -> Result<Arc<dyn DynamicClient>, ConnectError> {
        if self.insecure_skip_tls_verify {
            warn!(cluster_url = %config.cluster_url, "TLS verification disabled for cluster");
            config.accept_invalid_certs = true;
        }
        let client = Client::try_from(config).map_err(|e| ConnectError::Client(e.to_string()))?;
        Ok(Arc::new(KubeDynamicClient::new(client)))
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn DynamicClient>, ConnectError> {
        let parsed =
            Kubeconfig::from_yaml(kubeconfig).map_err(|e| ConnectError::Kubeconfig(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| ConnectError::Kubeconfig(e.to_string()))?;
        self.client(config)
    }

    async fn connect_default(&self) -> Result<Arc<dyn DynamicClient>, ConnectError> {
        let config = Config::infer()
            .await
            .map_err(|e| ConnectError::Client(e.to_string()))?;
        self.client(config)
    }
}
