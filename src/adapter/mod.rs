//! Operation handling
//!
//! `Adapter::apply_operation` validates a request against the catalog and
//! spawns one task per operation. The task renders the manifest, applies it
//! to every target cluster concurrently, and publishes exactly one terminal
//! progress event.

pub mod cluster;
pub mod error;
pub mod operations;
pub mod render;

pub use cluster::{ClusterConnector, ConnectError, KubeConnector};
pub use error::{AdapterError, ClusterError};
pub use operations::{find_operation, ManifestSource, Operation, OperationCategory, OPERATIONS};
pub use render::{ChartRef, HelmCliRenderer, ManifestRenderer, RenderError};

use crate::config::AdapterConfig;
use crate::events::{EventPublisher, ProgressEvent};
use crate::manifest::{AggregateError, ApplyOptions, ManifestApplier};
use crate::server::metrics::SharedMetrics;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{self, JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// A request to run one catalog operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationRequest {
    pub operation_id: String,
    pub operation_name: String,
    pub namespace: String,
    pub is_delete: bool,
    /// Manifest for the `custom` operation
    pub custom_body: String,
    /// Target clusters; empty means the adapter's own cluster
    pub kubeconfigs: Vec<String>,
}

impl OperationRequest {
    /// Assign a random id if the caller did not supply one
    pub fn ensure_operation_id(&mut self) -> &str {
        if self.operation_id.is_empty() {
            self.operation_id = uuid::Uuid::new_v4().to_string();
        }
        &self.operation_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Installing,
    Removing,
    Installed,
    Removed,
    Deploying,
    Deployed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Installing => "installing",
            OperationStatus::Removing => "removing",
            OperationStatus::Installed => "installed",
            OperationStatus::Removed => "removed",
            OperationStatus::Deploying => "deploying",
            OperationStatus::Deployed => "deployed",
        }
    }

    /// (in progress, finished) for an operation
    fn pair(category: OperationCategory, delete: bool) -> (Self, Self) {
        match (category, delete) {
            (_, true) => (OperationStatus::Removing, OperationStatus::Removed),
            (OperationCategory::Custom, false) => {
                (OperationStatus::Deploying, OperationStatus::Deployed)
            }
            (_, false) => (OperationStatus::Installing, OperationStatus::Installed),
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs catalog operations against one or more clusters
#[derive(Clone)]
pub struct Adapter {
    config: Arc<AdapterConfig>,
    connector: Arc<dyn ClusterConnector>,
    renderer: Arc<dyn ManifestRenderer>,
    publisher: EventPublisher,
    metrics: SharedMetrics,
}

impl Adapter {
    pub fn new(
        config: Arc<AdapterConfig>,
        connector: Arc<dyn ClusterConnector>,
        renderer: Arc<dyn ManifestRenderer>,
        publisher: EventPublisher,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            config,
            connector,
            renderer,
            publisher,
            metrics,
        }
    }

    /// Validate and start an operation
    ///
    /// Unknown operations publish an "invalid request" error event and return
    /// `InvalidOperation`. Known operations run on their own task, which is
    /// returned so callers may await it.
    pub async fn apply_operation(
        &self,
        mut request: OperationRequest,
    ) -> Result<JoinHandle<()>, AdapterError> {
        request.ensure_operation_id();

        let Some(operation) = find_operation(&request.operation_name) else {
            let err = AdapterError::InvalidOperation(request.operation_name.clone());
            warn!(
                operation_id = %request.operation_id,
                operation = %request.operation_name,
                "Rejected unsupported operation"
            );
            self.metrics
                .record_invalid_operation(&request.operation_name);
            // The caller is waiting on this path, so a full channel drops the event
            let event = self.error_event(&request.operation_id, "invalid request", &err);
            if let Err(e) = self.publisher.try_publish(event) {
                warn!(
                    operation_id = %request.operation_id,
                    error = %e,
                    "Dropping invalid request event"
                );
            }
            return Err(err);
        };

        info!(
            operation_id = %request.operation_id,
            operation = operation.name,
            namespace = %request.namespace,
            delete = request.is_delete,
            clusters = request.kubeconfigs.len(),
            "Starting operation"
        );

        let adapter = self.clone();
        Ok(tokio::spawn(async move {
            adapter.run_operation(operation, request).await;
        }))
    }

    async fn run_operation(&self, operation: &'static Operation, request: OperationRequest) {
        let started = Instant::now();
        let (pending, done) = OperationStatus::pair(operation.category, request.is_delete);

        let result = match tokio::time::timeout(
            self.config.operation_timeout,
            self.execute(operation, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(self.config.operation_timeout)),
        };
        let elapsed = started.elapsed().as_secs_f64();

        let event = match result {
            Ok(()) => {
                self.metrics.record_operation(operation.name, "success", elapsed);
                info!(
                    operation_id = %request.operation_id,
                    operation = operation.name,
                    status = %done,
                    "Operation finished"
                );
                self.success_event(operation, &request.operation_id, done)
            }
            Err(err) => {
                let result = match err {
                    AdapterError::Timeout(_) => "timeout",
                    _ => "error",
                };
                self.metrics.record_operation(operation.name, result, elapsed);
                error!(
                    operation_id = %request.operation_id,
                    operation = operation.name,
                    code = err.code(),
                    error = %err,
                    "Operation failed"
                );
                let summary = failure_summary(operation, pending);
                self.error_event(&request.operation_id, &summary, &err)
            }
        };
        self.publish(event).await;
    }

    async fn execute(
        &self,
        operation: &'static Operation,
        request: &OperationRequest,
    ) -> Result<(), AdapterError> {
        let wrap = |err: AdapterError| match operation.category {
            OperationCategory::Install => AdapterError::ApplyHelmChart(Box::new(err)),
            OperationCategory::SampleApplication => AdapterError::SampleApp(Box::new(err)),
            OperationCategory::Custom => AdapterError::CustomOperation(Box::new(err)),
        };

        let payload = self.render(operation, request).await.map_err(wrap)?;
        let options = match operation.category {
            OperationCategory::Custom => ApplyOptions::custom(request.is_delete),
            _ => ApplyOptions {
                delete: request.is_delete,
                custom: false,
            },
        };
        self.fan_out(payload, &request.namespace, options, &request.kubeconfigs)
            .await
            .map_err(wrap)
    }

    async fn render(
        &self,
        operation: &'static Operation,
        request: &OperationRequest,
    ) -> Result<Vec<u8>, AdapterError> {
        let namespace = request.namespace.as_str();
        let charts = &self.config.charts;

        let rendered = match operation.source {
            ManifestSource::MeshChart => {
                let chart = ChartRef {
                    repository: charts.repository.clone(),
                    chart: charts.mesh_chart.clone(),
                    version: charts.mesh_version.clone(),
                };
                let manifest = self.renderer.render_chart(&chart, namespace).await?;
                if request.is_delete || namespace.is_empty() {
                    manifest
                } else {
                    format!("{}---\n{}", namespace_document(namespace)?, manifest)
                }
            }
            ManifestSource::Chart(name) => {
                let chart = ChartRef {
                    repository: charts.repository.clone(),
                    chart: name.to_string(),
                    version: None,
                };
                self.renderer.render_chart(&chart, namespace).await?
            }
            ManifestSource::Template(template) => {
                self.renderer.render_template(template, namespace).await?
            }
            ManifestSource::Url(url) => self.renderer.render_url(url, namespace).await?,
            ManifestSource::Custom => request.custom_body.clone(),
        };
        Ok(rendered.into_bytes())
    }

    /// Apply the payload on every target cluster concurrently
    async fn fan_out(
        &self,
        payload: Vec<u8>,
        namespace: &str,
        options: ApplyOptions,
        kubeconfigs: &[String],
    ) -> Result<(), AdapterError> {
        let payload = Arc::new(payload);
        let targets: Vec<Option<String>> = if kubeconfigs.is_empty() {
            vec![None]
        } else {
            kubeconfigs.iter().cloned().map(Some).collect()
        };

        // Dropping the set aborts every cluster task, so an operation timeout
        // stops in-flight work along with the operation itself
        let mut tasks: JoinSet<Result<(), ClusterError>> = JoinSet::new();
        let mut indexes: HashMap<task::Id, usize> = HashMap::new();

        for (index, kubeconfig) in targets.into_iter().enumerate() {
            let connector = self.connector.clone();
            let metrics = self.metrics.clone();
            let payload = payload.clone();
            let namespace = namespace.to_string();
            let apply_config = self.config.apply;

            let handle = tasks.spawn(async move {
                let client = match kubeconfig {
                    Some(kubeconfig) => connector.connect(&kubeconfig).await,
                    None => connector.connect_default().await,
                }
                .map_err(|source| ClusterError::Connect { index, source })?;

                let report = ManifestApplier::new(client, apply_config)
                    .apply_manifest(&payload, &namespace, options)
                    .await
                    .map_err(|source| ClusterError::Apply { index, source })?;

                for outcome in &report.outcomes {
                    metrics.record_object(outcome.outcome.label());
                }
                Ok(())
            });
            indexes.insert(handle.id(), index);
        }

        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(join_err) => errors.push(ClusterError::Panicked {
                    index: indexes.get(&join_err.id()).copied().unwrap_or_default(),
                    message: join_err.to_string(),
                }),
            }
        }
        errors.sort_by_key(ClusterError::index);

        match AggregateError::from_errors(errors) {
            None => Ok(()),
            Some(source) => Err(AdapterError::LoadNamespace {
                namespace: namespace.to_string(),
                source,
            }),
        }
    }

    fn success_event(
        &self,
        operation: &Operation,
        operation_id: &str,
        done: OperationStatus,
    ) -> ProgressEvent {
        let (summary, details) = match operation.category {
            OperationCategory::Install => (
                format!("{} {} successfully", operation.service_name, done),
                format!("The {} is now {}.", operation.service_name, done),
            ),
            OperationCategory::SampleApplication => (
                format!("{} application {} successfully", operation.service_name, done),
                format!("The {} application is now {}.", operation.service_name, done),
            ),
            OperationCategory::Custom => (format!("Manifest {} successfully", done), String::new()),
        };
        ProgressEvent::info(operation_id, summary, details)
            .with_component(&self.config.component, &self.config.component_name)
    }

    fn error_event(&self, operation_id: &str, summary: &str, err: &AdapterError) -> ProgressEvent {
        ProgressEvent::error(operation_id, summary, err.to_string())
            .with_component(&self.config.component, &self.config.component_name)
            .with_error_code(err.code(), err.probable_cause(), err.remedy())
    }

    async fn publish(&self, event: ProgressEvent) {
        let operation_id = event.operation_id.clone();
        if let Err(e) = self.publisher.publish(event).await {
            warn!(operation_id = %operation_id, error = %e, "Dropping progress event");
        }
    }
}

fn failure_summary(operation: &Operation, pending: OperationStatus) -> String {
    match operation.category {
        OperationCategory::Install => {
            format!("Error while {} {}", pending, operation.service_name)
        }
        OperationCategory::SampleApplication => format!(
            "Error while {} {} application",
            pending, operation.service_name
        ),
        OperationCategory::Custom => format!("Error while {} custom operation", pending),
    }
}

/// YAML for the target namespace, applied ahead of the mesh chart
fn namespace_document(namespace: &str) -> Result<String, RenderError> {
    let object = Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    };
    serde_yaml::to_string(&object).map_err(|e| RenderError::Encode(e.to_string()))
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;
