//! Manifest rendering
//!
//! Charts are rendered by shelling out to `helm template`; download and
//! caching are left to Helm. Template files and published manifests are
//! plain YAML with an optional `{{namespace}}` placeholder.

use crate::config::ChartConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const NAMESPACE_PLACEHOLDER: &str = "{{namespace}}";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("helm template {chart} exited with {status}: {stderr}")]
    Helm {
        chart: String,
        status: String,
        stderr: String,
    },

    #[error("failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("rendered output is not valid UTF-8")]
    Encoding,

    #[error("failed to encode generated object: {0}")]
    Encode(String),
}

/// A chart in a Helm repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRef {
    pub repository: String,
    pub chart: String,
    /// Latest when unset
    pub version: Option<String>,
}

#[async_trait]
pub trait ManifestRenderer: Send + Sync {
    /// Render a chart into multi-document YAML for `namespace`
    async fn render_chart(&self, chart: &ChartRef, namespace: &str) -> Result<String, RenderError>;

    /// Load a bundled template and fill in `namespace`
    async fn render_template(&self, template: &str, namespace: &str)
        -> Result<String, RenderError>;

    /// Download a published manifest and fill in `namespace`
    async fn render_url(&self, url: &str, namespace: &str) -> Result<String, RenderError>;
}

/// Replace every namespace placeholder in a template
pub fn substitute_namespace(template: &str, namespace: &str) -> String {
    template.replace(NAMESPACE_PLACEHOLDER, namespace)
}

/// Renderer backed by the `helm` binary, a template directory and HTTP
pub struct HelmCliRenderer {
    helm_binary: String,
    template_dir: PathBuf,
    http: reqwest::Client,
}

impl HelmCliRenderer {
    pub fn new(config: &ChartConfig) -> Self {
        Self {
            helm_binary: config.helm_binary.clone(),
            template_dir: config.template_dir.clone(),
            http: reqwest::Client::new(),
        }
    }

    fn template_args(chart: &ChartRef, namespace: &str) -> Vec<String> {
        let mut args = vec![
            "template".to_string(),
            chart.chart.clone(),
            chart.chart.clone(),
            "--repo".to_string(),
            chart.repository.clone(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        if let Some(version) = &chart.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        args
    }
}

#[async_trait]
impl ManifestRenderer for HelmCliRenderer {
    async fn render_chart(&self, chart: &ChartRef, namespace: &str) -> Result<String, RenderError> {
        let args = Self::template_args(chart, namespace);
        debug!(binary = %self.helm_binary, ?args, "Rendering chart");

        let output = Command::new(&self.helm_binary)
            .args(&args)
            .output()
            .await
            .map_err(|source| RenderError::Spawn {
                binary: self.helm_binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RenderError::Helm {
                chart: chart.chart.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| RenderError::Encoding)
    }

    async fn render_template(
        &self,
        template: &str,
        namespace: &str,
    ) -> Result<String, RenderError> {
        let path = self.template_dir.join(template);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| RenderError::Template { path, source })?;
        Ok(substitute_namespace(&raw, namespace))
    }

    async fn render_url(&self, url: &str, namespace: &str) -> Result<String, RenderError> {
        debug!(url = %url, "Fetching manifest");
        let fetch_error = |message: String| RenderError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("server returned {}", status)));
        }
        let raw = response.text().await.map_err(|e| fetch_error(e.to_string()))?;
        Ok(substitute_namespace(&raw, namespace))
    }
}
