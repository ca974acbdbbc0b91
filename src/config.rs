//! Adapter configuration
//!
//! Everything the adapter needs is carried in one `AdapterConfig`, built from
//! `NSM_ADAPTER_*` environment variables at startup and handed to each
//! component's constructor.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default port for the HTTP surface
pub const DEFAULT_PORT: u16 = 10004;

/// Component name reported on every progress event
pub const DEFAULT_COMPONENT_NAME: &str = "NETWORK_SERVICE_MESH";

/// Default depth of the progress event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Default sleep between empty polls of the event channel
pub const DEFAULT_EVENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default wait between delete and re-create
pub const DEFAULT_RECREATE_DELAY: Duration = Duration::from_secs(1);

/// Default bound on delete-and-recreate cycles per object
pub const DEFAULT_MAX_RECREATE_CYCLES: u32 = 3;

/// Default bound on a single dynamic API call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a whole operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

pub const DEFAULT_HELM_REPOSITORY: &str = "https://helm.nsm.dev/";
pub const DEFAULT_MESH_CHART: &str = "nsm";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Progress event channel settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventConfig {
    pub capacity: usize,
    pub poll_interval: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
            poll_interval: DEFAULT_EVENT_POLL_INTERVAL,
        }
    }
}

/// Reconciler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyConfig {
    /// Wait after a delete before the object is created again
    pub recreate_delay: Duration,
    /// Delete-and-recreate cycles allowed before giving up on an object
    pub max_recreate_cycles: u32,
    /// Bound on each get/create/update/delete call
    pub request_timeout: Duration,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            recreate_delay: DEFAULT_RECREATE_DELAY,
            max_recreate_cycles: DEFAULT_MAX_RECREATE_CYCLES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Where manifests come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartConfig {
    pub helm_binary: String,
    pub repository: String,
    pub mesh_chart: String,
    /// Chart version pin, latest when unset
    pub mesh_version: Option<String>,
    pub template_dir: PathBuf,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            helm_binary: "helm".to_string(),
            repository: DEFAULT_HELM_REPOSITORY.to_string(),
            mesh_chart: DEFAULT_MESH_CHART.to_string(),
            mesh_version: None,
            template_dir: PathBuf::from("templates"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub port: u16,
    pub component: String,
    pub component_name: String,
    pub events: EventConfig,
    pub apply: ApplyConfig,
    pub operation_timeout: Duration,
    pub charts: ChartConfig,
    /// Skip TLS verification when connecting with a caller's kubeconfig
    pub insecure_skip_tls_verify: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            component: "ADAPTER".to_string(),
            component_name: DEFAULT_COMPONENT_NAME.to_string(),
            events: EventConfig::default(),
            apply: ApplyConfig::default(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            charts: ChartConfig::default(),
            insecure_skip_tls_verify: false,
        }
    }
}

impl AdapterConfig {
    /// Create config from `NSM_ADAPTER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable source
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = parse_or(&get, "NSM_ADAPTER_PORT", "port number", defaults.port)?;
        let capacity = parse_or(
            &get,
            "NSM_ADAPTER_EVENT_CAPACITY",
            "channel capacity",
            defaults.events.capacity,
        )?;
        if capacity == 0 {
            return Err(ConfigError::Zero {
                var: "NSM_ADAPTER_EVENT_CAPACITY",
            });
        }

        let poll_ms = parse_or(
            &get,
            "NSM_ADAPTER_EVENT_POLL_MS",
            "number of milliseconds",
            defaults.events.poll_interval.as_millis() as u64,
        )?;
        let recreate_ms = parse_or(
            &get,
            "NSM_ADAPTER_RECREATE_DELAY_MS",
            "number of milliseconds",
            defaults.apply.recreate_delay.as_millis() as u64,
        )?;
        let max_recreate_cycles = parse_or(
            &get,
            "NSM_ADAPTER_MAX_RECREATES",
            "cycle count",
            defaults.apply.max_recreate_cycles,
        )?;
        let request_secs = parse_or(
            &get,
            "NSM_ADAPTER_REQUEST_TIMEOUT_SECS",
            "number of seconds",
            defaults.apply.request_timeout.as_secs(),
        )?;
        let operation_secs = parse_or(
            &get,
            "NSM_ADAPTER_OPERATION_TIMEOUT_SECS",
            "number of seconds",
            defaults.operation_timeout.as_secs(),
        )?;
        for (var, value) in [
            ("NSM_ADAPTER_REQUEST_TIMEOUT_SECS", request_secs),
            ("NSM_ADAPTER_OPERATION_TIMEOUT_SECS", operation_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { var });
            }
        }

        let insecure_skip_tls_verify = match get("NSM_ADAPTER_INSECURE_SKIP_TLS_VERIFY") {
            None => defaults.insecure_skip_tls_verify,
            Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid {
                var: "NSM_ADAPTER_INSECURE_SKIP_TLS_VERIFY",
                value,
                expected: "boolean",
            })?,
        };

        Ok(Self {
            port,
            component: defaults.component,
            component_name: get("NSM_ADAPTER_COMPONENT_NAME").unwrap_or(defaults.component_name),
            events: EventConfig {
                capacity,
                poll_interval: Duration::from_millis(poll_ms),
            },
            apply: ApplyConfig {
                recreate_delay: Duration::from_millis(recreate_ms),
                max_recreate_cycles,
                request_timeout: Duration::from_secs(request_secs),
            },
            operation_timeout: Duration::from_secs(operation_secs),
            charts: ChartConfig {
                helm_binary: get("NSM_ADAPTER_HELM_BIN").unwrap_or(defaults.charts.helm_binary),
                repository: get("NSM_ADAPTER_HELM_REPO").unwrap_or(defaults.charts.repository),
                mesh_chart: get("NSM_ADAPTER_MESH_CHART").unwrap_or(defaults.charts.mesh_chart),
                mesh_version: get("NSM_ADAPTER_MESH_VERSION"),
                template_dir: get("NSM_ADAPTER_TEMPLATE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.charts.template_dir),
            },
            insecure_skip_tls_verify,
        })
    }
}

fn parse_or<T, G>(
    get: &G,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected,
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
