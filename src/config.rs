//! Host configuration: CLI flags with environment fallbacks, and the policy file

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::debug;

use meshroute_common::telemetry::{LogFormat, TelemetryConfig};
use meshroute_common::{Error, Result, DEFAULT_NAMESPACE};
use meshroute_reconciler::naming::DEFAULT_SERVICE_NAME;
use meshroute_reconciler::{NamingPolicy, PolicyDescriptor};

/// Default overall deadline for one reconciliation run
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// meshroute - reconcile Istio routing for a service from its traffic policy
#[derive(Parser, Debug, Clone)]
#[command(name = "meshroute", version, about, long_about = None)]
pub struct Config {
    /// Logical service name; also the mesh host and resource name prefix
    #[arg(long, env = "SERVICE_NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    /// Namespace holding the managed resources
    #[arg(long, env = "MESHROUTE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Path to the policy descriptor YAML file
    #[arg(short = 'p', long = "policy", env = "MESHROUTE_POLICY")]
    pub policy: PathBuf,

    /// Path to a kubeconfig file (inferred when unset)
    #[arg(long, env = "MESHROUTE_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Deadline for the whole reconciliation in seconds
    #[arg(long, env = "MESHROUTE_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Log line format: json or text
    #[arg(long, env = "MESHROUTE_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Config {
    /// Naming policy for the configured service
    pub fn naming(&self) -> NamingPolicy {
        NamingPolicy::new(&self.service_name, &self.namespace)
    }

    /// Reconciliation deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Telemetry tagged with the service and namespace being reconciled
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_format: self.log_format,
            ..TelemetryConfig::for_target(&self.service_name, &self.namespace)
        }
    }
}

/// Read, parse and validate a policy descriptor file.
///
/// An empty file yields the default descriptor.
pub async fn load_descriptor(path: &Path) -> Result<PolicyDescriptor> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::validation(format!("failed to read policy {}: {}", path.display(), e))
    })?;

    let descriptor = if content.trim().is_empty() {
        PolicyDescriptor::default()
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            Error::serialization(format!("invalid policy {}: {}", path.display(), e))
        })?
    };
    descriptor.validate()?;

    debug!(path = %path.display(), "loaded policy descriptor");
    Ok(descriptor)
}
