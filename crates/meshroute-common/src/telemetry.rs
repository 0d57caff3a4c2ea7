//! Logging and trace export for a meshroute run
//!
//! Log lines go to stdout, as JSON in a cluster job or as plain text when run
//! by hand. `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]. Spans are exported
//! over OTLP only when an endpoint is configured; the exported resource names
//! the service and namespace being reconciled so traces from different runs
//! can be told apart.

use std::fmt;
use std::str::FromStr;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,meshroute=debug,kube=info,tower=warn,hyper=warn";

/// Resource attribute carrying the reconciled service
pub const TARGET_SERVICE_KEY: &str = "meshroute.service";
/// Resource attribute carrying the namespace of the managed resources
pub const TARGET_NAMESPACE_KEY: &str = "k8s.namespace.name";

/// Errors raised while installing the subscriber or the exporter
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The OTLP exporter could not be built
    #[error("failed to initialize tracer: {0}")]
    TracerInit(String),

    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Shape of log lines on stdout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{other}' (expected json or text)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
        })
    }
}

/// What to install for one run
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Reported as `service.name`
    pub service_name: String,
    /// OTLP collector (e.g. "http://otel-collector:4317"); no export when unset
    pub otlp_endpoint: Option<String>,
    /// Log line shape
    pub log_format: LogFormat,
    /// Service whose routing is reconciled
    pub target_service: Option<String>,
    /// Namespace of the managed resources
    pub namespace: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "meshroute".to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            log_format: LogFormat::default(),
            target_service: None,
            namespace: None,
        }
    }
}

impl TelemetryConfig {
    /// Telemetry for a run reconciling `service` in `namespace`
    pub fn for_target(service: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            target_service: Some(service.into()),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Attributes describing this process and its target
    pub fn resource_attributes(&self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ];
        if let Some(service) = &self.target_service {
            attributes.push(KeyValue::new(TARGET_SERVICE_KEY, service.clone()));
        }
        if let Some(namespace) = &self.namespace {
            attributes.push(KeyValue::new(TARGET_NAMESPACE_KEY, namespace.clone()));
        }
        attributes
    }
}

/// Install the global subscriber, plus the OTLP exporter when configured
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let otel_layer = match otlp_provider(&config)? {
        Some(provider) => {
            let tracer = provider.tracer(config.service_name.clone());
            global::set_tracer_provider(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json_layer = (config.log_format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
    });
    let text_layer = (config.log_format == LogFormat::Text)
        .then(|| tracing_subscriber::fmt::layer().compact().with_target(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

/// Flush pending spans before the process exits
///
/// A no-op when OTLP export was not configured.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

fn otlp_provider(config: &TelemetryConfig) -> Result<Option<TracerProvider>, TelemetryError> {
    let Some(endpoint) = &config.otlp_endpoint else {
        return Ok(None);
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    Ok(Some(
        TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(Resource::new(config.resource_attributes()))
            .build(),
    ))
}
