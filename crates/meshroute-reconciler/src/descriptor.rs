//! Policy descriptor: the desired traffic behaviour of one service
//!
//! A descriptor is built once by the host (usually deserialized from YAML)
//! and passed read-only into the reconciler. Every field has a default so a
//! descriptor file only needs the knobs it changes.

use serde::{Deserialize, Serialize};

use meshroute_common::{Error, Result};

/// Weight meaning "this version takes all matched traffic"
pub const FULL_WEIGHT: u32 = 100;

/// Domain appended to the service name for gateway hosts when none is given
pub const DEFAULT_DOMAIN: &str = "ext";

/// Desired mesh behaviour for a service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDescriptor {
    /// Version (subset) this deployment represents; empty = no subset change
    pub version: String,
    /// Share of traffic for this version, 0-100 (0 = unweighted)
    pub weight: u32,
    /// Request timeout in seconds (0 = none)
    pub timeout_seconds: u64,
    /// Retry attempts (0 = no retry policy)
    pub number_of_retries: u32,
    /// Consecutive errors before ejection (0 = no outlier detection)
    pub circuit_breaker_errors: u32,
    /// Request match rules for the routing rule
    pub matches: Vec<MatchRule>,
    /// Fault injection
    pub fault: Option<FaultSpec>,
    /// Expose the service through an ingress gateway
    pub enable_gateway: bool,
    /// Domain for the external host `<service>.<domain>`
    pub domain: String,
}

impl Default for PolicyDescriptor {
    fn default() -> Self {
        Self {
            version: String::new(),
            weight: 0,
            timeout_seconds: 0,
            number_of_retries: 0,
            circuit_breaker_errors: 0,
            matches: Vec::new(),
            fault: None,
            enable_gateway: false,
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

impl PolicyDescriptor {
    /// Whether this run targets a specific subset
    pub fn has_version(&self) -> bool {
        !self.version.is_empty()
    }

    /// Fault to inject, if any. A zero percentage disables injection.
    pub fn active_fault(&self) -> Option<&FaultSpec> {
        self.fault.as_ref().filter(|f| f.percentage > 0)
    }

    /// Reject values outside their documented ranges.
    ///
    /// Combinations that are merely odd (see [`Self::degenerate_combinations`])
    /// are accepted.
    pub fn validate(&self) -> Result<()> {
        if self.weight > FULL_WEIGHT {
            return Err(Error::validation_for_field(
                "weight",
                format!("weight {} must be between 0 and 100", self.weight),
            ));
        }
        if let Some(fault) = &self.fault {
            if fault.percentage > 100 {
                return Err(Error::validation_for_field(
                    "fault.percentage",
                    format!("percentage {} must be between 0 and 100", fault.percentage),
                ));
            }
        }
        if self.enable_gateway && self.domain.is_empty() {
            return Err(Error::validation_for_field(
                "domain",
                "domain is required when the gateway is enabled",
            ));
        }
        Ok(())
    }

    /// Combinations that reconcile to defined but probably unintended state
    pub fn degenerate_combinations(&self) -> Vec<&'static str> {
        let mut found = Vec::new();
        if self.number_of_retries > 0 && self.timeout_seconds == 0 {
            found.push("retries configured without a timeout; perTryTimeout is omitted");
        }
        if !self.has_version() && self.weight != 0 {
            found.push("weight is ignored when no version is set");
        }
        found
    }
}

/// What part of the request a match rule inspects
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTarget {
    /// Request path
    #[default]
    Uri,
    /// Request header named by `key`
    Header,
    /// HTTP method
    Method,
    /// Gateway the request came through; `mode` is ignored
    Gateway,
    /// Label `key` of the calling workload; `mode` is ignored
    SourceLabel,
}

/// How a match value is compared
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMode {
    /// Exact string
    Exact,
    /// String prefix
    #[default]
    Prefix,
    /// Regular expression
    Regex,
}

/// One request match condition
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchRule {
    /// Inspected request attribute
    pub target: MatchTarget,
    /// Comparison mode
    pub mode: MatchMode,
    /// Header or label name
    pub key: String,
    /// Compared value
    pub value: String,
    /// Case-insensitive comparison
    pub ignore_case: bool,
}

impl MatchRule {
    /// Prefix match on the request path
    pub fn uri_prefix(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Kind of injected fault
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    /// Respond with `httpStatus` without forwarding
    #[default]
    Abort,
    /// Forward after `delaySeconds`
    Delay,
}

/// Fault injection settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FaultSpec {
    /// Fault kind
    pub kind: FaultKind,
    /// Share of requests affected, 0-100
    pub percentage: u32,
    /// Status for aborted requests
    pub http_status: u32,
    /// Delay for delayed requests
    pub delay_seconds: u64,
}

impl Default for FaultSpec {
    fn default() -> Self {
        Self {
            kind: FaultKind::Abort,
            percentage: 100,
            http_status: 500,
            delay_seconds: 0,
        }
    }
}
