//! Per-call execution options and the option applier.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::statement::{Statement, StatementSettings};
use crate::value::Value;

/// Consistency levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Any node, including hinted handoff.
    Any,
    /// One replica.
    One,
    /// Two replicas.
    Two,
    /// Three replicas.
    Three,
    /// A majority of replicas.
    Quorum,
    /// Every replica.
    All,
    /// A majority in the local datacenter.
    LocalQuorum,
    /// A majority in each datacenter.
    EachQuorum,
    /// One replica in the local datacenter.
    LocalOne,
}

impl Consistency {
    /// Returns the snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Any => "any",
            Consistency::One => "one",
            Consistency::Two => "two",
            Consistency::Three => "three",
            Consistency::Quorum => "quorum",
            Consistency::All => "all",
            Consistency::LocalQuorum => "local_quorum",
            Consistency::EachQuorum => "each_quorum",
            Consistency::LocalOne => "local_one",
        }
    }
}

/// Serial consistency levels for lightweight transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialConsistency {
    /// Paxos across all datacenters.
    Serial,
    /// Paxos in the local datacenter.
    LocalSerial,
}

impl SerialConsistency {
    /// Returns the snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialConsistency::Serial => "serial",
            SerialConsistency::LocalSerial => "local_serial",
        }
    }
}

/// Unknown consistency name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown consistency level: {0}")]
pub struct ParseConsistencyError(String);

fn normalize_level(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for Consistency {
    type Err = ParseConsistencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_level(s).as_str() {
            "any" => Ok(Consistency::Any),
            "one" => Ok(Consistency::One),
            "two" => Ok(Consistency::Two),
            "three" => Ok(Consistency::Three),
            "quorum" => Ok(Consistency::Quorum),
            "all" => Ok(Consistency::All),
            "local_quorum" => Ok(Consistency::LocalQuorum),
            "each_quorum" => Ok(Consistency::EachQuorum),
            "local_one" => Ok(Consistency::LocalOne),
            _ => Err(ParseConsistencyError(s.to_string())),
        }
    }
}

impl FromStr for SerialConsistency {
    type Err = ParseConsistencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_level(s).as_str() {
            "serial" => Ok(SerialConsistency::Serial),
            "local_serial" => Ok(SerialConsistency::LocalSerial),
            _ => Err(ParseConsistencyError(s.to_string())),
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SerialConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retry policy understood by the driver.
///
/// This layer never retries; it hands the policy object to the driver
/// untouched.
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    /// Returns the policy name the driver dispatches on.
    fn name(&self) -> &str;
}

/// Retries read and write timeouts the driver deems safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn name(&self) -> &str {
        "default"
    }
}

/// Never retries; every failure reaches the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn name(&self) -> &str {
        "fallthrough"
    }
}

/// Retries at a lower consistency level when replicas are missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DowngradingConsistencyRetryPolicy;

impl RetryPolicy for DowngradingConsistencyRetryPolicy {
    fn name(&self) -> &str {
        "downgrading_consistency"
    }
}

/// Per-call configuration applied to a resolved statement.
///
/// Every field is optional; unset fields keep the statement's prior value.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Consistency level.
    pub consistency: Option<Consistency>,
    /// Serial consistency level.
    pub serial_consistency: Option<SerialConsistency>,
    /// Routing key. Only meaningful for simple statements; the driver
    /// rejects it elsewhere.
    pub routing_key: Option<Bytes>,
    /// Retry policy forwarded to the driver.
    pub retry_policy: Option<Arc<dyn RetryPolicy>>,
    /// Server-side tracing.
    pub tracing: Option<bool>,
    /// Page size.
    pub fetch_size: Option<u32>,
    /// Decode column keys as strings instead of symbols.
    pub string_keys: bool,
    /// Values bound to prepared statements, in parameter order.
    pub values: Vec<Value>,
    /// Runtime completions run on. Defaults to the shared callback pool.
    pub executor: Option<Handle>,
}

impl ExecutionOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the consistency level.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Sets the serial consistency level.
    pub fn serial_consistency(mut self, serial: SerialConsistency) -> Self {
        self.serial_consistency = Some(serial);
        self
    }

    /// Sets the routing key.
    pub fn routing_key(mut self, key: impl Into<Bytes>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Enables or disables tracing.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing = Some(enabled);
        self
    }

    /// Sets the fetch size.
    pub fn fetch_size(mut self, size: u32) -> Self {
        self.fetch_size = Some(size);
        self
    }

    /// Selects string column keys.
    pub fn string_keys(mut self, enabled: bool) -> Self {
        self.string_keys = enabled;
        self
    }

    /// Sets the values bound to prepared statements.
    pub fn values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Runs completions on the given runtime.
    pub fn executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }
}

/// Applies the set options onto `statement`.
pub fn apply(statement: &mut Statement, options: &ExecutionOptions) {
    let settings: &mut StatementSettings = statement.settings_mut();

    if let Some(key) = &options.routing_key {
        settings.routing_key = Some(key.clone());
    }
    if let Some(policy) = &options.retry_policy {
        settings.retry_policy = Some(Arc::clone(policy));
    }
    if let Some(tracing) = options.tracing {
        settings.tracing = Some(tracing);
    }
    if let Some(fetch_size) = options.fetch_size {
        settings.fetch_size = Some(fetch_size);
    }
    if let Some(serial) = options.serial_consistency {
        settings.serial_consistency = Some(serial);
    }
    if let Some(consistency) = options.consistency {
        settings.consistency = Some(consistency);
    }
}
