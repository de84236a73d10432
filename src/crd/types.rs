//! Shared types for the PerconaServerMySQL Custom Resource Definition
//!
//! These types are used in the spec and status of the cluster resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Replication topology of the MySQL cluster
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterType {
    /// Asynchronous source/replica replication, failover driven by orchestrator
    #[default]
    #[serde(rename = "async")]
    Async,
    /// MySQL Group Replication
    #[serde(rename = "group-replication")]
    GroupReplication,
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterType::Async => write!(f, "async"),
            ClusterType::GroupReplication => write!(f, "group-replication"),
        }
    }
}

/// MySQL instance topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MySQLSpec {
    /// Replication topology (defaults to async)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<ClusterType>,

    /// Percona Server version, e.g. "8.0.36". Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Container image. Defaults to the upstream image for `version`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Number of MySQL instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,

    /// Topology key used for pod anti-affinity, or "none" to disable it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_affinity_topology_key: Option<String>,
}

/// Orchestrator (async replication failover manager)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Policy for generated system user credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPolicy {
    /// Length of generated passwords
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_length: Option<u32>,
}

/// Persistent storage for each MySQL instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Size of the PersistentVolumeClaim (e.g., "10Gi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Storage class name. The cluster default class is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

/// Resource requests for CPU and memory
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceSpec {
    /// CPU cores (e.g., "500m", "2")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory (e.g., "1Gi", "4Gi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Aggregate state reported in the status subresource
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    #[default]
    Initializing,
    Ready,
    Paused,
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterState::Initializing => write!(f, "initializing"),
            ClusterState::Ready => write!(f, "ready"),
            ClusterState::Paused => write!(f, "paused"),
        }
    }
}

/// Observed size of a StatefulSet-backed component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatefulAppStatus {
    /// Desired replicas
    #[serde(default)]
    pub size: i32,
    /// Ready replicas
    #[serde(default)]
    pub ready: i32,
}

/// Condition for status reporting (Kubernetes convention)
///
/// # Examples
///
/// ```rust,no_run
/// use ps_operator::crd::Condition;
///
/// let condition = Condition::ready(true, "ClusterReady", "All instances are ready");
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready", "Progressing", "Degraded")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// The .metadata.generation that the condition was set based upon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new Ready condition
    pub fn ready(status: bool, reason: &str, message: &str) -> Self {
        Self {
            type_: "Ready".to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: None,
        }
    }
}
