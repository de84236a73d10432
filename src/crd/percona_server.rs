//! PerconaServerMySQL Custom Resource Definition
//!
//! The PerconaServerMySQL CRD is the desired-state record for one managed
//! MySQL cluster. The operator converges credentials and instance topology
//! toward its spec and reports progress through its status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ClusterState, Condition, CredentialPolicy, MySQLSpec, OrchestratorSpec, StatefulAppStatus,
};

/// A single violated constraint found while normalizing a spec
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every constraint a spec violates, reported together
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid cluster spec: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<SpecValidationError>,
}

impl ValidationError {
    pub fn new(violations: Vec<SpecValidationError>) -> Self {
        Self { violations }
    }

    /// Whether a violation was reported for the given field path
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// Multi-line description including how to fix each violation
    pub fn details(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("- {}: {} ({})", v.field, v.message, v.how_to_fix))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn join_violations(violations: &[SpecValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ps.percona.com",
    version = "v1alpha1",
    kind = "PerconaServerMySQL",
    namespaced,
    status = "PerconaServerMySQLStatus",
    shortname = "ps",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.mysql.clusterType"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.mysql.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMySQLSpec {
    /// Operator version the record is pinned to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cr_version: Option<String>,

    /// Scale every workload down to zero while keeping data
    #[serde(default)]
    pub pause: bool,

    /// Name of the Secret holding system user passwords
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets_name: Option<String>,

    #[serde(default)]
    pub mysql: MySQLSpec,

    #[serde(default)]
    pub orchestrator: OrchestratorSpec,

    #[serde(default)]
    pub credentials: CredentialPolicy,
}

/// Status subresource for PerconaServerMySQL
///
/// Written back by the topology step after every successful pass.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMySQLStatus {
    #[serde(default)]
    pub state: ClusterState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub mysql: StatefulAppStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator: Option<StatefulAppStatus>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PerconaServerMySQLStatus {
    /// Ready when the Ready condition is True and every MySQL instance reports ready
    pub fn is_ready(&self) -> bool {
        let has_ready_condition = self
            .conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True");

        has_ready_condition && self.mysql.ready >= self.mysql.size
    }

    /// Get a condition by type
    pub fn get_condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == condition_type)
    }
}
