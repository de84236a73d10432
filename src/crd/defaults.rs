//! Policy defaults and structural validation for PerconaServerMySQL
//!
//! `check_and_set_defaults` is the only place defaults are decided. It is a
//! pure function of the record: no I/O, no randomness and no clock. Once it
//! returns `Ok`, every field read by the convergence steps is set.

use kube::ResourceExt;

use super::percona_server::{PerconaServerMySQL, SpecValidationError, ValidationError};
use super::types::ClusterType;

/// CR version assumed when a record does not pin one
pub const CR_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const MYSQL_IMAGE_REPOSITORY: &str = "percona/percona-server";
pub const ORCHESTRATOR_IMAGE_REPOSITORY: &str = "percona/percona-orchestrator";

pub const DEFAULT_MYSQL_SIZE: i32 = 3;
pub const DEFAULT_ORCHESTRATOR_SIZE: i32 = 3;
/// Group Replication supports at most nine members; async topologies use the same cap.
pub const MAX_CLUSTER_SIZE: i32 = 9;
pub const MIN_GROUP_REPLICATION_SIZE: i32 = 3;

pub const DEFAULT_STORAGE_SIZE: &str = "10Gi";
pub const DEFAULT_CPU_REQUEST: &str = "500m";
pub const DEFAULT_MEMORY_REQUEST: &str = "1Gi";

pub const DEFAULT_ANTI_AFFINITY_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
/// Disables pod anti-affinity
pub const ANTI_AFFINITY_NONE: &str = "none";
const ALLOWED_TOPOLOGY_KEYS: [&str; 4] = [
    "kubernetes.io/hostname",
    "topology.kubernetes.io/zone",
    "topology.kubernetes.io/region",
    ANTI_AFFINITY_NONE,
];

pub const DEFAULT_PASSWORD_LENGTH: u32 = 20;
pub const MIN_PASSWORD_LENGTH: u32 = 16;
pub const MAX_PASSWORD_LENGTH: u32 = 64;

impl PerconaServerMySQL {
    /// Fill every unset field with its policy default and validate the result
    ///
    /// Mutates the record in place. All violations are collected; the call
    /// never stops at the first one.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every violated constraint.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use ps_operator::crd::{PerconaServerMySQL, PerconaServerMySQLSpec};
    ///
    /// let mut cluster = PerconaServerMySQL::new("cluster1", PerconaServerMySQLSpec::default());
    /// cluster.spec.mysql.version = Some("8.0.36".to_string());
    /// cluster.spec.orchestrator.enabled = true;
    /// cluster.check_and_set_defaults().unwrap();
    /// assert_eq!(cluster.spec.secrets_name.as_deref(), Some("cluster1-secrets"));
    /// ```
    pub fn check_and_set_defaults(&mut self) -> Result<(), ValidationError> {
        let mut errors: Vec<SpecValidationError> = Vec::new();
        let name = self.name_any();
        let spec = &mut self.spec;

        if name.is_empty() {
            errors.push(SpecValidationError::new(
                "metadata.name",
                "metadata.name must not be empty",
                "Give the PerconaServerMySQL resource a name.",
            ));
        }

        let cr_version = spec
            .cr_version
            .get_or_insert_with(|| CR_VERSION.to_string())
            .clone();

        let secrets_name = spec
            .secrets_name
            .get_or_insert_with(|| format!("{name}-secrets"));
        if !is_dns_subdomain(secrets_name) {
            errors.push(SpecValidationError::new(
                "spec.secretsName",
                "secretsName must be a valid DNS subdomain",
                "Use lowercase alphanumerics, '-' and '.', starting and ending with an alphanumeric.",
            ));
        }

        // MySQL
        let mysql = &mut spec.mysql;
        let cluster_type = *mysql.cluster_type.get_or_insert(ClusterType::Async);

        let version = mysql.version.as_deref().map(|v| v.trim().to_string());
        match version {
            Some(version) if !version.is_empty() => {
                mysql
                    .image
                    .get_or_insert_with(|| format!("{MYSQL_IMAGE_REPOSITORY}:{version}"));
                mysql.version = Some(version);
            }
            _ => errors.push(SpecValidationError::new(
                "spec.mysql.version",
                "mysql.version is required and has no default",
                "Set spec.mysql.version to the Percona Server version to run, e.g. \"8.0.36\".",
            )),
        }

        let size = *mysql.size.get_or_insert(DEFAULT_MYSQL_SIZE);
        match cluster_type {
            ClusterType::Async => {
                if !(1..=MAX_CLUSTER_SIZE).contains(&size) {
                    errors.push(SpecValidationError::new(
                        "spec.mysql.size",
                        format!("mysql.size must be between 1 and {MAX_CLUSTER_SIZE} for async clusters"),
                        format!("Set spec.mysql.size to a value between 1 and {MAX_CLUSTER_SIZE}."),
                    ));
                }
            }
            ClusterType::GroupReplication => {
                if !(MIN_GROUP_REPLICATION_SIZE..=MAX_CLUSTER_SIZE).contains(&size) {
                    errors.push(SpecValidationError::new(
                        "spec.mysql.size",
                        format!(
                            "mysql.size must be between {MIN_GROUP_REPLICATION_SIZE} and {MAX_CLUSTER_SIZE} for group-replication clusters"
                        ),
                        format!(
                            "Set spec.mysql.size to a value between {MIN_GROUP_REPLICATION_SIZE} and {MAX_CLUSTER_SIZE}."
                        ),
                    ));
                }
            }
        }

        let storage = mysql.storage.get_or_insert_with(Default::default);
        let storage_size = storage
            .size
            .get_or_insert_with(|| DEFAULT_STORAGE_SIZE.to_string());
        if storage_size.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.mysql.storage.size",
                "mysql.storage.size must not be empty",
                "Set spec.mysql.storage.size to a quantity such as \"10Gi\", or remove it to use the default.",
            ));
        }

        let resources = mysql.resources.get_or_insert_with(Default::default);
        resources
            .cpu
            .get_or_insert_with(|| DEFAULT_CPU_REQUEST.to_string());
        resources
            .memory
            .get_or_insert_with(|| DEFAULT_MEMORY_REQUEST.to_string());

        let topology_key = mysql
            .anti_affinity_topology_key
            .get_or_insert_with(|| DEFAULT_ANTI_AFFINITY_TOPOLOGY_KEY.to_string());
        if !ALLOWED_TOPOLOGY_KEYS.contains(&topology_key.as_str()) {
            errors.push(SpecValidationError::new(
                "spec.mysql.antiAffinityTopologyKey",
                format!("unsupported antiAffinityTopologyKey {topology_key:?}"),
                format!("Use one of: {}.", ALLOWED_TOPOLOGY_KEYS.join(", ")),
            ));
        }

        // Orchestrator
        let orchestrator = &mut spec.orchestrator;
        if orchestrator.enabled {
            if cluster_type == ClusterType::GroupReplication {
                errors.push(SpecValidationError::new(
                    "spec.orchestrator.enabled",
                    "orchestrator cannot be enabled for group-replication clusters",
                    "Set spec.orchestrator.enabled to false, or use clusterType async.",
                ));
            }

            let orc_size = *orchestrator.size.get_or_insert(DEFAULT_ORCHESTRATOR_SIZE);
            if !(1..=MAX_CLUSTER_SIZE).contains(&orc_size) {
                errors.push(SpecValidationError::new(
                    "spec.orchestrator.size",
                    format!("orchestrator.size must be between 1 and {MAX_CLUSTER_SIZE}"),
                    format!("Set spec.orchestrator.size to a value between 1 and {MAX_CLUSTER_SIZE}."),
                ));
            }

            orchestrator
                .image
                .get_or_insert_with(|| format!("{ORCHESTRATOR_IMAGE_REPOSITORY}:{cr_version}"));
        } else if cluster_type == ClusterType::Async && size > 1 {
            errors.push(SpecValidationError::new(
                "spec.orchestrator.enabled",
                "async clusters with more than one instance require orchestrator",
                "Set spec.orchestrator.enabled to true, or set spec.mysql.size to 1.",
            ));
        }

        // Credentials
        let password_length = *spec
            .credentials
            .password_length
            .get_or_insert(DEFAULT_PASSWORD_LENGTH);
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password_length) {
            errors.push(SpecValidationError::new(
                "spec.credentials.passwordLength",
                format!(
                    "credentials.passwordLength must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH}"
                ),
                format!(
                    "Set spec.credentials.passwordLength to a value between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH}."
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(errors))
        }
    }
}

fn is_dns_subdomain(name: &str) -> bool {
    let bytes = name.as_bytes();
    !name.is_empty()
        && name.len() <= 253
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}
