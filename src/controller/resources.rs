//! Kubernetes resource builders for PerconaServerMySQL
//!
//! Pure functions that turn a normalized record into the objects the
//! convergence steps apply. Every object carries standard labels and an
//! owner reference so it is garbage collected with the record.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EnvVar, EnvVarSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec,
    ResourceRequirements as K8sResources, Secret, SecretKeySelector, Service, ServicePort,
    ServiceSpec, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::defaults::ANTI_AFFINITY_NONE;
use crate::crd::{ClusterType, PerconaServerMySQL};

use super::error::StepError;
use super::step::defaulted;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "ps-operator";

pub const MYSQL_COMPONENT: &str = "mysql";
pub const ORCHESTRATOR_COMPONENT: &str = "orchestrator";

pub const MYSQL_PORT: i32 = 3306;
pub const MYSQLX_PORT: i32 = 33060;
pub const MYSQL_ADMIN_PORT: i32 = 33062;
pub const ORCHESTRATOR_WEB_PORT: i32 = 3000;
pub const ORCHESTRATOR_RAFT_PORT: i32 = 10008;

const DATADIR_VOLUME: &str = "datadir";
const DATADIR_PATH: &str = "/var/lib/mysql";

/// Get the standard labels for a cluster component
pub fn standard_labels(cluster: &PerconaServerMySQL, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "percona-server".to_string(),
    );
    labels.insert("app.kubernetes.io/instance".to_string(), cluster.name_any());
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        FIELD_MANAGER.to_string(),
    );
    labels
}

/// Create an OwnerReference for garbage collection
pub fn owner_reference(cluster: &PerconaServerMySQL) -> OwnerReference {
    OwnerReference {
        api_version: PerconaServerMySQL::api_version(&()).to_string(),
        kind: PerconaServerMySQL::kind(&()).to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Build the resource name for a given component
pub fn component_name(cluster: &PerconaServerMySQL, component: &str) -> String {
    format!("{}-{}", cluster.name_any(), component)
}

fn object_meta(cluster: &PerconaServerMySQL, name: String, component: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(standard_labels(cluster, component)),
        owner_references: Some(vec![owner_reference(cluster)]),
        ..Default::default()
    }
}

/// Users Secret carrying the given passwords in `stringData`
pub fn build_users_secret(
    cluster: &PerconaServerMySQL,
    secret_name: &str,
    passwords: BTreeMap<String, String>,
) -> Secret {
    Secret {
        metadata: object_meta(cluster, secret_name.to_string(), "secrets"),
        type_: Some("Opaque".to_string()),
        string_data: Some(passwords),
        ..Default::default()
    }
}

/// Headless Service giving each instance of a component a stable DNS name
pub fn build_headless_service(
    cluster: &PerconaServerMySQL,
    component: &str,
    ports: &[(&str, i32)],
) -> Service {
    Service {
        metadata: object_meta(cluster, component_name(cluster, component), component),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(standard_labels(cluster, component)),
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port)| ServicePort {
                        name: Some(name.to_string()),
                        port: *port,
                        target_port: Some(IntOrString::Int(*port)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn mysql_service_ports() -> [(&'static str, i32); 3] {
    [
        ("mysql", MYSQL_PORT),
        ("mysqlx", MYSQLX_PORT),
        ("mysql-admin", MYSQL_ADMIN_PORT),
    ]
}

pub fn orchestrator_service_ports() -> [(&'static str, i32); 2] {
    [
        ("web", ORCHESTRATOR_WEB_PORT),
        ("raft", ORCHESTRATOR_RAFT_PORT),
    ]
}

/// MySQL StatefulSet for a normalized record
///
/// # Errors
///
/// Returns a permanent [`StepError`] if a field the defaulter sets is missing.
pub fn build_mysql_statefulset(cluster: &PerconaServerMySQL) -> Result<StatefulSet, StepError> {
    let spec = &cluster.spec;
    let mysql = &spec.mysql;
    let image = defaulted(&mysql.image, "spec.mysql.image")?;
    let size = *defaulted(&mysql.size, "spec.mysql.size")?;
    let cluster_type = *defaulted(&mysql.cluster_type, "spec.mysql.clusterType")?;
    let secrets_name = defaulted(&spec.secrets_name, "spec.secretsName")?;
    let storage = defaulted(&mysql.storage, "spec.mysql.storage")?;
    let storage_size = defaulted(&storage.size, "spec.mysql.storage.size")?;
    let resources = defaulted(&mysql.resources, "spec.mysql.resources")?;
    let topology_key = defaulted(
        &mysql.anti_affinity_topology_key,
        "spec.mysql.antiAffinityTopologyKey",
    )?;

    let labels = standard_labels(cluster, MYSQL_COMPONENT);
    let service_name = component_name(cluster, MYSQL_COMPONENT);

    let mut requests = BTreeMap::new();
    if let Some(cpu) = &resources.cpu {
        requests.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &resources.memory {
        requests.insert("memory".to_string(), Quantity(memory.clone()));
    }

    let container = Container {
        name: MYSQL_COMPONENT.to_string(),
        image: Some(image.clone()),
        ports: Some(
            mysql_service_ports()
                .iter()
                .map(|(name, port)| ContainerPort {
                    name: Some(name.to_string()),
                    container_port: *port,
                    ..Default::default()
                })
                .collect(),
        ),
        env: Some(vec![
            EnvVar {
                name: "CLUSTER_TYPE".to_string(),
                value: Some(cluster_type.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "SERVICE_NAME".to_string(),
                value: Some(service_name.clone()),
                ..Default::default()
            },
            secret_env("MYSQL_ROOT_PASSWORD", secrets_name, "root"),
            secret_env("OPERATOR_ADMIN_PASSWORD", secrets_name, "operator"),
            secret_env("REPLICATION_PASSWORD", secrets_name, "replication"),
            secret_env("MONITOR_PASSWORD", secrets_name, "monitor"),
        ]),
        resources: Some(K8sResources {
            requests: Some(requests),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: DATADIR_VOLUME.to_string(),
            mount_path: DATADIR_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let volume_claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATADIR_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    };

    Ok(StatefulSet {
        metadata: object_meta(cluster, service_name.clone(), MYSQL_COMPONENT),
        spec: Some(StatefulSetSpec {
            replicas: Some(if spec.pause { 0 } else { size }),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            service_name,
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    affinity: anti_affinity(&labels, topology_key),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![volume_claim]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Orchestrator StatefulSet, or `None` when orchestrator is not wanted
///
/// # Errors
///
/// Returns a permanent [`StepError`] if a field the defaulter sets is missing.
pub fn build_orchestrator_statefulset(
    cluster: &PerconaServerMySQL,
) -> Result<Option<StatefulSet>, StepError> {
    let spec = &cluster.spec;
    if !orchestrator_wanted(cluster) {
        return Ok(None);
    }

    let image = defaulted(&spec.orchestrator.image, "spec.orchestrator.image")?;
    let size = *defaulted(&spec.orchestrator.size, "spec.orchestrator.size")?;
    let secrets_name = defaulted(&spec.secrets_name, "spec.secretsName")?;
    let topology_key = defaulted(
        &spec.mysql.anti_affinity_topology_key,
        "spec.mysql.antiAffinityTopologyKey",
    )?;

    let labels = standard_labels(cluster, ORCHESTRATOR_COMPONENT);
    let name = component_name(cluster, ORCHESTRATOR_COMPONENT);

    let container = Container {
        name: ORCHESTRATOR_COMPONENT.to_string(),
        image: Some(image.clone()),
        ports: Some(
            orchestrator_service_ports()
                .iter()
                .map(|(name, port)| ContainerPort {
                    name: Some(name.to_string()),
                    container_port: *port,
                    ..Default::default()
                })
                .collect(),
        ),
        env: Some(vec![
            EnvVar {
                name: "ORC_TOPOLOGY_USER".to_string(),
                value: Some("orchestrator".to_string()),
                ..Default::default()
            },
            secret_env("ORC_TOPOLOGY_PASSWORD", secrets_name, "orchestrator"),
            EnvVar {
                name: "MYSQL_SERVICE_NAME".to_string(),
                value: Some(component_name(cluster, MYSQL_COMPONENT)),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    Ok(Some(StatefulSet {
        metadata: object_meta(cluster, name.clone(), ORCHESTRATOR_COMPONENT),
        spec: Some(StatefulSetSpec {
            replicas: Some(if spec.pause { 0 } else { size }),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            service_name: name,
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    affinity: anti_affinity(&labels, topology_key),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }))
}

/// Orchestrator runs only for async clusters that enable it
pub fn orchestrator_wanted(cluster: &PerconaServerMySQL) -> bool {
    cluster.spec.orchestrator.enabled
        && cluster.spec.mysql.cluster_type == Some(ClusterType::Async)
}

fn secret_env(name: &str, secret_name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret_name.to_string()),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn anti_affinity(labels: &BTreeMap<String, String>, topology_key: &str) -> Option<Affinity> {
    if topology_key == ANTI_AFFINITY_NONE {
        return None;
    }

    Some(Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                }),
                topology_key: topology_key.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}
