//! Unit tests for Kubernetes resource builders.
//!
//! Run with: `cargo test -p ps-operator resources_test`

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::controller::resources::{
        build_headless_service, build_mysql_statefulset, build_orchestrator_statefulset,
        build_users_secret, component_name, mysql_service_ports, orchestrator_wanted,
        owner_reference, standard_labels, MYSQL_COMPONENT, MYSQL_PORT, ORCHESTRATOR_COMPONENT,
    };
    use crate::crd::{
        ClusterType, MySQLSpec, OrchestratorSpec, PerconaServerMySQL, PerconaServerMySQLSpec,
        StorageSpec,
    };

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn normalized_cluster() -> PerconaServerMySQL {
        let mut cluster = PerconaServerMySQL::new(
            "cluster1",
            PerconaServerMySQLSpec {
                mysql: MySQLSpec {
                    version: Some("8.0.36".to_string()),
                    storage: Some(StorageSpec {
                        size: Some("20Gi".to_string()),
                        storage_class_name: Some("fast-ssd".to_string()),
                    }),
                    ..Default::default()
                },
                orchestrator: OrchestratorSpec {
                    enabled: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("db".to_string());
        cluster.metadata.uid = Some("uid-1234".to_string());
        cluster
            .check_and_set_defaults()
            .expect("fixture must be valid");
        cluster
    }

    fn env_value(
        statefulset: &k8s_openapi::api::apps::v1::StatefulSet,
        name: &str,
    ) -> Option<String> {
        statefulset
            .spec
            .as_ref()?
            .template
            .spec
            .as_ref()?
            .containers[0]
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.clone())
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    #[test]
    fn test_standard_labels() {
        let cluster = normalized_cluster();
        let labels = standard_labels(&cluster, MYSQL_COMPONENT);

        assert_eq!(labels["app.kubernetes.io/instance"], "cluster1");
        assert_eq!(labels["app.kubernetes.io/component"], "mysql");
        assert_eq!(labels["app.kubernetes.io/managed-by"], "ps-operator");
    }

    #[test]
    fn test_owner_reference_points_at_cluster() {
        let cluster = normalized_cluster();
        let owner = owner_reference(&cluster);

        assert_eq!(owner.kind, "PerconaServerMySQL");
        assert_eq!(owner.api_version, "ps.percona.com/v1alpha1");
        assert_eq!(owner.name, "cluster1");
        assert_eq!(owner.uid, "uid-1234");
        assert_eq!(owner.controller, Some(true));
    }

    // -----------------------------------------------------------------------
    // Secret and Service
    // -----------------------------------------------------------------------

    #[test]
    fn test_users_secret_is_owned_and_opaque() {
        let cluster = normalized_cluster();
        let passwords = BTreeMap::from([("root".to_string(), "pw".to_string())]);
        let secret = build_users_secret(&cluster, "cluster1-secrets", passwords);

        assert_eq!(secret.metadata.name.as_deref(), Some("cluster1-secrets"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("db"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(secret.string_data.unwrap()["root"], "pw");
        assert_eq!(secret.metadata.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn test_headless_service() {
        let cluster = normalized_cluster();
        let service = build_headless_service(&cluster, MYSQL_COMPONENT, &mysql_service_ports());
        let spec = service.spec.unwrap();

        assert_eq!(service.metadata.name.as_deref(), Some("cluster1-mysql"));
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].port, MYSQL_PORT);
    }

    // -----------------------------------------------------------------------
    // StatefulSets
    // -----------------------------------------------------------------------

    #[test]
    fn test_mysql_statefulset() {
        let cluster = normalized_cluster();
        let sts = build_mysql_statefulset(&cluster).unwrap();
        let spec = sts.spec.as_ref().unwrap();

        assert_eq!(sts.metadata.name.as_deref(), Some("cluster1-mysql"));
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, component_name(&cluster, MYSQL_COMPONENT));
        assert_eq!(env_value(&sts, "CLUSTER_TYPE").as_deref(), Some("async"));

        let container = &spec.template.spec.as_ref().unwrap().containers[0];
        assert_eq!(
            container.image.as_deref(),
            Some("percona/percona-server:8.0.36")
        );

        let claim = &spec.volume_claim_templates.as_ref().unwrap()[0];
        let claim_spec = claim.spec.as_ref().unwrap();
        assert_eq!(claim_spec.storage_class_name.as_deref(), Some("fast-ssd"));
        assert_eq!(
            claim_spec.resources.as_ref().unwrap().requests.as_ref().unwrap()["storage"].0,
            "20Gi"
        );
    }

    #[test]
    fn test_mysql_statefulset_reads_passwords_from_secret() {
        let cluster = normalized_cluster();
        let sts = build_mysql_statefulset(&cluster).unwrap();
        let env = sts.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();

        let root = env.iter().find(|e| e.name == "MYSQL_ROOT_PASSWORD").unwrap();
        let selector = root
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(selector.name.as_deref(), Some("cluster1-secrets"));
        assert_eq!(selector.key, "root");
        assert!(root.value.is_none());
    }

    #[test]
    fn test_paused_cluster_scales_to_zero() {
        let mut cluster = normalized_cluster();
        cluster.spec.pause = true;

        let mysql = build_mysql_statefulset(&cluster).unwrap();
        let orchestrator = build_orchestrator_statefulset(&cluster).unwrap().unwrap();

        assert_eq!(mysql.spec.unwrap().replicas, Some(0));
        assert_eq!(orchestrator.spec.unwrap().replicas, Some(0));
    }

    #[test]
    fn test_anti_affinity_uses_topology_key() {
        let cluster = normalized_cluster();
        let sts = build_mysql_statefulset(&cluster).unwrap();
        let affinity = sts.spec.unwrap().template.spec.unwrap().affinity.unwrap();
        let terms = affinity
            .pod_anti_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap();

        assert_eq!(terms[0].topology_key, "kubernetes.io/hostname");
    }

    #[test]
    fn test_anti_affinity_none_disables_affinity() {
        let mut cluster = normalized_cluster();
        cluster.spec.mysql.anti_affinity_topology_key = Some("none".to_string());

        let sts = build_mysql_statefulset(&cluster).unwrap();
        assert!(sts.spec.unwrap().template.spec.unwrap().affinity.is_none());
    }

    #[test]
    fn test_orchestrator_statefulset_for_async() {
        let cluster = normalized_cluster();
        assert!(orchestrator_wanted(&cluster));

        let sts = build_orchestrator_statefulset(&cluster).unwrap().unwrap();
        assert_eq!(
            sts.metadata.name,
            Some(component_name(&cluster, ORCHESTRATOR_COMPONENT))
        );
        assert_eq!(sts.spec.as_ref().unwrap().replicas, Some(3));
        assert_eq!(
            env_value(&sts, "MYSQL_SERVICE_NAME").as_deref(),
            Some("cluster1-mysql")
        );
    }

    #[test]
    fn test_no_orchestrator_for_group_replication() {
        let mut cluster = normalized_cluster();
        cluster.spec.mysql.cluster_type = Some(ClusterType::GroupReplication);

        assert!(!orchestrator_wanted(&cluster));
        assert!(build_orchestrator_statefulset(&cluster).unwrap().is_none());
    }

    #[test]
    fn test_unnormalized_record_is_rejected() {
        let mut cluster = normalized_cluster();
        cluster.spec.mysql.image = None;

        let err = build_mysql_statefulset(&cluster).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("spec.mysql.image"));
    }
}
