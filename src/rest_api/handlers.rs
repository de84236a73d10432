//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kube::{api::Api, ResourceExt};
use tracing::{error, instrument};

use crate::controller::ControllerState;
use crate::crd::PerconaServerMySQL;

use super::dto::{
    ClusterDetailResponse, ClusterListResponse, ClusterSummary, ErrorResponse, HealthResponse,
};

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Metrics endpoint in Prometheus text format
pub async fn metrics() -> Result<String, StatusCode> {
    use prometheus_client::encoding::text::encode;
    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).map_err(|e| {
        error!("Failed to encode metrics: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

fn summarize(cluster: &PerconaServerMySQL) -> ClusterSummary {
    let status = cluster.status.clone().unwrap_or_default();
    ClusterSummary {
        name: cluster.name_any(),
        namespace: cluster.namespace().unwrap_or_default(),
        cluster_type: cluster.spec.mysql.cluster_type,
        state: status.state,
        size: status.mysql.size,
        ready: status.mysql.ready,
    }
}

/// List managed clusters in the watched scope
#[instrument(skip(state))]
pub async fn list_clusters(
    State(state): State<Arc<ControllerState>>,
) -> Result<Json<ClusterListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let api: Api<PerconaServerMySQL> = match &state.config.namespace {
        Some(ns) => Api::namespaced(state.client.clone(), ns),
        None => Api::all(state.client.clone()),
    };

    match api.list(&Default::default()).await {
        Ok(clusters) => {
            let items: Vec<ClusterSummary> = clusters.items.iter().map(summarize).collect();
            let total = items.len();
            Ok(Json(ClusterListResponse { items, total }))
        }
        Err(e) => {
            error!("Failed to list clusters: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("list_failed", &e.to_string())),
            ))
        }
    }
}

/// Get a specific cluster
#[instrument(skip(state), fields(name = %name, namespace = %namespace))]
pub async fn get_cluster(
    State(state): State<Arc<ControllerState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<ClusterDetailResponse>, (StatusCode, Json<ErrorResponse>)> {
    let api: Api<PerconaServerMySQL> = Api::namespaced(state.client.clone(), &namespace);

    match api.get_opt(&name).await {
        Ok(Some(cluster)) => Ok(Json(ClusterDetailResponse {
            name: cluster.name_any(),
            namespace: cluster.namespace().unwrap_or_default(),
            cluster_type: cluster.spec.mysql.cluster_type,
            version: cluster.spec.mysql.version.clone(),
            paused: cluster.spec.pause,
            status: cluster.status.clone().unwrap_or_default(),
            created_at: cluster
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0.to_rfc3339()),
        })),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "not_found",
                &format!("Cluster {}/{} not found", namespace, name),
            )),
        )),
        Err(e) => {
            error!("Failed to get cluster {}/{}: {:?}", namespace, name, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("get_failed", &e.to_string())),
            ))
        }
    }
}
