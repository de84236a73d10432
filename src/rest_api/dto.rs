//! Response bodies for the REST API

use serde::Serialize;

use crate::crd::{ClusterState, ClusterType, PerconaServerMySQLStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// One row of the cluster list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    pub namespace: String,
    pub cluster_type: Option<ClusterType>,
    pub state: ClusterState,
    pub size: i32,
    pub ready: i32,
}

#[derive(Debug, Serialize)]
pub struct ClusterListResponse {
    pub items: Vec<ClusterSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDetailResponse {
    pub name: String,
    pub namespace: String,
    pub cluster_type: Option<ClusterType>,
    pub version: Option<String>,
    pub paused: bool,
    pub status: PerconaServerMySQLStatus,
    pub created_at: Option<String>,
}
