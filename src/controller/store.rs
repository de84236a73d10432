//! Access to the desired-state record
//!
//! The store distinguishes "not found" from every other failure in its
//! return type: absence is `Ok(None)`, never an error value to inspect.

use async_trait::async_trait;
use kube::{Api, Client};
use tracing::debug;

use crate::crd::PerconaServerMySQL;

use super::error::StoreError;
use super::identity::ReconcileIdentity;

/// Source of the current desired-state record for an identity
#[async_trait]
pub trait DesiredStateStore: Send + Sync {
    /// Fetch the record, or `None` when it does not exist
    async fn get(
        &self,
        identity: &ReconcileIdentity,
    ) -> Result<Option<PerconaServerMySQL>, StoreError>;
}

/// Store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DesiredStateStore for KubeStore {
    async fn get(
        &self,
        identity: &ReconcileIdentity,
    ) -> Result<Option<PerconaServerMySQL>, StoreError> {
        let api: Api<PerconaServerMySQL> =
            Api::namespaced(self.client.clone(), identity.namespace());

        let record = api.get_opt(identity.name()).await?;
        if record.is_none() {
            debug!(identity = %identity, "PerconaServerMySQL not found");
        }
        Ok(record)
    }
}
