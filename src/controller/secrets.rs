//! Users secret convergence
//!
//! Ensures the Secret named by `spec.secretsName` holds a password for every
//! system user the cluster needs.
//!
//! - Missing Secret: all passwords are generated and the Secret is created,
//!   owned by the cluster record.
//! - Existing Secret: only missing or empty keys are filled in. Existing
//!   passwords are never rotated, and nothing is written when no key is missing.
//!
//! Password values are never logged; log entries only name users and Secrets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use rand::Rng;
use serde_json::json;
use tracing::{debug, info};

use crate::crd::PerconaServerMySQL;

use super::error::StepError;
use super::reconcile_loop::ReconcileContext;
use super::resources::{build_users_secret, FIELD_MANAGER};
use super::step::{defaulted, ConvergenceStep, StepName};

/// System users that get a generated password
pub const SYSTEM_USERS: [&str; 8] = [
    "root",
    "xtrabackup",
    "monitor",
    "clustercheck",
    "proxyadmin",
    "operator",
    "replication",
    "orchestrator",
];

const PASSWORD_SYMBOLS: &[u8] = b"!#$%&()*+,-.<=>?@[]^_{}~";
const PASSWORD_ALPHANUMERIC: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random password of `length` characters
pub fn generate_password<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let charset: Vec<u8> = PASSWORD_ALPHANUMERIC
        .iter()
        .chain(PASSWORD_SYMBOLS.iter())
        .copied()
        .collect();

    (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// Users with no password, or an empty one, in `secret`
pub fn missing_users(secret: &Secret) -> Vec<&'static str> {
    SYSTEM_USERS
        .iter()
        .copied()
        .filter(|user| {
            let in_data = secret
                .data
                .as_ref()
                .and_then(|d| d.get(*user))
                .is_some_and(|v| !v.0.is_empty());
            let in_string_data = secret
                .string_data
                .as_ref()
                .and_then(|d| d.get(*user))
                .is_some_and(|v| !v.is_empty());
            !(in_data || in_string_data)
        })
        .collect()
}

/// Fresh passwords for the given users
pub fn generate_passwords<R: Rng + ?Sized>(
    rng: &mut R,
    users: &[&str],
    length: usize,
) -> BTreeMap<String, String> {
    users
        .iter()
        .map(|user| (user.to_string(), generate_password(rng, length)))
        .collect()
}

/// Converges the users Secret for a cluster
#[derive(Clone)]
pub struct SecretsStep {
    client: Client,
}

impl SecretsStep {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConvergenceStep for SecretsStep {
    fn name(&self) -> StepName {
        StepName::Secrets
    }

    async fn apply(
        &self,
        ctx: &ReconcileContext,
        record: &PerconaServerMySQL,
    ) -> Result<(), StepError> {
        let namespace = record
            .namespace()
            .ok_or_else(|| StepError::permanent("cluster record has no namespace"))?;
        let secret_name = defaulted(&record.spec.secrets_name, "spec.secretsName")?;
        let length = *defaulted(
            &record.spec.credentials.password_length,
            "spec.credentials.passwordLength",
        )? as usize;

        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let existing = api
            .get_opt(secret_name)
            .await
            .map_err(|e| StepError::from(e).context(format!("get Secret {secret_name}")))?;

        ctx.ensure_active()?;

        match existing {
            None => {
                let passwords = generate_passwords(&mut rand::thread_rng(), &SYSTEM_USERS, length);
                let secret = build_users_secret(record, secret_name, passwords);
                api.create(&PostParams::default(), &secret)
                    .await
                    .map_err(|e| {
                        StepError::from(e).context(format!("create Secret {secret_name}"))
                    })?;
                info!(
                    secret = %secret_name,
                    users = SYSTEM_USERS.len(),
                    "Created users secret"
                );
            }
            Some(secret) => {
                let missing = missing_users(&secret);
                if missing.is_empty() {
                    debug!(secret = %secret_name, "Users secret is complete");
                    return Ok(());
                }

                let passwords = generate_passwords(&mut rand::thread_rng(), &missing, length);
                let patch = json!({ "stringData": passwords });
                api.patch(
                    secret_name,
                    &PatchParams::apply(FIELD_MANAGER),
                    &Patch::Merge(&patch),
                )
                .await
                .map_err(|e| StepError::from(e).context(format!("patch Secret {secret_name}")))?;
                info!(
                    secret = %secret_name,
                    users = ?missing,
                    "Filled in missing user passwords"
                );
            }
        }

        Ok(())
    }
}
