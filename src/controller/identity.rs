//! Addressing a single reconciliation target

use std::fmt;

use kube::{Resource, ResourceExt};

use crate::error::{Error, Result};

/// The `(namespace, name)` pair that addresses one PerconaServerMySQL
///
/// Stable for the lifetime of the record; both parts are non-empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileIdentity {
    namespace: String,
    name: String,
}

impl ReconcileIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let name = name.into();

        if namespace.trim().is_empty() {
            return Err(Error::InvalidIdentity(format!(
                "empty namespace for {name:?}"
            )));
        }
        if name.trim().is_empty() {
            return Err(Error::InvalidIdentity(format!(
                "empty name in namespace {namespace:?}"
            )));
        }

        Ok(Self { namespace, name })
    }

    /// Identity of a watched namespaced object
    pub fn from_resource<K: Resource>(obj: &K) -> Result<Self> {
        let namespace = obj.namespace().ok_or_else(|| {
            Error::InvalidIdentity(format!("{} has no namespace", obj.name_any()))
        })?;
        Self::new(namespace, obj.name_any())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ReconcileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
