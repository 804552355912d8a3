//! Action dispatch: turns a policy's declared action into a concrete
//! remediation call on the storage cluster.
//!
//! Cluster access goes through the [`ObjectResolver`] and [`VolumeMutator`]
//! traits; this crate never talks to a cluster directly.

pub mod dispatcher;
pub mod error;


pub use dispatcher::{parse_action_name, ActionDispatcher};
pub use error::{ActionError, Result};

use anyhow::Result as AnyResult;
use oxpilot_common::types::{LabelSelector, PolicyObjectType};
use serde::{Deserialize, Serialize};

/// The capacity claim backing a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeClaim {
    pub name: String,
    pub namespace: String,
    /// Currently requested capacity in gigabytes.
    pub capacity_gb: u64,
}

/// Resolves a policy's declarative object target to concrete object IDs.
#[async_trait::async_trait]
pub trait ObjectResolver: Send + Sync {
    async fn resolve_objects(
        &self,
        object_type: PolicyObjectType,
        selector: &LabelSelector,
    ) -> AnyResult<Vec<String>>;
}

/// Mutates volume capacity through the cluster's claim objects.
#[async_trait::async_trait]
pub trait VolumeMutator: Send + Sync {
    /// Look up the claim backing `volume_id`.
    async fn get_volume_claim(&self, volume_id: &str) -> AnyResult<VolumeClaim>;

    /// Submit a new requested capacity for `claim`.
    async fn update_claim_capacity(&self, claim: &VolumeClaim, new_capacity_gb: u64)
        -> AnyResult<()>;
}
