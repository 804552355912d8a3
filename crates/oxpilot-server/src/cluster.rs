//! REST client for the storage cluster management API.
//!
//! Implements the control loop's cluster collaborator interfaces: resolving a
//! policy's object selector to concrete object IDs, and reading/updating the
//! capacity claims behind volumes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use oxpilot_action::{ObjectResolver, VolumeClaim, VolumeMutator};
use oxpilot_common::types::{LabelSelector, PolicyObjectType};
use serde::Deserialize;
use std::time::Duration;

pub struct ClusterApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ObjectListResponse {
    #[serde(default)]
    items: Vec<ObjectRow>,
}

#[derive(Debug, Deserialize)]
struct ObjectRow {
    id: String,
}

impl ClusterApiClient {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("failed to build cluster API client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Collection path segment for an object type.
    fn collection(object_type: PolicyObjectType) -> &'static str {
        match object_type {
            PolicyObjectType::Volume => "volumes",
            PolicyObjectType::StoragePool => "pools",
            PolicyObjectType::Node => "nodes",
            PolicyObjectType::Disk => "disks",
        }
    }

    /// Render a selector as the API's `labelSelector` query param
    /// (`k1=v1,k2=v2`, keys sorted for a stable request line).
    fn selector_param(selector: &LabelSelector) -> String {
        let mut pairs: Vec<String> = selector
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        pairs.sort();
        pairs.join(",")
    }
}

#[async_trait]
impl ObjectResolver for ClusterApiClient {
    async fn resolve_objects(
        &self,
        object_type: PolicyObjectType,
        selector: &LabelSelector,
    ) -> Result<Vec<String>> {
        let url = format!("{}/v1/{}", self.base_url, Self::collection(object_type));
        let mut request = self.client.get(&url);
        let param = Self::selector_param(selector);
        if !param.is_empty() {
            request = request.query(&[("labelSelector", param.as_str())]);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("listing {object_type} objects failed"))?;
        if !response.status().is_success() {
            bail!("cluster API returned {} for {url}", response.status());
        }

        let list: ObjectListResponse = response
            .json()
            .await
            .context("decoding object list failed")?;
        Ok(list.items.into_iter().map(|row| row.id).collect())
    }
}

#[async_trait]
impl VolumeMutator for ClusterApiClient {
    async fn get_volume_claim(&self, volume_id: &str) -> Result<VolumeClaim> {
        let url = format!("{}/v1/volumes/{volume_id}/claim", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("claim lookup for volume {volume_id} failed"))?;
        if !response.status().is_success() {
            bail!("cluster API returned {} for {url}", response.status());
        }
        response.json().await.context("decoding claim failed")
    }

    async fn update_claim_capacity(
        &self,
        claim: &VolumeClaim,
        new_capacity_gb: u64,
    ) -> Result<()> {
        let url = format!(
            "{}/v1/claims/{}/{}",
            self.base_url, claim.namespace, claim.name
        );
        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "capacity_gb": new_capacity_gb }))
            .send()
            .await
            .with_context(|| format!("capacity update for claim {} failed", claim.name))?;
        if !response.status().is_success() {
            bail!("cluster API returned {} for {url}", response.status());
        }
        Ok(())
    }
}
