//! Prometheus metrics provider.
//!
//! Conditions map through a fixed lookup table to PromQL expressions; queries
//! go to the instant-query endpoint and results come back in the standard
//! `{status, data: {resultType, result}}` envelope.

use crate::{MetricsError, MetricsProvider, Result};
use oxpilot_common::metrics::MetricVector;
use oxpilot_common::types::{
    ConditionOperator, LabelSelectorRequirement, CONDITION_VOLUME_CAPACITY_GB,
    CONDITION_VOLUME_USAGE_PERCENTAGE,
};
use serde::Deserialize;
use std::collections::HashMap;

pub const PROVIDER_TYPE: &str = "prometheus";

const DEFAULT_QUERY_PATH: &str = "/api/v1/query";

/// Condition key -> PromQL expression.
const PROMQL_METRIC_LOOKUP: &[(&str, &str)] = &[
    (
        CONDITION_VOLUME_USAGE_PERCENTAGE,
        "100 * (px_volume_usage_bytes / px_volume_capacity_bytes)",
    ),
    (
        CONDITION_VOLUME_CAPACITY_GB,
        "px_volume_fs_capacity_bytes / 1000000000",
    ),
];

#[derive(Debug)]
pub struct PrometheusProvider {
    client: reqwest::Client,
    base_url: String,
    query_path: String,
}

/// Constructor registered with the provider registry.
///
/// Required params: `url`. Optional: `path` (defaults to `/api/v1/query`).
pub fn new(params: &HashMap<String, String>) -> Result<Box<dyn MetricsProvider>> {
    let base_url = params
        .get("url")
        .ok_or_else(|| MetricsError::InvalidConfig("prometheus: missing 'url' param".into()))?;

    Ok(Box::new(PrometheusProvider {
        client: reqwest::Client::new(),
        base_url: base_url.trim_end_matches('/').to_string(),
        query_path: params
            .get("path")
            .cloned()
            .unwrap_or_else(|| DEFAULT_QUERY_PATH.to_string()),
    }))
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: QueryData,
    #[serde(rename = "errorType", default)]
    error_type: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<MetricVector>,
}

impl PrometheusProvider {
    fn lookup_metric(key: &str) -> &'static str {
        PROMQL_METRIC_LOOKUP
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, expr)| *expr)
            .unwrap_or("")
    }

    fn lookup_operator(operator: ConditionOperator) -> &'static str {
        match operator {
            ConditionOperator::Gt => ">",
            ConditionOperator::Lt => "<",
            ConditionOperator::Eq => "==",
        }
    }

    fn parse(data: &[u8]) -> Result<Vec<MetricVector>> {
        let response: QueryResponse = serde_json::from_slice(data)?;
        match response.status.as_str() {
            "success" => Ok(response.data.result),
            "error" => Err(MetricsError::Backend {
                error_type: response.error_type,
                message: response.error,
            }),
            other => Err(MetricsError::InvalidPayload(format!(
                "unexpected status '{other}'"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl MetricsProvider for PrometheusProvider {
    fn name(&self) -> &str {
        PROVIDER_TYPE
    }

    async fn query(&self, query: &str) -> Result<Vec<MetricVector>> {
        let url = format!("{}{}", self.base_url, self.query_path);
        tracing::debug!(%url, %query, "prometheus: executing query");

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MetricsError::UnexpectedStatus(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        Self::parse(&body)
    }

    fn condition_to_query(&self, condition: &LabelSelectorRequirement) -> String {
        let expr = Self::lookup_metric(&condition.key);
        if expr.is_empty() {
            return String::new();
        }
        let Some(value) = condition.values.first() else {
            return String::new();
        };
        format!(
            "{expr} {} {value}",
            Self::lookup_operator(condition.operator)
        )
    }
}
