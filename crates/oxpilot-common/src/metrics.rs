//! Telemetry vector types. The wire format follows the Prometheus data model:
//! an instant query returns `{metric: {labels...}, value: [ts, "v"]}` entries,
//! a range query returns `values: [[ts, "v"], ...]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dimensional attribution labels for a sample.
///
/// Optional labels are `None` when inapplicable; the condition evaluator uses
/// their presence, not just their value, to attribute a vector to an object
/// class (a vector describing a volume carries `volume_name`, one describing
/// a disk carries `disk`, and so on).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricAttribution {
    #[serde(rename = "__name__", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(rename = "node_id", default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(rename = "volumeid", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(rename = "volumename", default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(rename = "pvc", default, skip_serializing_if = "Option::is_none")]
    pub volume_pvc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

/// One `[timestamp, value]` pair. The backend serializes the value as a
/// string, so it is kept verbatim and parsed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarSample(pub f64, pub String);

impl ScalarSample {
    pub fn timestamp(&self) -> f64 {
        self.0
    }

    /// The sample instant, if the timestamp is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        let secs = self.0.trunc() as i64;
        let nanos = (self.0.fract() * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    /// The sample value parsed as a float, `None` if it is not numeric.
    pub fn value(&self) -> Option<f64> {
        self.1.parse().ok()
    }
}

/// A single telemetry sample with dimensional attribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricVector {
    #[serde(default)]
    pub metric: MetricAttribution,
    /// Instant query result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ScalarSample>,
    /// Range query results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ScalarSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_deserializes_instant_result() {
        let raw = serde_json::json!({
            "metric": {
                "__name__": "px_volume_usage_bytes",
                "cluster": "east-1",
                "volumename": "vol-A"
            },
            "value": [1699999999.5, "87.5"]
        });

        let vector: MetricVector = serde_json::from_value(raw).unwrap();
        assert_eq!(vector.metric.volume_name.as_deref(), Some("vol-A"));
        assert!(vector.metric.disk.is_none());
        let sample = vector.value.unwrap();
        assert_eq!(sample.value(), Some(87.5));
        assert!(sample.time().is_some());
        assert!(vector.values.is_empty());
    }

    #[test]
    fn vector_deserializes_range_result() {
        let raw = serde_json::json!({
            "metric": { "disk": "sdb" },
            "values": [[1.0, "1"], [2.0, "2"]]
        });

        let vector: MetricVector = serde_json::from_value(raw).unwrap();
        assert_eq!(vector.metric.disk.as_deref(), Some("sdb"));
        assert!(vector.value.is_none());
        assert_eq!(vector.values.len(), 2);
        assert_eq!(vector.values[1].value(), Some(2.0));
    }

    #[test]
    fn non_numeric_sample_value_is_none() {
        let sample = ScalarSample(0.0, "NaN-ish".to_string());
        assert_eq!(sample.value(), None);
    }
}
