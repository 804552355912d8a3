//! Condition matching: decides whether a policy's trigger has fired for a
//! specific object, given the vectors its condition queries returned.

use oxpilot_common::metrics::MetricVector;
use oxpilot_common::types::PolicyObjectType;

/// Whether the trigger is met for `object_id`.
///
/// Match-all semantics: every returned vector must attribute to the object.
/// Condition queries are expected to be pre-filtered to the object's own
/// series (e.g. via PromQL label matching), so any unattributed or foreign
/// vector invalidates the match. An empty vector set is no signal and never
/// a trigger.
pub fn matches(object_id: &str, object_type: PolicyObjectType, vectors: &[MetricVector]) -> bool {
    if vectors.is_empty() {
        return false;
    }
    vectors
        .iter()
        .all(|vector| attribution(vector, object_type) == Some(object_id))
}

/// The dimension label attributing `vector` to an object of `object_type`,
/// `None` when the vector does not describe that object class.
fn attribution(vector: &MetricVector, object_type: PolicyObjectType) -> Option<&str> {
    let metric = &vector.metric;
    match object_type {
        PolicyObjectType::Volume => metric.volume_name.as_deref(),
        PolicyObjectType::Disk => metric.disk.as_deref(),
        PolicyObjectType::StoragePool => metric.pool.as_deref(),
        PolicyObjectType::Node => metric.node.as_deref(),
    }
}
