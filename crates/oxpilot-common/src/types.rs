use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Domain prefix for all policy identifiers.
pub const POLICY_DOMAIN: &str = "oxpilot.io";

/// Prefix for policy object types (e.g. `oxpilot.io.object.volume`).
pub const POLICY_OBJECT_PREFIX: &str = "oxpilot.io.object";
/// Prefix for condition keys (e.g. `oxpilot.io.condition.volume.usage_percentage`).
pub const POLICY_CONDITION_PREFIX: &str = "oxpilot.io.condition";
/// Prefix for action names (e.g. `oxpilot.io.action.volume/resize`).
pub const POLICY_ACTION_PREFIX: &str = "oxpilot.io.action";

/// Volume usage as a percentage of capacity.
pub const CONDITION_VOLUME_USAGE_PERCENTAGE: &str =
    "oxpilot.io.condition.volume.usage_percentage";
/// Volume filesystem capacity in gigabytes.
pub const CONDITION_VOLUME_CAPACITY_GB: &str = "oxpilot.io.condition.volume.capacity_gb";

/// Grow the backing claim of a volume.
pub const ACTION_VOLUME_RESIZE: &str = "oxpilot.io.action.volume/resize";

/// The class of storage entity a policy targets.
///
/// Serialized as the domain-qualified identifier, e.g.
/// `oxpilot.io.object.volume`.
///
/// # Examples
///
/// ```
/// use oxpilot_common::types::PolicyObjectType;
///
/// let t: PolicyObjectType = "oxpilot.io.object.volume".parse().unwrap();
/// assert_eq!(t, PolicyObjectType::Volume);
/// assert_eq!(t.to_string(), "oxpilot.io.object.volume");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PolicyObjectType {
    Volume,
    StoragePool,
    Node,
    Disk,
}

impl PolicyObjectType {
    /// The short token for this object type, as it appears in action names
    /// (`oxpilot.io.action.<token>/<action>`).
    pub fn token(&self) -> &'static str {
        match self {
            PolicyObjectType::Volume => "volume",
            PolicyObjectType::StoragePool => "storagepool",
            PolicyObjectType::Node => "node",
            PolicyObjectType::Disk => "disk",
        }
    }
}

impl std::fmt::Display for PolicyObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", POLICY_OBJECT_PREFIX, self.token())
    }
}

impl std::str::FromStr for PolicyObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(POLICY_OBJECT_PREFIX).and_then(|r| r.strip_prefix('.')) {
            Some("volume") => Ok(PolicyObjectType::Volume),
            Some("storagepool") => Ok(PolicyObjectType::StoragePool),
            Some("node") => Ok(PolicyObjectType::Node),
            Some("disk") => Ok(PolicyObjectType::Disk),
            _ => Err(format!("unknown policy object type: {s}")),
        }
    }
}

impl TryFrom<String> for PolicyObjectType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PolicyObjectType> for String {
    fn from(value: PolicyObjectType) -> Self {
        value.to_string()
    }
}

/// Comparison operator relating a condition key to its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    Gt,
    Lt,
    Eq,
}

impl ConditionOperator {
    /// Whether this operator compares against a value (and therefore requires
    /// a non-empty `values` list on its condition).
    pub fn requires_values(&self) -> bool {
        matches!(
            self,
            ConditionOperator::Gt | ConditionOperator::Lt | ConditionOperator::Eq
        )
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionOperator::Gt => write!(f, "gt"),
            ConditionOperator::Lt => write!(f, "lt"),
            ConditionOperator::Eq => write!(f, "eq"),
        }
    }
}

impl std::str::FromStr for ConditionOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" => Ok(ConditionOperator::Gt),
            "lt" => Ok(ConditionOperator::Lt),
            "eq" => Ok(ConditionOperator::Eq),
            _ => Err(format!("unknown condition operator: {s}")),
        }
    }
}

/// Enforcement level of a policy. Informational; the control loop does not
/// change action semantics based on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Required,
    Preferred,
}

impl Default for Enforcement {
    fn default() -> Self {
        Enforcement::Required
    }
}

/// A label selector refining which objects of a type a policy applies to.
/// Pass-through for the object resolver; the control loop never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
}

/// One trigger condition: a telemetry query identified by `key`, compared
/// against `values` with `operator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

/// The entity a policy checks conditions on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyObject {
    #[serde(rename = "type")]
    pub object_type: PolicyObjectType,
    #[serde(default)]
    pub selector: LabelSelector,
}

/// The remediation to run when a policy's conditions are met.
///
/// `name` has the form `oxpilot.io.action.<objectType>/<actionType>`, with
/// exactly one `/`. `params` carries action-specific overrides (e.g.
/// `increment_gb` for volume resize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_object: Option<PolicyObject>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// A declarative autoscaling policy: an object selector, trigger conditions,
/// and a remediation action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePolicy {
    /// Unique, process-wide key.
    pub name: String,
    /// Pass-through scoping identifier, not interpreted by the control loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Version identifier from the policy source, compared on update events
    /// to absorb duplicate notifications.
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Tie-break priority among conflicting policies. Data only; tie-breaks
    /// are resolved by external consumers.
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub enforcement: Enforcement,
    pub object: PolicyObject,
    #[serde(default)]
    pub conditions: Vec<LabelSelectorRequirement>,
    pub action: PolicyAction,
}

/// A watch event for a policy object, as delivered by the policy source.
#[derive(Debug, Clone)]
pub enum PolicyEvent {
    Added(StoragePolicy),
    Modified(StoragePolicy),
    Deleted(StoragePolicy),
}
