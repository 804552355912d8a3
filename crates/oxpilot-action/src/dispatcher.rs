use crate::{ActionError, Result, VolumeMutator};
use oxpilot_common::events::{EventSink, EventType, REASON_ACTION_TRIGGERED};
use oxpilot_common::types::StoragePolicy;
use std::sync::Arc;

/// Fixed capacity increment applied when the policy does not override it.
pub const DEFAULT_RESIZE_INCREMENT_GB: u64 = 10;

/// Policy action param overriding the resize increment.
pub const PARAM_INCREMENT_GB: &str = "increment_gb";

const OBJECT_TYPE_VOLUME: &str = "volume";
const ACTION_TYPE_RESIZE: &str = "resize";

/// Split an action name of the form
/// `oxpilot.io.action.<objectType>/<actionType>` into its object-type token
/// and action type.
///
/// The name must contain exactly one `/`; the object-type token is the final
/// dotted segment before it.
///
/// # Examples
///
/// ```
/// use oxpilot_action::parse_action_name;
///
/// let (object, action) = parse_action_name("oxpilot.io.action.volume/resize").unwrap();
/// assert_eq!(object, "volume");
/// assert_eq!(action, "resize");
/// ```
pub fn parse_action_name(name: &str) -> Result<(String, String)> {
    let mut parts = name.split('/');
    let (Some(qualifier), Some(action_type), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(ActionError::MalformedActionName(name.to_string()));
    };
    if qualifier.is_empty() || action_type.is_empty() {
        return Err(ActionError::MalformedActionName(name.to_string()));
    }

    let object_type = qualifier.rsplit('.').next().unwrap_or(qualifier);
    if object_type.is_empty() {
        return Err(ActionError::MalformedActionName(name.to_string()));
    }

    Ok((object_type.to_string(), action_type.to_string()))
}

/// Routes a policy's action to the executor for its object type and performs
/// the remediation.
pub struct ActionDispatcher {
    volumes: Arc<dyn VolumeMutator>,
    events: Arc<dyn EventSink>,
}

impl ActionDispatcher {
    pub fn new(volumes: Arc<dyn VolumeMutator>, events: Arc<dyn EventSink>) -> Self {
        Self { volumes, events }
    }

    /// Execute `policy`'s action on `object_id`.
    ///
    /// Collaborator errors are propagated to the caller; no retry happens at
    /// this layer.
    pub async fn execute(&self, policy: &StoragePolicy, object_id: &str) -> Result<()> {
        let (object_type, action_type) = parse_action_name(&policy.action.name)?;

        match object_type.as_str() {
            OBJECT_TYPE_VOLUME => self.execute_volume(policy, object_id, &action_type).await,
            _ => Err(ActionError::UnsupportedObjectType(object_type)),
        }
    }

    async fn execute_volume(
        &self,
        policy: &StoragePolicy,
        volume_id: &str,
        action_type: &str,
    ) -> Result<()> {
        match action_type {
            ACTION_TYPE_RESIZE => self.resize_volume(policy, volume_id).await,
            _ => Err(ActionError::UnsupportedActionType {
                object_type: OBJECT_TYPE_VOLUME.to_string(),
                action_type: action_type.to_string(),
            }),
        }
    }

    async fn resize_volume(&self, policy: &StoragePolicy, volume_id: &str) -> Result<()> {
        let claim = self
            .volumes
            .get_volume_claim(volume_id)
            .await
            .map_err(|source| ActionError::Claim {
                volume: volume_id.to_string(),
                source,
            })?;

        let increment = resize_increment(policy);
        let new_capacity = claim.capacity_gb.saturating_add(increment);

        self.volumes
            .update_claim_capacity(&claim, new_capacity)
            .await
            .map_err(|source| ActionError::Mutation {
                claim: format!("{}/{}", claim.namespace, claim.name),
                source,
            })?;

        tracing::info!(
            policy = %policy.name,
            volume = %volume_id,
            claim = %claim.name,
            from_gb = claim.capacity_gb,
            to_gb = new_capacity,
            "volume resize submitted"
        );
        self.events.emit(
            &policy.name,
            EventType::Normal,
            REASON_ACTION_TRIGGERED,
            &format!(
                "resized volume {volume_id}: claim {}/{} now requests {new_capacity} GiB",
                claim.namespace, claim.name
            ),
        );
        Ok(())
    }
}

fn resize_increment(policy: &StoragePolicy) -> u64 {
    match policy.action.params.get(PARAM_INCREMENT_GB) {
        None => DEFAULT_RESIZE_INCREMENT_GB,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                policy = %policy.name,
                value = %raw,
                "invalid {PARAM_INCREMENT_GB} param, using default increment"
            );
            DEFAULT_RESIZE_INCREMENT_GB
        }),
    }
}
