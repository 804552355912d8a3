use crate::controller::PolicyController;
use crate::{evaluator, EngineError};
use anyhow::{anyhow, Result as AnyResult};
use oxpilot_action::{VolumeClaim, VolumeMutator};
use oxpilot_common::events::{
    EventSink, EventType, REASON_ACTION_FAILED, REASON_ACTION_TRIGGERED, REASON_CONDITION_MET,
    REASON_EVALUATION_FAILED,
};
use oxpilot_common::metrics::{MetricAttribution, MetricVector, ScalarSample};
use oxpilot_common::types::{
    ConditionOperator, LabelSelector, LabelSelectorRequirement, PolicyAction, PolicyEvent,
    PolicyObject, PolicyObjectType, StoragePolicy, ACTION_VOLUME_RESIZE,
};
use oxpilot_metrics::{MetricsError, MetricsProvider, Result as MetricsResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---- test doubles ----

#[derive(Debug, Default)]
struct ScriptedProvider {
    /// query string -> vectors returned for it
    responses: HashMap<String, Vec<MetricVector>>,
    /// query strings that fail with a backend error
    fail_queries: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl MetricsProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn query(&self, query: &str) -> MetricsResult<Vec<MetricVector>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail_queries.contains(query) {
            return Err(MetricsError::Backend {
                error_type: "test".to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(self.responses.get(query).cloned().unwrap_or_default())
    }

    fn condition_to_query(&self, condition: &LabelSelectorRequirement) -> String {
        if condition.key == "unmapped" {
            return String::new();
        }
        format!(
            "{} {} {}",
            condition.key,
            condition.operator,
            condition.values.first().map(String::as_str).unwrap_or("")
        )
    }
}

struct FakeResolver {
    objects: AnyResult<Vec<String>>,
}

impl FakeResolver {
    fn returning(objects: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            objects: Ok(objects.iter().map(|o| o.to_string()).collect()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            objects: Err(anyhow!("{}", message.to_string())),
        })
    }
}

#[async_trait::async_trait]
impl oxpilot_action::ObjectResolver for FakeResolver {
    async fn resolve_objects(
        &self,
        _object_type: PolicyObjectType,
        _selector: &LabelSelector,
    ) -> AnyResult<Vec<String>> {
        match &self.objects {
            Ok(objects) => Ok(objects.clone()),
            Err(e) => Err(anyhow!("{e}")),
        }
    }
}

#[derive(Default)]
struct FakeVolumes {
    fail_update: bool,
    claim_lookups: Mutex<u32>,
    updates: Mutex<Vec<(String, u64)>>,
}

#[async_trait::async_trait]
impl VolumeMutator for FakeVolumes {
    async fn get_volume_claim(&self, volume_id: &str) -> AnyResult<VolumeClaim> {
        *self.claim_lookups.lock().unwrap() += 1;
        Ok(VolumeClaim {
            name: format!("claim-{volume_id}"),
            namespace: "default".to_string(),
            capacity_gb: 100,
        })
    }

    async fn update_claim_capacity(
        &self,
        claim: &VolumeClaim,
        new_capacity_gb: u64,
    ) -> AnyResult<()> {
        if self.fail_update {
            return Err(anyhow!("cluster API unavailable"));
        }
        self.updates
            .lock()
            .unwrap()
            .push((claim.name.clone(), new_capacity_gb));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(String, EventType, String)>>,
}

impl RecordingSink {
    fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, reason)| reason.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, subject: &str, event_type: EventType, reason: &str, _message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((subject.to_string(), event_type, reason.to_string()));
    }
}

// ---- helpers ----

fn volume_vector(volume_name: &str) -> MetricVector {
    MetricVector {
        metric: MetricAttribution {
            volume_name: Some(volume_name.to_string()),
            ..Default::default()
        },
        value: Some(ScalarSample(1699999999.0, "92".to_string())),
        values: Vec::new(),
    }
}

fn condition(key: &str, value: &str) -> LabelSelectorRequirement {
    LabelSelectorRequirement {
        key: key.to_string(),
        operator: ConditionOperator::Gt,
        values: vec![value.to_string()],
    }
}

fn volume_policy(name: &str, version: &str, conditions: Vec<LabelSelectorRequirement>) -> StoragePolicy {
    StoragePolicy {
        name: name.to_string(),
        namespace: None,
        resource_version: version.to_string(),
        creation_timestamp: None,
        weight: 0,
        enforcement: Default::default(),
        object: PolicyObject {
            object_type: PolicyObjectType::Volume,
            selector: LabelSelector::default(),
        },
        conditions,
        action: PolicyAction {
            name: ACTION_VOLUME_RESIZE.to_string(),
            action_object: None,
            params: HashMap::new(),
        },
    }
}

struct Harness {
    controller: Arc<PolicyController>,
    volumes: Arc<FakeVolumes>,
    sink: Arc<RecordingSink>,
}

fn harness(resolver: Arc<FakeResolver>, volumes: FakeVolumes, cooldown: Duration) -> Harness {
    let volumes = Arc::new(volumes);
    let sink = Arc::new(RecordingSink::default());
    let controller = Arc::new(PolicyController::new(
        resolver,
        volumes.clone(),
        sink.clone(),
        cooldown,
    ));
    Harness {
        controller,
        volumes,
        sink,
    }
}

// ---- policy index ----

#[test]
fn added_then_duplicate_modified_is_idempotent() {
    let h = harness(
        FakeResolver::returning(&[]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );

    let mut policy = volume_policy("p1", "7", vec![]);
    policy.weight = 1;
    h.controller
        .handle_policy_event(PolicyEvent::Added(policy.clone()));
    assert_eq!(h.controller.policy_count(), 1);

    // Same resource version, different payload: duplicate notification, the
    // stored copy must not change.
    policy.weight = 99;
    h.controller
        .handle_policy_event(PolicyEvent::Modified(policy.clone()));
    assert_eq!(h.controller.policy_count(), 1);
    assert_eq!(h.controller.get_policy("p1").unwrap().weight, 1);
}

#[test]
fn modified_with_new_version_replaces() {
    let h = harness(
        FakeResolver::returning(&[]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );

    h.controller
        .handle_policy_event(PolicyEvent::Added(volume_policy("p1", "7", vec![])));

    let mut updated = volume_policy("p1", "8", vec![]);
    updated.weight = 42;
    h.controller
        .handle_policy_event(PolicyEvent::Modified(updated));

    let stored = h.controller.get_policy("p1").unwrap();
    assert_eq!(stored.resource_version, "8");
    assert_eq!(stored.weight, 42);
}

#[test]
fn deleted_removes_by_name() {
    let h = harness(
        FakeResolver::returning(&[]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );

    h.controller
        .handle_policy_event(PolicyEvent::Added(volume_policy("p1", "1", vec![])));
    h.controller
        .handle_policy_event(PolicyEvent::Deleted(volume_policy("p1", "1", vec![])));
    assert_eq!(h.controller.policy_count(), 0);

    // Deleting an unknown policy is a no-op.
    h.controller
        .handle_policy_event(PolicyEvent::Deleted(volume_policy("p2", "1", vec![])));
}

// ---- condition evaluator ----

#[test]
fn matches_requires_every_vector_to_attribute_to_the_object() {
    let vectors = vec![volume_vector("v1"), volume_vector("v1")];
    assert!(evaluator::matches("v1", PolicyObjectType::Volume, &vectors));

    let vectors = vec![volume_vector("v1"), volume_vector("v2")];
    assert!(!evaluator::matches("v1", PolicyObjectType::Volume, &vectors));
    assert!(!evaluator::matches("v2", PolicyObjectType::Volume, &vectors));
}

#[test]
fn matches_is_false_on_empty_vectors() {
    assert!(!evaluator::matches("v1", PolicyObjectType::Volume, &[]));
}

#[test]
fn matches_uses_the_dimension_implied_by_object_type() {
    // A volume vector does not attribute to a disk object of the same name.
    let vectors = vec![volume_vector("sdb")];
    assert!(!evaluator::matches("sdb", PolicyObjectType::Disk, &vectors));

    let disk_vector = MetricVector {
        metric: MetricAttribution {
            disk: Some("sdb".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(evaluator::matches(
        "sdb",
        PolicyObjectType::Disk,
        &[disk_vector]
    ));
}

// ---- evaluation pass ----

#[tokio::test]
async fn met_condition_dispatches_once_and_cools_down() {
    let provider = Arc::new(ScriptedProvider {
        responses: HashMap::from([(
            "oxpilot.io.condition.volume.usage_percentage gt 80".to_string(),
            vec![volume_vector("vol-A")],
        )]),
        ..Default::default()
    });
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    )));

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider];
    h.controller.evaluate_once(&providers).await;

    {
        let updates = h.volumes.updates.lock().unwrap();
        assert_eq!(updates.as_slice(), &[("claim-vol-A".to_string(), 110)]);
    }
    assert!(h.controller.in_cooldown("vol-A"));
    assert_eq!(
        h.sink.reasons(),
        vec![REASON_CONDITION_MET, REASON_ACTION_TRIGGERED]
    );

    // Second tick inside the window: the condition is still met and reported,
    // but no action is dispatched.
    h.controller.evaluate_once(&providers).await;
    assert_eq!(h.volumes.updates.lock().unwrap().len(), 1);
    assert_eq!(
        h.sink.reasons(),
        vec![REASON_CONDITION_MET, REASON_ACTION_TRIGGERED, REASON_CONDITION_MET]
    );
}

#[tokio::test]
async fn object_becomes_eligible_again_after_the_window() {
    let provider = Arc::new(ScriptedProvider {
        responses: HashMap::from([(
            "oxpilot.io.condition.volume.usage_percentage gt 80".to_string(),
            vec![volume_vector("vol-A")],
        )]),
        ..Default::default()
    });
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes::default(),
        Duration::from_millis(150),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    )));

    // Start with no providers: the loop idles, but the cooldown expiry task
    // runs.
    h.controller
        .start(Vec::new(), Duration::from_millis(25))
        .unwrap();

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider];
    h.controller.evaluate_once(&providers).await;
    assert_eq!(h.volumes.updates.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!h.controller.in_cooldown("vol-A"));

    h.controller.evaluate_once(&providers).await;
    assert_eq!(h.volumes.updates.lock().unwrap().len(), 2);

    h.controller.stop().await;
}

#[tokio::test]
async fn failing_condition_does_not_mask_the_others() {
    let failing = "oxpilot.io.condition.volume.capacity_gb gt 500".to_string();
    let provider = Arc::new(ScriptedProvider {
        responses: HashMap::from([(
            "oxpilot.io.condition.volume.usage_percentage gt 80".to_string(),
            vec![volume_vector("vol-A")],
        )]),
        fail_queries: HashSet::from([failing]),
        ..Default::default()
    });
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![
            condition("oxpilot.io.condition.volume.capacity_gb", "500"),
            condition("oxpilot.io.condition.volume.usage_percentage", "80"),
        ],
    )));

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider.clone()];
    h.controller.evaluate_once(&providers).await;

    // Both conditions were attempted, and the surviving one triggered.
    assert_eq!(provider.queries.lock().unwrap().len(), 2);
    assert_eq!(h.volumes.updates.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unmapped_condition_is_skipped_without_querying() {
    let provider = Arc::new(ScriptedProvider::default());
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("unmapped", "80")],
    )));

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider.clone()];
    h.controller.evaluate_once(&providers).await;

    assert!(provider.queries.lock().unwrap().is_empty());
    assert!(h.volumes.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_policy_warns_and_does_not_abort_the_tick() {
    let provider = Arc::new(ScriptedProvider {
        responses: HashMap::from([(
            "oxpilot.io.condition.volume.usage_percentage gt 80".to_string(),
            vec![volume_vector("vol-A")],
        )]),
        ..Default::default()
    });
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );

    let mut broken = volume_policy(
        "p0-broken",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    );
    broken.action.name = "no-separator-here".to_string();
    h.controller.handle_policy_event(PolicyEvent::Added(broken));
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    )));

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider];
    h.controller.evaluate_once(&providers).await;

    // The healthy policy acted; the broken one produced a warning event.
    assert_eq!(h.volumes.updates.lock().unwrap().len(), 1);
    let reasons = h.sink.reasons();
    assert!(reasons.iter().any(|r| r == REASON_ACTION_FAILED));
    assert!(reasons.iter().any(|r| r == REASON_ACTION_TRIGGERED));
}

#[tokio::test]
async fn failed_action_still_enters_cooldown() {
    let provider = Arc::new(ScriptedProvider {
        responses: HashMap::from([(
            "oxpilot.io.condition.volume.usage_percentage gt 80".to_string(),
            vec![volume_vector("vol-A")],
        )]),
        ..Default::default()
    });
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes {
            fail_update: true,
            ..Default::default()
        },
        Duration::from_secs(240),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    )));

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider];
    h.controller.evaluate_once(&providers).await;

    assert!(h.sink.reasons().iter().any(|r| r == REASON_ACTION_FAILED));
    assert!(h.controller.in_cooldown("vol-A"));

    // Within the window the failing backend is not hammered again.
    h.controller.evaluate_once(&providers).await;
    assert_eq!(*h.volumes.claim_lookups.lock().unwrap(), 1);
}

#[tokio::test]
async fn resolver_failure_emits_warning_and_skips_the_policy() {
    let provider = Arc::new(ScriptedProvider::default());
    let h = harness(
        FakeResolver::failing("cluster unreachable"),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    )));

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider.clone()];
    h.controller.evaluate_once(&providers).await;

    assert_eq!(h.sink.reasons(), vec![REASON_EVALUATION_FAILED]);
    assert!(provider.queries.lock().unwrap().is_empty());
    assert!(h.volumes.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn no_vectors_means_no_trigger() {
    let provider = Arc::new(ScriptedProvider::default());
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    )));

    let providers: Vec<Arc<dyn MetricsProvider>> = vec![provider];
    h.controller.evaluate_once(&providers).await;

    assert!(h.sink.events.lock().unwrap().is_empty());
    assert!(h.volumes.updates.lock().unwrap().is_empty());
}

// ---- lifecycle ----

#[tokio::test]
async fn start_rejects_zero_tick_interval() {
    let h = harness(
        FakeResolver::returning(&[]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );
    let err = h
        .controller
        .start(Vec::new(), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTickInterval));
}

#[tokio::test]
async fn loop_ticks_until_stopped() {
    let provider: Arc<dyn MetricsProvider> = Arc::new(ScriptedProvider {
        responses: HashMap::from([(
            "oxpilot.io.condition.volume.usage_percentage gt 80".to_string(),
            vec![volume_vector("vol-A")],
        )]),
        ..Default::default()
    });
    let h = harness(
        FakeResolver::returning(&["vol-A"]),
        FakeVolumes::default(),
        Duration::from_secs(240),
    );
    h.controller.handle_policy_event(PolicyEvent::Added(volume_policy(
        "p1",
        "1",
        vec![condition("oxpilot.io.condition.volume.usage_percentage", "80")],
    )));

    h.controller
        .start(vec![provider], Duration::from_millis(40))
        .unwrap();
    // Second start is a logged no-op.
    h.controller.start(Vec::new(), Duration::from_millis(40)).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    h.controller.stop().await;
    h.controller.stop().await;

    // The loop evaluated at least once and the action cooled down, so there
    // is exactly one dispatch.
    assert_eq!(h.volumes.updates.lock().unwrap().len(), 1);
    assert!(h.controller.in_cooldown("vol-A"));
}
