use crate::evaluator;
use crate::{EngineError, Result};
use oxpilot_action::{ActionDispatcher, ObjectResolver, VolumeMutator};
use oxpilot_common::events::{
    EventSink, EventType, REASON_ACTION_FAILED, REASON_CONDITION_MET, REASON_EVALUATION_FAILED,
};
use oxpilot_common::types::{PolicyEvent, StoragePolicy};
use oxpilot_metrics::MetricsProvider;
use oxpilot_probation::ProbationManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const PROBATION_NAME: &str = "policy-action-cooldown";
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

struct Worker {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

/// Top-level orchestrator of the control loop.
///
/// Holds the authoritative working copy of every active policy, keyed by
/// name. Watch-event handlers mutate the index under the lock; the evaluation
/// tick snapshots it under the same lock and releases it before any network
/// call, so a slow provider or remediation never blocks policy updates.
pub struct PolicyController {
    policies: RwLock<HashMap<String, StoragePolicy>>,
    resolver: Arc<dyn ObjectResolver>,
    dispatcher: ActionDispatcher,
    probation: ProbationManager<()>,
    events: Arc<dyn EventSink>,
    worker: Mutex<Worker>,
}

impl PolicyController {
    pub fn new(
        resolver: Arc<dyn ObjectResolver>,
        volumes: Arc<dyn VolumeMutator>,
        events: Arc<dyn EventSink>,
        cooldown_window: Duration,
    ) -> Self {
        tracing::info!(
            cooldown_secs = cooldown_window.as_secs(),
            "policy controller using action cooldown window"
        );
        Self {
            policies: RwLock::new(HashMap::new()),
            resolver,
            dispatcher: ActionDispatcher::new(volumes, Arc::clone(&events)),
            probation: ProbationManager::new(PROBATION_NAME, cooldown_window, |key, ()| {
                tracing::info!(object = %key, "object released from action cooldown");
            }),
            events,
            worker: Mutex::new(Worker {
                handle: None,
                shutdown: None,
            }),
        }
    }

    /// Apply a watch event to the policy index.
    ///
    /// Added/Modified upsert by name; an update whose `resource_version`
    /// equals the stored one is a duplicate notification and is ignored.
    /// Never blocks on I/O.
    pub fn handle_policy_event(&self, event: PolicyEvent) {
        let mut policies = self
            .policies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match event {
            PolicyEvent::Added(policy) | PolicyEvent::Modified(policy) => {
                match policies.get(&policy.name) {
                    None => {
                        tracing::info!(policy = %policy.name, "policy added");
                        policies.insert(policy.name.clone(), policy);
                    }
                    Some(existing) if existing.resource_version != policy.resource_version => {
                        tracing::info!(
                            policy = %policy.name,
                            version = %policy.resource_version,
                            "policy updated"
                        );
                        policies.insert(policy.name.clone(), policy);
                    }
                    Some(_) => {
                        tracing::debug!(policy = %policy.name, "duplicate policy notification ignored");
                    }
                }
            }
            PolicyEvent::Deleted(policy) => {
                if policies.remove(&policy.name).is_some() {
                    tracing::info!(policy = %policy.name, "policy deleted");
                }
            }
        }
    }

    /// A copy of the stored policy named `name`, if any.
    pub fn get_policy(&self, name: &str) -> Option<StoragePolicy> {
        self.policies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Number of active policies.
    pub fn policy_count(&self) -> usize {
        self.policies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether `object_id` is currently exempt from re-triggering.
    pub fn in_cooldown(&self, object_id: &str) -> bool {
        self.probation.contains(object_id)
    }

    /// Begin the periodic evaluation loop and return immediately.
    ///
    /// The loop re-arms its timer only after the in-flight pass completes,
    /// so two ticks never run concurrently.
    pub fn start(
        self: &Arc<Self>,
        providers: Vec<Arc<dyn MetricsProvider>>,
        tick_interval: Duration,
    ) -> Result<()> {
        if tick_interval.is_zero() {
            return Err(EngineError::InvalidTickInterval);
        }

        self.probation.start()?;

        let mut worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker.handle.is_some() {
            tracing::warn!("policy controller already started");
            return Ok(());
        }

        let (tx, mut rx) = watch::channel(false);
        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tracing::info!(
                tick_secs = tick_interval.as_secs(),
                providers = providers.len(),
                "policy evaluation loop started"
            );
            // First evaluation happens one interval after start, not
            // immediately.
            let start_at = tokio::time::Instant::now() + tick_interval;
            let mut tick = tokio::time::interval_at(start_at, tick_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => controller.evaluate_once(&providers).await,
                    _ = rx.changed() => break,
                }
            }
            tracing::info!("policy evaluation loop stopped");
        });

        worker.handle = Some(handle);
        worker.shutdown = Some(tx);
        Ok(())
    }

    /// Signal the loop to exit after the in-flight tick, wait (bounded) for
    /// it, then stop the cooldown manager. Idempotent.
    pub async fn stop(&self) {
        let (handle, shutdown) = {
            let mut worker = self
                .worker
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (worker.handle.take(), worker.shutdown.take())
        };

        if let Some(handle) = handle {
            if let Some(shutdown) = shutdown {
                let _ = shutdown.send(true);
            }
            let abort = handle.abort_handle();
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                tracing::warn!("policy evaluation loop did not stop in time, aborting");
                abort.abort();
            }
        }

        self.probation.stop().await;
    }

    /// One evaluation pass over all configured providers and known policies.
    pub(crate) async fn evaluate_once(&self, providers: &[Arc<dyn MetricsProvider>]) {
        // Snapshot under the read lock; evaluation and actions run without it.
        let policies: Vec<StoragePolicy> = {
            self.policies
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .values()
                .cloned()
                .collect()
        };

        for provider in providers {
            for policy in &policies {
                self.evaluate_policy(provider.as_ref(), policy).await;
            }
        }
    }

    async fn evaluate_policy(&self, provider: &dyn MetricsProvider, policy: &StoragePolicy) {
        let objects = match self
            .resolver
            .resolve_objects(policy.object.object_type, &policy.object.selector)
            .await
        {
            Ok(objects) => objects,
            Err(e) => {
                tracing::error!(policy = %policy.name, error = %e, "object resolution failed");
                self.events.emit(
                    &policy.name,
                    EventType::Warning,
                    REASON_EVALUATION_FAILED,
                    &format!("failed to resolve policy objects: {e}"),
                );
                return;
            }
        };
        if objects.is_empty() {
            tracing::debug!(policy = %policy.name, "selector matched no objects");
            return;
        }

        // Conditions are evaluated in declared order, each in its own failure
        // domain: one failing query must not mask the others.
        let mut vectors = Vec::new();
        for condition in &policy.conditions {
            let query = provider.condition_to_query(condition);
            if query.is_empty() {
                tracing::warn!(
                    policy = %policy.name,
                    key = %condition.key,
                    provider = %provider.name(),
                    "condition does not map to a provider query"
                );
                continue;
            }
            match provider.query(&query).await {
                Ok(result) => vectors.extend(result),
                Err(e) => {
                    tracing::error!(
                        policy = %policy.name,
                        key = %condition.key,
                        error = %e,
                        "condition query failed"
                    );
                    continue;
                }
            }
        }

        if vectors.is_empty() {
            tracing::debug!(policy = %policy.name, provider = %provider.name(), "no vectors matched");
            return;
        }
        tracing::debug!(
            policy = %policy.name,
            provider = %provider.name(),
            matches = vectors.len(),
            "provider returned vectors"
        );

        for object in &objects {
            if !evaluator::matches(object, policy.object.object_type, &vectors) {
                tracing::debug!(policy = %policy.name, object = %object, "condition not met");
                continue;
            }

            self.events.emit(
                &policy.name,
                EventType::Normal,
                REASON_CONDITION_MET,
                &format!(
                    "conditions: {} met on object: {object}",
                    summarize_conditions(policy)
                ),
            );

            if self.probation.contains(object) {
                tracing::debug!(policy = %policy.name, object = %object, "object in cooldown, skipping action");
                continue;
            }

            if let Err(e) = self.dispatcher.execute(policy, object).await {
                tracing::error!(policy = %policy.name, object = %object, error = %e, "policy action failed");
                self.events.emit(
                    &policy.name,
                    EventType::Warning,
                    REASON_ACTION_FAILED,
                    &e.to_string(),
                );
            }

            // A failed action cools down like a successful one, so a
            // persistently failing backend is retried once per window rather
            // than every tick.
            if let Err(e) = self.probation.add(object, (), true) {
                tracing::error!(object = %object, error = %e, "failed to mark object for cooldown");
            }
        }
    }
}

fn summarize_conditions(policy: &StoragePolicy) -> String {
    let parts: Vec<String> = policy
        .conditions
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} => {} {} [{}]", i + 1, c.key, c.operator, c.values.join(",")))
        .collect();
    parts.join("\t")
}
