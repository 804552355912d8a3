//! Metrics provider abstraction and registry.
//!
//! A provider translates policy conditions into backend-native queries and
//! returns uniform [`MetricVector`] results. Providers are registered by name
//! at process init and instantiated from configuration through
//! [`new_provider`].

pub mod error;
pub mod providers;


use oxpilot_common::metrics::MetricVector;
use oxpilot_common::types::LabelSelectorRequirement;
use std::collections::HashMap;
use std::sync::RwLock;

pub use error::{MetricsError, Result};

/// A telemetry backend queried by the policy evaluation loop.
#[async_trait::async_trait]
pub trait MetricsProvider: Send + Sync + std::fmt::Debug {
    /// Provider instance name (e.g. `"prometheus"`).
    fn name(&self) -> &str;

    /// Execute a backend-native query and return the matching vectors.
    async fn query(&self, query: &str) -> Result<Vec<MetricVector>>;

    /// Translate a policy condition into a backend-native query expression.
    ///
    /// Returns the empty string when the condition key or operator has no
    /// mapping for this backend; callers must treat an empty query as a
    /// configuration error and not send it.
    fn condition_to_query(&self, condition: &LabelSelectorRequirement) -> String;
}

/// Constructor registered for a provider type. Receives the provider's
/// configuration params (e.g. `url`).
pub type NewProviderFn = fn(&HashMap<String, String>) -> Result<Box<dyn MetricsProvider>>;

static PROVIDERS: RwLock<Option<HashMap<String, NewProviderFn>>> = RwLock::new(None);

/// Make a provider type available under `name` (lowercased).
///
/// Registration happens at process init, before concurrent use.
///
/// # Panics
///
/// Panics if `name` is already registered; that is a programming error, not a
/// runtime condition.
pub fn register(name: &str, ctor: NewProviderFn) {
    let name = name.to_lowercase();
    let mut providers = PROVIDERS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    let providers = providers.get_or_insert_with(HashMap::new);
    if providers.contains_key(&name) {
        panic!("metrics: register called twice for provider {name}");
    }
    providers.insert(name, ctor);
}

/// Instantiate a registered provider type with the given params.
pub fn new_provider(
    name: &str,
    params: &HashMap<String, String>,
) -> Result<Box<dyn MetricsProvider>> {
    let name = name.to_lowercase();
    let providers = PROVIDERS.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    let ctor = providers
        .as_ref()
        .and_then(|p| p.get(&name))
        .ok_or_else(|| MetricsError::UnknownProvider(name.clone()))?;
    ctor(params)
}

/// Whether a provider type is registered under `name`.
pub fn is_registered(name: &str) -> bool {
    let providers = PROVIDERS.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    providers
        .as_ref()
        .is_some_and(|p| p.contains_key(&name.to_lowercase()))
}
