pub mod prometheus;

/// Register every built-in provider type. Called once at process init.
///
/// # Panics
///
/// Panics when called more than once (duplicate registration).
pub fn register_all() {
    crate::register(prometheus::PROVIDER_TYPE, prometheus::new);
}
