//! Startup policy documents.
//!
//! The daemon has no watch source of its own; it reads JSON policy documents
//! from a directory at startup and applies them as `Added` events. Re-applying
//! the same documents is safe because the controller's upsert is idempotent by
//! resource version.

use anyhow::{bail, Context, Result};
use oxpilot_action::parse_action_name;
use oxpilot_common::types::StoragePolicy;
use std::path::Path;

/// Read every `*.json` policy document under `dir`, in file-name order.
///
/// A missing directory is an empty policy set, not an error; a document that
/// fails to parse or validate is.
pub fn load_policy_dir(dir: &Path) -> Result<Vec<StoragePolicy>> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "policy directory does not exist, starting with an empty policy set");
        return Ok(Vec::new());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading policy directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut policies = Vec::new();
    for path in paths {
        let policy = load_policy_file(&path)
            .with_context(|| format!("loading policy document {}", path.display()))?;
        tracing::info!(policy = %policy.name, path = %path.display(), "policy document loaded");
        policies.push(policy);
    }
    Ok(policies)
}

pub fn load_policy_file(path: &Path) -> Result<StoragePolicy> {
    let text = std::fs::read_to_string(path)?;
    let policy: StoragePolicy = serde_json::from_str(&text)?;
    validate(&policy)?;
    Ok(policy)
}

/// Reject documents the control loop could never act on.
pub fn validate(policy: &StoragePolicy) -> Result<()> {
    if policy.name.is_empty() {
        bail!("policy name must not be empty");
    }
    parse_action_name(&policy.action.name)
        .with_context(|| format!("policy '{}' has an invalid action name", policy.name))?;
    for condition in &policy.conditions {
        if condition.operator.requires_values() && condition.values.is_empty() {
            bail!(
                "policy '{}': condition '{}' requires at least one value",
                policy.name,
                condition.key
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxpilot_common::types::{ACTION_VOLUME_RESIZE, CONDITION_VOLUME_USAGE_PERCENTAGE};

    fn document(name: &str, action: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "resource_version": "1",
            "object": { "type": "oxpilot.io.object.volume" },
            "conditions": [
                {
                    "key": CONDITION_VOLUME_USAGE_PERCENTAGE,
                    "operator": "gt",
                    "values": ["80"]
                }
            ],
            "action": { "name": action }
        })
    }

    #[test]
    fn loads_documents_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20-second.json"),
            document("second", ACTION_VOLUME_RESIZE).to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("10-first.json"),
            document("first", ACTION_VOLUME_RESIZE).to_string(),
        )
        .unwrap();
        // Non-JSON files are ignored.
        std::fs::write(dir.path().join("README.md"), "not a policy").unwrap();

        let policies = load_policy_dir(dir.path()).unwrap();
        let names: Vec<&str> = policies.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn missing_directory_is_an_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(load_policy_dir(&missing).unwrap().is_empty());
    }

    #[test]
    fn invalid_action_name_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.json"),
            document("bad", "not-an-action-name").to_string(),
        )
        .unwrap();

        let err = load_policy_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid action name"));
    }

    #[test]
    fn comparison_condition_without_values_fails_validation() {
        let mut doc = document("no-values", ACTION_VOLUME_RESIZE);
        doc["conditions"][0]["values"] = serde_json::json!([]);
        let policy: StoragePolicy = serde_json::from_value(doc).unwrap();

        let err = validate(&policy).unwrap_err();
        assert!(err.to_string().contains("requires at least one value"));
    }

    #[test]
    fn unparseable_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(load_policy_dir(dir.path()).is_err());
    }
}
