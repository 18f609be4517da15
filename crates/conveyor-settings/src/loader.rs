//! Settings file loading and merging.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ConveyorSettings;

/// Deep-merge `overlay` into `base`.
///
/// Objects merge recursively; every other value (arrays included) replaces
/// the base wholesale. `null` in the overlay clears the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        let _ = base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

/// Load settings from a JSON file.
///
/// The file is deep-merged over compiled defaults, so partial files are
/// fine. The merged result is validated before it is returned — semantic
/// configuration defects fail here, at setup, never at call time.
pub fn load_settings_from_path(path: &Path) -> Result<ConveyorSettings> {
    let raw = std::fs::read_to_string(path)?;
    let overlay: Value = serde_json::from_str(&raw)?;

    let mut merged = serde_json::to_value(ConveyorSettings::default())?;
    deep_merge(&mut merged, &overlay);

    let settings: ConveyorSettings = serde_json::from_value(merged)?;
    settings.validate()?;
    debug!(?path, "settings loaded");
    Ok(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use conveyor_core::ConfigError;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn deep_merge_recurses_into_objects() {
        let mut base = json!({ "costs": { "enabled": true, "maxEntries": 10000 } });
        deep_merge(&mut base, &json!({ "costs": { "maxEntries": 50 } }));
        assert_eq!(base["costs"]["enabled"], json!(true));
        assert_eq!(base["costs"]["maxEntries"], json!(50));
    }

    #[test]
    fn deep_merge_replaces_arrays_wholesale() {
        let mut base = json!({ "tiers": [1, 2, 3] });
        deep_merge(&mut base, &json!({ "tiers": [9] }));
        assert_eq!(base["tiers"], json!([9]));
    }

    #[test]
    fn deep_merge_adds_missing_keys() {
        let mut base = json!({});
        deep_merge(&mut base, &json!({ "name": "petline" }));
        assert_eq!(base["name"], json!("petline"));
    }

    fn write_settings(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_merges_partial_file_over_defaults() {
        let file = write_settings(
            r#"{
                "name": "petline",
                "costs": { "models": { "gpt-4o-mini": { "inputPer1k": 0.00015, "outputPer1k": 0.0006 } } }
            }"#,
        );
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.name, "petline");
        assert_eq!(settings.costs.max_entries, 10_000);
        assert!(settings.costs.models.contains_key("gpt-4o-mini"));
    }

    #[test]
    fn load_rejects_invalid_configuration() {
        // enabled (default) with no pricing models
        let file = write_settings("{}");
        let err = load_settings_from_path(file.path()).unwrap_err();
        match err {
            SettingsError::Config(config) => assert_eq!(config, ConfigError::NoPricingModels),
            other => panic!("expected config error, got {other}"),
        }
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_settings_from_path(Path::new("/nonexistent/conveyor.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }
}
