use anyhow::{Context, Result};
use permissive_core::errors::SettingsError;
use permissive_core::settings::{ApplyOutcome, BreakSettings};
use serde_json::Value;

use super::atomic::atomic_write;

/// Read a settings document. A missing file is an empty document.
pub fn load_document(path: &str) -> Result<Value> {
    if !std::path::Path::new(path).exists() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read settings {path}"))?;
    let document: Value =
        serde_json::from_str(&content).with_context(|| format!("{path}: invalid settings JSON"))?;
    if !document.is_object() {
        return Err(SettingsError::NotAnObject {
            path: path.to_string(),
        }
        .into());
    }
    Ok(document)
}

/// Load break settings from `path`, starting from defaults.
pub fn load_break_settings(path: &str) -> Result<(BreakSettings, ApplyOutcome)> {
    let document = load_document(path)?;
    let mut settings = BreakSettings::default();
    let outcome = settings.apply_json(&document);
    Ok((settings, outcome))
}

/// Store `settings` under its key, keeping the rest of the document.
///
/// An existing file that cannot be parsed is left untouched and reported.
pub fn save_break_settings(path: &str, settings: &BreakSettings) -> Result<()> {
    let document = load_document(path)
        .with_context(|| format!("refusing to overwrite unreadable settings {path}"))?;
    let merged = settings.merge_into(document);
    let mut json = serde_json::to_string_pretty(&merged)?;
    json.push('\n');
    atomic_write(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch(name: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name).to_str().unwrap().to_string();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let (_dir, path) = scratch("absent.json");
        let (settings, outcome) = load_break_settings(&path).unwrap();
        assert_eq!(settings, BreakSettings::default());
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn save_keeps_unrelated_keys() {
        let (_dir, path) = scratch("bot.json");
        std::fs::write(&path, r#"{"botName": "fisher", "breakScheduler": {"enabled": false}}"#)
            .unwrap();

        let settings = BreakSettings {
            enabled: true,
            total_breaks_taken: 3,
            ..BreakSettings::default()
        };
        save_break_settings(&path, &settings).unwrap();

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["botName"], "fisher");
        assert_eq!(doc["breakScheduler"]["totalBreaksTaken"], 3);

        let (loaded, _) = load_break_settings(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let (_dir, path) = scratch("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_break_settings(&path).unwrap_err();
        assert!(err.to_string().contains("invalid settings JSON"));
    }

    #[test]
    fn non_object_document_is_rejected() {
        let (_dir, path) = scratch("list.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(err.downcast_ref::<SettingsError>().is_some());
    }

    #[test]
    fn save_leaves_malformed_document_untouched() {
        let (_dir, path) = scratch("miner.json");
        let original = r#"{"botName":"miner","route":[1,2,]}"#;
        std::fs::write(&path, original).unwrap();

        let err = save_break_settings(&path, &BreakSettings::default()).unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn save_creates_missing_document() {
        let (_dir, path) = scratch("fresh.json");
        save_break_settings(&path, &BreakSettings::default()).unwrap();
        let doc = load_document(&path).unwrap();
        assert_eq!(doc, json!({"breakScheduler": serde_json::to_value(BreakSettings::default()).unwrap()}));
    }
}
