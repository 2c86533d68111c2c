/*!
 * Tests for translator configuration loading
 */

use std::time::Duration;
use sublingo::app_config::LogLevel;
use sublingo::document::GuidelineStandard;
use sublingo::TranslatorConfig;
use tempfile::TempDir;

#[test]
fn test_saveAndLoad_shouldKeepOverrides() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("translator.json");
    let config = TranslatorConfig::default()
        .with_batch_size(12)
        .with_glossary_cache_ttl(Duration::from_secs(60));

    config.save_to_file(&path).unwrap();
    let loaded = TranslatorConfig::from_file(&path).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.glossary_cache_ttl(), Duration::from_secs(60));
}

#[test]
fn test_fromFile_withInvalidTemperature_shouldFail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("translator.json");
    std::fs::write(&path, r#"{"default_temperature": 3.5}"#).unwrap();

    let error = TranslatorConfig::from_file(&path).unwrap_err();
    assert!(error.to_string().contains("default_temperature"));
}

#[test]
fn test_fromFile_withMissingFile_shouldFail() {
    let dir = TempDir::new().unwrap();
    assert!(TranslatorConfig::from_file(dir.path().join("missing.json")).is_err());
}

#[test]
fn test_deserialize_withEnums_shouldUseLowercaseNames() {
    let config: TranslatorConfig =
        serde_json::from_str(r#"{"guideline_standard": "bbc", "log_level": "debug"}"#).unwrap();

    assert_eq!(config.guideline_standard, GuidelineStandard::Bbc);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.log_level.to_level_filter(), log::LevelFilter::Debug);
    assert_eq!(config.batch_size, 20);
}
