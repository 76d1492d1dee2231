use form_engine::{ConfigError, DependencyFaultPolicy, EngineSettings, LovSettings, SubmitLimit};
use serde_json::json;

#[test]
fn blank_settings_use_defaults() {
    for blank in ["", "   ", "\n"] {
        let settings = EngineSettings::from_json(blank).expect("defaults");
        assert_eq!(settings, EngineSettings::default());
    }

    let settings = EngineSettings::default();
    assert_eq!(settings.max_dependency_depth, 16);
    assert!(settings.validate_on_change);
    assert_eq!(settings.dependency_faults, DependencyFaultPolicy::Propagate);
    assert_eq!(settings.lov, LovSettings { page_size: 20, debounce_ms: 300 });
    assert_eq!(settings.submit_limit, None);
}

#[test]
fn partial_settings_fill_in_the_rest() {
    let settings = EngineSettings::from_json(
        &json!({
            "validate_on_change": false,
            "dependency_faults": "log",
            "lov": { "debounce_ms": 150 },
            "submit_limit": { "max_attempts": 5, "window_secs": 300 }
        })
        .to_string(),
    )
    .expect("settings");

    assert!(!settings.validate_on_change);
    assert_eq!(settings.dependency_faults, DependencyFaultPolicy::Log);
    assert_eq!(settings.lov.page_size, 20);
    assert_eq!(settings.lov.debounce().as_millis(), 150);
    assert_eq!(
        settings.submit_limit,
        Some(SubmitLimit {
            max_attempts: 5,
            window_secs: 300
        })
    );
    assert_eq!(settings.max_dependency_depth, 16);
}

#[test]
fn malformed_settings_are_rejected() {
    let result = EngineSettings::from_json("{ \"lov\": { \"page_size\": \"many\" } }");
    assert!(matches!(result, Err(ConfigError::SettingsParse(_))));

    let result = EngineSettings::from_json("not json");
    assert!(matches!(result, Err(ConfigError::SettingsParse(_))));
}
