use super::*;

#[test]
fn test_default_tolerances() {
    let config = EngineConfig::default();
    assert_eq!(config.validation.score_absolute_tolerance, 0.001);
    assert_eq!(config.validation.score_relative_tolerance, 0.1);
    assert_eq!(config.validation.derivative_absolute_tolerance, 0.01);
    assert_eq!(config.validation.derivative_relative_tolerance, 0.01);
    assert!(config.validation.check_incremental);
    assert!(config.validation.check_finite);
    assert!(!config.gather_statistics);
}

#[test]
fn test_toml_round_trip() {
    let config = EngineConfig::from_toml_str(
        r#"
        gather_statistics = true

        [validation]
        enabled = false
        check_incremental = false
        score_relative_tolerance = 0.25
        "#,
    )
    .unwrap();
    assert!(config.gather_statistics);
    assert!(!config.validation.enabled);
    assert!(!config.validation.check_incremental);
    assert_eq!(config.validation.score_relative_tolerance, 0.25);
    // Unspecified fields keep their defaults.
    assert_eq!(config.validation.score_absolute_tolerance, 0.001);

    let serialized = toml::to_string(&config).unwrap();
    let reparsed = EngineConfig::from_toml_str(&serialized).unwrap();
    assert_eq!(
        reparsed.validation.score_relative_tolerance,
        config.validation.score_relative_tolerance
    );
}

#[test]
fn test_yaml_parsing() {
    let config = EngineConfig::from_yaml_str(
        r#"
        validation:
          enabled: true
          score_absolute_tolerance: 0.0005
        "#,
    )
    .unwrap();
    assert!(config.validation.enabled);
    assert_eq!(config.validation.score_absolute_tolerance, 0.0005);
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = EngineConfig::from_toml_str("").unwrap();
    assert_eq!(config.validation.score_absolute_tolerance, 0.001);
}

#[test]
fn test_negative_tolerance_rejected() {
    let err = EngineConfig::from_toml_str(
        r#"
        [validation]
        score_absolute_tolerance = -1.0
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_missing_file_errors() {
    assert!(EngineConfig::load("does/not/exist.toml").is_err());
    // The load-or-default idiom still works.
    let config = EngineConfig::load("does/not/exist.toml").unwrap_or_default();
    assert!(config.validation.check_finite);
}
