use icusynth_core::GeneratorConfig;
use schemars::schema_for;

#[test]
fn partial_toml_keeps_defaults() {
    let raw = r#"
seed = 7
n_patients = 5

[format_a]
imv_rate = 0.5
"#;
    let config: GeneratorConfig = toml::from_str(raw).expect("parse config");
    assert_eq!(config.seed, 7);
    assert_eq!(config.n_patients, 5);
    assert_eq!(config.format_a.imv_rate, 0.5);
    assert_eq!(config.format_a.vasopressor_rate, 0.368);
    assert_eq!(config.format_b.conditions.len(), 8);
    assert_eq!(config.base_date.to_string(), "2024-01-01");
    config.validate().expect("valid config");
}

#[test]
fn unknown_keys_are_rejected() {
    let raw = "seeed = 7\n";
    assert!(toml::from_str::<GeneratorConfig>(raw).is_err());
}

#[test]
fn json_schema_lists_sections() {
    let schema = schema_for!(GeneratorConfig);
    let json = serde_json::to_value(&schema).expect("serialize schema");
    let properties = json
        .get("properties")
        .and_then(|value| value.as_object())
        .expect("properties");
    for key in ["seed", "n_patients", "base_date", "format_a", "format_b"] {
        assert!(properties.contains_key(key), "missing {key}");
    }
}
