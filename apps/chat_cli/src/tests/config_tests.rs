use super::*;

use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn defaults_have_no_api_key() {
    let settings = Settings::default();
    assert_eq!(settings.api_key, None);
    assert_eq!(settings.model, gemini::DEFAULT_MODEL);
    assert_eq!(settings.api_base, gemini::DEFAULT_API_BASE);
    assert!(settings.gemini_config().is_err());
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    settings
        .apply_file(
            r#"
            api_key = "file-key"
            model = "gemini-pro-vision"
            temperature = 0.4
            max_output_tokens = 256
            "#,
        )
        .expect("apply file");

    assert_eq!(settings.api_key.as_deref(), Some("file-key"));
    assert_eq!(settings.model, "gemini-pro-vision");
    assert_eq!(settings.api_base, gemini::DEFAULT_API_BASE);
    assert_eq!(settings.temperature, Some(0.4));
    assert_eq!(settings.max_output_tokens, Some(256));
}

#[test]
fn unknown_file_keys_are_rejected() {
    let mut settings = Settings::default();
    assert!(settings.apply_file("apikey = \"typo\"").is_err());
}

#[test]
fn env_overrides_file_and_app_prefix_wins() {
    let mut settings = Settings::default();
    settings.apply_file("api_key = \"file-key\"").expect("apply file");

    settings.apply_env(env_of(&[
        ("GEMINI_API_KEY", "gemini-key"),
        ("APP__MODEL", "gemini-1.5-pro"),
        ("GEMINI_MODEL", "ignored-model"),
        ("APP__TEMPERATURE", "0.9"),
        ("APP__MAX_OUTPUT_TOKENS", "not-a-number"),
    ]));

    assert_eq!(settings.api_key.as_deref(), Some("gemini-key"));
    assert_eq!(settings.model, "gemini-1.5-pro");
    assert_eq!(settings.temperature, Some(0.9));
    assert_eq!(settings.max_output_tokens, None);

    settings.apply_env(env_of(&[("APP__API_KEY", "app-key"), ("GEMINI_API_KEY", "gemini-key")]));
    assert_eq!(settings.api_key.as_deref(), Some("app-key"));
}

#[test]
fn blank_env_values_are_ignored() {
    let mut settings = Settings::default();
    settings.apply_env(env_of(&[("GEMINI_API_KEY", "  "), ("APP__MODEL", "")]));
    assert_eq!(settings.api_key, None);
    assert_eq!(settings.model, gemini::DEFAULT_MODEL);
}

#[test]
fn gemini_config_carries_settings() {
    let settings = Settings {
        api_key: Some(" key ".into()),
        model: "gemini-pro-vision".into(),
        api_base: "http://127.0.0.1:9000/v1beta".into(),
        temperature: Some(0.1),
        max_output_tokens: Some(64),
    };

    let config = settings.gemini_config().expect("config");

    assert_eq!(config.api_key, "key");
    assert_eq!(config.model, "gemini-pro-vision");
    assert_eq!(config.api_base, "http://127.0.0.1:9000/v1beta");
    assert_eq!(config.generation.temperature, Some(0.1));
    assert_eq!(config.generation.max_output_tokens, Some(64));
}

#[test]
fn gemini_config_rejects_bad_api_base() {
    let mut settings = Settings {
        api_key: Some("key".into()),
        ..Settings::default()
    };
    settings.api_base = "not a url".into();
    assert!(settings.gemini_config().is_err());

    settings.api_base = "ftp://example.test".into();
    assert!(settings.gemini_config().is_err());
}

#[test]
fn debug_output_redacts_api_key() {
    let settings = Settings {
        api_key: Some("super-secret".into()),
        ..Settings::default()
    };
    assert!(!format!("{settings:?}").contains("super-secret"));
}

#[test]
fn explicit_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    assert!(load_settings(Some(&missing)).is_err());
}

#[test]
fn explicit_config_file_is_loaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chat.toml");
    fs::write(&path, "model = \"from-file\"\n").expect("write");

    let settings = load_settings(Some(&path)).expect("load");

    // Environment may override the model on a developer machine.
    if std::env::var("GEMINI_MODEL").is_err() && std::env::var("APP__MODEL").is_err() {
        assert_eq!(settings.model, "from-file");
    }
}

#[test]
fn missing_api_key_selects_unavailable_model() {
    let model = build_model(&Settings::default()).expect("model");
    assert_eq!(model.model_name(), "unavailable");

    let blank = Settings {
        api_key: Some("   ".into()),
        ..Settings::default()
    };
    assert_eq!(build_model(&blank).expect("model").model_name(), "unavailable");
}

#[test]
fn configured_api_key_selects_gemini_model() {
    let settings = Settings {
        api_key: Some("key".into()),
        model: "gemini-pro-vision".into(),
        ..Settings::default()
    };
    assert_eq!(
        build_model(&settings).expect("model").model_name(),
        "gemini-pro-vision"
    );
}

#[test]
fn invalid_settings_still_fail_when_a_key_is_present() {
    let settings = Settings {
        api_key: Some("key".into()),
        api_base: "ftp://example.test".into(),
        ..Settings::default()
    };
    assert!(build_model(&settings).is_err());
}

#[tokio::test]
async fn session_without_api_key_answers_with_configuration_error() {
    let session = client_core::ChatSession::new(build_model(&Settings::default()).expect("model"));

    let outcome = session.send_prompt("hi", Vec::new()).await.expect("send");

    match outcome {
        client_core::TurnOutcome::Failed { message } => assert!(message.contains("no API key")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
