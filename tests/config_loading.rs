//! Loading a TOML file and building a pool from it.

use std::path::PathBuf;

use llm_lb::config::{load_config, ConfigError, ValidationError};
use llm_lb::{CircuitState, LbClient, LbError};

fn write_config(content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("llm-lb-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_and_build_from_file() {
    std::env::set_var("LLM_LB_CONFIG_TEST_KEY", "sk-from-env");
    let path = write_config(
        r#"
        [[endpoints]]
        api_key = "sk-inline"
        base_url = "https://one.example.com/v1"

        [[endpoints]]
        name = "backup"
        api_key_env = "LLM_LB_CONFIG_TEST_KEY"
        base_url = "https://two.example.com/v1"
        model_map = { "gpt-4o" = "gpt-4o-mini" }

        [breaker]
        consecutive_failures = 2
        name_template = "openai-{index}"
        "#,
    );

    let config = load_config(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.endpoints[1].resolve_api_key().as_deref(), Some("sk-from-env"));

    let client = LbClient::from_config(&config).unwrap();
    let statuses = client.endpoints();
    let names: Vec<_> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["openai-0", "backup"]);
    assert!(statuses.iter().all(|s| s.state == CircuitState::Closed));
}

#[test]
fn test_validation_reports_every_problem() {
    let path = write_config(
        r#"
        [[endpoints]]
        base_url = "ftp://nope"

        [breaker]
        half_open_max_requests = 0
        "#,
    );

    let err = load_config(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();

    let ConfigError::Validation(errors) = err else {
        panic!("expected validation errors, got {}", err);
    };
    assert_eq!(errors.len(), 3);
    assert!(errors.contains(&ValidationError::MissingKeySource { index: 0 }));
    assert!(errors.contains(&ValidationError::ZeroValue { field: "half_open_max_requests" }));
}

#[test]
fn test_unresolvable_env_key_fails_at_build() {
    let path = write_config(
        r#"
        [[endpoints]]
        api_key_env = "LLM_LB_CONFIG_TEST_MISSING_KEY"
        base_url = "https://one.example.com/v1"
        "#,
    );
    let config = load_config(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let err = LbClient::from_config(&config).unwrap_err();
    assert!(matches!(err, LbError::Config(ConfigError::MissingApiKey { .. })));
    assert!(err.to_string().contains("Client-0"));
}
