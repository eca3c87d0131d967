//! Integration tests for layered configuration loading.

use std::fs;

use llm_admin::config::{ConfigError, ConfigLoader};
use tempfile::TempDir;

fn write_env(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[tokio::test]
async fn test_loads_from_env_file() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LLM_ADMIN_OPERATOR_TOKEN=file-token\n\
         LLM_ADMIN_PROXY_BASE_URL=http://proxy.internal:4000\n\
         LLM_ADMIN_PROXY_RETRY_ATTEMPTS=5\n\
         LLM_ADMIN_MAX_KEYS_PER_USER=3\n",
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();

    assert_eq!(config.operator_tokens, vec!["file-token"]);
    assert_eq!(config.proxy.base_url, "http://proxy.internal:4000");
    assert_eq!(config.proxy.retry_attempts, 5);
    assert_eq!(config.keys.max_keys_per_user, 3);
    // Untouched settings keep their defaults.
    assert_eq!(config.proxy.breaker_failure_threshold, 5);
}

#[tokio::test]
async fn test_local_file_overrides_base_file() {
    let dir = TempDir::new().unwrap();
    write_env(&dir, ".env", "LLM_ADMIN_OPERATOR_TOKEN=base-token\n");
    write_env(&dir, ".env.local", "LLM_ADMIN_OPERATOR_TOKEN=local-token\n");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();

    assert_eq!(config.operator_tokens, vec!["local-token"]);
}

#[tokio::test]
async fn test_profile_file_layering() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LLM_ADMIN_PROFILE=staging\nLLM_ADMIN_OPERATOR_TOKEN=token\nLLM_ADMIN_PROXY_API_KEY=sk-base\n",
    );
    write_env(&dir, ".env.staging", "LLM_ADMIN_PROXY_API_KEY=sk-staging\n");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();

    assert_eq!(config.profile, "staging");
    assert_eq!(config.proxy.api_key.as_deref(), Some("sk-staging"));
}

#[tokio::test]
async fn test_operator_token_list_is_split() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LLM_ADMIN_OPERATOR_TOKENS=alpha, beta ,gamma,\n",
    );

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();

    assert_eq!(config.operator_tokens, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_missing_operator_tokens_rejected() {
    let dir = TempDir::new().unwrap();
    write_env(&dir, ".env", "LLM_ADMIN_PROXY_BASE_URL=http://localhost:4000\n");

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingOperatorTokens));
}

#[tokio::test]
async fn test_non_local_profile_requires_proxy_api_key() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LLM_ADMIN_PROFILE=production\nLLM_ADMIN_OPERATOR_TOKEN=token\n",
    );

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingProxyApiKey));

    // Mock mode lifts the requirement.
    write_env(
        &dir,
        ".env",
        "LLM_ADMIN_PROFILE=production\nLLM_ADMIN_OPERATOR_TOKEN=token\nLLM_ADMIN_PROXY_MOCK_MODE=true\n",
    );
    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();
    assert!(config.proxy.mock_mode);
}

#[tokio::test]
async fn test_invalid_bind_addr_rejected() {
    let dir = TempDir::new().unwrap();
    write_env(
        &dir,
        ".env",
        "LLM_ADMIN_OPERATOR_TOKEN=token\nLLM_ADMIN_API_BIND_ADDR=not-an-addr\n",
    );

    let err = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
}
