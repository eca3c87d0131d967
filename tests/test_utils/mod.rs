//! Test utilities for database and proxy testing.
//!
//! Sets up in-memory SQLite databases with migrations applied, inserts
//! fixture rows, and builds the service graph against a wiremock proxy.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use llm_admin::config::{AppConfig, KeyPolicyConfig, ProxyConfig};
use llm_admin::migration::{Migrator, MigratorTrait};
use llm_admin::models::api_key::{self, sync_status};
use llm_admin::models::api_key_model;
use llm_admin::models::model::{self, AVAILABILITY_AVAILABLE};
use llm_admin::models::subscription;
use llm_admin::models::user;
use llm_admin::proxy::ProxyClient;
use llm_admin::repositories::{AuditLogRepository, SubscriptionRepository};
use llm_admin::services::api_keys::ApiKeyService;
use llm_admin::services::model_sync::ModelSyncService;
use llm_admin::services::subscriptions::SubscriptionService;
use llm_admin::services::AuditService;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Set, Statement};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // SQLite does not enforce our Postgres foreign key semantics; disable FK
    // checks so fixtures can be inserted in any order.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

/// Configuration pointed at a wiremock proxy, with delays shrunk for tests.
#[allow(dead_code)]
pub fn test_config(proxy_base_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.profile = "test".to_string();
    config.operator_tokens = vec!["test-operator-token".to_string()];
    config.proxy = ProxyConfig {
        base_url: proxy_base_url.to_string(),
        api_key: Some("sk-admin-test".to_string()),
        team_id: None,
        timeout_ms: 2000,
        retry_attempts: 2,
        retry_delay_ms: 1,
        cache_ttl_seconds: 60,
        breaker_failure_threshold: 10,
        breaker_open_seconds: 1,
        settle_delay_ms: 0,
        activity_page_size: 500,
        mock_mode: false,
    };
    config.keys = KeyPolicyConfig {
        max_keys_per_user: 10,
        key_prefix: "sk-".to_string(),
        alias_suffix_len: 8,
    };
    config
}

/// Full service graph wired against the given database and config.
#[allow(dead_code)]
pub struct TestServices {
    pub proxy: Arc<ProxyClient>,
    pub api_keys: Arc<ApiKeyService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub model_sync: Arc<ModelSyncService>,
}

#[allow(dead_code)]
pub fn build_services(db: Arc<DatabaseConnection>, config: AppConfig) -> Result<TestServices> {
    let config = Arc::new(config);
    let proxy = Arc::new(ProxyClient::new(config.proxy.clone())?);
    let audit = AuditService::new(AuditLogRepository::new(Arc::clone(&db)));

    let api_keys = Arc::new(ApiKeyService::new(
        Arc::clone(&db),
        Arc::clone(&proxy),
        audit.clone(),
        Arc::clone(&config),
    ));
    let subscriptions = Arc::new(SubscriptionService::new(
        SubscriptionRepository::new(Arc::clone(&db)),
        Arc::clone(&api_keys),
        audit.clone(),
    ));
    let model_sync = Arc::new(ModelSyncService::new(
        Arc::clone(&db),
        Arc::clone(&proxy),
        Arc::clone(&subscriptions),
        audit,
    ));

    Ok(TestServices {
        proxy,
        api_keys,
        subscriptions,
        model_sync,
    })
}

#[allow(dead_code)]
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

// --- fixtures ---

#[allow(dead_code)]
pub async fn insert_user(db: &DatabaseConnection, email: &str) -> Result<user::Model> {
    let row = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        display_name: Set(Some("Test User".to_string())),
        role: Set("user".to_string()),
        created_at: Set(Utc::now().into()),
    };
    Ok(row.insert(db).await?)
}

#[allow(dead_code)]
pub async fn insert_model(db: &DatabaseConnection, id: &str) -> Result<model::Model> {
    insert_model_with(db, id, AVAILABILITY_AVAILABLE, false).await
}

#[allow(dead_code)]
pub async fn insert_model_with(
    db: &DatabaseConnection,
    id: &str,
    availability: &str,
    restricted: bool,
) -> Result<model::Model> {
    let now = Utc::now();
    let row = model::ActiveModel {
        id: Set(id.to_string()),
        provider: Set("openai".to_string()),
        input_cost_per_token: Set(0.0000025),
        output_cost_per_token: Set(0.00001),
        context_length: Set(Some(128000)),
        supports_vision: Set(false),
        supports_function_calling: Set(true),
        supports_parallel_function_calling: Set(false),
        supports_tool_choice: Set(false),
        availability: Set(availability.to_string()),
        restricted_access: Set(restricted),
        external_model_id: Set(Some(format!("ext-{}", id))),
        description: Set(None),
        last_synced_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Ok(row.insert(db).await?)
}

#[allow(dead_code)]
pub async fn insert_subscription(
    db: &DatabaseConnection,
    user_id: Uuid,
    model_id: &str,
    status: &str,
) -> Result<subscription::Model> {
    let now = Utc::now();
    let row = subscription::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        model_id: Set(model_id.to_string()),
        status: Set(status.to_string()),
        status_reason: Set(None),
        status_changed_at: Set(None),
        status_changed_by: Set(None),
        requests_used: Set(0),
        requests_allotted: Set(None),
        tokens_used: Set(0),
        tokens_allotted: Set(None),
        max_budget: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Ok(row.insert(db).await?)
}

/// Inserts an active key whose hash matches its secret, linked to the given
/// models.
#[allow(dead_code)]
pub async fn insert_api_key(
    db: &DatabaseConnection,
    user_id: Uuid,
    secret: &str,
    model_ids: &[&str],
) -> Result<api_key::Model> {
    let now = Utc::now();
    let id = Uuid::new_v4();
    let row = api_key::ActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        name: Set("fixture key".to_string()),
        key_hash: Set(sha256_hex(secret)),
        key_prefix: Set(secret.chars().take(10).collect()),
        external_key_value: Set(secret.to_string()),
        external_key_alias: Set(format!("fixture-{}", id.simple())),
        subscription_id: Set(None),
        max_budget: Set(None),
        soft_budget: Set(None),
        budget_duration: Set(None),
        tpm_limit: Set(None),
        rpm_limit: Set(None),
        max_parallel_requests: Set(None),
        per_model_limits: Set(None),
        is_active: Set(true),
        expires_at: Set(None),
        revoked_at: Set(None),
        last_used_at: Set(None),
        sync_status: Set(sync_status::SYNCED.to_string()),
        sync_error: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let key = row.insert(db).await?;

    for model_id in model_ids {
        let link = api_key_model::ActiveModel {
            api_key_id: Set(id),
            model_id: Set(model_id.to_string()),
            created_at: Set(now.into()),
        };
        link.insert(db).await?;
    }

    Ok(key)
}

// --- proxy response fixtures ---

/// One `/model/info` data entry in the shape the proxy reports.
#[allow(dead_code)]
pub fn model_info_entry(name: &str, external_id: &str, input_cost: f64) -> serde_json::Value {
    serde_json::json!({
        "model_name": name,
        "litellm_params": { "model": format!("openai/{}", name) },
        "model_info": {
            "id": external_id,
            "litellm_provider": "openai",
            "input_cost_per_token": input_cost,
            "output_cost_per_token": 0.00001,
            "max_input_tokens": 128000,
            "supports_function_calling": true
        }
    })
}

/// A `/user/info` body for a user the proxy already knows.
#[allow(dead_code)]
pub fn existing_user_body(user_id: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "teams": [],
        "user_info": { "user_email": format!("{}@example.com", user_id) }
    })
}
