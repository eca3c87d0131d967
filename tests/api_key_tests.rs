//! Integration tests for the API key lifecycle: admission checks, proxy-first
//! ordering, rotation, validation, and the legacy hash repair pass.

use llm_admin::models::api_key::{self, sync_status, Entity as ApiKey};
use llm_admin::models::subscription::status as sub_status;
use llm_admin::repositories::ApiKeyRepository;
use llm_admin::services::api_keys::CreateKeyRequest;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_utils;
use test_utils::{
    build_services, existing_user_body, insert_api_key, insert_model, insert_subscription,
    insert_user, setup_test_db_arc, sha256_hex, test_config,
};

async fn mount_user_exists(server: &MockServer, user_id: &str) {
    Mock::given(method("GET"))
        .and(path("/user/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(existing_user_body(user_id)))
        .mount(server)
        .await;
}

async fn mount_key_generate(server: &MockServer, secret: &str) {
    Mock::given(method("POST"))
        .and(path("/key/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "key": secret })))
        .mount(server)
        .await;
}

fn multi_model_request(name: &str, model_ids: &[&str]) -> CreateKeyRequest {
    serde_json::from_value(json!({
        "name": name,
        "model_ids": model_ids,
        "max_budget": 50.0
    }))
    .unwrap()
}

#[tokio::test]
async fn test_create_api_key_happy_path() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();

    mount_user_exists(&server, &user.id.to_string()).await;
    mount_key_generate(&server, "sk-proxy-issued-secret-0001").await;

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let created = services
        .api_keys
        .create_api_key(user.id, multi_model_request("prod key", &["gpt-4o"]), None)
        .await
        .unwrap();

    assert_eq!(created.key, "sk-proxy-issued-secret-0001");
    assert_eq!(created.key_prefix, "sk-proxy-i");
    assert_eq!(created.models, vec!["gpt-4o"]);
    assert_eq!(created.max_budget, Some(50.0));
    assert!(created.key_alias.starts_with("prod-key-"));

    // Hash invariant: key_hash is always sha256 of the proxy-issued secret.
    let repo = ApiKeyRepository::new(Arc::clone(&db));
    let row = repo.find_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(row.key_hash, sha256_hex("sk-proxy-issued-secret-0001"));
    assert_eq!(row.sync_status, sync_status::SYNCED);
    assert!(row.is_active);
    assert_eq!(repo.model_ids_for_key(&created.id).await.unwrap(), vec!["gpt-4o"]);
}

#[tokio::test]
async fn test_create_rejects_missing_subscription() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_model(&db, "claude-sonnet").await.unwrap();
    insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let err = services
        .api_keys
        .create_api_key(
            user.id,
            multi_model_request("prod key", &["gpt-4o", "claude-sonnet"]),
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
    let details = err.details.unwrap();
    assert_eq!(
        details.get("missing_model_ids"),
        Some(&json!(["claude-sonnet"]))
    );

    // Nothing was persisted and the proxy was never asked for a key.
    let repo = ApiKeyRepository::new(db);
    assert!(repo.find_by_user(&user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_rejects_pending_subscription() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_subscription(&db, user.id, "gpt-4o", sub_status::PENDING)
        .await
        .unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let err = services
        .api_keys
        .create_api_key(user.id, multi_model_request("prod key", &["gpt-4o"]), None)
        .await
        .unwrap_err();
    assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_create_enforces_active_key_ceiling() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();
    insert_api_key(&db, user.id, "sk-existing-key-00001", &["gpt-4o"])
        .await
        .unwrap();

    let mut config = test_config(&server.uri());
    config.keys.max_keys_per_user = 1;

    let services = build_services(Arc::clone(&db), config).unwrap();
    let err = services
        .api_keys
        .create_api_key(user.id, multi_model_request("second key", &["gpt-4o"]), None)
        .await
        .unwrap_err();

    assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
    assert!(err.message.contains("limit"));
}

#[tokio::test]
async fn test_create_accepts_legacy_request_shape() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    let sub = insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();

    mount_user_exists(&server, &user.id.to_string()).await;
    mount_key_generate(&server, "sk-legacy-shaped-00001").await;

    let request: CreateKeyRequest = serde_json::from_value(json!({
        "name": "old client key",
        "subscription_id": sub.id
    }))
    .unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let created = services
        .api_keys
        .create_api_key(user.id, request, None)
        .await
        .unwrap();

    // The legacy shape resolves to the subscription's single model.
    assert_eq!(created.models, vec!["gpt-4o"]);
    let row = ApiKeyRepository::new(db)
        .find_by_id(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.subscription_id, Some(sub.id));
}

#[tokio::test]
async fn test_proxy_failure_on_generate_persists_nothing() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();

    mount_user_exists(&server, &user.id.to_string()).await;
    Mock::given(method("POST"))
        .and(path("/key/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let err = services
        .api_keys
        .create_api_key(user.id, multi_model_request("prod key", &["gpt-4o"]), None)
        .await
        .unwrap_err();

    assert_eq!(err.status, axum::http::StatusCode::SERVICE_UNAVAILABLE);
    let repo = ApiKeyRepository::new(db);
    assert!(repo.find_by_user(&user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_key_models_hits_proxy_first() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_model(&db, "claude-sonnet").await.unwrap();
    insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();
    insert_subscription(&db, user.id, "claude-sonnet", sub_status::ACTIVE)
        .await
        .unwrap();
    let key = insert_api_key(&db, user.id, "sk-update-target-0001", &["gpt-4o"])
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/key/update"))
        .and(body_partial_json(json!({
            "key": "sk-update-target-0001",
            "models": ["claude-sonnet"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let updated = services
        .api_keys
        .update_api_key(
            user.id,
            key.id,
            None,
            Some(vec!["claude-sonnet".to_string()]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(updated.models, vec!["claude-sonnet"]);
}

#[tokio::test]
async fn test_update_key_models_keeps_local_state_on_proxy_rejection() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_model(&db, "claude-sonnet").await.unwrap();
    insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();
    insert_subscription(&db, user.id, "claude-sonnet", sub_status::ACTIVE)
        .await
        .unwrap();
    let key = insert_api_key(&db, user.id, "sk-update-target-0002", &["gpt-4o"])
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/key/update"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "model not allowed for team" }
        })))
        .mount(&server)
        .await;

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let err = services
        .api_keys
        .update_api_key(
            user.id,
            key.id,
            None,
            Some(vec!["claude-sonnet".to_string()]),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");

    let repo = ApiKeyRepository::new(db);
    assert_eq!(repo.model_ids_for_key(&key.id).await.unwrap(), vec!["gpt-4o"]);
}

#[tokio::test]
async fn test_delete_key_tolerates_proxy_absence() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    let key = insert_api_key(&db, user.id, "sk-delete-target-0001", &["gpt-4o"])
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/key/delete"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "detail": { "error": "key not found" }
        })))
        .mount(&server)
        .await;

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    services
        .api_keys
        .delete_api_key(user.id, key.id, None)
        .await
        .unwrap();

    let row = ApiKey::find_by_id(key.id).one(&*db).await.unwrap().unwrap();
    assert!(!row.is_active);
    assert!(row.revoked_at.is_some());
}

#[tokio::test]
async fn test_key_ownership_is_enforced() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let owner = insert_user(&db, "owner@example.com").await.unwrap();
    let other = insert_user(&db, "other@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    let key = insert_api_key(&db, owner.id, "sk-owned-key-000001", &["gpt-4o"])
        .await
        .unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let err = services
        .api_keys
        .retrieve_full_key(other.id, key.id, None)
        .await
        .unwrap_err();
    // Cross-user access reads as absence, not as forbidden.
    assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rotate_key_swaps_secret_and_keeps_hash_invariant() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    let key = insert_api_key(&db, user.id, "sk-old-secret-000001", &["gpt-4o"])
        .await
        .unwrap();

    mount_key_generate(&server, "sk-new-secret-000001").await;
    Mock::given(method("POST"))
        .and(path("/key/delete"))
        .and(body_partial_json(json!({ "keys": ["sk-old-secret-000001"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let rotated = services
        .api_keys
        .rotate_api_key(user.id, key.id, None)
        .await
        .unwrap();

    assert_eq!(rotated.id, key.id);
    assert_eq!(rotated.key, "sk-new-secret-000001");

    let row = ApiKey::find_by_id(key.id).one(&*db).await.unwrap().unwrap();
    assert_eq!(row.external_key_value, "sk-new-secret-000001");
    assert_eq!(row.key_hash, sha256_hex("sk-new-secret-000001"));
    assert_ne!(row.external_key_alias, key.external_key_alias);
}

#[tokio::test]
async fn test_rotate_cleans_up_proxy_key_when_local_swap_fails() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    // An existing key already holds the hash the rotation will produce, so
    // the local row swap trips the unique key_hash constraint.
    insert_api_key(&db, user.id, "sk-colliding-secret1", &["gpt-4o"])
        .await
        .unwrap();
    let key = insert_api_key(&db, user.id, "sk-rotating-key-0001", &["gpt-4o"])
        .await
        .unwrap();

    mount_key_generate(&server, "sk-colliding-secret1").await;
    // The only delete allowed is the cleanup of the newly generated secret;
    // the old key is never deleted on this path.
    Mock::given(method("POST"))
        .and(path("/key/delete"))
        .and(body_partial_json(json!({ "keys": ["sk-colliding-secret1"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let err = services
        .api_keys
        .rotate_api_key(user.id, key.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.code.as_ref(), "INTERNAL_SERVER_ERROR");

    // The rotating key still carries its original secret and stays usable.
    let row = ApiKey::find_by_id(key.id).one(&*db).await.unwrap().unwrap();
    assert_eq!(row.external_key_value, "sk-rotating-key-0001");
    assert_eq!(row.key_hash, sha256_hex("sk-rotating-key-0001"));
    assert_eq!(row.external_key_alias, key.external_key_alias);
    assert!(row.is_active);
}

#[tokio::test]
async fn test_rotate_revoked_key_is_rejected() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    let key = insert_api_key(&db, user.id, "sk-revoked-key-00001", &["gpt-4o"])
        .await
        .unwrap();
    ApiKeyRepository::new(Arc::clone(&db))
        .deactivate(&key.id)
        .await
        .unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let err = services
        .api_keys
        .rotate_api_key(user.id, key.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_validate_api_key_paths() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_api_key(&db, user.id, "sk-validate-me-00001", &["gpt-4o"])
        .await
        .unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();

    let ok = services
        .api_keys
        .validate_api_key("sk-validate-me-00001")
        .await
        .unwrap();
    assert!(ok.is_valid);
    assert_eq!(ok.model_ids, vec!["gpt-4o"]);

    let wrong_prefix = services.api_keys.validate_api_key("pk-whatever").await.unwrap();
    assert!(!wrong_prefix.is_valid);
    assert_eq!(wrong_prefix.error.as_deref(), Some("malformed key"));

    let unknown = services
        .api_keys
        .validate_api_key("sk-unknown-key-00001")
        .await
        .unwrap();
    assert!(!unknown.is_valid);
    assert_eq!(unknown.error.as_deref(), Some("unknown key"));

    // Validation touches last_used_at.
    let row = ApiKeyRepository::new(db)
        .find_by_key_hash(&sha256_hex("sk-validate-me-00001"))
        .await
        .unwrap()
        .unwrap();
    assert!(row.last_used_at.is_some());
}

#[tokio::test]
async fn test_validate_falls_back_to_legacy_subscription() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    let sub = insert_subscription(&db, user.id, "gpt-4o", sub_status::ACTIVE)
        .await
        .unwrap();

    // Legacy key: no join rows, just the subscription pointer.
    let key = insert_api_key(&db, user.id, "sk-legacy-key-000001", &[])
        .await
        .unwrap();
    let mut active: api_key::ActiveModel = key.into();
    active.subscription_id = Set(Some(sub.id));
    active.update(&*db).await.unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let outcome = services
        .api_keys
        .validate_api_key("sk-legacy-key-000001")
        .await
        .unwrap();
    assert!(outcome.is_valid);
    assert_eq!(outcome.model_ids, vec!["gpt-4o"]);

    // An inactive legacy subscription invalidates the key.
    services
        .subscriptions
        .list_user_subscriptions(user.id)
        .await
        .unwrap();
    llm_admin::repositories::SubscriptionRepository::new(Arc::clone(&db))
        .set_status(&sub.id, sub_status::SUSPENDED, None, None)
        .await
        .unwrap();
    let outcome = services
        .api_keys
        .validate_api_key("sk-legacy-key-000001")
        .await
        .unwrap();
    assert!(!outcome.is_valid);
}

#[tokio::test]
async fn test_replace_model_links_rolls_back_on_failure() {
    let db = setup_test_db_arc().await.unwrap();

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    insert_model(&db, "claude-sonnet").await.unwrap();
    let key = insert_api_key(&db, user.id, "sk-link-rollback-001", &["gpt-4o"])
        .await
        .unwrap();

    // The duplicate entry violates the composite primary key after the
    // delete has already run; the whole replacement must roll back.
    let repo = ApiKeyRepository::new(Arc::clone(&db));
    let result = repo
        .replace_model_links(
            &key.id,
            &["claude-sonnet".to_string(), "claude-sonnet".to_string()],
        )
        .await;
    assert!(result.is_err());

    assert_eq!(repo.model_ids_for_key(&key.id).await.unwrap(), vec!["gpt-4o"]);
}

#[tokio::test]
async fn test_repair_legacy_key_hashes() {
    let db = setup_test_db_arc().await.unwrap();
    let server = MockServer::start().await;

    let user = insert_user(&db, "casey@example.com").await.unwrap();
    insert_model(&db, "gpt-4o").await.unwrap();
    let good = insert_api_key(&db, user.id, "sk-good-hash-000001", &["gpt-4o"])
        .await
        .unwrap();
    let bad = insert_api_key(&db, user.id, "sk-bad-hash-0000001", &["gpt-4o"])
        .await
        .unwrap();

    // Simulate a legacy row hashed from a locally generated value.
    let mut active: api_key::ActiveModel = bad.clone().into();
    active.key_hash = Set(sha256_hex("some-local-placeholder"));
    active.update(&*db).await.unwrap();

    let services = build_services(Arc::clone(&db), test_config(&server.uri())).unwrap();
    let repaired = services.api_keys.repair_legacy_key_hashes().await.unwrap();
    assert_eq!(repaired, 1);

    let repo = ApiKeyRepository::new(db);
    let bad = repo.find_by_id(&bad.id).await.unwrap().unwrap();
    assert_eq!(bad.key_hash, sha256_hex("sk-bad-hash-0000001"));
    let good = repo.find_by_id(&good.id).await.unwrap().unwrap();
    assert_eq!(good.key_hash, sha256_hex("sk-good-hash-000001"));
}
