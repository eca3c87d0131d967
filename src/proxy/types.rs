//! Wire types and response normalizers for the proxy admin API.
//!
//! Different proxy versions wrap some responses differently (flat object vs.
//! `{key, info}` envelope); the normalizers here fold both into one canonical
//! internal shape so callers never branch on response shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Canonical model description as reported by the proxy's `/model/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyModel {
    /// The proxy-side model name; doubles as our catalog id
    pub name: String,
    /// Upstream provider inferred by the proxy
    pub provider: String,
    /// The proxy's internal model identifier; changes when a model is
    /// deleted and recreated under the same name
    pub external_id: Option<String>,
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    pub context_length: Option<i32>,
    pub supports_vision: bool,
    pub supports_function_calling: bool,
    pub supports_parallel_function_calling: bool,
    pub supports_tool_choice: bool,
    /// Proxy-provided description; only used to fill a locally-empty one
    pub description: Option<String>,
}

impl ProxyModel {
    /// Parse one entry of the `/model/info` data array.
    ///
    /// Entries nest the interesting fields across `litellm_params` (routing
    /// and pricing) and `model_info` (capabilities and the internal id).
    pub fn from_info_entry(entry: &JsonValue) -> Option<Self> {
        let name = entry.get("model_name")?.as_str()?.to_string();
        let params = entry.get("litellm_params").cloned().unwrap_or_default();
        let info = entry.get("model_info").cloned().unwrap_or_default();

        let provider = info
            .get("litellm_provider")
            .and_then(JsonValue::as_str)
            .or_else(|| {
                params
                    .get("model")
                    .and_then(JsonValue::as_str)
                    .and_then(|m| m.split('/').next())
            })
            .unwrap_or("unknown")
            .to_string();

        Some(Self {
            name,
            provider,
            external_id: info
                .get("id")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            input_cost_per_token: read_f64(&info, "input_cost_per_token")
                .or_else(|| read_f64(&params, "input_cost_per_token"))
                .unwrap_or(0.0),
            output_cost_per_token: read_f64(&info, "output_cost_per_token")
                .or_else(|| read_f64(&params, "output_cost_per_token"))
                .unwrap_or(0.0),
            context_length: info
                .get("max_input_tokens")
                .or_else(|| info.get("max_tokens"))
                .and_then(JsonValue::as_i64)
                .map(|v| v as i32),
            supports_vision: read_flag(&info, "supports_vision"),
            supports_function_calling: read_flag(&info, "supports_function_calling"),
            supports_parallel_function_calling: read_flag(
                &info,
                "supports_parallel_function_calling",
            ),
            supports_tool_choice: read_flag(&info, "supports_tool_choice"),
            description: info
                .get("description")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
        })
    }
}

fn read_f64(value: &JsonValue, field: &str) -> Option<f64> {
    value.get(field).and_then(JsonValue::as_f64)
}

fn read_flag(value: &JsonValue, field: &str) -> bool {
    value.get(field).and_then(JsonValue::as_bool).unwrap_or(false)
}

/// Request body for `/key/generate`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateKeyRequest {
    pub models: Vec<String>,
    pub key_alias: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpm_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_requests: Option<i32>,
    /// ISO-8601 duration accepted by the proxy (e.g., "30d")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Per-model budget overrides, keyed by model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_max_budget: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub guardrails: Vec<String>,
}

/// Response of `/key/generate`: the one moment the plaintext secret exists.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedKey {
    pub key: String,
    #[serde(default)]
    pub key_alias: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
}

/// Canonical key info, normalized from either response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(default)]
    pub key_alias: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub max_budget: Option<f64>,
    #[serde(default)]
    pub tpm_limit: Option<i64>,
    #[serde(default)]
    pub rpm_limit: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Fold the two `/key/info` envelope shapes into [`KeyInfo`].
///
/// Older proxies return the info object flat; newer ones wrap it as
/// `{"key": "...", "info": {...}}`.
pub fn normalize_key_info(raw: &JsonValue) -> Option<KeyInfo> {
    let info = match raw.get("info") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    };

    if !info.is_object() {
        return None;
    }

    serde_json::from_value(info.clone()).ok()
}

/// Canonical user record from `/user/info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyUserInfo {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub teams: Vec<JsonValue>,
    #[serde(default)]
    pub user_info: Option<JsonValue>,
}

impl ProxyUserInfo {
    /// The proxy answers HTTP 200 with placeholder data for any identifier
    /// rather than 404; an empty teams array with no user_info payload means
    /// the user does not actually exist.
    pub fn exists(&self) -> bool {
        if self.teams.is_empty() {
            return self
                .user_info
                .as_ref()
                .map(|info| info.is_object() && !info.as_object().is_none_or(|o| o.is_empty()))
                .unwrap_or(false);
        }
        true
    }
}

/// Fold the two `/user/info` envelope shapes into [`ProxyUserInfo`].
pub fn normalize_user_info(raw: &JsonValue) -> Option<ProxyUserInfo> {
    serde_json::from_value(raw.clone()).ok()
}

/// Per-day activity metrics from `/user/daily/activity`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyActivityDay {
    pub date: String,
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default)]
    pub api_requests: i64,
    /// Per-model breakdown for the day, keyed by model name
    #[serde(default)]
    pub models: BTreeMap<String, JsonValue>,
}

/// Accumulated daily-activity report across all pages.
///
/// `metadata` carries the proxy-supplied aggregates verbatim; they are not
/// recomputed locally so our totals can never drift from the proxy's own
/// rounding and aggregation rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyActivityReport {
    pub days: Vec<DailyActivityDay>,
    pub metadata: JsonValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_from_info_entry() {
        let entry = json!({
            "model_name": "gpt-4o",
            "litellm_params": { "model": "openai/gpt-4o" },
            "model_info": {
                "id": "abc-123",
                "litellm_provider": "openai",
                "input_cost_per_token": 0.0000025,
                "output_cost_per_token": 0.00001,
                "max_input_tokens": 128000,
                "supports_vision": true,
                "supports_function_calling": true
            }
        });

        let model = ProxyModel::from_info_entry(&entry).unwrap();
        assert_eq!(model.name, "gpt-4o");
        assert_eq!(model.provider, "openai");
        assert_eq!(model.external_id.as_deref(), Some("abc-123"));
        assert_eq!(model.context_length, Some(128000));
        assert!(model.supports_vision);
        assert!(model.supports_function_calling);
        assert!(!model.supports_tool_choice);
    }

    #[test]
    fn test_model_provider_falls_back_to_route_prefix() {
        let entry = json!({
            "model_name": "claude-sonnet",
            "litellm_params": { "model": "anthropic/claude-sonnet" },
            "model_info": {}
        });

        let model = ProxyModel::from_info_entry(&entry).unwrap();
        assert_eq!(model.provider, "anthropic");
        assert_eq!(model.external_id, None);
    }

    #[test]
    fn test_model_entry_without_name_is_skipped() {
        assert!(ProxyModel::from_info_entry(&json!({"model_info": {}})).is_none());
    }

    #[test]
    fn test_normalize_key_info_flat_shape() {
        let raw = json!({
            "key_alias": "alias-1",
            "models": ["gpt-4o"],
            "spend": 1.25,
            "max_budget": 50.0
        });

        let info = normalize_key_info(&raw).unwrap();
        assert_eq!(info.key_alias.as_deref(), Some("alias-1"));
        assert_eq!(info.models, vec!["gpt-4o"]);
        assert_eq!(info.max_budget, Some(50.0));
    }

    #[test]
    fn test_normalize_key_info_wrapped_shape() {
        let raw = json!({
            "key": "sk-xyz",
            "info": {
                "key_alias": "alias-2",
                "models": ["gpt-4o", "claude-sonnet"],
                "spend": 0.0
            }
        });

        let info = normalize_key_info(&raw).unwrap();
        assert_eq!(info.key_alias.as_deref(), Some("alias-2"));
        assert_eq!(info.models.len(), 2);
    }

    #[test]
    fn test_user_exists_semantics() {
        let absent = normalize_user_info(&json!({ "user_id": "u1", "teams": [] })).unwrap();
        assert!(!absent.exists());

        let placeholder =
            normalize_user_info(&json!({ "user_id": "u1", "teams": [], "user_info": {} }))
                .unwrap();
        assert!(!placeholder.exists());

        let present = normalize_user_info(&json!({
            "user_id": "u1",
            "teams": [],
            "user_info": { "user_email": "u1@example.com" }
        }))
        .unwrap();
        assert!(present.exists());

        let with_team =
            normalize_user_info(&json!({ "user_id": "u1", "teams": [{"team_id": "t"}] }))
                .unwrap();
        assert!(with_team.exists());
    }
}
