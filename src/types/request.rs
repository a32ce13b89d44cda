use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An inbound request to spend money calling an upstream LLM provider on
/// behalf of a user/project, optionally on behalf of an agent acting under
/// that project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DecisionRequest {
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub user_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    pub api_provider: String,
    pub model_name: String,
    pub operation_type: String,

    #[serde(default)]
    pub request_params: HashMap<String, serde_json::Value>,

    /// Caller-supplied estimate of input size, validated structurally
    /// (`0..=1_000_000`, spec §4.1 step 1) and preferred by the pricing
    /// engine over deriving a count from `request_params["prompt"]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,

    /// Caller-supplied hint; the pricing engine re-estimates regardless.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output_tokens: Option<u64>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

impl DecisionRequest {
    /// Deterministic fingerprint used for idempotency/caching, mirroring
    /// the original system's `APIRequest.get_fingerprint`.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut params: Vec<(String, serde_json::Value)> = self
            .request_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let components = format!(
            "{}|{}|{}|{}|{}|{:?}",
            self.user_id, self.project_id, self.api_provider, self.model_name, self.operation_type, params
        );

        let mut hasher = Sha256::new();
        hasher.update(components.as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_identical_requests() {
        let mut req = DecisionRequest {
            request_id: "req_1".into(),
            user_id: "u1".into(),
            project_id: "p1".into(),
            agent_id: None,
            api_provider: "openai".into(),
            model_name: "gpt-4".into(),
            operation_type: "chat".into(),
            request_params: HashMap::new(),
            estimated_tokens: None,
            expected_output_tokens: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        };
        let a = req.fingerprint();
        req.request_id = "req_2".into();
        let b = req.fingerprint();
        assert_eq!(a, b, "fingerprint must not depend on request_id");
    }
}
