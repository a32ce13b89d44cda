use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Closed audit event-type enumeration (spec §6), verbatim names from
/// `audit_logger.py::EventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RequestReceived,
    PolicyCheck,
    BudgetCheck,
    RiskAssessment,
    AgentDecision,
    PaymentReserved,
    PaymentCompleted,
    ApiCallSuccess,
    ApiCallFailed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventResult {
    Success,
    Failure,
    Warning,
}

/// A single hash-chained audit entry (spec §3, §4.7).
///
/// The hash covers every field except `entry_hash` itself, and includes
/// `previous_hash`, forming a tamper-evident chain: altering any entry
/// invalidates every hash after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditEvent {
    #[serde(default = "new_log_id")]
    pub log_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    pub event_type: EventType,
    #[serde(default)]
    pub details: serde_json::Value,
    /// A point-in-time snapshot of what the logging call site was doing
    /// (spec §3's `context_snapshot`), e.g. `{"action": "policy_validation"}`.
    /// Distinct from `details`, which carries the actual check results.
    #[serde(default)]
    pub context_snapshot: serde_json::Value,

    pub result: EventResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// ISO-8601 UTC with microsecond precision, per spec §4.7.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

fn new_log_id() -> String {
    format!("log_{}", Uuid::new_v4().simple())
}

/// The subset of fields that feed the hash, serialized through
/// `serde_json::Value` (whose `Map` is a `BTreeMap` when the
/// `preserve_order` feature is disabled, as it is here) so object keys
/// come out lexicographically sorted regardless of struct field order —
/// this is what makes the hash byte-for-byte reproducible across
/// implementations, per spec §4.7.
#[derive(Serialize)]
struct HashableContent<'a> {
    log_id: &'a str,
    request_id: Option<&'a str>,
    event_type: EventType,
    timestamp: String,
    details: &'a serde_json::Value,
    context_snapshot: &'a serde_json::Value,
    result: EventResult,
    previous_hash: &'a str,
}

impl AuditEvent {
    pub fn calculate_hash(&self) -> String {
        let content = HashableContent {
            log_id: &self.log_id,
            request_id: self.request_id.as_deref(),
            event_type: self.event_type,
            timestamp: self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            details: &self.details,
            context_snapshot: &self.context_snapshot,
            result: self.result,
            previous_hash: self.previous_hash.as_deref().unwrap_or(""),
        };

        let value = serde_json::to_value(&content).expect("audit content is always serializable");
        let canonical = serde_json::to_string(&value).expect("audit value is always serializable");

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// The totally ordered sequence of events sharing one request-id (spec §3,
/// glossary "Trail"). Rebuilt either from the in-memory cache or, on a
/// cache miss, from the day files on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditTrail {
    pub request_id: String,
    pub events: Vec<AuditEvent>,
}

impl AuditTrail {
    /// Recomputes every `entry_hash` and checks it against the stored
    /// value, and checks that each event's `previous_hash` equals the
    /// prior event's `entry_hash` (spec §4.7, §8 property 1).
    pub fn verify_integrity(&self) -> bool {
        let mut expected_previous: Option<&str> = None;
        for event in &self.events {
            if event.previous_hash.as_deref() != expected_previous {
                return false;
            }
            let recomputed = event.calculate_hash();
            match &event.entry_hash {
                Some(stored) if stored == &recomputed => {}
                _ => return false,
            }
            expected_previous = event.entry_hash.as_deref();
        }
        true
    }

    /// The index of the first event whose hash or chain link disagrees
    /// with what is stored, if any (spec §8 scenario S6: tamper detection
    /// should identify *which* event diverged, not just that the chain is
    /// broken).
    pub fn first_divergent_index(&self) -> Option<usize> {
        let mut expected_previous: Option<&str> = None;
        for (i, event) in self.events.iter().enumerate() {
            if event.previous_hash.as_deref() != expected_previous {
                return Some(i);
            }
            let recomputed = event.calculate_hash();
            match &event.entry_hash {
                Some(stored) if stored == &recomputed => {}
                _ => return Some(i),
            }
            expected_previous = event.entry_hash.as_deref();
        }
        None
    }
}

/// Aggregated compliance statistics over a time window (spec §4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub user_id: String,
    pub project_id: Option<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_requests: u64,
    pub approved_requests: u64,
    pub rejected_requests: u64,
    pub total_spending: Decimal,
    pub policy_violations: u64,
    pub risk_alerts: u64,
    pub payment_failures: u64,
    pub api_failures: u64,
    pub requests: Vec<AuditTrail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> AuditEvent {
        AuditEvent {
            log_id: "log_fixed".into(),
            request_id: Some("req_1".into()),
            user_id: None,
            project_id: None,
            agent_id: None,
            event_type: EventType::RequestReceived,
            details: serde_json::json!({"b": 1, "a": 2}),
            context_snapshot: serde_json::json!({"action": "request_received"}),
            result: EventResult::Success,
            error: None,
            timestamp: DateTime::parse_from_rfc3339("2026-01-01T00:00:00.000000Z")
                .unwrap()
                .with_timezone(&Utc),
            previous_hash: None,
            entry_hash: None,
        }
    }

    #[test]
    fn hash_is_deterministic_regardless_of_field_insertion_order() {
        let event = sample_event();
        let h1 = event.calculate_hash();
        let h2 = event.calculate_hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_changes_when_previous_hash_changes() {
        let mut event = sample_event();
        let h1 = event.calculate_hash();
        event.previous_hash = Some("something".into());
        let h2 = event.calculate_hash();
        assert_ne!(h1, h2);
    }

    fn chained_trail(len: usize) -> AuditTrail {
        let mut events = Vec::new();
        let mut previous_hash = None;
        for i in 0..len {
            let mut event = sample_event();
            event.log_id = format!("log_{i}");
            event.previous_hash = previous_hash.clone();
            event.entry_hash = Some(event.calculate_hash());
            previous_hash = event.entry_hash.clone();
            events.push(event);
        }
        AuditTrail {
            request_id: "req_1".into(),
            events,
        }
    }

    #[test]
    fn intact_trail_verifies() {
        assert!(chained_trail(3).verify_integrity());
    }

    #[test]
    fn tampering_with_an_event_breaks_verification_at_that_event() {
        let mut trail = chained_trail(3);
        trail.events[1].details = serde_json::json!({"tampered": true});
        assert!(!trail.verify_integrity());
        assert_eq!(trail.first_divergent_index(), Some(1));
    }
}
