//! Audit Logger (spec §4.7).
//!
//! Every pipeline stage writes exactly one event through this module. Each
//! event is hash-chained to the previous one written by this process, then
//! appended as a single line of canonical JSON to a daily-rotating file
//! under a configurable directory, and mirrored into an in-memory trail
//! keyed by request-id so `get_trail` doesn't need to touch disk for an
//! in-flight request. Mirrors `audit_logger.py` exactly in write path and
//! read path (spec §9 open question: this crate's `verify_integrity` takes
//! the intact semantics in `audit_logger.py`'s only complete definition).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::types::{AuditEvent, AuditTrail, ComplianceReport, EventResult, EventType};

const LOG_FILE_EXTENSION: &str = "jsonl";

struct ChainState {
    last_hash: Option<String>,
    open_day: Option<NaiveDate>,
    file: Option<File>,
}

pub struct AuditLogger {
    log_dir: PathBuf,
    chain: Mutex<ChainState>,
    trails: Mutex<HashMap<String, Vec<AuditEvent>>>,
}

impl AuditLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)?;
        Ok(Self {
            log_dir,
            chain: Mutex::new(ChainState {
                last_hash: None,
                open_day: None,
                file: None,
            }),
            trails: Mutex::new(HashMap::new()),
        })
    }

    fn day_file_path(&self, day: NaiveDate) -> PathBuf {
        self.log_dir.join(format!("audit_{}.{}", day.format("%Y%m%d"), LOG_FILE_EXTENSION))
    }

    /// Appends one event to the day file, updates the chain head, and
    /// mirrors it into the in-memory trail — all under a single lock per
    /// spec §5's "(compute-hash -> write-line -> update-head)" critical
    /// section, so concurrent events from different requests still form a
    /// well-defined total order on disk.
    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        request_id: Option<&str>,
        user_id: Option<&str>,
        project_id: Option<&str>,
        agent_id: Option<&str>,
        event_type: EventType,
        details: serde_json::Value,
        context_snapshot: serde_json::Value,
        result: EventResult,
        error: Option<String>,
    ) -> Result<AuditEvent> {
        let mut event = AuditEvent {
            log_id: new_log_id(),
            request_id: request_id.map(String::from),
            user_id: user_id.map(String::from),
            project_id: project_id.map(String::from),
            agent_id: agent_id.map(String::from),
            event_type,
            details,
            context_snapshot,
            result,
            error,
            timestamp: Utc::now(),
            previous_hash: None,
            entry_hash: None,
        };

        {
            let mut chain = self.chain.lock().unwrap();
            let today = event.timestamp.date_naive();
            if chain.open_day != Some(today) {
                let file = OpenOptions::new().create(true).append(true).open(self.day_file_path(today))?;
                chain.open_day = Some(today);
                chain.file = Some(file);
            }

            event.previous_hash = chain.last_hash.clone();
            event.entry_hash = Some(event.calculate_hash());

            let line = serde_json::to_string(&event)?;
            let file = chain.file.as_mut().expect("day file opened above");
            writeln!(file, "{line}")?;
            file.flush()?;

            chain.last_hash = event.entry_hash.clone();
        }

        if let Some(request_id) = request_id {
            self.trails.lock().unwrap().entry(request_id.to_string()).or_default().push(event.clone());
        }

        Ok(event)
    }

    #[instrument(skip(self, request_details))]
    pub fn log_request_received(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        agent_id: Option<&str>,
        request_details: serde_json::Value,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            agent_id,
            EventType::RequestReceived,
            request_details,
            json!({"action": "request_received"}),
            EventResult::Success,
            None,
        )
    }

    #[instrument(skip(self, results))]
    pub fn log_policy_check(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        policies_checked: &[String],
        results: serde_json::Value,
        compliant: bool,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::PolicyCheck,
            json!({
                "policies_checked": policies_checked,
                "results": results,
                "compliant": compliant,
            }),
            json!({"action": "policy_validation"}),
            if compliant { EventResult::Success } else { EventResult::Failure },
            (!compliant).then(|| "policy violations detected".to_string()),
        )
    }

    #[instrument(skip(self))]
    pub fn log_budget_check(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        estimated_cost: Decimal,
        available_budget: Decimal,
        budget_approved: bool,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::BudgetCheck,
            json!({
                "estimated_cost": estimated_cost.to_string(),
                "available_budget": available_budget.to_string(),
                "budget_approved": budget_approved,
            }),
            json!({"action": "budget_check"}),
            if budget_approved { EventResult::Success } else { EventResult::Failure },
            (!budget_approved).then(|| "insufficient budget".to_string()),
        )
    }

    #[instrument(skip(self, risk_factors))]
    pub fn log_risk_assessment(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        risk_score: f64,
        risk_factors: serde_json::Value,
        risk_category: &str,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::RiskAssessment,
            json!({
                "risk_score": risk_score,
                "risk_factors": risk_factors,
                "risk_category": risk_category,
            }),
            json!({"action": "risk_assessment"}),
            EventResult::Success,
            None,
        )
    }

    #[instrument(skip(self, decision_details))]
    #[allow(clippy::too_many_arguments)]
    pub fn log_agent_decision(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        agent_id: &str,
        tier: &str,
        decision: &str,
        reasoning: &str,
        decision_details: serde_json::Value,
    ) -> Result<AuditEvent> {
        let mut details = json!({
            "tier": tier,
            "decision": decision,
            "reasoning": reasoning,
        });
        if let (Some(obj), Some(extra)) = (details.as_object_mut(), decision_details.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }

        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            Some(agent_id),
            EventType::AgentDecision,
            details,
            json!({"action": "agent_decision"}),
            EventResult::Success,
            None,
        )
    }

    #[instrument(skip(self))]
    pub fn log_payment_reserved(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        amount: Decimal,
        tx_ref: &str,
        reservation_id: &str,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::PaymentReserved,
            json!({
                "amount": amount.to_string(),
                "tx_ref": tx_ref,
                "reservation_id": reservation_id,
            }),
            json!({"action": "payment_reserved"}),
            EventResult::Success,
            None,
        )
    }

    #[instrument(skip(self))]
    pub fn log_payment_completed(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        estimated_amount: Decimal,
        actual_amount: Decimal,
        variance_amount: Decimal,
        variance_percent: f64,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::PaymentCompleted,
            json!({
                "estimated_amount": estimated_amount.to_string(),
                "actual_amount": actual_amount.to_string(),
                "variance_amount": variance_amount.to_string(),
                "variance_percent": variance_percent,
            }),
            json!({"action": "payment_completed"}),
            EventResult::Success,
            None,
        )
    }

    #[instrument(skip(self, response_details))]
    pub fn log_api_call_success(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        provider: &str,
        model: &str,
        actual_cost: Decimal,
        response_details: serde_json::Value,
    ) -> Result<AuditEvent> {
        let mut details = json!({
            "provider": provider,
            "model": model,
            "actual_cost": actual_cost.to_string(),
        });
        if let (Some(obj), Some(extra)) = (details.as_object_mut(), response_details.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }

        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::ApiCallSuccess,
            details,
            json!({"action": "api_call_success"}),
            EventResult::Success,
            None,
        )
    }

    #[instrument(skip(self))]
    pub fn log_api_call_failed(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        provider: &str,
        model: &str,
        error: &str,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::ApiCallFailed,
            json!({"provider": provider, "model": model, "error": error}),
            json!({"action": "api_call_failed"}),
            EventResult::Failure,
            Some(error.to_string()),
        )
    }

    #[instrument(skip(self, error_details))]
    pub fn log_error(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: &str,
        error: &str,
        error_details: serde_json::Value,
    ) -> Result<AuditEvent> {
        self.append(
            Some(request_id),
            Some(user_id),
            Some(project_id),
            None,
            EventType::Error,
            error_details,
            json!({"action": "error"}),
            EventResult::Failure,
            Some(error.to_string()),
        )
    }

    /// Prefers the in-memory trail; falls back to scanning day files in
    /// chronological order and rebuilding it (spec §4.7 read path).
    pub fn get_trail(&self, request_id: &str) -> Result<Option<AuditTrail>> {
        if let Some(events) = self.trails.lock().unwrap().get(request_id) {
            if !events.is_empty() {
                return Ok(Some(AuditTrail {
                    request_id: request_id.to_string(),
                    events: events.clone(),
                }));
            }
        }

        let mut events = Vec::new();
        for path in self.day_files()? {
            for event in read_events(&path)? {
                if event.request_id.as_deref() == Some(request_id) {
                    events.push(event);
                }
            }
        }

        if events.is_empty() {
            Ok(None)
        } else {
            Ok(Some(AuditTrail {
                request_id: request_id.to_string(),
                events,
            }))
        }
    }

    /// Scans day files, filters by principal/project/time window, and
    /// aggregates the counters in spec §4.7 / §8 property 9.
    pub fn compliance_report(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ComplianceReport> {
        let mut report = ComplianceReport {
            user_id: user_id.to_string(),
            project_id: project_id.map(String::from),
            from,
            to,
            total_requests: 0,
            approved_requests: 0,
            rejected_requests: 0,
            total_spending: Decimal::ZERO,
            policy_violations: 0,
            risk_alerts: 0,
            payment_failures: 0,
            api_failures: 0,
            requests: Vec::new(),
        };

        let mut by_request: HashMap<String, Vec<AuditEvent>> = HashMap::new();

        for path in self.day_files()? {
            for event in read_events(&path)? {
                if event.user_id.as_deref() != Some(user_id) {
                    continue;
                }
                if event.timestamp < from || event.timestamp > to {
                    continue;
                }
                if let Some(project_id) = project_id {
                    if event.project_id.as_deref() != Some(project_id) {
                        continue;
                    }
                }

                match event.event_type {
                    EventType::RequestReceived => report.total_requests += 1,
                    EventType::PolicyCheck => {
                        if matches!(event.result, EventResult::Failure) {
                            report.policy_violations += 1;
                        }
                    }
                    EventType::RiskAssessment => {
                        let category = event.details.get("risk_category").and_then(|v| v.as_str()).unwrap_or("");
                        if matches!(category, "high" | "critical") {
                            report.risk_alerts += 1;
                        }
                    }
                    EventType::AgentDecision => {
                        match event.details.get("decision").and_then(|v| v.as_str()) {
                            Some("approve") => report.approved_requests += 1,
                            Some("reject") => report.rejected_requests += 1,
                            _ => {}
                        }
                    }
                    EventType::PaymentReserved => {
                        if let Some(amount) = event.details.get("amount").and_then(|v| v.as_str()) {
                            if let Ok(amount) = amount.parse::<Decimal>() {
                                report.total_spending += amount;
                            }
                        }
                    }
                    EventType::ApiCallFailed => report.api_failures += 1,
                    EventType::Error => {
                        if event.details.get("exception_type").and_then(|v| v.as_str()) == Some("PaymentError") {
                            report.payment_failures += 1;
                        }
                    }
                    _ => {}
                }

                if let Some(request_id) = event.request_id.clone() {
                    by_request.entry(request_id).or_default().push(event);
                }
            }
        }

        report.requests = by_request
            .into_iter()
            .map(|(request_id, events)| AuditTrail { request_id, events })
            .collect();
        report.requests.sort_by(|a, b| a.request_id.cmp(&b.request_id));

        Ok(report)
    }

    fn day_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        if !self.log_dir.exists() {
            return Ok(paths);
        }
        for entry in fs::read_dir(&self.log_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_day_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("audit_") && n.ends_with(LOG_FILE_EXTENSION))
                .unwrap_or(false);
            if is_day_file {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn read_events(path: &Path) -> Result<Vec<AuditEvent>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEvent>(&line) {
            Ok(event) => events.push(event),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unparseable audit line"),
        }
    }
    Ok(events)
}

fn new_log_id() -> String {
    format!("log_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[test]
    fn events_for_one_request_chain_and_verify() {
        let dir = tempdir().unwrap();
        let logger = AuditLogger::new(dir.path()).unwrap();

        logger.log_request_received("req1", "u1", "p1", None, json!({"provider": "openai"})).unwrap();
        logger.log_budget_check("req1", "u1", "p1", dec!(0.01), dec!(50), true).unwrap();
        logger
            .log_agent_decision("req1", "u1", "p1", "flash-1", "fast", "approve", "looks fine", json!({}))
            .unwrap();

        let trail = logger.get_trail("req1").unwrap().expect("trail exists");
        assert_eq!(trail.events.len(), 3);
        assert!(trail.verify_integrity());
        assert_eq!(trail.events[0].previous_hash, None);
        assert_eq!(trail.events[1].previous_hash, trail.events[0].entry_hash);
        assert_eq!(trail.events[2].previous_hash, trail.events[1].entry_hash);
    }

    #[test]
    fn different_requests_still_chain_through_one_process_wide_head() {
        let dir = tempdir().unwrap();
        let logger = AuditLogger::new(dir.path()).unwrap();

        logger.log_request_received("req1", "u1", "p1", None, json!({})).unwrap();
        logger.log_request_received("req2", "u1", "p1", None, json!({})).unwrap();

        let trail1 = logger.get_trail("req1").unwrap().unwrap();
        let trail2 = logger.get_trail("req2").unwrap().unwrap();
        assert_eq!(trail2.events[0].previous_hash, trail1.events[0].entry_hash);
    }

    #[test]
    fn get_trail_rebuilds_from_disk_when_cache_is_cold() {
        let dir = tempdir().unwrap();
        {
            let logger = AuditLogger::new(dir.path()).unwrap();
            logger.log_request_received("req1", "u1", "p1", None, json!({})).unwrap();
            logger.log_error("req1", "u1", "p1", "boom", json!({"exception_type": "UpstreamError"})).unwrap();
        }

        let reopened = AuditLogger::new(dir.path()).unwrap();
        let trail = reopened.get_trail("req1").unwrap().expect("trail rebuilt from disk");
        assert_eq!(trail.events.len(), 2);
        assert!(trail.verify_integrity());
    }

    #[test]
    fn compliance_report_aggregates_by_user_and_window() {
        let dir = tempdir().unwrap();
        let logger = AuditLogger::new(dir.path()).unwrap();

        logger.log_request_received("req1", "u1", "p1", None, json!({})).unwrap();
        logger.log_policy_check("req1", "u1", "p1", &["allowed_providers".to_string()], json!({}), false).unwrap();
        logger
            .log_agent_decision("req1", "u1", "p1", "flash-1", "fast", "reject", "denied", json!({}))
            .unwrap();

        logger.log_request_received("req2", "u1", "p1", None, json!({})).unwrap();
        logger.log_payment_reserved("req2", "u1", "p1", dec!(1.5), "0xabc", "resv1").unwrap();
        logger
            .log_agent_decision("req2", "u1", "p1", "pro-1", "deep", "approve", "looks fine", json!({}))
            .unwrap();

        let report = logger
            .compliance_report("u1", Some("p1"), Utc::now() - chrono::Duration::hours(1), Utc::now() + chrono::Duration::hours(1))
            .unwrap();

        assert_eq!(report.total_requests, 2);
        assert_eq!(report.policy_violations, 1);
        assert_eq!(report.rejected_requests, 1);
        assert_eq!(report.approved_requests, 1);
        assert_eq!(report.total_spending, dec!(1.5));
        assert_eq!(report.requests.len(), 2);
    }
}
