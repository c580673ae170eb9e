//! Compliance report types and signing (spec §4.7).

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub product_name: String,
    pub version: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainVerificationSummary {
    pub verified: bool,
    pub total_events: u64,
    pub failed_at_index: Option<usize>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ApprovalStats {
    pub total: u64,
    pub granted: u64,
    pub denied: u64,
    pub expired: u64,
    pub avg_response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct HumanOversight {
    pub approval_requests: ApprovalStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub event_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub session_id: String,
    pub agent_id: String,
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CostUsage {
    pub total_usd: f64,
    pub by_agent: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionInfo {
    pub chain_intact: bool,
    pub oldest_event: Option<chrono::DateTime<chrono::Utc>>,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub version: u32,
    pub tenant_id: String,
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    pub system_info: SystemInfo,
    pub chain_verification: ChainVerificationSummary,
    pub human_oversight: HumanOversight,
    pub incidents: Vec<Incident>,
    pub cost_usage: CostUsage,
    pub retention: RetentionInfo,
    pub signature: Option<String>,
}

impl ComplianceReport {
    /// Sign everything but the signature field: `"hmac-sha256:" +
    /// HMAC_SHA256(signingKey, JSON.stringify(reportWithoutSignature))`.
    pub fn sign(mut self, signing_key: Option<&[u8]>) -> Self {
        self.signature = None;
        self.signature = signing_key.map(|key| {
            let body = serde_json::to_vec(&self).expect("report always serializes");
            let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
            mac.update(&body);
            format!("hmac-sha256:{}", hex::encode(mac.finalize().into_bytes()))
        });
        self
    }
}

/// `to - from <= 365 days`, otherwise the request is rejected (spec §4.7).
pub fn validate_range(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> Result<(), String> {
    if to < from {
        return Err("`to` must not precede `from`".to_string());
    }
    if (to - from) > chrono::Duration::days(365) {
        return Err("report range must not exceed 365 days".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> ComplianceReport {
        ComplianceReport {
            version: 1,
            tenant_id: "t_a".into(),
            from,
            to,
            system_info: SystemInfo {
                product_name: "AgentLens".into(),
                version: "0.1.0".into(),
                generated_at: to,
            },
            chain_verification: ChainVerificationSummary {
                verified: true,
                total_events: 0,
                failed_at_index: None,
                reason: None,
            },
            human_oversight: HumanOversight::default(),
            incidents: Vec::new(),
            cost_usage: CostUsage::default(),
            retention: RetentionInfo {
                chain_intact: true,
                oldest_event: None,
                retention_days: 30,
            },
            signature: None,
        }
    }

    #[test]
    fn unsigned_without_key() {
        let from = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let to = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let report = sample(from, to).sign(None);
        assert!(report.signature.is_none());
    }

    #[test]
    fn signed_with_key_has_prefix() {
        let from = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let to = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let report = sample(from, to).sign(Some(b"secret"));
        assert!(report.signature.unwrap().starts_with("hmac-sha256:"));
    }

    #[test]
    fn range_over_a_year_rejected() {
        let from = chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let to = chrono::Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        assert!(validate_range(from, to).is_err());
    }
}
