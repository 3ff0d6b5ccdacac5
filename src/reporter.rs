//! Reporter (C8): aggregates metadata-store counters over a window into a
//! compliance score. Weights are a policy choice, specified so different
//! implementations produce identical scores from identical counters —
//! grounded in `original_source/scripts/compliance_report.py::generate_compliance_score`,
//! reweighted per the archival-coverage subscore the distillation specifies.

use crate::metadata::{MetadataStore, VerificationStatus};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub logs: u64,
    pub signatures: u64,
    pub archives: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_signatures: u64,
    pub valid_signatures: u64,
    pub timestamped_signatures: u64,
    pub total_archives: u64,
    pub total_access_events: u64,
    pub successful_access_events: u64,
    pub daily: Vec<DailyCount>,
    pub score: f64,
}

pub struct Reporter {
    store: Arc<dyn MetadataStore>,
}

impl Reporter {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Reporter { store }
    }

    pub fn generate(&self, start: NaiveDate, end: NaiveDate) -> crate::error::Result<ComplianceReport> {
        let signatures = self.store.select_signatures_in(start, end)?;
        let archives = self.store.select_archives_in(start, end)?;
        let access_events = self.store.select_access_log_in(start, end)?;

        let total_signatures = signatures.len() as u64;
        let valid_signatures = signatures
            .iter()
            .filter(|s| s.verification_status == VerificationStatus::Valid)
            .count() as u64;
        let timestamped_signatures = signatures.iter().filter(|s| s.tsa_timestamp.is_some()).count() as u64;
        let total_archives = archives.len() as u64;
        let total_access_events = access_events.len() as u64;
        let successful_access_events = access_events.iter().filter(|e| e.success).count() as u64;

        let signature_penalty = if total_signatures > 0 {
            40.0 * (1.0 - valid_signatures as f64 / total_signatures as f64)
        } else {
            0.0
        };
        let timestamp_penalty = if total_signatures > 0 {
            20.0 * (1.0 - timestamped_signatures as f64 / total_signatures as f64)
        } else {
            0.0
        };
        let archival_penalty = if total_archives == 0 { 20.0 } else { 0.0 };
        let access_penalty = if total_access_events > 0 {
            20.0 * (1.0 - successful_access_events as f64 / total_access_events as f64)
        } else {
            0.0
        };

        let score = (100.0 - signature_penalty - timestamp_penalty - archival_penalty - access_penalty)
            .clamp(0.0, 100.0);

        let daily = build_daily_series(start, end, &signatures, &archives);

        let report = ComplianceReport {
            period_start: start,
            period_end: end,
            total_signatures,
            valid_signatures,
            timestamped_signatures,
            total_archives,
            total_access_events,
            successful_access_events,
            daily,
            score,
        };

        self.store.insert_report(crate::metadata::ReportRow {
            period_start: start,
            period_end: end,
            generated_at: chrono::Utc::now(),
            score,
        })?;

        Ok(report)
    }
}

fn build_daily_series(
    start: NaiveDate,
    end: NaiveDate,
    signatures: &[crate::metadata::SignatureRow],
    archives: &[crate::metadata::ArchiveRow],
) -> Vec<DailyCount> {
    let mut series = Vec::new();
    let mut day = start;
    while day <= end {
        let signatures_today = signatures.iter().filter(|s| s.signed_at.date_naive() == day).count() as u64;
        let archives_today = archives.iter().filter(|a| a.created_at.date_naive() == day).count() as u64;
        series.push(DailyCount {
            date: day,
            logs: 0, // the core has no log-entry table; populated by the raw-log count when available
            signatures: signatures_today,
            archives: archives_today,
        });
        day += chrono::Duration::days(1);
    }
    series
}
