//! Report data structure (HTML is generated in gap_confirm_report crate).

use crate::journal::FlowRecord;
use serde::{Deserialize, Serialize};

/// Data passed to the HTML report generator: recent runs plus tallies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportData {
    pub runs: Vec<FlowRecord>,
    pub generated_utc_rfc3339: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub indexed: usize,
    pub exhausted: usize,
    pub cancelled: usize,
    pub error: usize,
}

impl ReportData {
    pub fn new(runs: Vec<FlowRecord>) -> Self {
        let generated_utc_rfc3339 = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| String::new());
        Self {
            runs,
            generated_utc_rfc3339,
        }
    }

    pub fn outcome_counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for run in &self.runs {
            match run.outcome.as_str() {
                "indexed" => counts.indexed += 1,
                "exhausted" => counts.exhausted += 1,
                "cancelled" => counts.cancelled += 1,
                _ => counts.error += 1,
            }
        }
        counts
    }
}
