//! Aggregates over the feedback log.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::piece::PieceLabel;
use crate::record::FeedbackRecord;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statistics {
    /// Whole log.
    pub total: usize,
    pub active: usize,
    pub superseded: usize,
    /// Over the selected records (active only, or all).
    pub by_label: BTreeMap<PieceLabel, usize>,
    pub mean_confidence: f64,
    pub by_session: BTreeMap<String, usize>,
}

impl Statistics {
    pub(crate) fn collect(records: &[FeedbackRecord], active_only: bool) -> Self {
        let active = records.iter().filter(|r| r.is_active()).count();
        let mut stats = Statistics {
            total: records.len(),
            active,
            superseded: records.len() - active,
            ..Default::default()
        };

        let mut confidence_sum = 0.0;
        let mut selected = 0usize;
        for record in records.iter().filter(|r| !active_only || r.is_active()) {
            *stats.by_label.entry(record.corrected_label()).or_default() += 1;
            *stats.by_session.entry(record.session_id().to_string()).or_default() += 1;
            confidence_sum += record.original_confidence();
            selected += 1;
        }
        if selected > 0 {
            stats.mean_confidence = confidence_sum / selected as f64;
        }
        stats
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total corrections:      {}", self.total)?;
        writeln!(f, "Active corrections:     {}", self.active)?;
        writeln!(f, "Superseded corrections: {}", self.superseded)?;
        writeln!(f, "Mean original confidence: {:.2}", self.mean_confidence)?;
        if !self.by_label.is_empty() {
            writeln!(f, "By label:")?;
            for (label, count) in &self.by_label {
                writeln!(f, "  {label:<13} {count}")?;
            }
        }
        if !self.by_session.is_empty() {
            writeln!(f, "By session:")?;
            for (session, count) in &self.by_session {
                writeln!(f, "  {session} {count}")?;
            }
        }
        Ok(())
    }
}

/// Per-session record counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub total_count: usize,
    pub active_count: usize,
}

pub(crate) fn session_summary(records: &[FeedbackRecord]) -> BTreeMap<String, SessionSummary> {
    let mut summary: BTreeMap<String, SessionSummary> = BTreeMap::new();
    for record in records {
        let entry = summary.entry(record.session_id().to_string()).or_default();
        entry.total_count += 1;
        if record.is_active() {
            entry.active_count += 1;
        }
    }
    summary
}
