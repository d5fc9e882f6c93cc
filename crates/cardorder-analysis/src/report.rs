//! Discrepancy reports.
//!
//! The primary artifact is a JSON object keyed by elite ID, consumed by the
//! plotting scripts:
//!
//! ```json
//! { "12": { "inversions": 3, "sum_squared_pos_shift": 1.5, "fitness": 7.35 } }
//! ```
//!
//! Derived values (ranking length, Kendall tau) and skipped elites are kept
//! beside the mapping, never inside it.

use std::collections::BTreeMap;

use cardorder_stats::descriptive::DescriptiveStats;
use serde::{Deserialize, Serialize};

use crate::{comparator::Stage, individual_log::EliteId};

/// Disagreement between the real and predicted card orders of one elite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub inversions: u64,
    pub sum_squared_pos_shift: f64,
    /// Average health difference of the complete deck
    pub fitness: f64,
}

pub type DiscrepancyMap = BTreeMap<EliteId, DiscrepancyRecord>;

/// A recorded elite with the values derived alongside its record.
#[derive(Debug, Clone, PartialEq)]
pub struct EliteComparison {
    pub elite_id: EliteId,
    pub record: DiscrepancyRecord,
    /// Number of ranked cards
    pub num_cards: usize,
    pub kendall_tau: f64,
}

/// An elite left out of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedElite {
    pub elite_id: EliteId,
    pub stage: Stage,
    /// Stable reason code, e.g. `missing_data`
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonReport {
    comparisons: BTreeMap<EliteId, EliteComparison>,
    skipped: Vec<SkippedElite>,
}

impl ComparisonReport {
    pub(crate) fn record(&mut self, comparison: EliteComparison) {
        self.comparisons.insert(comparison.elite_id, comparison);
    }

    pub(crate) fn skip(&mut self, skipped: SkippedElite) {
        let pos = self
            .skipped
            .partition_point(|s| s.elite_id < skipped.elite_id);
        self.skipped.insert(pos, skipped);
    }

    /// Recorded elites, ascending by ID.
    pub fn comparisons(&self) -> impl Iterator<Item = &EliteComparison> {
        self.comparisons.values()
    }

    #[must_use]
    pub fn comparison(&self, elite_id: EliteId) -> Option<&EliteComparison> {
        self.comparisons.get(&elite_id)
    }

    /// Skipped elites, ascending by ID.
    #[must_use]
    pub fn skipped(&self) -> &[SkippedElite] {
        &self.skipped
    }

    /// Number of recorded elites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.comparisons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }

    /// The `{elite_id: record}` mapping written for downstream tools.
    #[must_use]
    pub fn discrepancy_map(&self) -> DiscrepancyMap {
        self.comparisons
            .iter()
            .map(|(id, c)| (*id, c.record))
            .collect()
    }
}

/// Distribution of both discrepancy metrics over a set of records.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub count: usize,
    pub inversions: Option<DescriptiveStats>,
    pub sum_squared_pos_shift: Option<DescriptiveStats>,
}

impl ReportSummary {
    #[must_use]
    pub fn new<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a DiscrepancyRecord>,
    {
        let records = records.into_iter().collect::<Vec<_>>();
        #[expect(clippy::cast_precision_loss)]
        let inversions = DescriptiveStats::new(records.iter().map(|r| r.inversions as f64));
        let sum_squared_pos_shift =
            DescriptiveStats::new(records.iter().map(|r| r.sum_squared_pos_shift));
        Self {
            count: records.len(),
            inversions,
            sum_squared_pos_shift,
        }
    }
}
