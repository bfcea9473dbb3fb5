//! # Stage Reports
//!
//! Every stage finishes with a [`StageReport`]: how many items it looked at,
//! how many made it into the output, and which ones were skipped and why.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::TrussError;

/// Pipeline stage identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Network,
    Connectors,
    Engineering,
    HalfLap,
    Voids,
    Panels,
    Geometry,
    Export,
}

impl Stage {
    /// Display name for logs and console output
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Network => "Network extraction",
            Stage::Connectors => "Connector classification",
            Stage::Engineering => "Connector engineering",
            Stage::HalfLap => "Half-lap detection",
            Stage::Voids => "Connector voids",
            Stage::Panels => "Connector panels",
            Stage::Geometry => "Geometry emission",
            Stage::Export => "Tabular export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One item a stage excluded from its output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// What was skipped (e.g. "node 7", "beams 0-1 x 2-3")
    pub item: String,
    /// Why it was skipped
    pub error: TrussError,
}

/// Success/failure summary of a stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Items examined
    pub processed: usize,
    /// Items that produced output
    pub succeeded: usize,
    /// Items excluded, with the reason
    pub skipped: Vec<SkippedItem>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        StageReport {
            stage,
            processed: 0,
            succeeded: 0,
            skipped: Vec::new(),
        }
    }

    /// Count an item that made it into the output
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    /// Count an item that was excluded, logging why
    pub fn record_skip(&mut self, item: impl Into<String>, error: TrussError) {
        let item = item.into();
        warn!(stage = %self.stage, item = %item, code = error.error_code(), "Skipped: {}", error);
        self.processed += 1;
        self.skipped.push(SkippedItem { item, error });
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// True when nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Emit the completion summary at info level
    pub fn log_summary(&self) {
        info!(
            stage = %self.stage,
            processed = self.processed,
            succeeded = self.succeeded,
            skipped = self.skipped.len(),
            "Stage complete"
        );
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, {} succeeded, {} skipped",
            self.stage,
            self.processed,
            self.succeeded,
            self.skipped.len()
        )
    }
}
