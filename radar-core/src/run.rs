//! Pipeline runs and per-item stage tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ProfileId;

/// Stages an item moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingested,
    Normalized,
    Resolved,
    Enriched,
    Scored,
    Classified,
    OutreachTriggered,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingested => "ingested",
            Stage::Normalized => "normalized",
            Stage::Resolved => "resolved",
            Stage::Enriched => "enriched",
            Stage::Scored => "scored",
            Stage::Classified => "classified",
            Stage::OutreachTriggered => "outreach_triggered",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Collaborator timed out on every attempt, or the item timeout elapsed
    Timeout,
    RateLimited,
    NotFound,
    MalformedInput,
    InsufficientData,
    /// Transport or decoding failure at a source
    Source,
    Store,
    Dispatch,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::NotFound => "not_found",
            FailureReason::MalformedInput => "malformed_input",
            FailureReason::InsufficientData => "insufficient_data",
            FailureReason::Source => "source",
            FailureReason::Store => "store",
            FailureReason::Dispatch => "dispatch",
        };
        f.write_str(s)
    }
}

/// Status of one item in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Succeeded,
    /// `stage` is the last stage the item reached before failing
    Failed { stage: Stage, reason: FailureReason },
    SkippedDuplicate,
    /// No computable scoring signal; retry when more data arrives
    SkippedIncomplete,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemStatus::Pending | ItemStatus::InProgress)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Pending => f.write_str("pending"),
            ItemStatus::InProgress => f.write_str("in_progress"),
            ItemStatus::Succeeded => f.write_str("succeeded"),
            ItemStatus::Failed { stage, reason } => write!(f, "failed({}, {})", stage, reason),
            ItemStatus::SkippedDuplicate => f.write_str("skipped_duplicate"),
            ItemStatus::SkippedIncomplete => f.write_str("skipped_incomplete"),
        }
    }
}

/// One input of a batch and how far it got
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunItem {
    pub input_ref: String,
    pub stage_reached: Stage,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub profile_id: Option<ProfileId>,
    /// Total collaborator attempts spent on this item
    pub attempts: u32,
}

impl RunItem {
    pub fn new(input_ref: impl Into<String>) -> Self {
        Self {
            input_ref: input_ref.into(),
            stage_reached: Stage::Ingested,
            status: ItemStatus::Pending,
            error: None,
            profile_id: None,
            attempts: 0,
        }
    }
}

/// Per-status counts of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_duplicate: usize,
    pub skipped_incomplete: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items: {} succeeded, {} failed, {} duplicate, {} incomplete, {} unfinished",
            self.total,
            self.succeeded,
            self.failed,
            self.skipped_duplicate,
            self.skipped_incomplete,
            self.pending + self.in_progress
        )
    }
}

/// One execution of the pipeline over a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub items: Vec<RunItem>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
}

impl PipelineRun {
    pub fn new<I, S>(input_refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_id: Uuid::new_v4(),
            items: input_refs.into_iter().map(RunItem::new).collect(),
            started_at: Utc::now(),
            completed_at: None,
            cancelled: false,
        }
    }

    /// Terminal once every item reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.items.iter().all(|item| item.status.is_terminal())
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Pending => summary.pending += 1,
                ItemStatus::InProgress => summary.in_progress += 1,
                ItemStatus::Succeeded => summary.succeeded += 1,
                ItemStatus::Failed { .. } => summary.failed += 1,
                ItemStatus::SkippedDuplicate => summary.skipped_duplicate += 1,
                ItemStatus::SkippedIncomplete => summary.skipped_incomplete += 1,
            }
        }
        summary
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }
}
