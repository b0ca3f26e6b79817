//! Step Ledger
//!
//! Append-only record of every capability invocation a run attempted. A step
//! is appended as `Pending` before its handler runs and sealed exactly once
//! afterwards, so a crash or cancellation mid-invocation still leaves a trace.
//! The ledger's length is the number of invocations attempted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Succeeded,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => StepStatus::Succeeded,
            "failed" => StepStatus::Failed,
            _ => StepStatus::Pending,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged attempt to invoke a capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Position in the ledger, starting at 0
    pub index: usize,
    /// Iteration of the loop that issued it, starting at 1
    pub iteration: usize,
    pub capability: String,
    pub input: Value,
    pub status: StepStatus,
    /// Output summary, or the error message for failed steps
    pub summary: String,
    /// Stable error category for failed steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cost attributed to this invocation
    pub cost: f64,
    /// Evidence records it returned
    pub evidence_count: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn is_sealed(&self) -> bool {
        self.status != StepStatus::Pending
    }
}

/// How a pending step ended
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded {
        summary: String,
        cost: f64,
        evidence_count: usize,
    },
    /// `cost` is whatever the call spent before failing
    Failed {
        kind: String,
        message: String,
        cost: f64,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("no step at index {0}")]
    NoSuchStep(usize),

    #[error("step {0} is already sealed")]
    AlreadySealed(usize),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepLedger {
    steps: Vec<Step>,
}

impl StepLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending step and return its index
    pub fn begin(&mut self, iteration: usize, capability: &str, input: Value) -> usize {
        let index = self.steps.len();
        self.steps.push(Step {
            index,
            iteration,
            capability: capability.to_string(),
            input,
            status: StepStatus::Pending,
            summary: String::new(),
            error: None,
            cost: 0.0,
            evidence_count: 0,
            started_at: Utc::now(),
            finished_at: None,
        });
        index
    }

    /// Seal a pending step
    pub fn finish(&mut self, index: usize, outcome: StepOutcome) -> Result<&Step, LedgerError> {
        let step = self
            .steps
            .get_mut(index)
            .ok_or(LedgerError::NoSuchStep(index))?;
        if step.is_sealed() {
            return Err(LedgerError::AlreadySealed(index));
        }

        match outcome {
            StepOutcome::Succeeded {
                summary,
                cost,
                evidence_count,
            } => {
                step.status = StepStatus::Succeeded;
                step.summary = summary;
                step.cost = cost;
                step.evidence_count = evidence_count;
            }
            StepOutcome::Failed {
                kind,
                message,
                cost,
            } => {
                step.status = StepStatus::Failed;
                step.summary = message;
                step.error = Some(kind);
                step.cost = cost;
            }
        }
        step.finished_at = Some(Utc::now());
        Ok(step)
    }

    pub fn all(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Succeeded)
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}
