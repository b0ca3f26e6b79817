//! Run request, run state and run result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use sdk::capability::CapabilityContext;
use sdk::evidence::{normalize_domain, EntityKey, EntityKind, Evidence};
use sdk::record::FusedRecord;

use super::budget::BudgetTracker;
use super::ledger::{Step, StepLedger};
use crate::fusion::{self, ScoredContact};
use crate::llm::TokenUsage;

/// Which part of the pipeline a run is allowed to drive
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    /// Research, contacts, scoring, pitch and persistence
    #[default]
    Full,
    /// Company research and scoring only
    Research,
    /// Contact discovery and scoring only
    Contacts,
}

impl Workflow {
    /// Capabilities advertised to the reasoning engine for this workflow
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            Workflow::Full => &[
                "research_company",
                "find_contacts",
                "score_opportunity",
                "generate_pitch",
                "persist_opportunity",
                "terminate",
            ],
            Workflow::Research => &[
                "research_company",
                "score_opportunity",
                "persist_opportunity",
                "terminate",
            ],
            Workflow::Contacts => &["find_contacts", "score_opportunity", "terminate"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::Full => "full",
            Workflow::Research => "research",
            Workflow::Contacts => "contacts",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Workflow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Workflow::Full),
            "research" => Ok(Workflow::Research),
            "contacts" => Ok(Workflow::Contacts),
            other => Err(format!(
                "unknown workflow '{}'; expected full, research or contacts",
                other
            )),
        }
    }
}

/// What the caller wants researched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunRequest {
    pub domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    #[serde(default)]
    pub workflow: Workflow,

    /// Roles to look for, on top of the configured targeting
    #[serde(default)]
    pub target_roles: Vec<String>,

    /// Overrides `orchestrator.max_iterations`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,

    /// Overrides `orchestrator.budget_ceiling`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_ceiling: Option<f64>,

    /// Free-form instructions appended to the initial prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RunRequest {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_budget(mut self, ceiling: f64) -> Self {
        self.budget_ceiling = Some(ceiling);
        self
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    BudgetExceeded,
    IterationLimitReached,
    Cancelled,
    ReasoningUnavailable,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Completed => "completed",
            TerminationReason::BudgetExceeded => "budget_exceeded",
            TerminationReason::IterationLimitReached => "iteration_limit_reached",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::ReasoningUnavailable => "reasoning_unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(TerminationReason::Completed),
            "budget_exceeded" => Some(TerminationReason::BudgetExceeded),
            "iteration_limit_reached" => Some(TerminationReason::IterationLimitReached),
            "cancelled" => Some(TerminationReason::Cancelled),
            "reasoning_unavailable" => Some(TerminationReason::ReasoningUnavailable),
            _ => None,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of one capability, kept for the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub step: usize,
    pub capability: String,
    pub value: Value,
}

/// Everything one run owns while the loop is executing
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    evidence: BTreeMap<EntityKey, Vec<Evidence>>,
    records: BTreeMap<EntityKey, FusedRecord>,
    pub ledger: StepLedger,
    pub budget: BudgetTracker,
    pub artifacts: Vec<Artifact>,
    pub iterations: usize,
    /// Text of the engine's final turn, if it finished without `terminate`
    pub final_answer: Option<String>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, budget_ceiling: f64) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            evidence: BTreeMap::new(),
            records: BTreeMap::new(),
            ledger: StepLedger::new(),
            budget: BudgetTracker::new(budget_ceiling),
            artifacts: Vec::new(),
            iterations: 0,
            final_answer: None,
        }
    }

    /// Fold new evidence and replace the fused record of every touched entity
    ///
    /// Records are recomputed from all evidence seen for the entity, so the
    /// result is the same whatever order evidence arrived in.
    pub fn fold(&mut self, evidence: Vec<Evidence>) -> usize {
        let mut touched = Vec::new();
        for e in evidence {
            if !touched.contains(&e.entity) {
                touched.push(e.entity.clone());
            }
            self.evidence.entry(e.entity.clone()).or_default().push(e);
        }
        for key in &touched {
            let all = self.evidence.get(key).map(Vec::as_slice).unwrap_or_default();
            self.records.insert(key.clone(), fusion::fuse(key, all));
        }
        touched.len()
    }

    pub fn records(&self) -> &BTreeMap<EntityKey, FusedRecord> {
        &self.records
    }

    pub fn record(&self, key: &EntityKey) -> Option<&FusedRecord> {
        self.records.get(key)
    }

    pub fn records_of(&self, kind: EntityKind) -> impl Iterator<Item = &FusedRecord> {
        self.records.values().filter(move |r| r.key.kind == kind)
    }

    /// Fused contacts employed at `domain`
    pub fn contacts_of(&self, domain: &str) -> Vec<&FusedRecord> {
        let domain = normalize_domain(domain);
        self.records_of(EntityKind::Contact)
            .filter(|r| {
                r.str_value("company_domain")
                    .map(|d| normalize_domain(&d) == domain)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn add_artifact(&mut self, step: usize, capability: &str, value: Value) {
        self.artifacts.push(Artifact {
            step,
            capability: capability.to_string(),
            value,
        });
    }

    /// Read-only view handed to capabilities for one turn
    pub fn snapshot(&self) -> CapabilityContext {
        let latest: BTreeMap<String, Value> = self
            .artifacts
            .iter()
            .map(|a| (a.capability.clone(), a.value.clone()))
            .collect();
        CapabilityContext::new(self.run_id.clone(), self.records.clone()).with_artifacts(latest)
    }
}

/// What the caller gets back once the loop stops
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunResult {
    pub run_id: String,
    pub request: RunRequest,
    pub termination: TerminationReason,
    pub iterations: usize,
    /// Fused record of every entity touched
    pub entities: Vec<FusedRecord>,
    /// Derived company fit score, when the company was researched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_score: Option<u8>,
    /// Deduplicated contacts, best first
    pub contacts: Vec<ScoredContact>,
    pub artifacts: Vec<Artifact>,
    pub steps: Vec<Step>,
    pub total_cost: f64,
    pub usage: TokenUsage,
    pub total_tokens: u64,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn company(&self) -> Option<&FusedRecord> {
        let key = EntityKey::company(&self.request.domain);
        self.entities.iter().find(|r| r.key == key)
    }

    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == super::ledger::StepStatus::Failed)
            .count()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// The reasoning engine could not be reached on the very first iteration
///
/// Carries the partial result so the caller still has the ledger.
#[derive(Debug, thiserror::Error)]
#[error("reasoning engine unavailable: {reason}")]
pub struct RunError {
    pub reason: String,
    pub partial: Box<RunResult>,
}

impl RunError {
    pub fn into_partial(self) -> RunResult {
        *self.partial
    }
}
