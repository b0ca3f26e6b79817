//! Orchestration Loop
//!
//! Drives one run through a bounded think-act-observe cycle:
//!
//! 1. Stop if cancelled or out of iterations
//! 2. Ask the reasoning engine for the next action(s), under a timeout
//! 3. Charge the engine's token usage; stop if that alone passes the ceiling
//! 4. Dispatch every requested invocation through the registry, recording a
//!    pending step before and sealing it after each one
//! 5. Fold returned evidence, charge the invocation cost, feed the result back
//! 6. Stop on a successful `terminate`, a finished turn, or an exceeded budget
//!
//! Capability failures never end a run; they become failed steps and the
//! structured error is shown to the engine. A reasoning call that times out is
//! recorded as a failed `reasoning` step and ends the run as
//! `ReasoningUnavailable`.

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sdk::capability::{CapabilityContext, CapabilityError};
use sdk::entity::ContactProfile;
use sdk::evidence::EntityKey;
use sdk::types::CapabilityOutput;

use super::conversation::Conversation;
use super::ledger::{Step, StepOutcome};
use super::prompt::{initial_instruction, system_prompt, CONTINUE_NUDGE};
use super::state::{RunError, RunRequest, RunResult, RunState, TerminationReason};
use super::summary::{synthesize, SummaryInput};
use crate::capabilities::{CapabilityRegistry, OpportunityScorer, TerminateCapability};
use crate::config::{DispatchMode, OrchestratorConfig};
use crate::llm::{Invocation, Message, ReasoningEngine, ReasoningTurn};

/// Called once for every sealed step
pub type ProgressFn = Arc<dyn Fn(&Step) + Send + Sync>;

/// Ledger name of a reasoning call that had to be recorded as a step
pub const REASONING_STEP: &str = "reasoning";

pub struct Orchestrator {
    engine: Arc<dyn ReasoningEngine>,
    registry: Arc<CapabilityRegistry>,
    config: OrchestratorConfig,
    scorer: Arc<dyn OpportunityScorer>,
    progress: Option<ProgressFn>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        registry: Arc<CapabilityRegistry>,
        config: OrchestratorConfig,
        scorer: Arc<dyn OpportunityScorer>,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
            scorer,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the loop until one of the termination conditions holds
    ///
    /// Fails only when the reasoning engine cannot be reached on the first
    /// iteration; the error still carries the partial result. Timeouts are
    /// never run errors.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunResult, RunError> {
        let max_iterations = request
            .max_iterations
            .unwrap_or(self.config.max_iterations)
            .max(1);
        let ceiling = request
            .budget_ceiling
            .unwrap_or(self.config.budget_ceiling);

        let mut state = RunState::new(Uuid::new_v4().to_string(), ceiling);
        let mut conversation = Conversation::with_limit(self.config.context_limit);
        conversation.push(Message::system(system_prompt(request.workflow)));
        conversation.push(Message::user(initial_instruction(&request)));

        let capabilities = self
            .registry
            .descriptors_for(request.workflow.capabilities());
        let pricing = self.engine.pricing();
        let llm_timeout = Duration::from_secs(self.config.llm_timeout_secs);

        info!(
            "Starting run {} for {} ({} workflow, {} iterations, ceiling {:.4})",
            state.run_id, request.domain, request.workflow, max_iterations, ceiling
        );

        let termination = loop {
            if cancel.is_cancelled() {
                break TerminationReason::Cancelled;
            }
            if state.iterations >= max_iterations {
                break TerminationReason::IterationLimitReached;
            }
            state.iterations += 1;
            let iteration = state.iterations;
            debug!(
                "Run {} iteration {}/{}",
                state.run_id, iteration, max_iterations
            );

            let answer = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = timeout(
                    llm_timeout,
                    self.engine.converse(conversation.messages(), &capabilities),
                ) => Some(result),
            };
            let Some(answer) = answer else {
                break TerminationReason::Cancelled;
            };

            let turn: ReasoningTurn = match answer {
                Ok(Ok(turn)) => turn,
                Ok(Err(e)) => {
                    error!("Reasoning call failed: {}", e);
                    if iteration == 1 {
                        return Err(self.fail_early(request, state, e.to_string()));
                    }
                    break TerminationReason::ReasoningUnavailable;
                }
                Err(_) => {
                    let message = format!(
                        "reasoning call timed out after {}s",
                        self.config.llm_timeout_secs
                    );
                    error!("{}", message);
                    let index = state.ledger.begin(iteration, REASONING_STEP, json!({}));
                    self.seal(
                        &mut state,
                        index,
                        StepOutcome::Failed {
                            kind: "timeout".to_string(),
                            message,
                            cost: 0.0,
                        },
                    );
                    break TerminationReason::ReasoningUnavailable;
                }
            };

            state.budget.add_usage(turn.usage, pricing);
            if state.budget.is_exceeded() {
                warn!(
                    "Run {} over budget after reasoning ({:.4} > {:.4})",
                    state.run_id,
                    state.budget.spent(),
                    ceiling
                );
                break TerminationReason::BudgetExceeded;
            }

            conversation.push(Message::assistant_with_invocations(
                turn.content.clone(),
                turn.invocations.clone(),
            ));

            if turn.invocations.is_empty() {
                if turn.finished {
                    debug!("Engine finished without terminate");
                    if !turn.content.trim().is_empty() {
                        state.final_answer = Some(turn.content.trim().to_string());
                    }
                    break TerminationReason::Completed;
                }
                // Truncated or idle turn
                conversation.push(Message::user(CONTINUE_NUDGE));
                continue;
            }

            let ctx = state.snapshot();
            let (terminated, stop) = match self.config.dispatch {
                DispatchMode::Sequential => {
                    self.dispatch_sequential(&request, &turn, &ctx, &mut state, &mut conversation, &cancel)
                        .await
                }
                DispatchMode::Concurrent => {
                    self.dispatch_concurrent(&request, &turn, &ctx, &mut state, &mut conversation, &cancel)
                        .await
                }
            };

            if let Some(reason) = stop {
                break reason;
            }
            if terminated {
                break TerminationReason::Completed;
            }
            if turn.finished {
                if !turn.content.trim().is_empty() {
                    state.final_answer = Some(turn.content.trim().to_string());
                }
                break TerminationReason::Completed;
            }
        };

        let result = self.assemble(request, state, termination);
        info!(
            "Run {} stopped: {} after {} iterations, {} steps, cost {:.4}",
            result.run_id,
            result.termination,
            result.iterations,
            result.steps.len(),
            result.total_cost
        );
        Ok(result)
    }

    /// One invocation at a time; the budget and cancellation are checked
    /// between invocations
    async fn dispatch_sequential(
        &self,
        request: &RunRequest,
        turn: &ReasoningTurn,
        ctx: &CapabilityContext,
        state: &mut RunState,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> (bool, Option<TerminationReason>) {
        for invocation in &turn.invocations {
            if cancel.is_cancelled() {
                return (false, Some(TerminationReason::Cancelled));
            }
            let index = state.ledger.begin(
                state.iterations,
                &invocation.capability,
                invocation.arguments.clone(),
            );
            let result = self.dispatch(request, invocation, ctx).await;
            let terminated = self.record(state, conversation, index, invocation, result);

            if state.budget.is_exceeded() {
                warn!(
                    "Run {} over budget after {} ({:.4} > {:.4})",
                    state.run_id,
                    invocation.capability,
                    state.budget.spent(),
                    state.budget.ceiling()
                );
                return (terminated, Some(TerminationReason::BudgetExceeded));
            }
            if terminated {
                return (true, None);
            }
        }
        (false, None)
    }

    /// Every invocation at once, folded in request order afterwards
    ///
    /// A cancel during the batch drops the unfinished invocations and seals
    /// their steps as cancelled.
    async fn dispatch_concurrent(
        &self,
        request: &RunRequest,
        turn: &ReasoningTurn,
        ctx: &CapabilityContext,
        state: &mut RunState,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> (bool, Option<TerminationReason>) {
        let indices: Vec<usize> = turn
            .invocations
            .iter()
            .map(|inv| {
                state
                    .ledger
                    .begin(state.iterations, &inv.capability, inv.arguments.clone())
            })
            .collect();

        let batch = join_all(
            turn.invocations
                .iter()
                .map(|inv| self.dispatch(request, inv, ctx)),
        );
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            results = batch => Some(results),
        };

        let Some(results) = results else {
            warn!("Run {} cancelled during a concurrent batch", state.run_id);
            for (invocation, index) in turn.invocations.iter().zip(indices) {
                let outcome = StepOutcome::Failed {
                    kind: "cancelled".to_string(),
                    message: "run cancelled before the invocation finished".to_string(),
                    cost: 0.0,
                };
                let feedback = json!({"status": "error", "error": "cancelled"});
                conversation.push(Message::tool_result(feedback.to_string(), &invocation.id));
                self.seal(state, index, outcome);
            }
            return (false, Some(TerminationReason::Cancelled));
        };

        let mut terminated = false;
        for ((invocation, index), result) in turn.invocations.iter().zip(indices).zip(results) {
            terminated |= self.record(state, conversation, index, invocation, result);
        }

        if cancel.is_cancelled() {
            return (terminated, Some(TerminationReason::Cancelled));
        }
        if state.budget.is_exceeded() {
            warn!(
                "Run {} over budget after concurrent batch ({:.4} > {:.4})",
                state.run_id,
                state.budget.spent(),
                state.budget.ceiling()
            );
            return (terminated, Some(TerminationReason::BudgetExceeded));
        }
        (terminated, None)
    }

    async fn dispatch(
        &self,
        request: &RunRequest,
        invocation: &Invocation,
        ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let allowed = request.workflow.capabilities();
        if !allowed.contains(&invocation.capability.as_str()) {
            return Err(CapabilityError::Unknown {
                name: invocation.capability.clone(),
                available: allowed.join(", "),
            });
        }

        debug!("Dispatching {} ({})", invocation.capability, invocation.id);
        let limit = self.config.capability_timeout_secs;
        match timeout(
            Duration::from_secs(limit),
            self.registry
                .invoke(&invocation.capability, invocation.arguments.clone(), ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(limit)),
        }
    }

    /// Seal the step, fold and charge the output, answer the engine
    ///
    /// Returns true when a `terminate` invocation succeeded.
    fn record(
        &self,
        state: &mut RunState,
        conversation: &mut Conversation,
        index: usize,
        invocation: &Invocation,
        result: Result<CapabilityOutput, CapabilityError>,
    ) -> bool {
        let (outcome, feedback, terminated) = match result {
            Ok(output) => {
                let cost = output.total_cost();
                state.budget.add_spend(cost, output.usage);
                let evidence_count = output.evidence.len();
                let summary = output.summary;
                state.fold(output.evidence);
                if let Some(artifact) = output.artifact {
                    state.add_artifact(index, &invocation.capability, artifact);
                }
                let feedback = json!({
                    "status": "ok",
                    "summary": summary,
                    "cost": cost,
                });
                (
                    StepOutcome::Succeeded {
                        summary,
                        cost,
                        evidence_count,
                    },
                    feedback,
                    invocation.capability == TerminateCapability::NAME,
                )
            }
            Err(e) => {
                warn!("Capability {} failed: {}", invocation.capability, e);
                let (cost, usage) = e.spent();
                let cost = state.budget.add_spend(cost, usage);
                (
                    StepOutcome::Failed {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        cost,
                    },
                    e.to_feedback(),
                    false,
                )
            }
        };

        conversation.push(Message::tool_result(feedback.to_string(), &invocation.id));
        self.seal(state, index, outcome);
        terminated
    }

    fn seal(&self, state: &mut RunState, index: usize, outcome: StepOutcome) {
        match state.ledger.finish(index, outcome) {
            Ok(step) => {
                if let Some(progress) = &self.progress {
                    progress(step);
                }
            }
            Err(e) => error!("Ledger rejected step {}: {}", index, e),
        }
    }

    fn fail_early(&self, request: RunRequest, state: RunState, reason: String) -> RunError {
        let partial = self.assemble(request, state, TerminationReason::ReasoningUnavailable);
        RunError {
            reason,
            partial: Box::new(partial),
        }
    }

    /// Build the caller's result; scores are derived here, never stored
    fn assemble(
        &self,
        request: RunRequest,
        state: RunState,
        termination: TerminationReason,
    ) -> RunResult {
        let company = state.record(&EntityKey::company(&request.domain));
        let contacts: Vec<ContactProfile> = state
            .contacts_of(&request.domain)
            .into_iter()
            .map(|r| r.contact())
            .collect();
        let score = self
            .scorer
            .score(company, &contacts, &request.target_roles);

        let report = (termination == TerminationReason::Completed)
            .then(|| {
                state
                    .artifacts
                    .iter()
                    .rev()
                    .find(|a| a.capability == TerminateCapability::NAME)
            })
            .flatten();

        let synthesized = || {
            synthesize(&SummaryInput {
                domain: &request.domain,
                reason: termination,
                iterations: state.iterations,
                company,
                company_score: score.company_score,
                contacts: &score.contacts,
                steps: state.ledger.all(),
                total_cost: state.budget.spent(),
                pitched: state.artifacts.iter().any(|a| a.capability == "generate_pitch"),
            })
        };

        let (summary, recommendations) = match (report, &state.final_answer) {
            (Some(report), _) => {
                let summary = report.value["summary"].as_str().unwrap_or_default().to_string();
                let recommendations = report.value["recommendations"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|i| i.as_str())
                            .map(String::from)
                            .collect::<Vec<String>>()
                    })
                    .unwrap_or_default();
                (summary, recommendations)
            }
            (None, Some(answer)) if termination == TerminationReason::Completed => {
                (answer.clone(), synthesized().1)
            }
            _ => synthesized(),
        };

        let entities = state.records().values().cloned().collect();
        let RunState {
            run_id,
            started_at,
            ledger,
            budget,
            artifacts,
            iterations,
            ..
        } = state;

        RunResult {
            run_id,
            request,
            termination,
            iterations,
            entities,
            company_score: score.company_score,
            contacts: score.contacts,
            artifacts,
            steps: ledger.into_steps(),
            total_cost: budget.spent(),
            usage: budget.usage(),
            total_tokens: budget.total_tokens(),
            summary,
            recommendations,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
