//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Research one company now
//! - opportunities: List saved opportunities
//! - history: Show last N runs
//! - replay: Show all steps of a run
//! - config: Print the effective configuration

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sdk::errors::{EngineError, ScoutErrorExt};

use crate::capabilities::{
    CapabilityRegistry, Collaborators, LlmPitchWriter, OpportunityScorer, PolicyScorer,
};
use crate::config::{Config, DispatchMode};
use crate::db::Database;
use crate::enrichment::providers_from_config;
use crate::llm::build_engine;
use crate::orchestrator::{Orchestrator, ProgressFn, RunRequest, RunResult, Step, Workflow};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Put the user-facing hint in front of an engine error
///
/// The original error stays in the chain; fatal errors say so.
pub fn hinted(err: EngineError) -> anyhow::Error {
    let hint = if err.is_recoverable() {
        err.user_hint().to_string()
    } else {
        format!("{} (retrying will not help until this is fixed)", err.user_hint())
    };
    anyhow::Error::new(err).context(hint)
}

/// Options of `scout run` that override the configuration
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub domain: String,
    pub name: Option<String>,
    pub workflow: Workflow,
    pub roles: Vec<String>,
    pub max_iterations: Option<usize>,
    pub budget: Option<f64>,
    pub notes: Option<String>,
    pub concurrent: bool,
}

impl RunOptions {
    fn into_request(self) -> RunRequest {
        RunRequest {
            domain: self.domain,
            company_name: self.name,
            workflow: self.workflow,
            target_roles: self.roles,
            max_iterations: self.max_iterations,
            budget_ceiling: self.budget,
            notes: self.notes,
        }
    }
}

/// Research one company and store the run
///
/// Ctrl-C cancels the run; whatever was gathered so far is still stored and
/// printed.
pub async fn handle_run(options: RunOptions, config: &Config, format: OutputFormat) -> Result<()> {
    if let Some(budget) = options.budget {
        if !(budget.is_finite() && budget > 0.0) {
            anyhow::bail!("--budget must be greater than 0");
        }
    }
    if options.max_iterations == Some(0) {
        anyhow::bail!("--max-iterations must be at least 1");
    }

    config.ensure_data_dir().map_err(hinted)?;
    let database = Database::new(&config.core.database_path())
        .await
        .context("Failed to open database")?;

    let engine = build_engine(&config.llm).map_err(hinted)?;
    let (researchers, finders) = providers_from_config(&config.providers).map_err(hinted)?;
    if researchers.is_empty() && finders.is_empty() {
        tracing::warn!("No enrichment providers configured; research capabilities will fail");
    }

    let scorer: Arc<dyn OpportunityScorer> = Arc::new(PolicyScorer::new(
        config.scoring.clone(),
        config.targeting.clone(),
    ));

    let registry = CapabilityRegistry::standard(Collaborators {
        researchers,
        finders,
        scorer: Arc::clone(&scorer),
        pitch_writer: Arc::new(LlmPitchWriter::new(Arc::clone(&engine))),
        store: Arc::new(database.opportunities()),
    })
    .map_err(hinted)?;

    let mut orchestrator_config = config.orchestrator.clone();
    if options.concurrent {
        orchestrator_config.dispatch = DispatchMode::Concurrent;
    }

    let mut orchestrator =
        Orchestrator::new(engine, Arc::new(registry), orchestrator_config, scorer);
    if matches!(format, OutputFormat::Text) {
        let progress: ProgressFn = Arc::new(|step: &Step| print_step(step));
        orchestrator = orchestrator.with_progress(progress);
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping run");
                cancel.cancel();
            }
        })
    };

    let request = options.into_request();
    tracing::info!("Researching {} ({} workflow)", request.domain, request.workflow);
    let outcome = orchestrator.run(request, cancel).await;
    watcher.abort();

    let (result, failure) = match outcome {
        Ok(result) => (result, None),
        Err(e) => {
            let reason = e.reason.clone();
            (e.into_partial(), Some(reason))
        }
    };

    database
        .runs()
        .record(&result)
        .await
        .context("Failed to store run")?;
    database.close().await?;

    match format {
        OutputFormat::Text => print_result(&result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    match failure {
        Some(reason) => Err(anyhow::anyhow!("Reasoning engine unavailable: {}", reason)),
        None => Ok(()),
    }
}

/// List saved opportunities, most recently updated first
pub async fn handle_opportunities(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.core.database_path())
        .await
        .context("Failed to open database")?;

    let opportunities = database
        .opportunities()
        .list(limit as i64)
        .await
        .context("Failed to fetch opportunities")?;

    match format {
        OutputFormat::Text => {
            if opportunities.is_empty() {
                println!("No saved opportunities");
                return Ok(());
            }

            println!("Opportunities (last {}):", limit);
            println!();

            for opp in &opportunities {
                let name = opp.company_name.as_deref().unwrap_or("-");
                let score = opp
                    .score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let contacts = opp.contacts.as_array().map(Vec::len).unwrap_or(0);
                println!("{} ({})", opp.domain, name);
                println!("  Score: {}", score);
                println!("  Contacts: {}", contacts);
                println!("  Pitch: {}", if opp.pitch.is_some() { "yes" } else { "no" });
                println!("  Run: {}", opp.run_id);
                println!("  Updated: {}", opp.updated_at.format("%Y-%m-%d %H:%M:%S"));
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "opportunities": opportunities,
                "count": opportunities.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the most recent runs
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.core.database_path())
        .await
        .context("Failed to open database")?;

    let runs = database
        .runs()
        .recent(limit as i64)
        .await
        .context("Failed to fetch run history")?;

    match format {
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No runs in history");
                return Ok(());
            }

            println!("Run History (last {} runs):", limit);
            println!();

            for run in runs {
                println!("Run ID: {}", run.id);
                println!("  Domain: {} ({})", run.domain, run.workflow);
                println!("  Termination: {}", run.termination);
                println!("  Iterations: {}", run.iterations);
                println!("  Cost: {:.4} ({} tokens)", run.total_cost, run.total_tokens);
                println!(
                    "  Duration: {}ms",
                    (run.finished_at - run.started_at).num_milliseconds()
                );
                println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "runs": runs,
                "count": runs.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show a stored run and every step of its ledger
pub async fn handle_replay(run_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.core.database_path())
        .await
        .context("Failed to open database")?;
    let runs = database.runs();

    let result = runs
        .result(&run_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Run not found: {}", run_id))?;
    let steps = runs.steps(&run_id).await?;

    match format {
        OutputFormat::Text => {
            println!("Run Replay: {}", run_id);
            println!();
            if let Some(domain) = result.pointer("/request/domain").and_then(|v| v.as_str()) {
                println!("Domain: {}", domain);
            }
            if let Some(reason) = result.get("termination").and_then(|v| v.as_str()) {
                println!("Termination: {}", reason);
            }
            if let Some(summary) = result.get("summary").and_then(|v| v.as_str()) {
                println!("Summary: {}", summary);
            }

            println!();
            println!("Steps ({} total):", steps.len());
            println!();

            for step in &steps {
                print_step(step);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "run": result,
                "steps": steps,
                "step_count": steps.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print the configuration after defaults and path expansion
pub fn handle_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", config.to_toml()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

fn print_step(step: &Step) {
    let duration = step
        .duration_ms()
        .map(|ms| format!(" {}ms", ms))
        .unwrap_or_default();
    println!(
        "[{}] #{} {} ({}, cost {:.4}{})",
        step.iteration, step.index, step.capability, step.status, step.cost, duration
    );
    if !step.summary.is_empty() {
        for line in step.summary.lines() {
            println!("    {}", line);
        }
    }
}

fn print_result(result: &RunResult) {
    println!();
    println!("Run {} finished: {}", result.run_id, result.termination);
    println!(
        "Iterations: {}  Steps: {} ({} failed)  Cost: {:.4}  Tokens: {}",
        result.iterations,
        result.steps.len(),
        result.failed_steps(),
        result.total_cost,
        result.total_tokens
    );

    if let Some(company) = result.company() {
        let profile = company.company();
        println!();
        println!(
            "Company: {} ({})",
            profile.name.as_deref().unwrap_or("-"),
            profile.domain
        );
        if let Some(industry) = &profile.industry {
            println!("  Industry: {}", industry);
        }
        if let Some(size) = &profile.size {
            println!("  Size: {}", size);
        }
        if let Some(score) = result.company_score {
            println!("  Fit score: {}", score);
        }
    }

    if !result.contacts.is_empty() {
        println!();
        println!("Contacts:");
        for scored in result.contacts.iter().take(10) {
            let c = &scored.contact;
            println!(
                "  {:>3}  {} - {} {}",
                scored.score,
                c.full_name,
                c.title.as_deref().unwrap_or("-"),
                c.email.as_deref().map(|e| format!("<{}>", e)).unwrap_or_default()
            );
        }
    }

    println!();
    println!("Summary: {}", result.summary);
    if !result.recommendations.is_empty() {
        println!("Recommendations:");
        for rec in &result.recommendations {
            println!("  - {}", rec);
        }
    }
}
