//! Best-effort summary for runs that did not end with `terminate`

use sdk::record::FusedRecord;

use super::ledger::{Step, StepStatus};
use super::state::TerminationReason;
use crate::fusion::ScoredContact;

/// Inputs for [`synthesize`]
pub struct SummaryInput<'a> {
    pub domain: &'a str,
    pub reason: TerminationReason,
    pub iterations: usize,
    pub company: Option<&'a FusedRecord>,
    pub company_score: Option<u8>,
    pub contacts: &'a [ScoredContact],
    pub steps: &'a [Step],
    pub total_cost: f64,
    pub pitched: bool,
}

/// Summary text and follow-up recommendations built from what the run found
pub fn synthesize(input: &SummaryInput<'_>) -> (String, Vec<String>) {
    let mut parts = vec![format!(
        "Run for {} stopped ({}) after {} iteration{}.",
        input.domain,
        reason_text(input.reason),
        input.iterations,
        if input.iterations == 1 { "" } else { "s" }
    )];

    match input.company {
        Some(company) if !company.is_empty() => {
            let profile = company.company();
            let mut facts = Vec::new();
            if let Some(name) = profile.name {
                facts.push(name);
            }
            if let Some(industry) = profile.industry {
                facts.push(industry);
            }
            if let Some(size) = profile.size {
                facts.push(format!("{} employees", size));
            }
            let detail = if facts.is_empty() {
                String::new()
            } else {
                format!(": {}", facts.join(", "))
            };
            parts.push(format!(
                "Company profiled from {} source{}{}.",
                company.sources.len(),
                if company.sources.len() == 1 { "" } else { "s" },
                detail
            ));
        }
        _ => parts.push("Company was not profiled.".to_string()),
    }

    if let Some(score) = input.company_score {
        parts.push(format!("Company fit score {}/100.", score));
    }

    if let Some(top) = input.contacts.first() {
        parts.push(format!(
            "{} contact{} found; best match {}{} (score {}).",
            input.contacts.len(),
            if input.contacts.len() == 1 { "" } else { "s" },
            top.contact.full_name,
            top.contact
                .title
                .as_deref()
                .map(|t| format!(", {}", t))
                .unwrap_or_default(),
            top.score
        ));
    }

    let failed: Vec<&Step> = input
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .collect();
    parts.push(format!(
        "{} step{} ({} failed), cost {:.4}.",
        input.steps.len(),
        if input.steps.len() == 1 { "" } else { "s" },
        failed.len(),
        input.total_cost
    ));

    let mut recommendations = Vec::new();
    if input.company.map(FusedRecord::is_empty).unwrap_or(true) {
        recommendations.push(format!("Research {} before outreach.", input.domain));
    }
    if input.contacts.is_empty() {
        recommendations.push("Find decision-maker contacts.".to_string());
    } else {
        for c in input.contacts.iter().take(3) {
            recommendations.push(format!(
                "Reach out to {}{}.",
                c.contact.full_name,
                c.contact
                    .email
                    .as_deref()
                    .map(|e| format!(" <{}>", e))
                    .unwrap_or_default()
            ));
        }
        if !input.pitched {
            recommendations.push("Draft a pitch for the top contact.".to_string());
        }
    }
    let mut retry: Vec<&str> = Vec::new();
    for step in &failed {
        if !retry.contains(&step.capability.as_str()) {
            retry.push(step.capability.as_str());
        }
    }
    if !retry.is_empty() {
        recommendations.push(format!("Retry failed capabilities: {}.", retry.join(", ")));
    }

    (parts.join(" "), recommendations)
}

fn reason_text(reason: TerminationReason) -> &'static str {
    match reason {
        TerminationReason::Completed => "completed",
        TerminationReason::BudgetExceeded => "budget exceeded",
        TerminationReason::IterationLimitReached => "iteration limit reached",
        TerminationReason::Cancelled => "cancelled",
        TerminationReason::ReasoningUnavailable => "reasoning engine unavailable",
    }
}
