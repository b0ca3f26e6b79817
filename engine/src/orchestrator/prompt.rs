//! Prompts for the orchestration loop

use super::state::{RunRequest, Workflow};

/// Sent when the engine stopped without acting and without finishing
pub const CONTINUE_NUDGE: &str =
    "Continue. Invoke the next capability, or call `terminate` with your summary if the work is done.";

pub fn system_prompt(workflow: Workflow) -> String {
    let steps = match workflow {
        Workflow::Full => {
            "1. research_company to profile the company.\n\
             2. find_contacts to discover decision makers.\n\
             3. score_opportunity once company and contacts are known.\n\
             4. generate_pitch for the best contact.\n\
             5. persist_opportunity to save the result.\n\
             6. terminate with a summary and recommendations."
        }
        Workflow::Research => {
            "1. research_company to profile the company.\n\
             2. score_opportunity to rate the fit.\n\
             3. persist_opportunity to save the result.\n\
             4. terminate with a summary and recommendations."
        }
        Workflow::Contacts => {
            "1. find_contacts to discover decision makers.\n\
             2. score_opportunity to rank them.\n\
             3. terminate with a summary and recommendations."
        }
    };

    format!(
        "You are a sales research agent. You work only through the capabilities \
         you are given; every fact you report must come from their results.\n\n\
         Typical plan:\n{}\n\n\
         Rules:\n\
         - You may request several capabilities in one turn when they do not depend on each other.\n\
         - If a capability fails, read the error and adjust the arguments or move on.\n\
         - Do not repeat a successful call with the same arguments.\n\
         - Finish by calling `terminate`.",
        steps
    )
}

pub fn initial_instruction(request: &RunRequest) -> String {
    let mut text = format!(
        "Workflow: {}\nCompany domain: {}\n",
        request.workflow, request.domain
    );
    if let Some(name) = request.company_name.as_deref().filter(|n| !n.trim().is_empty()) {
        text.push_str(&format!("Company name: {}\n", name));
    }
    if !request.target_roles.is_empty() {
        text.push_str(&format!("Target roles: {}\n", request.target_roles.join(", ")));
    }
    if let Some(notes) = request.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        text.push_str(&format!("Notes: {}\n", notes));
    }
    text.push_str("\nBegin.");
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_mentions_request() {
        let mut request = RunRequest::new("acme.com").with_workflow(Workflow::Contacts);
        request.target_roles = vec!["CTO".to_string(), "VP Engineering".to_string()];
        let text = initial_instruction(&request);
        assert!(text.contains("Workflow: contacts"));
        assert!(text.contains("acme.com"));
        assert!(text.contains("CTO, VP Engineering"));
        assert!(!text.contains("Company name"));
    }

    #[test]
    fn test_system_prompt_follows_workflow() {
        assert!(!system_prompt(Workflow::Research).contains("find_contacts"));
        assert!(system_prompt(Workflow::Full).contains("generate_pitch"));
    }
}
