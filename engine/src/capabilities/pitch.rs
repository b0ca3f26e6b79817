//! `generate_pitch`
//!
//! Drafts outreach copy for one contact. The default writer asks the
//! configured reasoning engine with no capabilities on offer and reports the
//! tokens it spent as the capability cost, including when the draft it got
//! back is unusable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use sdk::capability::{Capability, CapabilityContext, CapabilityError};
use sdk::entity::{CompanyProfile, ContactProfile};
use sdk::evidence::{normalize_domain, normalize_email, normalize_name};
use sdk::schema::{FieldKind, InputSchema};
use sdk::types::{CapabilityInput, CapabilityOutput, TokenUsage};

use super::scoring::OpportunityScorer;
use crate::llm::{Message, ReasoningEngine};

/// Everything the writer knows about the recipient
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PitchBrief {
    pub company: CompanyProfile,
    pub contact: ContactProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_proposition: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PitchDraft {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub usage: TokenUsage,
}

#[async_trait]
pub trait PitchWriter: Send + Sync {
    /// A failure after paid work must carry that spend
    /// (see [`CapabilityError::with_spend`])
    async fn write(&self, brief: &PitchBrief) -> Result<PitchDraft, CapabilityError>;
}

pub struct LlmPitchWriter {
    engine: Arc<dyn ReasoningEngine>,
}

impl LlmPitchWriter {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self { engine }
    }

    fn prompt(brief: &PitchBrief) -> String {
        let company = serde_json::to_string_pretty(&brief.company).unwrap_or_default();
        let mut text = format!(
            "Write a short cold outreach email to {}{} at {}.\n\nWhat we know about the company:\n{}\n",
            brief.contact.full_name,
            brief
                .contact
                .title
                .as_deref()
                .map(|t| format!(" ({})", t))
                .unwrap_or_default(),
            brief.company.name.as_deref().unwrap_or(&brief.company.domain),
            company
        );
        if let Some(value) = &brief.value_proposition {
            text.push_str(&format!("\nOur value proposition: {}\n", value));
        }
        if let Some(tone) = &brief.tone {
            text.push_str(&format!("\nTone: {}\n", tone));
        }
        text.push_str(
            "\nAnswer with JSON only: {\"subject\": \"...\", \"body\": \"...\"}. \
             Keep the body under 150 words and mention only facts listed above.",
        );
        text
    }
}

#[async_trait]
impl PitchWriter for LlmPitchWriter {
    async fn write(&self, brief: &PitchBrief) -> Result<PitchDraft, CapabilityError> {
        let history = vec![
            Message::system("You write concise, specific B2B outreach emails."),
            Message::user(Self::prompt(brief)),
        ];
        let turn = self
            .engine
            .converse(&history, &[])
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("pitch writer: {}", e)))?;

        let cost = self.engine.pricing().cost_of(turn.usage);
        let (subject, body) = parse_draft(&turn.content).ok_or_else(|| {
            CapabilityError::Failed("pitch writer returned an empty draft".to_string())
                .with_spend(cost, turn.usage)
        })?;
        Ok(PitchDraft {
            subject,
            body,
            cost,
            usage: turn.usage,
        })
    }
}

/// Read a draft written either as JSON (optionally fenced) or as
/// `Subject: ...` followed by the body
pub fn parse_draft(content: &str) -> Option<(String, String)> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(unfenced) {
        let subject = map.get("subject").and_then(Value::as_str).unwrap_or("").trim();
        let body = map.get("body").and_then(Value::as_str).unwrap_or("").trim();
        if !body.is_empty() {
            return Some((subject.to_string(), body.to_string()));
        }
    }

    let mut lines = trimmed.lines();
    let first = lines.next().unwrap_or("");
    let is_subject = first
        .get(..8)
        .map(|p| p.eq_ignore_ascii_case("subject:"))
        .unwrap_or(false);
    if is_subject {
        let subject = first[8..].trim().to_string();
        let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
        return (!body.is_empty()).then_some((subject, body));
    }

    Some((String::new(), trimmed.to_string()))
}

pub struct GeneratePitchCapability {
    writer: Arc<dyn PitchWriter>,
    scorer: Arc<dyn OpportunityScorer>,
}

impl GeneratePitchCapability {
    pub fn new(writer: Arc<dyn PitchWriter>, scorer: Arc<dyn OpportunityScorer>) -> Self {
        Self { writer, scorer }
    }

    /// The named contact, or the best-scoring one
    fn pick_contact(
        &self,
        contacts: Vec<ContactProfile>,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<ContactProfile, CapabilityError> {
        if let Some(email) = email.map(normalize_email) {
            return contacts
                .into_iter()
                .find(|c| c.email.as_deref().map(normalize_email).as_deref() == Some(email.as_str()))
                .ok_or_else(|| CapabilityError::Failed(format!("no known contact with email {}", email)));
        }
        if let Some(name) = name.map(normalize_name) {
            return contacts
                .into_iter()
                .find(|c| normalize_name(&c.full_name) == name)
                .ok_or_else(|| CapabilityError::Failed(format!("no known contact named {}", name)));
        }
        self.scorer
            .score(None, &contacts, &[])
            .contacts
            .into_iter()
            .next()
            .map(|c| c.contact)
            .ok_or_else(|| {
                CapabilityError::Failed("no contacts known yet; call find_contacts first".to_string())
            })
    }
}

#[async_trait]
impl Capability for GeneratePitchCapability {
    fn name(&self) -> &str {
        "generate_pitch"
    }

    fn description(&self) -> &str {
        "Draft a personalised outreach email for a contact found earlier in this run. \
         Without contact_email or contact_name the best-scoring contact is used."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("domain", FieldKind::String, "Company web domain")
            .optional("contact_email", FieldKind::String, "Email of the recipient")
            .optional("contact_name", FieldKind::String, "Full name of the recipient")
            .optional("tone", FieldKind::String, "Desired tone, e.g. 'friendly'")
            .optional("value_proposition", FieldKind::String, "What we offer")
    }

    async fn invoke(
        &self,
        input: CapabilityInput,
        ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let domain = normalize_domain(&input.param_str("domain")?);
        let contacts: Vec<ContactProfile> =
            ctx.contacts_of(&domain).into_iter().map(|r| r.contact()).collect();
        let contact = self.pick_contact(
            contacts,
            input.param_str_opt("contact_email").as_deref(),
            input.param_str_opt("contact_name").as_deref(),
        )?;
        let company = ctx
            .company(&domain)
            .map(|r| r.company())
            .unwrap_or_else(|| CompanyProfile::new(domain.clone()));

        let brief = PitchBrief {
            company,
            contact,
            tone: input.param_str_opt("tone"),
            value_proposition: input.param_str_opt("value_proposition"),
        };
        let draft = self.writer.write(&brief).await?;

        let summary = format!(
            "Drafted pitch for {}: \"{}\" ({} words).",
            brief.contact.full_name,
            draft.subject,
            draft.body.split_whitespace().count()
        );
        let artifact = json!({
            "domain": domain,
            "contact": {
                "full_name": brief.contact.full_name,
                "email": brief.contact.email,
                "title": brief.contact.title,
            },
            "subject": draft.subject,
            "body": draft.body,
        });
        Ok(CapabilityOutput::summary(summary)
            .with_cost(draft.cost)
            .with_usage(draft.usage)
            .with_artifact(artifact))
    }
}
