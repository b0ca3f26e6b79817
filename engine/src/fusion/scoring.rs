//! Scoring Policy
//!
//! An entity's aggregate score is the sum of the points of every rule whose
//! predicate matches, clamped to [0, 100]. Rules are an ordered list supplied
//! by configuration; the weights below are only defaults.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sdk::entity::{ContactProfile, Seniority};
use sdk::evidence::FieldMap;

/// Anything that can contribute points to a score
pub trait Rule<S: ?Sized> {
    fn matches(&self, subject: &S) -> bool;
    fn points(&self) -> i32;
}

impl<S: ?Sized, F> Rule<S> for (F, i32)
where
    F: Fn(&S) -> bool,
{
    fn matches(&self, subject: &S) -> bool {
        (self.0)(subject)
    }

    fn points(&self) -> i32 {
        self.1
    }
}

/// Sum matching rules and clamp to [0, 100]
pub fn aggregate<S: ?Sized, R: Rule<S>>(rules: &[R], subject: &S) -> u8 {
    let total: i64 = rules
        .iter()
        .filter(|r| r.matches(subject))
        .map(|r| i64::from(r.points()))
        .sum();
    total.clamp(0, 100) as u8
}

/// What the run is looking for; consumed by the `target_*` predicates
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Targeting {
    /// Roles worth reaching (matched case-insensitively against titles)
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub industries: Vec<String>,

    /// Employee bands, e.g. `"51-200"`
    #[serde(default)]
    pub sizes: Vec<String>,
}

/// Entity being scored together with the run's targeting
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub fields: &'a FieldMap,
    pub targeting: &'a Targeting,
}

impl<'a> Subject<'a> {
    pub fn new(fields: &'a FieldMap, targeting: &'a Targeting) -> Self {
        Self { fields, targeting }
    }

    fn str_field(&self, name: &str) -> Option<&'a str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    fn list_field(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_lowercase())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn seniority(&self) -> Seniority {
        ContactProfile::from_fields(self.fields).effective_seniority()
    }
}

/// Case-insensitive title regexes, compiled when the policy is loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TitlePatterns {
    sources: Vec<String>,
    compiled: Vec<Regex>,
}

impl TitlePatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let compiled = sources
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| format!("invalid title pattern '{}': {}", p, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sources, compiled })
    }

    pub fn is_match(&self, title: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(title))
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

impl TryFrom<Vec<String>> for TitlePatterns {
    type Error = String;

    fn try_from(patterns: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(patterns)
    }
}

impl From<TitlePatterns> for Vec<String> {
    fn from(patterns: TitlePatterns) -> Self {
        patterns.sources
    }
}

impl PartialEq for TitlePatterns {
    fn eq(&self, other: &Self) -> bool {
        self.sources == other.sources
    }
}

/// Declarative predicates usable from config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Predicate {
    /// Seniority (reported or inferred from title) equals the given band
    SeniorityIs { seniority: Seniority },
    /// Seniority is at or above the given band
    SeniorityAtLeast { seniority: Seniority },
    /// Field is present and non-empty
    HasField { field: String },
    /// String field equals value, case-insensitively
    FieldEquals { field: String, value: String },
    /// `email_verified` is true
    VerifiedEmail,
    /// Title matches any of the case-insensitive regexes
    TitleMatches { patterns: TitlePatterns },
    /// Title contains one of the targeted roles
    TargetRole,
    TargetIndustry,
    TargetSize,
    /// List field contains at least `min` items
    ListLenAtLeast { field: String, min: usize },
    /// List field contains any of the values
    ListContainsAny { field: String, values: Vec<String> },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Predicate {
    pub fn matches(&self, subject: &Subject<'_>) -> bool {
        match self {
            Predicate::SeniorityIs { seniority } => subject.seniority() == *seniority,
            Predicate::SeniorityAtLeast { seniority } => {
                let actual = subject.seniority();
                actual != Seniority::Unknown && actual >= *seniority
            }
            Predicate::HasField { field } => match subject.fields.get(field) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(Value::Array(a)) => !a.is_empty(),
                Some(Value::Object(o)) => !o.is_empty(),
                Some(_) => true,
            },
            Predicate::FieldEquals { field, value } => subject
                .str_field(field)
                .map(|s| s.trim().eq_ignore_ascii_case(value.trim()))
                .unwrap_or(false),
            Predicate::VerifiedEmail => {
                subject.fields.get("email_verified").and_then(Value::as_bool) == Some(true)
                    && subject.str_field("email").is_some()
            }
            Predicate::TitleMatches { patterns } => subject
                .str_field("title")
                .map(|title| patterns.is_match(title))
                .unwrap_or(false),
            Predicate::TargetRole => {
                let Some(title) = subject.str_field("title") else {
                    return false;
                };
                let title = title.to_lowercase();
                subject
                    .targeting
                    .roles
                    .iter()
                    .map(|r| r.trim().to_lowercase())
                    .any(|r| !r.is_empty() && title.contains(&r))
            }
            Predicate::TargetIndustry => subject
                .str_field("industry")
                .map(|industry| {
                    let industry = industry.to_lowercase();
                    subject
                        .targeting
                        .industries
                        .iter()
                        .any(|t| industry.contains(&t.trim().to_lowercase()))
                })
                .unwrap_or(false),
            Predicate::TargetSize => subject
                .str_field("size")
                .map(|size| {
                    subject
                        .targeting
                        .sizes
                        .iter()
                        .any(|t| t.trim().eq_ignore_ascii_case(size.trim()))
                })
                .unwrap_or(false),
            Predicate::ListLenAtLeast { field, min } => subject.list_field(field).len() >= *min,
            Predicate::ListContainsAny { field, values } => {
                let items = subject.list_field(field);
                values
                    .iter()
                    .any(|v| items.contains(&v.trim().to_lowercase()))
            }
            Predicate::All { of } => of.iter().all(|p| p.matches(subject)),
            Predicate::Any { of } => of.iter().any(|p| p.matches(subject)),
            Predicate::Not { predicate } => !predicate.matches(subject),
        }
    }
}

/// One `(predicate, points)` entry of a policy table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringRule {
    #[serde(flatten)]
    pub predicate: Predicate,
    pub points: i32,
    /// Free-form label shown in score breakdowns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ScoringRule {
    pub fn new(predicate: Predicate, points: i32) -> Self {
        Self {
            predicate,
            points,
            label: None,
        }
    }

    pub fn labeled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

impl<'a> Rule<Subject<'a>> for ScoringRule {
    fn matches(&self, subject: &Subject<'a>) -> bool {
        self.predicate.matches(subject)
    }

    fn points(&self) -> i32 {
        self.points
    }
}

/// Company and contact rule tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringPolicy {
    #[serde(default = "default_company_rules")]
    pub company: Vec<ScoringRule>,

    #[serde(default = "default_contact_rules")]
    pub contact: Vec<ScoringRule>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            company: default_company_rules(),
            contact: default_contact_rules(),
        }
    }
}

impl ScoringPolicy {
    pub fn score_company(&self, fields: &FieldMap, targeting: &Targeting) -> u8 {
        aggregate(&self.company, &Subject::new(fields, targeting))
    }

    pub fn score_contact(&self, fields: &FieldMap, targeting: &Targeting) -> u8 {
        aggregate(&self.contact, &Subject::new(fields, targeting))
    }

    /// Labels of the contact rules that matched, for summaries
    pub fn explain_contact(&self, fields: &FieldMap, targeting: &Targeting) -> Vec<String> {
        explain(&self.contact, &Subject::new(fields, targeting))
    }

    pub fn explain_company(&self, fields: &FieldMap, targeting: &Targeting) -> Vec<String> {
        explain(&self.company, &Subject::new(fields, targeting))
    }
}

fn explain(rules: &[ScoringRule], subject: &Subject<'_>) -> Vec<String> {
    rules
        .iter()
        .filter(|r| r.matches(subject))
        .map(|r| {
            let label = r
                .label
                .clone()
                .unwrap_or_else(|| format!("{:?}", r.predicate));
            format!("{} ({:+})", label, r.points)
        })
        .collect()
}

pub fn default_contact_rules() -> Vec<ScoringRule> {
    vec![
        ScoringRule::new(
            Predicate::SeniorityIs {
                seniority: Seniority::CLevel,
            },
            40,
        )
        .labeled("c-level"),
        ScoringRule::new(
            Predicate::SeniorityIs {
                seniority: Seniority::Vp,
            },
            30,
        )
        .labeled("vp"),
        ScoringRule::new(
            Predicate::SeniorityIs {
                seniority: Seniority::Director,
            },
            20,
        )
        .labeled("director"),
        ScoringRule::new(
            Predicate::SeniorityIs {
                seniority: Seniority::Manager,
            },
            10,
        )
        .labeled("manager"),
        ScoringRule::new(
            Predicate::HasField {
                field: "email".to_string(),
            },
            10,
        )
        .labeled("email"),
        ScoringRule::new(Predicate::VerifiedEmail, 5).labeled("verified email"),
        ScoringRule::new(
            Predicate::HasField {
                field: "phone".to_string(),
            },
            10,
        )
        .labeled("phone"),
        ScoringRule::new(
            Predicate::HasField {
                field: "linkedin_url".to_string(),
            },
            5,
        )
        .labeled("linkedin"),
        ScoringRule::new(Predicate::TargetRole, 20).labeled("role match"),
    ]
}

pub fn default_company_rules() -> Vec<ScoringRule> {
    vec![
        ScoringRule::new(Predicate::TargetIndustry, 25).labeled("industry fit"),
        ScoringRule::new(Predicate::TargetSize, 20).labeled("size fit"),
        ScoringRule::new(
            Predicate::HasField {
                field: "funding".to_string(),
            },
            15,
        )
        .labeled("funded"),
        ScoringRule::new(
            Predicate::ListLenAtLeast {
                field: "tech_stack".to_string(),
                min: 3,
            },
            10,
        )
        .labeled("known stack"),
        ScoringRule::new(
            Predicate::HasField {
                field: "products".to_string(),
            },
            10,
        )
        .labeled("products"),
        ScoringRule::new(
            Predicate::HasField {
                field: "industry".to_string(),
            },
            5,
        )
        .labeled("profiled"),
    ]
}
