//! Contact deduplication
//!
//! Contacts found by several providers are collapsed by identity key (email if
//! present, else full name, both lower-cased). The first occurrence is the one
//! that survives; scoring looks at the union of every duplicate's attributes.

use serde::Serialize;
use std::collections::HashMap;

use sdk::entity::ContactProfile;
use sdk::evidence::EntityKey;

use super::scoring::{ScoringPolicy, Targeting};

/// Every occurrence of one real-world contact
#[derive(Debug, Clone, PartialEq)]
pub struct ContactGroup {
    pub key: EntityKey,
    /// First occurrence
    pub representative: ContactProfile,
    /// All occurrences, including the representative, in input order
    pub members: Vec<ContactProfile>,
}

impl ContactGroup {
    fn new(key: EntityKey, first: ContactProfile) -> Self {
        Self {
            key,
            representative: first.clone(),
            members: vec![first],
        }
    }

    /// Attributes contributed by all members
    ///
    /// Each field takes the first non-empty value in occurrence order, except
    /// `email_verified` which holds if any member verified the address.
    pub fn union(&self) -> ContactProfile {
        let mut merged = self.representative.clone();
        for m in self.members.iter().skip(1) {
            if merged.full_name.trim().is_empty() {
                merged.full_name = m.full_name.clone();
            }
            fill(&mut merged.title, &m.title);
            fill(&mut merged.email, &m.email);
            fill(&mut merged.phone, &m.phone);
            fill(&mut merged.department, &m.department);
            fill(&mut merged.linkedin_url, &m.linkedin_url);
            fill(&mut merged.company_domain, &m.company_domain);
            if merged.seniority.is_none() {
                merged.seniority = m.seniority;
            }
        }
        let verified = self
            .members
            .iter()
            .any(|m| m.email_verified == Some(true));
        if verified {
            merged.email_verified = Some(true);
        } else if merged.email_verified.is_none() {
            merged.email_verified = self.members.iter().find_map(|m| m.email_verified);
        }
        merged
    }
}

fn fill(slot: &mut Option<String>, candidate: &Option<String>) {
    let empty = slot.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
    if empty {
        if let Some(c) = candidate.as_deref().filter(|c| !c.trim().is_empty()) {
            *slot = Some(c.to_string());
        }
    }
}

/// Group contacts by identity key, preserving first-occurrence order
///
/// Contacts with neither email nor name cannot be identified and are dropped.
pub fn dedup_contacts(contacts: &[ContactProfile]) -> Vec<ContactGroup> {
    let mut groups: Vec<ContactGroup> = Vec::new();
    let mut index: HashMap<EntityKey, usize> = HashMap::new();

    for contact in contacts {
        let key = EntityKey::contact(contact.email.as_deref(), &contact.full_name);
        if key.id.is_empty() {
            continue;
        }
        match index.get(&key) {
            Some(&i) => groups[i].members.push(contact.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(ContactGroup::new(key, contact.clone()));
            }
        }
    }

    groups
}

/// A deduplicated contact with its derived authority score
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredContact {
    /// Surviving representative with `authority_score` filled in
    pub contact: ContactProfile,
    pub score: u8,
    /// Matched rule labels
    pub reasons: Vec<String>,
    /// How many raw entries collapsed into this one
    pub occurrences: usize,
}

/// Deduplicate, score over each group's union, and sort best first
///
/// Ties keep first-occurrence order.
pub fn rank_contacts(
    contacts: &[ContactProfile],
    policy: &ScoringPolicy,
    targeting: &Targeting,
) -> Vec<ScoredContact> {
    let mut scored: Vec<ScoredContact> = dedup_contacts(contacts)
        .into_iter()
        .map(|group| {
            let fields = group.union().to_fields();
            let score = policy.score_contact(&fields, targeting);
            let mut contact = group.representative;
            contact.authority_score = Some(score);
            ScoredContact {
                contact,
                score,
                reasons: policy.explain_contact(&fields, targeting),
                occurrences: group.members.len(),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(name: &str, email: Option<&str>, title: Option<&str>) -> ContactProfile {
        ContactProfile {
            full_name: name.to_string(),
            email: email.map(String::from),
            title: title.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_email_collapses_and_scores_union() {
        let mut first = contact("J. Doe", Some("Jane@Acme.com"), None);
        first.phone = Some("+1 555 0100".to_string());
        let second = contact("Jane Doe", Some("jane@acme.com"), Some("VP Sales"));

        let ranked = rank_contacts(
            &[first, second],
            &ScoringPolicy::default(),
            &Targeting::default(),
        );

        assert_eq!(ranked.len(), 1);
        let only = &ranked[0];
        assert_eq!(only.contact.full_name, "J. Doe");
        assert_eq!(only.occurrences, 2);
        // vp 30 + email 10 + phone 10, title comes from the duplicate
        assert_eq!(only.score, 50);
        assert_eq!(only.contact.authority_score, Some(50));
    }

    #[test]
    fn test_name_fallback_when_no_email() {
        let groups = dedup_contacts(&[
            contact("Sam Lee", None, Some("CTO")),
            contact("  sam   LEE ", None, Some("Engineer")),
            contact("Sam Lee", Some("sam@acme.com"), None),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[0].union().title.as_deref(), Some("CTO"));
    }

    #[test]
    fn test_unidentifiable_contacts_dropped() {
        let groups = dedup_contacts(&[contact("", None, Some("CEO"))]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_verified_if_any_member_verified() {
        let mut a = contact("A", Some("a@x.io"), None);
        a.email_verified = Some(false);
        let mut b = contact("A", Some("a@x.io"), None);
        b.email_verified = Some(true);

        let groups = dedup_contacts(&[a, b]);
        assert_eq!(groups[0].union().email_verified, Some(true));
    }

    #[test]
    fn test_ranked_best_first() {
        let ranked = rank_contacts(
            &[
                contact("Ann", None, Some("Engineer")),
                contact("Bob", None, Some("Chief Executive Officer")),
            ],
            &ScoringPolicy::default(),
            &Targeting::default(),
        );
        assert_eq!(ranked[0].contact.full_name, "Bob");
        assert!(ranked[0].score > ranked[1].score);
    }
}
