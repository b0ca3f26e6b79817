use proptest::prelude::*;
use sdk::errors::{EngineError, ScoutErrorExt};
use sdk::evidence::{normalize_domain, EntityKey};
use sdk::schema::{FieldKind, InputSchema};

// Error hints never echo the raw error payload
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Database(error_str.clone()),
            EngineError::Reasoning(error_str.clone()),
            EngineError::DuplicateCapability(error_str.clone()),
            EngineError::Network(error_str.clone()),
            EngineError::MissingApiKey(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 12 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

// Domain normalization is idempotent and insensitive to scheme, www and case
proptest! {
    #[test]
    fn test_domain_normalization_idempotent(
        label in "[a-zA-Z0-9]{1,12}",
        tld in "(com|io|net|co)",
        scheme in "(https?://)?",
        www in "(www\\.|WWW\\.)?",
        path in "(/|/about|/a/b\\?x=1)?",
    ) {
        prop_assume!(label.to_lowercase() != "www");
        let raw = format!("{}{}{}.{}{}", scheme, www, label, tld, path);
        let once = normalize_domain(&raw);
        prop_assert_eq!(&once, &format!("{}.{}", label.to_lowercase(), tld));
        prop_assert_eq!(normalize_domain(&once), once.clone());
        prop_assert_eq!(EntityKey::company(&raw), EntityKey::company(&once));
    }
}

// Contact identity: email wins over name regardless of case and padding
proptest! {
    #[test]
    fn test_contact_key_email_case_insensitive(
        user in "[a-z]{1,10}",
        host in "[a-z]{1,10}",
        name_a in "[A-Za-z ]{1,20}",
        name_b in "[A-Za-z ]{1,20}",
    ) {
        let email = format!("{}@{}.com", user, host);
        let a = EntityKey::contact(Some(&email.to_uppercase()), &name_a);
        let b = EntityKey::contact(Some(&format!("  {}  ", email)), &name_b);
        prop_assert_eq!(a, b);
    }
}

// Schema validation never accepts a payload missing a required string
proptest! {
    #[test]
    fn test_schema_rejects_missing_required(other_key in "[a-z]{1,8}", value in "\\PC{0,20}") {
        prop_assume!(other_key != "domain");
        let schema = InputSchema::new().required("domain", FieldKind::String, "Company domain");
        let mut payload = serde_json::Map::new();
        payload.insert(other_key, serde_json::Value::String(value));
        let payload = serde_json::Value::Object(payload);
        prop_assert!(schema.validate(payload).is_err());
    }
}
