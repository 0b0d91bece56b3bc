//! Structural JSON Schema checks for judge replies.
//!
//! The schemas only reject replies whose shape is
//! wrong (an evidence field that is not a list, a verification reply with no
//! `verified` flag) and leave value coercion to [`super::parse`].

use std::sync::OnceLock;

use crate::types::JudgeRole;

const HALLUCINATION_SCHEMA: &str = include_str!("../../schemas/hallucination.schema.json");
const DOCUMENT_RELEVANCE_SCHEMA: &str =
    include_str!("../../schemas/document_relevance.schema.json");
const COMPLETENESS_SCHEMA: &str = include_str!("../../schemas/completeness.schema.json");
const ESCALATION_SCHEMA: &str = include_str!("../../schemas/escalation.schema.json");
const VERIFICATION_SCHEMA: &str = include_str!("../../schemas/verification.schema.json");

type Compiled = OnceLock<Result<jsonschema::Validator, String>>;

static HALLUCINATION: Compiled = OnceLock::new();
static DOCUMENT_RELEVANCE: Compiled = OnceLock::new();
static COMPLETENESS: Compiled = OnceLock::new();
static ESCALATION: Compiled = OnceLock::new();
static VERIFICATION: Compiled = OnceLock::new();

fn slot(role: JudgeRole) -> (&'static Compiled, &'static str) {
    match role {
        JudgeRole::Hallucination => (&HALLUCINATION, HALLUCINATION_SCHEMA),
        JudgeRole::DocumentRelevance => (&DOCUMENT_RELEVANCE, DOCUMENT_RELEVANCE_SCHEMA),
        JudgeRole::Completeness => (&COMPLETENESS, COMPLETENESS_SCHEMA),
        JudgeRole::Escalation => (&ESCALATION, ESCALATION_SCHEMA),
        JudgeRole::Verification => (&VERIFICATION, VERIFICATION_SCHEMA),
    }
}

/// Get or compile the validator for a role.
fn get_validator(role: JudgeRole) -> Result<&'static jsonschema::Validator, String> {
    let (cell, source) = slot(role);
    let result = cell.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(source)
            .map_err(|e| format!("Invalid {} schema JSON: {}", role, e))?;
        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile {} schema: {}", role, e))
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(e.clone()),
    }
}

/// Errors from reply validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaFailure {
    /// The embedded schema itself could not be loaded
    Load(String),
    /// The reply does not match the schema
    Invalid(Vec<String>),
}

/// Validate a decoded reply against the schema for `role`.
pub fn validate_reply(role: JudgeRole, reply: &serde_json::Value) -> Result<(), SchemaFailure> {
    let validator = get_validator(role).map_err(SchemaFailure::Load)?;

    let errors: Vec<String> = validator
        .iter_errors(reply)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaFailure::Invalid(errors))
    }
}
