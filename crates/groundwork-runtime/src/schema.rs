//! JSON Schemas for generator output.
//!
//! Every structured response is checked against its schema before it is
//! deserialized. Schemas live in `schema/` at the workspace root and are
//! compiled once.

use std::sync::OnceLock;
use thiserror::Error;

const CANDIDATES_SCHEMA_JSON: &str = include_str!("../../../schema/candidates.schema.json");
const PLAN_SCHEMA_JSON: &str = include_str!("../../../schema/plan.schema.json");
const ANSWER_SCHEMA_JSON: &str = include_str!("../../../schema/answer.schema.json");

static CANDIDATES: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static PLAN: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static ANSWER: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

/// The response shapes the pipeline asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    Candidates,
    Plan,
    Answer,
}

impl ResponseSchema {
    fn validator(&self) -> Result<&'static jsonschema::Validator, SchemaError> {
        let (cell, raw) = match self {
            ResponseSchema::Candidates => (&CANDIDATES, CANDIDATES_SCHEMA_JSON),
            ResponseSchema::Plan => (&PLAN, PLAN_SCHEMA_JSON),
            ResponseSchema::Answer => (&ANSWER, ANSWER_SCHEMA_JSON),
        };

        let compiled = cell.get_or_init(|| {
            let value: serde_json::Value = serde_json::from_str(raw)
                .map_err(|e| format!("Invalid schema JSON: {}", e))?;
            jsonschema::options()
                .build(&value)
                .map_err(|e| format!("Failed to compile schema: {}", e))
        });

        compiled
            .as_ref()
            .map_err(|e| SchemaError::LoadError(e.clone()))
    }

    /// Validate a response value, returning every violation found.
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), Vec<String>> {
        let validator = self.validator().map_err(|e| vec![e.to_string()])?;

        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn is_valid(&self, value: &serde_json::Value) -> bool {
        self.validator()
            .map(|v| v.is_valid(value))
            .unwrap_or(false)
    }
}
