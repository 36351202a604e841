//! Error taxonomy shared by every guarded collection.

use crate::domain::hooks::EventKind;
use serde::Serialize;
use std::fmt;

pub type GuardResult<T> = Result<T, GuardError>;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Construction-time misconfiguration (missing schema, unknown fields, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// A write reached the store without going through the generated procedures.
    #[error("access denied: {0}")]
    Authorization(String),

    /// A hook handler failed. Never swallowed.
    #[error("hook handler for '{event}' failed: {source}")]
    Hook {
        event: EventKind,
        #[source]
        source: anyhow::Error,
    },
}

impl GuardError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        GuardError::Configuration(msg.into())
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        GuardError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Short machine-readable code, used by transports.
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::Configuration(_) => "CONFIGURATION",
            GuardError::Validation(_) => "VALIDATION",
            GuardError::NotFound { .. } => "NOT_FOUND",
            GuardError::Authorization(_) => "AUTHORIZATION",
            GuardError::Hook { .. } => "HOOK",
        }
    }
}

/// Which constraint a field broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Required,
    NotAllowed,
    Type,
    Min,
    Max,
    AllowedValues,
    IdFormat,
    Modifier,
    Argument,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rule::Required => "required",
            Rule::NotAllowed => "not_allowed",
            Rule::Type => "type",
            Rule::Min => "min",
            Rule::Max => "max",
            Rule::AllowedValues => "allowed_values",
            Rule::IdFormat => "id_format",
            Rule::Modifier => "modifier",
            Rule::Argument => "argument",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub rule: Rule,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, rule: Rule, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule,
            message: message.into(),
        }
    }
}

/// Malformed mutation input or channel arguments. Raised before the store is touched.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("validation failed for {}{}", .context, list_violations(.violations))]
pub struct ValidationError {
    pub context: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(context: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self {
            context: context.into(),
            violations,
        }
    }

    pub fn single(context: impl Into<String>, violation: FieldViolation) -> Self {
        Self::new(context, vec![violation])
    }

    /// Re-labels the error with the procedure or channel that raised it.
    pub fn within(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.field.as_str())
    }

    pub fn has(&self, field: &str, rule: Rule) -> bool {
        self.violations
            .iter()
            .any(|v| v.field == field && v.rule == rule)
    }
}

fn list_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let sep = if i == 0 { ": " } else { "; " };
            format!("{}{} ({}): {}", sep, v.field, v.rule, v.message)
        })
        .collect()
}
