//! Record schema validation.
//!
//! A [`RecordSchema`] is compiled once from configuration and shared
//! read-only (it is `Send + Sync`) by every validation call. Validation never
//! stops at the first problem: an invalid record reports every violated rule
//! so the row's error detail lists all of them.

use std::collections::HashSet;
use std::fmt;

use snafu::prelude::*;

use crate::config::{FieldType, SchemaConfig};
use crate::error::{
    DuplicateFieldSnafu, EmptySchemaSnafu, InvalidLengthBoundsSnafu, RecordFailure, SchemaError,
};
use crate::record::Record;

/// A single violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Required field is absent.
    Missing { field: String },
    /// Value does not parse as the declared type.
    WrongType { field: String, expected: FieldType },
    /// Value is shorter than allowed.
    TooShort { field: String, min: usize },
    /// Value is longer than allowed.
    TooLong { field: String, max: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing { field } => write!(f, "must have required property '{field}'"),
            Violation::WrongType { field, expected } => {
                write!(f, "{field} must be {}", expected.as_str())
            }
            Violation::TooShort { field, min } => {
                write!(f, "{field} must NOT have fewer than {min} characters")
            }
            Violation::TooLong { field, max } => {
                write!(f, "{field} must NOT have more than {max} characters")
            }
        }
    }
}

/// Result of validating one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid { violations: Vec<Violation> },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    /// Human-readable reasons, in rule order.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            ValidationOutcome::Valid => Vec::new(),
            ValidationOutcome::Invalid { violations } => {
                violations.iter().map(ToString::to_string).collect()
            }
        }
    }

    /// Convert into a record failure, or `None` when valid.
    pub fn into_failure(self) -> Option<RecordFailure> {
        match self {
            ValidationOutcome::Valid => None,
            invalid => Some(RecordFailure::Validation {
                reasons: invalid.reasons(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    field_type: FieldType,
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl FieldRule {
    fn check(&self, record: &Record, violations: &mut Vec<Violation>) {
        let Some(value) = record.get(&self.name) else {
            if self.required {
                violations.push(Violation::Missing {
                    field: self.name.clone(),
                });
            }
            return;
        };

        if !type_matches(self.field_type, value) {
            violations.push(Violation::WrongType {
                field: self.name.clone(),
                expected: self.field_type,
            });
        }

        let length = value.chars().count();
        if let Some(min) = self.min_length
            && length < min
        {
            violations.push(Violation::TooShort {
                field: self.name.clone(),
                min,
            });
        }
        if let Some(max) = self.max_length
            && length > max
        {
            violations.push(Violation::TooLong {
                field: self.name.clone(),
                max,
            });
        }
    }
}

fn type_matches(field_type: FieldType, value: &str) -> bool {
    match field_type {
        FieldType::String => true,
        FieldType::Integer => value.parse::<i64>().is_ok(),
        FieldType::Number => value.parse::<f64>().is_ok_and(f64::is_finite),
        FieldType::Boolean => matches!(value, "true" | "false"),
    }
}

/// A compiled, immutable record schema.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    rules: Vec<FieldRule>,
}

impl RecordSchema {
    /// Compile a schema definition.
    pub fn compile(config: &SchemaConfig) -> Result<Self, SchemaError> {
        ensure!(!config.fields.is_empty(), EmptySchemaSnafu);

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(config.fields.len());
        for field in &config.fields {
            ensure!(
                seen.insert(field.name.as_str()),
                DuplicateFieldSnafu {
                    field: field.name.clone(),
                }
            );
            if let (Some(min), Some(max)) = (field.min_length, field.max_length) {
                ensure!(
                    min <= max,
                    InvalidLengthBoundsSnafu {
                        field: field.name.clone(),
                        min,
                        max,
                    }
                );
            }
            rules.push(FieldRule {
                name: field.name.clone(),
                field_type: field.field_type,
                required: field.required,
                min_length: field.min_length,
                max_length: field.max_length,
            });
        }

        Ok(Self { rules })
    }

    /// Validate a record against every rule.
    pub fn validate(&self, record: &Record) -> ValidationOutcome {
        let mut violations = Vec::new();
        for rule in &self.rules {
            rule.check(record, &mut violations);
        }

        if violations.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid { violations }
        }
    }
}
