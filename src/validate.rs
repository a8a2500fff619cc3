//! Record validation: one pure pass over a record against a declared policy.
//!
//! Checks run in a fixed order:
//!
//! 1. **Unreadable marks**: fields containing the placeholder character. Fewer than
//!    `max_unreadable` are blanked and the record continues; more are a fault.
//! 2. **Identifier**: the identifier field must match `identifier_pattern`.
//! 3. **Auto-fill**: a blank `auto_fill` field takes its default value.
//! 4. **Completeness**: every field in `complete_fields` must be non-blank.
//!
//! The policy is plain data so that each form layout carries its own.

use crate::error::{RecordFault, ScanError};
use crate::record::{blank_like, is_blank, is_unreadable, ScanRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Two digits, a literal 0, then 1-9: the student/test identifier encoding.
pub const DEFAULT_IDENTIFIER_PATTERN: &str = r"^\d{2}0[1-9]";

/// Position of a field, counted from the start or back from the end of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldBound {
    At(usize),
    /// `FromEnd(1)` is the last field; as a range end it excludes the last field.
    FromEnd(usize),
}

impl FieldBound {
    pub fn resolve(self, len: usize) -> usize {
        match self {
            FieldBound::At(i) => i,
            FieldBound::FromEnd(k) => len.saturating_sub(k),
        }
    }
}

/// Half-open field range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRange {
    pub start: FieldBound,
    pub end: FieldBound,
}

/// Default value synthesized for a blank field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFill {
    pub field: FieldBound,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub separator: char,
    /// Placeholder the scanner prints for an unreadable mark.
    pub unreadable: char,
    /// Records with this many unreadable fields or more are refused.
    pub max_unreadable: usize,
    pub identifier_field: Option<usize>,
    pub identifier_pattern: String,
    pub complete_fields: Option<FieldRange>,
    pub auto_fill: Option<AutoFill>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationPolicy {
            separator: ',',
            unreadable: '?',
            max_unreadable: 1,
            identifier_field: Some(1),
            identifier_pattern: DEFAULT_IDENTIFIER_PATTERN.to_string(),
            complete_fields: None,
            auto_fill: None,
        }
    }
}

/// An accepted record and what was done to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub record: ScanRecord,
    pub sanitized: usize,
    pub auto_filled: bool,
}

#[derive(Debug, Clone)]
pub struct RecordValidator {
    policy: ValidationPolicy,
    identifier: Regex,
}

impl RecordValidator {
    pub fn new(policy: ValidationPolicy) -> Result<Self, ScanError> {
        let identifier = Regex::new(&policy.identifier_pattern)
            .map_err(|e| ScanError::Config(format!("identifier pattern: {}", e)))?;
        Ok(RecordValidator { policy, identifier })
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn identifier_ok(&self, token: &str) -> bool {
        self.identifier.is_match(token)
    }

    /// Split raw scanner text with the policy's separator and validate it.
    pub fn validate_text(&self, text: &str) -> Result<Validated, RecordFault> {
        self.validate(&ScanRecord::new(text, self.policy.separator))
    }

    pub fn validate(&self, record: &ScanRecord) -> Result<Validated, RecordFault> {
        let p = &self.policy;
        let mut tokens: Vec<String> = record.tokens().into_iter().map(String::from).collect();

        let unreadable: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| is_unreadable(t, p.unreadable))
            .map(|(i, _)| i)
            .collect();
        if !unreadable.is_empty() && unreadable.len() >= p.max_unreadable {
            return Err(RecordFault::Unreadable { fields: unreadable });
        }
        for &i in &unreadable {
            tokens[i] = blank_like(&tokens[i]);
        }

        if let Some(field) = p.identifier_field {
            let value = tokens.get(field).ok_or(RecordFault::MissingIdentifier { field })?;
            if !self.identifier.is_match(value) {
                return Err(RecordFault::BadIdentifier {
                    field,
                    value: value.clone(),
                });
            }
        }

        let mut auto_filled = false;
        if let Some(fill) = &p.auto_fill {
            let idx = fill.field.resolve(tokens.len());
            if let Some(t) = tokens.get_mut(idx) {
                if is_blank(t) {
                    *t = fill.value.clone();
                    auto_filled = true;
                }
            }
        }

        if let Some(range) = p.complete_fields {
            let start = range.start.resolve(tokens.len());
            let end = range.end.resolve(tokens.len());
            if let Some(field) = (start..end).find(|&i| tokens.get(i).map_or(true, |t| is_blank(t))) {
                return Err(RecordFault::Incomplete { field });
            }
        }

        Ok(Validated {
            record: ScanRecord::from_tokens(&tokens, p.separator),
            sanitized: unreadable.len(),
            auto_filled,
        })
    }
}
