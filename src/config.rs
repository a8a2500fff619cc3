//! TOML configuration: session tuning, threshold, validation policy and an
//! optional declarative form layout.
//!
//! ```toml
//! [session]
//! response_timeout_ms = 5000
//! end_of_batch = "!"
//!
//! [threshold]
//! darkness = 50
//! contrast = 40
//!
//! [validation]
//! identifier_field = 1
//! complete_fields = { start = { at = 4 }, end = { from_end = 0 } }
//!
//! [form]
//! lines = 21
//! identifier = { orientation = "L", position = 21, mask = "01" }
//!
//! [[form.fields]]
//! kind = "fixed"
//! literal = "I"
//!
//! [[form.fields]]
//! kind = "multiple_choice"
//! mark_size = 1
//! line = 20
//! column = 15
//! orientation = "C"
//! field_size = 4
//! values = "0123456789"
//! ```

use crate::error::ScanError;
use crate::form::{FormDefinition, SpacingTerm, DEFAULT_COLUMNS, DEFAULT_COLUMN_SPACING};
use crate::geometry::{FieldGeometry, FixedValue, FormIdentifier, MultipleChoice, RandomEntry, RandomInput};
use crate::layout::FormLayout;
use crate::session::{SessionConfig, DEFAULT_END_OF_BATCH, DEFAULT_RESPONSE_TIMEOUT};
use crate::validate::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub session: SessionSection,
    pub threshold: Option<ThresholdSection>,
    pub validation: ValidationPolicy,
    pub form: Option<FormSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub response_timeout_ms: u64,
    pub end_of_batch: String,
    pub command_delay_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        SessionSection {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            end_of_batch: DEFAULT_END_OF_BATCH.to_string(),
            command_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSection {
    pub darkness: u8,
    pub contrast: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSection {
    pub lines: u32,
    #[serde(default = "default_columns")]
    pub columns: u32,
    #[serde(default = "default_column_spacing")]
    pub column_spacing: u32,
    #[serde(default)]
    pub spacing_term: SpacingTerm,
    #[serde(default)]
    pub identifier: Option<IdentifierSpec>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

fn default_columns() -> u32 {
    DEFAULT_COLUMNS
}

fn default_column_spacing() -> u32 {
    DEFAULT_COLUMN_SPACING
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierSpec {
    pub orientation: String,
    pub position: u32,
    pub mask: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    Fixed {
        /// Defaults to the literal's length.
        #[serde(default)]
        size: Option<u32>,
        literal: String,
    },
    MultipleChoice {
        mark_size: u32,
        line: u32,
        column: u32,
        orientation: String,
        field_size: u32,
        values: String,
    },
    RandomInput {
        field_len: u32,
        entries: Vec<EntrySpec>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySpec {
    pub size: u32,
    pub line: u32,
    pub column: u32,
    pub value: String,
}

impl FieldSpec {
    pub fn to_geometry(&self) -> Result<FieldGeometry, ScanError> {
        Ok(match self {
            FieldSpec::Fixed { size, literal } => {
                let size = size.unwrap_or(literal.chars().count() as u32);
                FixedValue::new(size, literal.clone())?.into()
            }
            FieldSpec::MultipleChoice {
                mark_size,
                line,
                column,
                orientation,
                field_size,
                values,
            } => MultipleChoice::new(*mark_size, *line, *column, orientation.parse()?, *field_size, values.clone())?
                .into(),
            FieldSpec::RandomInput { field_len, entries } => {
                let entries = entries
                    .iter()
                    .map(|e| RandomEntry::new(e.size, e.line, e.column, e.value.clone()))
                    .collect();
                RandomInput::new(*field_len, entries)?.into()
            }
        })
    }
}

impl FormSection {
    pub fn definition(&self) -> Result<FormDefinition, ScanError> {
        let mut b = FormDefinition::builder(self.lines)
            .columns(self.columns)
            .column_spacing(self.column_spacing)
            .spacing_term(self.spacing_term);
        if let Some(id) = &self.identifier {
            b.add_identifier(FormIdentifier::new(id.orientation.parse()?, id.position, &id.mask)?);
        }
        for field in &self.fields {
            b.add_field(field.to_geometry()?)?;
        }
        b.finalize()
    }
}

impl ScannerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ScanError> {
        toml::from_str(source).map_err(|e| ScanError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            response_timeout: Duration::from_millis(self.session.response_timeout_ms),
            end_of_batch: self.session.end_of_batch.clone(),
            command_delay: Duration::from_millis(self.session.command_delay_ms),
        }
    }

    /// The configured form paired with the configured validation policy.
    pub fn form_layout(&self) -> Result<Option<FormLayout>, ScanError> {
        self.form
            .as_ref()
            .map(|f| {
                Ok(FormLayout {
                    definition: f.definition()?,
                    policy: self.validation.clone(),
                })
            })
            .transpose()
    }
}
