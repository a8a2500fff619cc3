//! Form definitions: the ordered command list describing one sheet layout.
//!
//! A [`FormBuilder`] accumulates fields and derives each multiple-choice field's end
//! coordinate; [`FormBuilder::finalize`] freezes the result into a [`FormDefinition`]
//! shaped `[FormStart, Identifier?, Field*, FormEnd]`.

use crate::codec::Command;
use crate::error::ScanError;
use crate::geometry::{FieldGeometry, FixedValue, FormIdentifier, MultipleChoice, Orientation, RandomInput};
use crate::parser::parse_command;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Columns on a US Letter sheet.
pub const DEFAULT_COLUMNS: u32 = 48;
/// Marks usually skip a column to avoid bleed-over.
pub const DEFAULT_COLUMN_SPACING: u32 = 2;

/// Sign of the trailing spacing term in the column-oriented end-column formula
/// `colEnd = colStart - fieldSize * spacing ± spacing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingTerm {
    #[default]
    Add,
    Subtract,
}

/// Accumulates fields into a [`FormDefinition`].
#[derive(Debug, Clone)]
pub struct FormBuilder {
    lines: u32,
    cols: u32,
    column_spacing: u32,
    spacing_term: SpacingTerm,
    identifier: Option<FormIdentifier>,
    fields: Vec<Command>,
}

impl FormBuilder {
    pub fn new(lines: u32) -> Self {
        FormBuilder {
            lines,
            cols: DEFAULT_COLUMNS,
            column_spacing: DEFAULT_COLUMN_SPACING,
            spacing_term: SpacingTerm::Add,
            identifier: None,
            fields: Vec::new(),
        }
    }

    pub fn columns(mut self, cols: u32) -> Self {
        self.cols = cols;
        self
    }

    /// Applies to fields added after this call.
    pub fn column_spacing(mut self, spacing: u32) -> Self {
        self.column_spacing = spacing;
        self
    }

    /// Applies to fields added after this call.
    pub fn spacing_term(mut self, term: SpacingTerm) -> Self {
        self.spacing_term = term;
        self
    }

    /// Set the sheet identifier; a second call replaces the first.
    pub fn add_identifier(&mut self, identifier: FormIdentifier) -> &mut Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn add_fixed_value(&mut self, value: FixedValue) -> &mut Self {
        self.fields.push(Command::Fixed(value));
        self
    }

    pub fn add_separator(&mut self, sep: char) -> Result<&mut Self, ScanError> {
        Ok(self.add_fixed_value(FixedValue::separator(sep)?))
    }

    /// Add a bubble group; fails if the derived end coordinate falls off the sheet.
    pub fn add_multiple_choice(&mut self, field: MultipleChoice) -> Result<&mut Self, ScanError> {
        let (line_end, col_end) = self.end_coordinates(&field)?;
        self.fields.push(Command::MultipleChoice { field, line_end, col_end });
        Ok(self)
    }

    pub fn add_random_input(&mut self, field: RandomInput) -> &mut Self {
        self.fields.push(Command::RandomInput(field));
        self
    }

    pub fn add_field(&mut self, field: FieldGeometry) -> Result<&mut Self, ScanError> {
        match field {
            FieldGeometry::FixedValue(v) => Ok(self.add_fixed_value(v)),
            FieldGeometry::MultipleChoice(v) => self.add_multiple_choice(v),
            FieldGeometry::RandomInput(v) => Ok(self.add_random_input(v)),
            FieldGeometry::FormIdentifier(v) => Ok(self.add_identifier(v)),
        }
    }

    fn end_coordinates(&self, field: &MultipleChoice) -> Result<(u32, u32), ScanError> {
        let count = field.values().len() as i64;
        let mark = i64::from(field.mark_size());
        let line_start = i64::from(field.line_start());
        let col_start = i64::from(field.col_start());
        let (line_end, col_end) = match field.orientation() {
            Orientation::Column => {
                let spacing = i64::from(self.column_spacing);
                let span = i64::from(field.field_size()) * spacing;
                let col_end = match self.spacing_term {
                    SpacingTerm::Add => col_start - span + spacing,
                    SpacingTerm::Subtract => col_start - span - spacing,
                };
                (line_start - count + mark, col_end)
            }
            Orientation::Line => (line_start, col_start - count + mark),
        };
        if line_end < 1 || col_end < 1 {
            return Err(ScanError::invalid(format!(
                "multiple choice at line {} column {} ends off the sheet (line {}, column {})",
                line_start, col_start, line_end, col_end
            )));
        }
        Ok((line_end as u32, col_end as u32))
    }

    /// Freeze the layout. Fails when no field was added or a field starts outside
    /// the declared extent.
    pub fn finalize(&self) -> Result<FormDefinition, ScanError> {
        if self.lines == 0 || self.cols == 0 {
            return Err(ScanError::invalid("form extent must be at least one line and one column"));
        }
        if self.fields.is_empty() {
            return Err(ScanError::invalid("form definition has no fields"));
        }
        let mut commands = Vec::with_capacity(self.fields.len() + 3);
        commands.push(Command::FormStart {
            lines: self.lines,
            cols: self.cols,
        });
        if let Some(identifier) = &self.identifier {
            commands.push(Command::Identifier {
                identifier: identifier.clone(),
                width: self.cols,
            });
        }
        commands.extend(self.fields.iter().cloned());
        commands.push(Command::FormEnd);
        FormDefinition::from_commands(commands)
    }
}

/// An immutable, validated form definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDefinition {
    lines: u32,
    cols: u32,
    commands: Vec<Command>,
}

impl FormDefinition {
    pub fn builder(lines: u32) -> FormBuilder {
        FormBuilder::new(lines)
    }

    /// Validate a command sequence as a form definition.
    pub fn from_commands(commands: Vec<Command>) -> Result<Self, ScanError> {
        let (lines, cols) = match commands.first() {
            Some(Command::FormStart { lines, cols }) => (*lines, *cols),
            _ => return Err(ScanError::invalid("form definition must begin with FormStart")),
        };
        if commands.len() < 3 || !matches!(commands.last(), Some(Command::FormEnd)) {
            return Err(ScanError::invalid("form definition must end with FormEnd after at least one field"));
        }
        let body = &commands[1..commands.len() - 1];
        let mut fields = 0usize;
        for (i, c) in body.iter().enumerate() {
            match c {
                Command::Identifier { .. } if i == 0 => {}
                Command::Identifier { .. } => {
                    return Err(ScanError::invalid("identifier must directly follow FormStart"));
                }
                Command::Fixed(_) | Command::MultipleChoice { .. } | Command::RandomInput(_) => fields += 1,
                other => {
                    return Err(ScanError::invalid(format!(
                        "{} command not allowed inside a form definition",
                        other.kind()
                    )));
                }
            }
            check_extent(c, lines, cols)?;
        }
        if fields == 0 {
            return Err(ScanError::invalid("form definition has no fields"));
        }
        Ok(FormDefinition { lines, cols, commands })
    }

    /// Rebuild a definition from wire text, one command per line. Blank lines and
    /// `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, ScanError> {
        let commands = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(parse_command)
            .collect::<Result<Vec<_>, _>>()?;
        FormDefinition::from_commands(commands)
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn columns(&self) -> u32 {
        self.cols
    }

    /// Commands in upload order, `FormStart` through `FormEnd`.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn identifier(&self) -> Option<&FormIdentifier> {
        match self.commands.get(1) {
            Some(Command::Identifier { identifier, .. }) => Some(identifier),
            _ => None,
        }
    }

    /// Number of fields, i.e. delimited tokens' producers, in record order.
    pub fn field_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Fixed(_) | Command::MultipleChoice { .. } | Command::RandomInput(_)))
            .count()
    }
}

impl fmt::Display for FormDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.commands {
            writeln!(f, "{}", c)?;
        }
        Ok(())
    }
}

fn check_extent(c: &Command, lines: u32, cols: u32) -> Result<(), ScanError> {
    let outside = |line: u32, col: u32| line > lines || col > cols;
    let bad = match c {
        Command::Identifier { identifier, .. } => match identifier.orientation() {
            Orientation::Line => identifier.position() > lines,
            Orientation::Column => identifier.position() > cols,
        },
        Command::MultipleChoice { field, .. } => outside(field.line_start(), field.col_start()),
        Command::RandomInput(ri) => ri.entries().iter().any(|e| outside(e.line, e.col)),
        _ => false,
    };
    if bad {
        return Err(ScanError::invalid(format!(
            "{} command lies outside the {}x{} form",
            c.kind(),
            lines,
            cols
        )));
    }
    Ok(())
}
