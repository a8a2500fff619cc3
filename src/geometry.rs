//! Field geometry: typed descriptions of where a field sits on the sheet.
//!
//! Lines are numbered from 1 at the top, columns from 1 at the left; column 0
//! holds the guide marks. Constructors check every size and count constraint so
//! that anything reaching the builder can be encoded.

use crate::error::ScanError;
use std::fmt;
use std::str::FromStr;

/// Identifier masks are padded to this many positions before column padding.
pub const IDENTIFIER_MASK_BITS: usize = 10;

/// Whether a field's alternatives run along a line or down a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Line,
    Column,
}

impl Orientation {
    pub fn code(self) -> char {
        match self {
            Orientation::Line => 'L',
            Orientation::Column => 'C',
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Orientation {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(Orientation::Line),
            "C" => Ok(Orientation::Column),
            other => Err(ScanError::invalid(format!("orientation must be L or C, got {:?}", other))),
        }
    }
}

/// A literal emitted regardless of marks; usually a separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedValue {
    size: u32,
    literal: String,
}

impl FixedValue {
    pub fn new(size: u32, literal: impl Into<String>) -> Result<Self, ScanError> {
        let literal = literal.into();
        check_positive("fixed value size", size)?;
        check_wire_token("fixed value", &literal)?;
        if literal.chars().count() != size as usize {
            return Err(ScanError::invalid(format!(
                "fixed value {:?} has length {}, declared size {}",
                literal,
                literal.chars().count(),
                size
            )));
        }
        Ok(FixedValue { size, literal })
    }

    /// Single-character separator, the common case.
    pub fn separator(sep: char) -> Result<Self, ScanError> {
        FixedValue::new(1, sep.to_string())
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }
}

/// A group of bubbles; each alternative is `mark_size` characters of `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleChoice {
    mark_size: u32,
    line_start: u32,
    col_start: u32,
    orientation: Orientation,
    field_size: u32,
    values: String,
}

impl MultipleChoice {
    pub fn new(
        mark_size: u32,
        line_start: u32,
        col_start: u32,
        orientation: Orientation,
        field_size: u32,
        values: impl Into<String>,
    ) -> Result<Self, ScanError> {
        let values = values.into();
        check_positive("mark size", mark_size)?;
        check_positive("field size", field_size)?;
        check_positive("start line", line_start)?;
        check_positive("start column", col_start)?;
        check_wire_token("multiple choice values", &values)?;
        if values.len() % mark_size as usize != 0 {
            return Err(ScanError::invalid(format!(
                "{} value characters is not a multiple of mark size {}",
                values.len(),
                mark_size
            )));
        }
        Ok(MultipleChoice {
            mark_size,
            line_start,
            col_start,
            orientation,
            field_size,
            values,
        })
    }

    pub fn mark_size(&self) -> u32 {
        self.mark_size
    }

    pub fn line_start(&self) -> u32 {
        self.line_start
    }

    pub fn col_start(&self) -> u32 {
        self.col_start
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn field_size(&self) -> u32 {
        self.field_size
    }

    pub fn values(&self) -> &str {
        &self.values
    }

    /// Number of alternatives (`values` length over mark size).
    pub fn num_values(&self) -> u32 {
        (self.values.len() / self.mark_size as usize) as u32
    }
}

/// One selectable position of a random-input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomEntry {
    pub size: u32,
    pub line: u32,
    pub col: u32,
    pub value: String,
}

impl RandomEntry {
    pub fn new(size: u32, line: u32, col: u32, value: impl Into<String>) -> Self {
        RandomEntry {
            size,
            line,
            col,
            value: value.into(),
        }
    }
}

/// Value chosen by whichever single mark among disjoint positions is filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomInput {
    field_len: u32,
    entries: Vec<RandomEntry>,
}

impl RandomInput {
    pub fn new(field_len: u32, entries: Vec<RandomEntry>) -> Result<Self, ScanError> {
        check_positive("random input length", field_len)?;
        if entries.is_empty() {
            return Err(ScanError::invalid("random input needs at least one entry"));
        }
        for (i, e) in entries.iter().enumerate() {
            check_positive("random entry size", e.size)?;
            check_positive("random entry line", e.line)?;
            check_positive("random entry column", e.col)?;
            check_wire_token("random entry value", &e.value)?;
            if e.value.len() > field_len as usize {
                return Err(ScanError::invalid(format!(
                    "random entry value {:?} longer than field length {}",
                    e.value, field_len
                )));
            }
            if entries[..i].iter().any(|p| p.line == e.line && p.col == e.col) {
                return Err(ScanError::invalid(format!(
                    "random entries share position line {} column {}",
                    e.line, e.col
                )));
            }
        }
        Ok(RandomInput { field_len, entries })
    }

    pub fn field_len(&self) -> u32 {
        self.field_len
    }

    pub fn entries(&self) -> &[RandomEntry] {
        &self.entries
    }
}

/// Bit pattern the scanner checks before accepting a sheet.
///
/// The mask is stored padded with `0` to [`IDENTIFIER_MASK_BITS`] positions;
/// column padding with `X` happens on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormIdentifier {
    orientation: Orientation,
    position: u32,
    mask: String,
}

impl FormIdentifier {
    pub fn new(orientation: Orientation, position: u32, mask: &str) -> Result<Self, ScanError> {
        check_positive("identifier position", position)?;
        if mask.is_empty() || mask.len() > IDENTIFIER_MASK_BITS {
            return Err(ScanError::invalid(format!(
                "identifier mask must have 1 to {} positions, got {}",
                IDENTIFIER_MASK_BITS,
                mask.len()
            )));
        }
        if !mask.chars().all(|c| c == '0' || c == '1') {
            return Err(ScanError::invalid(format!("identifier mask {:?} must be 0s and 1s", mask)));
        }
        let mut padded = mask.to_string();
        while padded.len() < IDENTIFIER_MASK_BITS {
            padded.push('0');
        }
        Ok(FormIdentifier {
            orientation,
            position,
            mask: padded,
        })
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Wire mask for a form `width` columns wide.
    pub fn wire_mask(&self, width: u32) -> String {
        let mut m = self.mask.clone();
        while m.len() < width as usize {
            m.push('X');
        }
        m
    }
}

/// Any field that can be declared on a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldGeometry {
    FixedValue(FixedValue),
    MultipleChoice(MultipleChoice),
    RandomInput(RandomInput),
    FormIdentifier(FormIdentifier),
}

impl From<FixedValue> for FieldGeometry {
    fn from(v: FixedValue) -> Self {
        FieldGeometry::FixedValue(v)
    }
}

impl From<MultipleChoice> for FieldGeometry {
    fn from(v: MultipleChoice) -> Self {
        FieldGeometry::MultipleChoice(v)
    }
}

impl From<RandomInput> for FieldGeometry {
    fn from(v: RandomInput) -> Self {
        FieldGeometry::RandomInput(v)
    }
}

impl From<FormIdentifier> for FieldGeometry {
    fn from(v: FormIdentifier) -> Self {
        FieldGeometry::FormIdentifier(v)
    }
}

fn check_positive(what: &str, n: u32) -> Result<(), ScanError> {
    if n == 0 {
        return Err(ScanError::invalid(format!("{} must be positive", what)));
    }
    Ok(())
}

// Wire text is space-delimited, so tokens must be printable and space-free.
fn check_wire_token(what: &str, s: &str) -> Result<(), ScanError> {
    if s.is_empty() {
        return Err(ScanError::invalid(format!("{} must not be empty", what)));
    }
    if !s.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ScanError::invalid(format!(
            "{} {:?} must be printable ASCII without spaces",
            what, s
        )));
    }
    Ok(())
}
