//! Form layouts: a definition plus the validation policy for the records it yields.
//!
//! [`RatingSheet`] describes the ten-question rating sheet family as data; every
//! variant comes out of the same builder instead of per-sheet command lists.

use crate::error::ScanError;
use crate::form::FormDefinition;
use crate::geometry::{FormIdentifier, MultipleChoice, Orientation, RandomEntry, RandomInput};
use crate::validate::{AutoFill, FieldBound, FieldRange, ValidationPolicy};

/// Everything needed to program a scanner for one sheet type and check its output.
#[derive(Debug, Clone)]
pub struct FormLayout {
    pub definition: FormDefinition,
    pub policy: ValidationPolicy,
}

const DIGITS: &str = "0123456789";
/// Rating bubbles, most to least, two characters each.
const RATING_VALUES: &str = "1009080706050403020100";
const RATING_QUESTIONS: u32 = 10;
/// Token index of the first rating in a record.
const FIRST_RATING_FIELD: usize = 4;
const PENALTY_DEFAULT: &str = "000";

/// Parameters of a rating sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingSheet {
    /// Literal emitted as the first record field.
    pub tag: char,
    /// Line holding the top of the identifier bubble block.
    pub top_line: u32,
    /// Identifier mark pattern on the bottom guide line.
    pub identifier_mask: String,
    /// Trailing timing-penalty selector on line 1.
    pub penalty: bool,
}

impl RatingSheet {
    pub fn instructor() -> Self {
        RatingSheet {
            tag: 'I',
            top_line: 20,
            identifier_mask: "01".to_string(),
            penalty: false,
        }
    }

    pub fn student() -> Self {
        RatingSheet {
            tag: 'S',
            top_line: 21,
            identifier_mask: "011".to_string(),
            penalty: true,
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "instructor" => Some(Self::instructor()),
            "student" => Some(Self::student()),
            _ => None,
        }
    }

    /// Sheet height: the top line plus the identifier guide line.
    pub fn lines(&self) -> Result<u32, ScanError> {
        self.top_line
            .checked_add(1)
            .ok_or_else(|| ScanError::invalid(format!("top line {} leaves no room for the guide line", self.top_line)))
    }

    pub fn layout(&self) -> Result<FormLayout, ScanError> {
        let min_top = RATING_QUESTIONS + 10 + u32::from(self.penalty);
        if self.top_line < min_top {
            return Err(ScanError::invalid(format!(
                "rating sheet needs a top line of at least {}, got {}",
                min_top, self.top_line
            )));
        }
        let top = self.top_line;
        let lines = self.lines()?;
        let mut b = FormDefinition::builder(lines);
        b.add_identifier(FormIdentifier::new(Orientation::Line, lines, &self.identifier_mask)?);
        b.add_separator(self.tag)?.add_separator(',')?;
        b.add_multiple_choice(MultipleChoice::new(1, top, 15, Orientation::Column, 4, DIGITS)?)?
            .add_separator(',')?;
        b.add_multiple_choice(MultipleChoice::new(1, top, 6, Orientation::Column, 3, DIGITS)?)?
            .add_separator(',')?;

        let (upper, lower) = (top - 8, top - 9);
        let section = [(upper, 25), (upper, 23), (upper, 21), (lower, 25), (lower, 23), (lower, 21)]
            .iter()
            .enumerate()
            .map(|(i, &(line, col))| RandomEntry::new(1, line, col, (i + 1).to_string()))
            .collect();
        b.add_random_input(RandomInput::new(1, section)?);

        for line in (top - 9 - RATING_QUESTIONS..top - 9).rev() {
            b.add_separator(',')?;
            b.add_multiple_choice(MultipleChoice::new(2, line, 22, Orientation::Line, 1, RATING_VALUES)?)?;
        }

        if self.penalty {
            b.add_separator(',')?;
            b.add_random_input(RandomInput::new(
                3,
                vec![
                    RandomEntry::new(1, 1, 22, "-10"),
                    RandomEntry::new(1, 1, 16, "-07"),
                    RandomEntry::new(1, 1, 8, "-03"),
                    RandomEntry::new(1, 1, 2, PENALTY_DEFAULT),
                ],
            )?);
        }

        let definition = b.finalize()?;
        Ok(FormLayout {
            definition,
            policy: self.policy(),
        })
    }

    /// Identifier in field 1, all ten ratings required, blank penalty becomes `000`.
    pub fn policy(&self) -> ValidationPolicy {
        let trailing = if self.penalty { 1 } else { 0 };
        ValidationPolicy {
            complete_fields: Some(FieldRange {
                start: FieldBound::At(FIRST_RATING_FIELD),
                end: FieldBound::FromEnd(trailing),
            }),
            auto_fill: self.penalty.then(|| AutoFill {
                field: FieldBound::FromEnd(1),
                value: PENALTY_DEFAULT.to_string(),
            }),
            ..ValidationPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructor_sheet_commands() {
        let layout = RatingSheet::instructor().layout().unwrap();
        let text: Vec<String> = layout.definition.commands().iter().map(|c| c.encode()).collect();
        assert_eq!(text[0], "FRM=FS 21 0 48 N N N");
        assert!(text[1].starts_with("FRM=ID 1 L 21 0100000000X"));
        assert_eq!(text[2], "FRM=IN 1 I");
        assert_eq!(text[3], "FRM=IN 1 ,");
        assert_eq!(text[4], "FRM=MC N N 1 1 20 15 11 9 C 4 10 0123456789");
        assert_eq!(text[6], "FRM=MC N N 1 1 20 6 11 2 C 3 10 0123456789");
        assert_eq!(
            text[8],
            "FRM=RI N N 1 1 12 25 1 1 12 23 2 1 12 21 3 1 11 25 4 1 11 23 5 1 11 21 6"
        );
        assert_eq!(text[10], "FRM=MC N N 2 1 10 22 10 2 L 1 11 1009080706050403020100");
        assert_eq!(text[28], "FRM=MC N N 2 1 1 22 1 2 L 1 11 1009080706050403020100");
        assert_eq!(text.last().unwrap(), "FRM=LS");
        assert_eq!(layout.definition.field_count(), 27);
    }

    #[test]
    fn student_sheet_adds_penalty() {
        let layout = RatingSheet::student().layout().unwrap();
        let text: Vec<String> = layout.definition.commands().iter().map(|c| c.encode()).collect();
        assert_eq!(text[0], "FRM=FS 22 0 48 N N N");
        assert!(text[1].starts_with("FRM=ID 1 L 22 0110000000X"));
        assert_eq!(text[4], "FRM=MC N N 1 1 21 15 12 9 C 4 10 0123456789");
        assert_eq!(text[28], "FRM=MC N N 2 1 2 22 2 2 L 1 11 1009080706050403020100");
        assert_eq!(text[30], "FRM=RI N N 3 1 1 22 -10 1 1 16 -07 1 1 8 -03 1 1 2 000");
        assert!(layout.policy.auto_fill.is_some());
    }

    #[test]
    fn top_line_too_low_is_rejected() {
        let sheet = RatingSheet {
            top_line: 12,
            ..RatingSheet::instructor()
        };
        assert!(sheet.layout().is_err());
    }

    #[test]
    fn top_line_at_u32_max_is_invalid_parameter() {
        let sheet = RatingSheet {
            top_line: u32::MAX,
            ..RatingSheet::student()
        };
        assert!(matches!(sheet.lines(), Err(ScanError::InvalidParameter(_))));
        assert!(matches!(sheet.layout(), Err(ScanError::InvalidParameter(_))));
    }
}
