//! Parse scanner command text back into [`Command`] values using PEST.
//!
//! Used to reload dumped form definitions and to check that encoding is lossless.
//! Geometry goes back through the validating constructors, so text that parses
//! but describes an impossible field is still refused.

use crate::codec::Command;
use crate::error::ScanError;
use crate::geometry::{
    FixedValue, FormIdentifier, MultipleChoice, Orientation, RandomEntry, RandomInput, IDENTIFIER_MASK_BITS,
};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct CommandParser;

/// Parse one command line (no `ESC`/`CR` framing).
pub fn parse_command(source: &str) -> Result<Command, ScanError> {
    let pairs = CommandParser::parse(Rule::command, source)
        .map_err(|e| ScanError::Parse(format!("{}", e)))?;
    let command = pairs
        .into_iter()
        .next()
        .ok_or_else(|| ScanError::Parse("empty command".to_string()))?;
    let inner = command
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or_else(|| ScanError::Parse("empty command".to_string()))?;
    build_command(inner)
}

fn build_command(pair: Pair<Rule>) -> Result<Command, ScanError> {
    match pair.as_rule() {
        Rule::reset => Ok(Command::Reset),
        Rule::read => Ok(Command::Read),
        Rule::form_end => Ok(Command::FormEnd),
        Rule::threshold => {
            let mut it = pair.into_inner();
            let darkness = next_u32(&mut it, "darkness")?;
            let contrast = next_u32(&mut it, "contrast")?;
            Ok(Command::Threshold {
                darkness: threshold_level(darkness)?,
                contrast: threshold_level(contrast)?,
            })
        }
        Rule::form_start => {
            let mut it = pair.into_inner();
            let lines = next_u32(&mut it, "lines")?;
            let cols = next_u32(&mut it, "columns")?;
            Ok(Command::FormStart { lines, cols })
        }
        Rule::identifier => {
            let mut it = pair.into_inner();
            let orientation = next_orientation(&mut it)?;
            let position = next_u32(&mut it, "identifier position")?;
            let wire_mask = next_str(&mut it, "identifier mask")?;
            let bits = wire_mask.trim_end_matches('X');
            let identifier = FormIdentifier::new(orientation, position, bits)?;
            // A short unpadded mask still encodes as the full ten bits.
            Ok(Command::Identifier {
                identifier,
                width: wire_mask.len().max(IDENTIFIER_MASK_BITS) as u32,
            })
        }
        Rule::fixed_value => {
            let mut it = pair.into_inner();
            let size = next_u32(&mut it, "fixed value size")?;
            let literal = next_str(&mut it, "fixed value")?;
            Ok(Command::Fixed(FixedValue::new(size, literal)?))
        }
        Rule::multiple_choice => {
            let mut it = pair.into_inner();
            let mark_size = next_u32(&mut it, "mark size")?;
            let line_start = next_u32(&mut it, "start line")?;
            let col_start = next_u32(&mut it, "start column")?;
            let line_end = next_u32(&mut it, "end line")?;
            let col_end = next_u32(&mut it, "end column")?;
            let orientation = next_orientation(&mut it)?;
            let field_size = next_u32(&mut it, "field size")?;
            let num_values = next_u32(&mut it, "value count")?;
            let values = next_str(&mut it, "values")?;
            let field = MultipleChoice::new(mark_size, line_start, col_start, orientation, field_size, values)?;
            if field.num_values() != num_values {
                return Err(ScanError::Parse(format!(
                    "declared {} values but {:?} holds {}",
                    num_values,
                    field.values(),
                    field.num_values()
                )));
            }
            Ok(Command::MultipleChoice { field, line_end, col_end })
        }
        Rule::random_input => {
            let mut it = pair.into_inner();
            let field_len = next_u32(&mut it, "random input length")?;
            let mut entries = Vec::new();
            for entry in it {
                let mut e = entry.into_inner();
                let size = next_u32(&mut e, "entry size")?;
                let line = next_u32(&mut e, "entry line")?;
                let col = next_u32(&mut e, "entry column")?;
                let value = next_str(&mut e, "entry value")?;
                entries.push(RandomEntry::new(size, line, col, value));
            }
            Ok(Command::RandomInput(RandomInput::new(field_len, entries)?))
        }
        other => Err(ScanError::Parse(format!("unexpected rule {:?}", other))),
    }
}

fn next_str<'a>(it: &mut Pairs<'a, Rule>, what: &str) -> Result<&'a str, ScanError> {
    it.next()
        .map(|p| p.as_str())
        .ok_or_else(|| ScanError::Parse(format!("missing {}", what)))
}

fn next_u32(it: &mut Pairs<Rule>, what: &str) -> Result<u32, ScanError> {
    let s = next_str(it, what)?;
    s.parse::<u32>()
        .map_err(|e| ScanError::Parse(format!("{} {:?}: {}", what, s, e)))
}

fn next_orientation(it: &mut Pairs<Rule>) -> Result<Orientation, ScanError> {
    next_str(it, "orientation")?.parse()
}

fn threshold_level(n: u32) -> Result<u8, ScanError> {
    if n > 99 {
        return Err(ScanError::Parse(format!("threshold level {} outside 0-99", n)));
    }
    Ok(n as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fixed_commands() {
        assert_eq!(parse_command("SRST").unwrap(), Command::Reset);
        assert_eq!(parse_command("READ 0 Y").unwrap(), Command::Read);
        assert_eq!(parse_command("FRM=LS").unwrap(), Command::FormEnd);
        assert_eq!(
            parse_command("THR=40 60").unwrap(),
            Command::Threshold { darkness: 40, contrast: 60 }
        );
        assert_eq!(
            parse_command("FRM=FS 22 0 48 N N N").unwrap(),
            Command::FormStart { lines: 22, cols: 48 }
        );
    }

    #[test]
    fn parse_random_input_entries() {
        let cmd = parse_command("FRM=RI N N 3 1 1 22 -10 1 1 16 -07").unwrap();
        match cmd {
            Command::RandomInput(ri) => {
                assert_eq!(ri.field_len(), 3);
                assert_eq!(ri.entries().len(), 2);
                assert_eq!(ri.entries()[1], RandomEntry::new(1, 1, 16, "-07"));
            }
            other => panic!("expected random input, got {:?}", other),
        }
    }

    #[test]
    fn parse_rejects_inconsistent_value_count() {
        let r = parse_command("FRM=MC N N 1 1 20 15 11 9 C 4 9 0123456789");
        assert!(matches!(r, Err(ScanError::Parse(_))));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_command("").is_err());
        assert!(parse_command("FRM=XX 1").is_err());
        assert!(parse_command("THR=100 5").is_err());
        assert!(parse_command("FRM=ID 1 Q 22 01").is_err());
        assert!(parse_command("SRST trailing").is_err());
    }
}
