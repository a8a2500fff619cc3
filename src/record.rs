//! Scanned records: the raw delimited text returned by one read.

use std::fmt;

/// One sheet's worth of field tokens, in form-definition order.
///
/// Records are never edited in place; sanitizing or auto-filling builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    text: String,
    separator: char,
}

impl ScanRecord {
    pub fn new(text: impl Into<String>, separator: char) -> Self {
        ScanRecord {
            text: text.into(),
            separator,
        }
    }

    /// Join tokens back into a record.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S], separator: char) -> Self {
        let mut text = String::new();
        for (i, t) in tokens.iter().enumerate() {
            if i > 0 {
                text.push(separator);
            }
            text.push_str(t.as_ref());
        }
        ScanRecord { text, separator }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.text.split(self.separator).collect()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.text.split(self.separator).nth(index)
    }
}

impl fmt::Display for ScanRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Unfilled field: empty or spaces only.
pub fn is_blank(token: &str) -> bool {
    token.chars().all(|c| c == ' ')
}

/// A field holding at least one unreadable-mark placeholder.
pub fn is_unreadable(token: &str, placeholder: char) -> bool {
    token.contains(placeholder)
}

/// Blank run the same width as `token`.
pub fn blank_like(token: &str) -> String {
    " ".repeat(token.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_split_on_separator() {
        let r = ScanRecord::new("S,3401,567,  ,10", ',');
        assert_eq!(r.tokens(), vec!["S", "3401", "567", "  ", "10"]);
        assert_eq!(r.token(3), Some("  "));
        assert_eq!(r.token(9), None);
    }

    #[test]
    fn from_tokens_rejoins() {
        let r = ScanRecord::from_tokens(&["a", "  ", "c"], ';');
        assert_eq!(r.text(), "a;  ;c");
        assert_eq!(r.to_string(), "a;  ;c");
    }

    #[test]
    fn blank_and_unreadable() {
        assert!(is_blank("  "));
        assert!(is_blank(""));
        assert!(!is_blank(" 1"));
        assert!(is_unreadable("??", '?'));
        assert!(is_unreadable("1?", '?'));
        assert!(!is_unreadable("10", '?'));
        assert_eq!(blank_like("??"), "  ");
    }
}
