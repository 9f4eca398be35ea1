//! Diagnostic codes with category prefixes for structured identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a diagnostic code, determining its prefix letter.
///
/// Displayed as e.g. `E301` for a routing failure or `F101` for a
/// fault-avoidance repair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Routing failures, prefixed with `E`.
    Error,
    /// Suspicious but routable input, prefixed with `W`.
    Warning,
    /// Repairs made around dead chips and links, prefixed with `F`.
    Fault,
    /// Machine and router configuration issues, prefixed with `C`.
    Config,
    /// Routing statistics and progress notes, prefixed with `N`.
    Note,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Error => 'E',
            Category::Warning => 'W',
            Category::Fault => 'F',
            Category::Config => 'C',
            Category::Note => 'N',
        }
    }
}

/// A structured diagnostic code combining a category prefix and a number.
///
/// Displayed as the prefix followed by a zero-padded 3-digit number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_prefixes() {
        assert_eq!(Category::Error.prefix(), 'E');
        assert_eq!(Category::Warning.prefix(), 'W');
        assert_eq!(Category::Fault.prefix(), 'F');
        assert_eq!(Category::Config.prefix(), 'C');
        assert_eq!(Category::Note.prefix(), 'N');
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", DiagnosticCode::new(Category::Error, 301)), "E301");
        assert_eq!(format!("{}", DiagnosticCode::new(Category::Fault, 7)), "F007");
    }

    #[test]
    fn serde_roundtrip() {
        let code = DiagnosticCode::new(Category::Config, 12);
        let json = serde_json::to_string(&code).unwrap();
        let back: DiagnosticCode = serde_json::from_str(&json).unwrap();
        assert_eq!(code, back);
    }
}
