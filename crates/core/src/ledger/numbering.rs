//! Journal entry numbers.
//!
//! Numbers have the form `{prefix}-{year}-{sequence:06}` and come from a
//! per-year counter advanced inside the posting transaction, so they are
//! unique and never reused.

use std::fmt;

/// A formatted, per-year sequential entry number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryNumber {
    prefix: String,
    year: i32,
    sequence: i64,
}

impl EntryNumber {
    /// Creates an entry number.
    #[must_use]
    pub fn new(prefix: impl Into<String>, year: i32, sequence: i64) -> Self {
        Self {
            prefix: prefix.into(),
            year,
            sequence,
        }
    }

    /// The configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The fiscal year component.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// The sequence within the year, starting at 1.
    #[must_use]
    pub const fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Parses `JE-2026-000042`. The prefix itself may contain dashes.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, '-');
        let sequence = parts.next()?.parse::<i64>().ok()?;
        let year = parts.next()?.parse::<i32>().ok()?;
        let prefix = parts.next()?;
        if prefix.is_empty() || sequence < 1 {
            return None;
        }
        Some(Self::new(prefix, year, sequence))
    }
}

impl fmt::Display for EntryNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}-{:06}", self.prefix, self.year, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(EntryNumber::new("JE", 2026, 1).to_string(), "JE-2026-000001");
        assert_eq!(EntryNumber::new("JE", 2026, 123_456).to_string(), "JE-2026-123456");
        assert_eq!(EntryNumber::new("JE", 2026, 1_234_567).to_string(), "JE-2026-1234567");
    }

    #[test]
    fn test_parse() {
        let number = EntryNumber::parse("JE-2026-000042").unwrap();
        assert_eq!(number.prefix(), "JE");
        assert_eq!(number.year(), 2026);
        assert_eq!(number.sequence(), 42);

        let number = EntryNumber::parse("GL-EU-2025-000007").unwrap();
        assert_eq!(number.prefix(), "GL-EU");
        assert_eq!(number.year(), 2025);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(EntryNumber::parse("JE-2026").is_none());
        assert!(EntryNumber::parse("JE-20x6-000001").is_none());
        assert!(EntryNumber::parse("-2026-000001").is_none());
        assert!(EntryNumber::parse("JE-2026-000000").is_none());
    }

    #[test]
    fn test_ordering_follows_year_then_sequence() {
        let a = EntryNumber::new("JE", 2025, 900);
        let b = EntryNumber::new("JE", 2026, 1);
        let c = EntryNumber::new("JE", 2026, 2);
        assert!(a < b);
        assert!(b < c);
        assert!(a.to_string() < b.to_string());
        assert!(b.to_string() < c.to_string());
    }
}
