//! Static allow-list of searchable customer fields.
//!
//! Logical field names accepted from callers map to physical identifiers
//! here and nowhere else. Statement builders only ever format identifiers
//! taken from this table.

use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

/// Table holding customer records.
pub const TABLE: &str = "customers";

/// Key column; results are ordered by it ascending.
pub const KEY_COLUMN: &str = "customer_id";

/// Columns projected by every search, in result order.
pub const PROJECTION: &[&str] = &["customer_id", "full_name", "email_address", "city"];

/// A field callers may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Name,
    Email,
    City,
}

impl SearchField {
    pub const ALL: [SearchField; 3] = [SearchField::Name, SearchField::Email, SearchField::City];

    /// Logical name used by callers.
    pub fn as_str(self) -> &'static str {
        match self {
            SearchField::Name => "name",
            SearchField::Email => "email",
            SearchField::City => "city",
        }
    }

    /// Physical column identifier.
    pub fn column(self) -> &'static str {
        match self {
            SearchField::Name => "full_name",
            SearchField::Email => "email_address",
            SearchField::City => "city",
        }
    }
}

impl FromStr for SearchField {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| SearchError::InvalidField {
                field: s.to_string(),
            })
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn known_fields_parse() {
        assert_eq!("name".parse::<SearchField>().unwrap(), SearchField::Name);
        assert_eq!("email".parse::<SearchField>().unwrap(), SearchField::Email);
        assert_eq!("city".parse::<SearchField>().unwrap(), SearchField::City);
    }

    #[test]
    fn unknown_fields_rejected() {
        for field in ["ssn", "Name", "full_name", "", "name; DROP TABLE customers"] {
            assert_eq!(
                field.parse::<SearchField>(),
                Err(SearchError::InvalidField {
                    field: field.to_string()
                })
            );
        }
    }

    #[test]
    fn identifiers_are_plain() {
        let ident = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
        assert!(ident.is_match(TABLE));
        assert!(ident.is_match(KEY_COLUMN));
        for column in PROJECTION {
            assert!(ident.is_match(column), "{column}");
        }
        for field in SearchField::ALL {
            assert!(PROJECTION.contains(&field.column()), "{field}");
        }
    }
}
