//! Filter requests and parameterized statements.
//!
//! Two interchangeable [`StatementBuilder`]s turn filter requests into a
//! [`ParameterizedStatement`]:
//! - [`SeaQueryStatementBuilder`]: declarative, via SeaQuery
//! - [`SqlTemplateBuilder`]: hand-written SQL with numbered placeholders
//!
//! Caller values only ever travel as bound parameters. Identifiers come from
//! [`crate::fields`].

mod sea;
mod template;

pub use sea::SeaQueryStatementBuilder;
pub use template::SqlTemplateBuilder;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SearchError;
use crate::fields::SearchField;
use crate::row::SqlValue;

/// Matches PostgreSQL positional placeholders (`$1`, `$2`, ...).
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static NUMBERED_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").expect("valid regex literal"));

/// Matches placeholder styles SQLite templates must not use here
/// (`?NNN`, `$NNN`, `:name`, `@name`).
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static NON_ANONYMOUS_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\?\d|\$\d|[:@][A-Za-z_]").expect("valid regex literal")
});

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Case-insensitive substring match; the value is matched literally.
    Contains,
    /// Exact match.
    Equals,
}

/// A single caller filter: `field <operator> value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Logical field name; must be in the allow-list.
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterRequest {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Equals, value)
    }

    /// Whether the value is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Resolve the field against the allow-list.
    pub fn search_field(&self) -> Result<SearchField, SearchError> {
        self.field.parse()
    }
}

/// SQL dialect a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => f.write_str("postgres"),
            Dialect::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// A statement template plus the values bound to its placeholders.
///
/// The placeholder count always equals `params.len()`. Templates are built
/// by the statement builders from static identifiers, or supplied by trusted
/// code as `&'static str` through [`ParameterizedStatement::trusted`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedStatement {
    template: String,
    params: Vec<SqlValue>,
    dialect: Dialect,
}

impl ParameterizedStatement {
    /// Wrap a compile-time template written by trusted code.
    ///
    /// Fails with [`SearchError::Statement`] if the placeholders do not line
    /// up with `params`.
    pub fn trusted(
        template: &'static str,
        params: Vec<SqlValue>,
        dialect: Dialect,
    ) -> Result<Self, SearchError> {
        Self::assemble(template.to_string(), params, dialect)
    }

    pub(crate) fn assemble(
        template: String,
        params: Vec<SqlValue>,
        dialect: Dialect,
    ) -> Result<Self, SearchError> {
        if let Err(reason) = check_placeholders(&template, params.len(), dialect) {
            warn!(%dialect, %reason, "malformed parameterized statement");
            return Err(SearchError::Statement);
        }
        Ok(Self {
            template,
            params,
            dialect,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

/// Capability shared by every way of producing a statement from filters.
pub trait StatementBuilder: Send + Sync {
    /// Build one statement matching all `filters` (AND). An empty slice
    /// selects every row.
    fn build(&self, filters: &[FilterRequest]) -> Result<ParameterizedStatement, SearchError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Dialect of the produced statements.
    fn dialect(&self) -> Dialect;
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub(crate) fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// LIKE pattern for a literal substring match. Case is folded by the
/// engine's `LOWER` on both sides of the comparison, never here.
pub(crate) fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like_wildcards(value))
}

/// Blank out single- and double-quoted regions so placeholder scanning only
/// sees statement structure.
fn strip_quoted(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut quote: Option<char> = None;
    for c in template.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                out.push(' ');
            }
            Some(_) => out.push(' '),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(' ');
            }
            None => out.push(c),
        }
    }
    out
}

fn check_placeholders(template: &str, expected: usize, dialect: Dialect) -> Result<(), String> {
    let structure = strip_quoted(template);
    match dialect {
        Dialect::Postgres => {
            let mut indices = BTreeSet::new();
            for cap in NUMBERED_PLACEHOLDER.captures_iter(&structure) {
                let index: usize = cap[1]
                    .parse()
                    .map_err(|_| format!("placeholder ${} out of range", &cap[1]))?;
                indices.insert(index);
            }
            let wanted: BTreeSet<usize> = (1..=expected).collect();
            if indices != wanted {
                return Err(format!(
                    "placeholders {indices:?} do not match {expected} parameters"
                ));
            }
        }
        Dialect::Sqlite => {
            if NON_ANONYMOUS_PLACEHOLDER.is_match(&structure) {
                return Err("only anonymous `?` placeholders are allowed".to_string());
            }
            let found = structure.matches('?').count();
            if found != expected {
                return Err(format!(
                    "{found} placeholders do not match {expected} parameters"
                ));
            }
        }
    }
    Ok(())
}
