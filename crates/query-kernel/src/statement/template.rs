//! Hand-written SQL statement builder.
//!
//! Assembles the statement text directly, the way a native SQL query would
//! be written. Only identifiers from [`crate::fields`] and placeholders are
//! ever formatted into the text; caller values go to the parameter list.

use tracing::debug;

use super::{
    Dialect, FilterOperator, FilterRequest, ParameterizedStatement, StatementBuilder,
    contains_pattern,
};
use crate::error::SearchError;
use crate::fields::{KEY_COLUMN, PROJECTION, TABLE};
use crate::row::SqlValue;

/// Raw SQL statement builder.
#[derive(Debug, Clone, Copy)]
pub struct SqlTemplateBuilder {
    dialect: Dialect,
}

impl SqlTemplateBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Render one condition on a static column, appending its bound value.
    fn condition(
        &self,
        column: &'static str,
        filter: &FilterRequest,
        params: &mut Vec<SqlValue>,
    ) -> String {
        let placeholder = self.dialect.placeholder(params.len() + 1);
        match filter.operator {
            FilterOperator::Contains => {
                params.push(SqlValue::Text(contains_pattern(&filter.value)));
                format!("LOWER({TABLE}.{column}) LIKE LOWER({placeholder}) ESCAPE '\\'")
            }
            FilterOperator::Equals => {
                params.push(SqlValue::Text(filter.value.clone()));
                format!("{TABLE}.{column} = {placeholder}")
            }
        }
    }
}

impl StatementBuilder for SqlTemplateBuilder {
    fn build(&self, filters: &[FilterRequest]) -> Result<ParameterizedStatement, SearchError> {
        let columns: Vec<String> = PROJECTION
            .iter()
            .map(|column| format!("{TABLE}.{column}"))
            .collect();
        let mut sql = format!("SELECT {} FROM {TABLE}", columns.join(", "));
        let mut params = Vec::new();

        // WHERE clause
        let mut conditions = Vec::new();
        for filter in filters {
            let field = filter.search_field()?;
            conditions.push(self.condition(field.column(), filter, &mut params));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(&format!(" ORDER BY {TABLE}.{KEY_COLUMN} ASC"));

        debug!(
            builder = self.name(),
            filters = filters.len(),
            params = params.len(),
            "statement built"
        );

        ParameterizedStatement::assemble(sql, params, self.dialect)
    }

    fn name(&self) -> &'static str {
        "sql-template"
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}
