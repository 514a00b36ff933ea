//! Statement builder using SeaQuery.
//!
//! Filters become SeaQuery expressions; rendering with `build` keeps every
//! value out of the SQL text and returns it as a bound parameter.

use sea_query::{
    Alias, BinOper, Expr, Func, Order, PostgresQueryBuilder, Query, SelectStatement, SimpleExpr,
    SqliteQueryBuilder, Value,
};
use tracing::{debug, warn};

use super::{
    Dialect, FilterOperator, FilterRequest, ParameterizedStatement, StatementBuilder,
    contains_pattern,
};
use crate::error::SearchError;
use crate::fields::{KEY_COLUMN, PROJECTION, SearchField, TABLE};
use crate::row::SqlValue;

/// Declarative statement builder.
#[derive(Debug, Clone, Copy)]
pub struct SeaQueryStatementBuilder {
    dialect: Dialect,
}

impl SeaQueryStatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Add the fixed projection.
    fn add_select_fields(query: &mut SelectStatement) {
        for column in PROJECTION {
            query.column((Alias::new(TABLE), Alias::new(*column)));
        }
    }

    /// Build a single filter condition.
    fn build_filter_condition(field: SearchField, filter: &FilterRequest) -> SimpleExpr {
        let column = Expr::col((Alias::new(TABLE), Alias::new(field.column())));

        match filter.operator {
            FilterOperator::Contains => {
                // LOWER(column) LIKE LOWER(pattern) ESCAPE '\'
                let pattern = SimpleExpr::Binary(
                    Box::new(Func::lower(Expr::val(contains_pattern(&filter.value))).into()),
                    BinOper::Escape,
                    Box::new(SimpleExpr::Constant('\\'.into())),
                );
                SimpleExpr::Binary(
                    Box::new(Func::lower(column).into()),
                    BinOper::Like,
                    Box::new(pattern),
                )
            }
            FilterOperator::Equals => column.eq(filter.value.clone()),
        }
    }

    fn render(&self, query: &SelectStatement) -> (String, sea_query::Values) {
        match self.dialect {
            Dialect::Postgres => query.build(PostgresQueryBuilder),
            Dialect::Sqlite => query.build(SqliteQueryBuilder),
        }
    }
}

impl StatementBuilder for SeaQueryStatementBuilder {
    fn build(&self, filters: &[FilterRequest]) -> Result<ParameterizedStatement, SearchError> {
        let mut query = Query::select();

        Self::add_select_fields(&mut query);
        query.from(Alias::new(TABLE));

        for filter in filters {
            let field = filter.search_field()?;
            query.and_where(Self::build_filter_condition(field, filter));
        }

        query.order_by((Alias::new(TABLE), Alias::new(KEY_COLUMN)), Order::Asc);

        let (sql, values) = self.render(&query);
        let params = values
            .0
            .into_iter()
            .map(sql_value_from_sea)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            builder = self.name(),
            filters = filters.len(),
            params = params.len(),
            "statement built"
        );

        ParameterizedStatement::assemble(sql, params, self.dialect)
    }

    fn name(&self) -> &'static str {
        "sea-query"
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

/// Convert a SeaQuery bound value into a kernel value.
fn sql_value_from_sea(value: Value) -> Result<SqlValue, SearchError> {
    let converted = match value {
        Value::Bool(v) => v.into(),
        Value::TinyInt(v) => v.map(i64::from).into(),
        Value::SmallInt(v) => v.map(i64::from).into(),
        Value::Int(v) => v.map(i64::from).into(),
        Value::BigInt(v) => v.into(),
        Value::TinyUnsigned(v) => v.map(i64::from).into(),
        Value::SmallUnsigned(v) => v.map(i64::from).into(),
        Value::Unsigned(v) => v.map(i64::from).into(),
        Value::Float(v) => v.map(f64::from).into(),
        Value::Double(v) => v.into(),
        Value::String(v) => v.map(|s| s.to_string()).into(),
        Value::Char(v) => v.map(|c| c.to_string()).into(),
        Value::Bytes(v) => v.map(|b| b.to_vec()).into(),
        _ => {
            warn!("unsupported bound value type");
            return Err(SearchError::Statement);
        }
    };
    Ok(converted)
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn pg() -> SeaQueryStatementBuilder {
        SeaQueryStatementBuilder::new(Dialect::Postgres)
    }

    #[test]
    fn unfiltered_selects_projection_in_key_order() {
        let stmt = pg().build(&[]).unwrap();
        let sql = stmt.template();

        assert!(sql.contains("FROM \"customers\""), "{sql}");
        assert!(sql.contains("\"full_name\""), "{sql}");
        assert!(sql.contains("\"email_address\""), "{sql}");
        assert!(!sql.contains('*'), "projection must be explicit: {sql}");
        assert!(sql.contains("ORDER BY"), "{sql}");
        assert!(!sql.contains("WHERE"), "{sql}");
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn contains_folds_both_sides_in_sql() {
        let stmt = pg().build(&[FilterRequest::contains("name", "Ana")]).unwrap();
        let sql = stmt.template();

        assert!(sql.contains("LOWER(\"customers\".\"full_name\")"), "{sql}");
        assert!(sql.contains("LIKE LOWER($1)"), "{sql}");
        assert!(sql.contains("ESCAPE"), "{sql}");
        assert!(!sql.contains("Ana"), "value must not be inlined: {sql}");
        assert_eq!(stmt.params(), &[SqlValue::Text("%Ana%".to_string())]);
    }

    #[test]
    fn equals_binds_value_verbatim() {
        let stmt = pg().build(&[FilterRequest::equals("city", "São Paulo")]).unwrap();
        let sql = stmt.template();

        assert!(sql.contains("\"customers\".\"city\" = $1"), "{sql}");
        assert_eq!(stmt.params(), &[SqlValue::Text("São Paulo".to_string())]);
    }

    #[test]
    fn multiple_filters_are_anded() {
        let stmt = pg()
            .build(&[
                FilterRequest::contains("name", "ana"),
                FilterRequest::equals("city", "Lisboa"),
            ])
            .unwrap();
        let sql = stmt.template();

        assert!(sql.contains(" AND "), "{sql}");
        assert!(sql.contains("$2"), "{sql}");
        assert_eq!(stmt.params().len(), 2);
    }

    #[test]
    fn unknown_field_rejected() {
        let result = pg().build(&[FilterRequest::contains("ssn", "123")]);
        assert_eq!(
            result,
            Err(SearchError::InvalidField {
                field: "ssn".to_string()
            })
        );
    }

    #[test]
    fn hostile_values_stay_out_of_template() {
        let hostile = [
            "'; DROP TABLE customers; --",
            "100%_done",
            "\" OR \"1\"=\"1",
            "a\\b",
        ];
        for value in hostile {
            for op in [FilterOperator::Contains, FilterOperator::Equals] {
                let stmt = pg().build(&[FilterRequest::new("name", op, value)]).unwrap();
                assert!(
                    !stmt.template().contains(value),
                    "{value:?} leaked into {}",
                    stmt.template()
                );
                assert_eq!(stmt.params().len(), 1);
            }
        }
    }

    #[test]
    fn sqlite_uses_anonymous_placeholders() {
        let stmt = SeaQueryStatementBuilder::new(Dialect::Sqlite)
            .build(&[
                FilterRequest::contains("name", "ana"),
                FilterRequest::equals("email", "ana@example.com"),
            ])
            .unwrap();
        let sql = stmt.template();

        assert!(sql.contains('?'), "{sql}");
        assert!(!sql.contains("$1"), "{sql}");
        assert_eq!(stmt.dialect(), Dialect::Sqlite);
        assert_eq!(stmt.params().len(), 2);
    }

    #[test]
    fn sea_values_convert() {
        assert_eq!(
            sql_value_from_sea(Value::Int(Some(4))).unwrap(),
            SqlValue::Integer(4)
        );
        assert_eq!(sql_value_from_sea(Value::Int(None)).unwrap(), SqlValue::Null);
        assert_eq!(
            sql_value_from_sea(Value::Bool(Some(true))).unwrap(),
            SqlValue::Bool(true)
        );
    }
}
