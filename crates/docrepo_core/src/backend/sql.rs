//! Translation of [`Filter`] and [`FindOptions`] into SQLite SQL.
//!
//! Documents live in a `body` JSON column; fields are read with
//! `json_extract`. Field paths are validated before being embedded as JSON
//! path literals, values are always bound as parameters.

use super::{FindOptions, SortOrder};
use crate::db::DbResult;
use crate::filter::{validate_field_path, CompareOp, Filter};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// SQL text plus its positional parameters, in order.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

/// Expression reading `field` out of the document body. `field` must be validated.
pub(crate) fn extract(field: &str) -> String {
    format!("json_extract(body, '$.{field}')")
}

pub(crate) fn where_clause(filter: &Filter) -> DbResult<SqlFragment> {
    filter.validate()?;
    let mut params = Vec::new();
    let sql = render(filter, &mut params);
    Ok(SqlFragment { sql, params })
}

/// `ORDER BY` plus `LIMIT`/`OFFSET`; parameters are appended to `params`.
pub(crate) fn tail_clause(options: &FindOptions, params: &mut Vec<SqlValue>) -> DbResult<String> {
    let mut sql = String::from(" ORDER BY ");
    for (field, order) in &options.sort {
        validate_field_path(field)?;
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        sql.push_str(&format!("{} {direction}, ", extract(field)));
    }
    sql.push_str("seq ASC");

    if let Some(limit) = options.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(to_i64(limit)));
        if options.skip > 0 {
            sql.push_str(" OFFSET ?");
            params.push(SqlValue::Integer(to_i64(options.skip)));
        }
    } else if options.skip > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        params.push(SqlValue::Integer(to_i64(options.skip)));
    }

    Ok(sql)
}

fn render(filter: &Filter, params: &mut Vec<SqlValue>) -> String {
    match filter {
        Filter::All => "1".to_string(),
        Filter::Compare { field, op, value } => {
            let target = extract(field);
            match (op, value) {
                (CompareOp::Eq, Value::Null) => format!("{target} IS NULL"),
                (CompareOp::Ne, Value::Null) => format!("{target} IS NOT NULL"),
                (op, value) => {
                    let placeholder = bind(value, params);
                    format!("{target} {} {placeholder}", operator(*op))
                }
            }
        }
        Filter::In { field, values } => {
            if values.is_empty() {
                return "0".to_string();
            }
            let placeholders: Vec<&str> = values.iter().map(|value| bind(value, params)).collect();
            format!("{} IN ({})", extract(field), placeholders.join(", "))
        }
        Filter::Exists { field, exists } => {
            let test = if *exists { "IS NOT NULL" } else { "IS NULL" };
            format!("json_type(body, '$.{field}') {test}")
        }
        Filter::Contains { field, needle } => {
            params.push(SqlValue::Text(needle.clone()));
            format!("instr({}, ?) > 0", extract(field))
        }
        Filter::And(filters) => join(filters, " AND ", "1", params),
        Filter::Or(filters) => join(filters, " OR ", "0", params),
        Filter::Not(inner) => format!("NOT ({})", render(inner, params)),
    }
}

fn join(filters: &[Filter], separator: &str, empty: &str, params: &mut Vec<SqlValue>) -> String {
    if filters.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = filters.iter().map(|filter| render(filter, params)).collect();
    format!("({})", parts.join(separator))
}

fn operator(op: CompareOp) -> &'static str {
    match op {
        // IS / IS NOT compare NULL-safely, so a missing field never equals a value.
        CompareOp::Eq => "IS",
        CompareOp::Ne => "IS NOT",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
    }
}

/// Binds `value` and returns the placeholder to compare `json_extract` output with.
fn bind(value: &Value, params: &mut Vec<SqlValue>) -> &'static str {
    match value {
        Value::Null => {
            params.push(SqlValue::Null);
            "?"
        }
        // json_extract yields 1/0 for JSON booleans.
        Value::Bool(flag) => {
            params.push(SqlValue::Integer(i64::from(*flag)));
            "?"
        }
        Value::Number(number) => {
            let bound = match (number.as_i64(), number.as_f64()) {
                (Some(int), _) => SqlValue::Integer(int),
                (None, Some(float)) => SqlValue::Real(float),
                (None, None) => SqlValue::Null,
            };
            params.push(bound);
            "?"
        }
        Value::String(text) => {
            params.push(SqlValue::Text(text.clone()));
            "?"
        }
        // json_extract returns minified JSON text for containers.
        Value::Array(_) | Value::Object(_) => {
            params.push(SqlValue::Text(value.to_string()));
            "json(?)"
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{tail_clause, where_clause, SqlFragment};
    use crate::backend::{FindOptions, SortOrder};
    use crate::db::DbError;
    use crate::filter::{Field, Filter};
    use rusqlite::types::Value as SqlValue;

    #[test]
    fn all_renders_as_true_without_params() {
        assert_eq!(
            where_clause(&Filter::All).unwrap(),
            SqlFragment {
                sql: "1".to_string(),
                params: Vec::new(),
            }
        );
    }

    #[test]
    fn conjunction_binds_values_in_order() {
        let filter = Field::new("deleted")
            .eq(false)
            .and(Field::new("address.city").eq("Oslo"))
            .and(Field::new("score").gt(2.5));
        let fragment = where_clause(&filter).unwrap();

        assert_eq!(
            fragment.sql,
            "(json_extract(body, '$.deleted') IS ? AND json_extract(body, '$.address.city') IS ? AND json_extract(body, '$.score') > ?)"
        );
        assert_eq!(
            fragment.params,
            vec![
                SqlValue::Integer(0),
                SqlValue::Text("Oslo".to_string()),
                SqlValue::Real(2.5),
            ]
        );
    }

    #[test]
    fn null_comparisons_do_not_bind() {
        let fragment = where_clause(&Field::new("owner").eq(serde_json::Value::Null)).unwrap();
        assert_eq!(fragment.sql, "json_extract(body, '$.owner') IS NULL");
        assert!(fragment.params.is_empty());
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let fragment = where_clause(&Field::new("tag").is_in(Vec::<String>::new())).unwrap();
        assert_eq!(fragment.sql, "0");
    }

    #[test]
    fn container_values_compare_as_json() {
        let fragment = where_clause(&Field::new("tags").eq(serde_json::json!(["a", "b"]))).unwrap();
        assert_eq!(fragment.sql, "json_extract(body, '$.tags') IS json(?)");
        assert_eq!(fragment.params, vec![SqlValue::Text(r#"["a","b"]"#.to_string())]);
    }

    #[test]
    fn negation_and_existence_render() {
        let filter = Field::new("note").exists().negate();
        assert_eq!(
            where_clause(&filter).unwrap().sql,
            "NOT (json_type(body, '$.note') IS NOT NULL)"
        );
    }

    #[test]
    fn invalid_field_paths_are_rejected_before_rendering() {
        let err = where_clause(&Field::new("a'; DROP TABLE x; --").eq(1)).unwrap_err();
        assert!(matches!(err, DbError::InvalidFieldPath(_)));
    }

    #[test]
    fn tail_clause_orders_then_pages() {
        let options = FindOptions {
            sort: vec![("added".to_string(), SortOrder::Descending)],
            skip: 5,
            limit: Some(10),
        };
        let mut params = Vec::new();
        let sql = tail_clause(&options, &mut params).unwrap();

        assert_eq!(
            sql,
            " ORDER BY json_extract(body, '$.added') DESC, seq ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(params, vec![SqlValue::Integer(10), SqlValue::Integer(5)]);
    }

    #[test]
    fn tail_clause_supports_offset_without_limit() {
        let options = FindOptions {
            skip: 3,
            ..FindOptions::default()
        };
        let mut params = Vec::new();
        let sql = tail_clause(&options, &mut params).unwrap();

        assert_eq!(sql, " ORDER BY seq ASC LIMIT -1 OFFSET ?");
        assert_eq!(params, vec![SqlValue::Integer(3)]);
    }
}
