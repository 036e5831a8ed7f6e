//! SQL text generation for the table helpers.
//!
//! Every builder validates identifiers, numbers placeholders from `$1` and
//! returns the statement together with its parameters. Nothing here touches
//! a connection, so the generated SQL can be inspected or logged up front.
//!
//! ```ignore
//! use pgcrud::{ColumnCase, Where, statement};
//! use serde_json::json;
//!
//! let payload = json!({"price": 2}).as_object().cloned().unwrap();
//! let stmt = statement::update("products", &payload, &Where::new("id = $1", ["x"]), ColumnCase::Preserve)?;
//! assert_eq!(stmt.sql, "UPDATE products SET price = $1 WHERE id = $2 RETURNING *");
//! ```

use crate::condition::Where;
use crate::config::ColumnCase;
use crate::error::{CrudError, CrudResult};
use crate::ident::{column_list, column_name, table_name};
use crate::value::Record;
use serde::Serialize;
use serde_json::Value;

/// A generated statement and its parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

/// Serialize a payload into a column → value record.
pub fn payload_record<T: Serialize + ?Sized>(payload: &T) -> CrudResult<Record> {
    match serde_json::to_value(payload)? {
        Value::Object(record) => Ok(record),
        other => Err(CrudError::validation(format!(
            "payload must serialize to an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// ` WHERE ...` for a non-empty condition, placeholders starting after `offset`.
fn where_clause(cond: &Where, case: ColumnCase, offset: usize) -> CrudResult<(String, Vec<Value>)> {
    if cond.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let rendered = cond.render(case, offset)?;
    Ok((format!(" WHERE {}", rendered.sql), rendered.params))
}

fn placeholders(start: usize, count: usize) -> String {
    (start + 1..=start + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT cols FROM t [WHERE ..] [LIMIT n]`
pub fn select(
    table: &str,
    columns: &str,
    cond: &Where,
    limit: Option<u64>,
    case: ColumnCase,
) -> CrudResult<Statement> {
    let table = table_name(table)?;
    let columns = column_list(columns, case)?;
    let (filter, params) = where_clause(cond, case, 0)?;
    let mut sql = format!("SELECT {columns} FROM {table}{filter}");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(Statement::new(sql, params))
}

/// `SELECT * FROM t WHERE id = $1`
pub fn select_by_id(table: &str, id: Value) -> CrudResult<Statement> {
    let table = table_name(table)?;
    Ok(Statement::new(
        format!("SELECT * FROM {table} WHERE id = $1"),
        vec![id],
    ))
}

/// `SELECT COUNT(*) AS count FROM t [WHERE ..]`
pub fn count(table: &str, cond: &Where, case: ColumnCase) -> CrudResult<Statement> {
    let table = table_name(table)?;
    let (filter, params) = where_clause(cond, case, 0)?;
    Ok(Statement::new(
        format!("SELECT COUNT(*) AS count FROM {table}{filter}"),
        params,
    ))
}

/// `SELECT EXISTS (SELECT 1 FROM t [WHERE ..]) AS exists`
pub fn exists(table: &str, cond: &Where, case: ColumnCase) -> CrudResult<Statement> {
    let table = table_name(table)?;
    let (filter, params) = where_clause(cond, case, 0)?;
    Ok(Statement::new(
        format!("SELECT EXISTS (SELECT 1 FROM {table}{filter}) AS exists"),
        params,
    ))
}

/// `INSERT INTO t (cols) VALUES ($1, .., $N) RETURNING *`
///
/// An empty payload inserts `DEFAULT VALUES`.
pub fn insert(table: &str, payload: &Record, case: ColumnCase) -> CrudResult<Statement> {
    let table = table_name(table)?;
    if payload.is_empty() {
        return Ok(Statement::new(
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING *"),
            Vec::new(),
        ));
    }

    let columns = payload
        .keys()
        .map(|k| column_name(k, case))
        .collect::<CrudResult<Vec<_>>>()?;
    let params: Vec<Value> = payload.values().cloned().collect();
    Ok(Statement::new(
        format!(
            "INSERT INTO {table} ({}) VALUES ({}) RETURNING *",
            columns.join(", "),
            placeholders(0, params.len())
        ),
        params,
    ))
}

/// Multi-row insert. Every payload must carry exactly the first payload's
/// keys; values are bound in the first payload's column order.
pub fn insert_many(table: &str, payloads: &[Record], case: ColumnCase) -> CrudResult<Statement> {
    let Some(first) = payloads.first() else {
        return Err(CrudError::validation("insert_many needs at least one payload"));
    };
    if first.is_empty() {
        return Err(CrudError::validation("insert_many payloads must have at least one column"));
    }

    let table = table_name(table)?;
    let columns = first
        .keys()
        .map(|k| column_name(k, case))
        .collect::<CrudResult<Vec<_>>>()?;

    let width = first.len();
    let mut params = Vec::with_capacity(width * payloads.len());
    let mut rows = Vec::with_capacity(payloads.len());
    for (row, payload) in payloads.iter().enumerate() {
        if payload.len() != width {
            return Err(CrudError::validation(format!(
                "insert_many payload {row} has {} columns, expected {width}",
                payload.len()
            )));
        }
        for key in first.keys() {
            let value = payload.get(key).ok_or_else(|| {
                CrudError::validation(format!("insert_many payload {row} is missing '{key}'"))
            })?;
            params.push(value.clone());
        }
        rows.push(format!("({})", placeholders(row * width, width)));
    }

    Ok(Statement::new(
        format!(
            "INSERT INTO {table} ({}) VALUES {} RETURNING *",
            columns.join(", "),
            rows.join(", ")
        ),
        params,
    ))
}

fn is_id_column(column: &str) -> bool {
    column.eq_ignore_ascii_case("id") || column == "\"id\""
}

/// `UPDATE t SET col = $1, .. WHERE .. RETURNING *`
///
/// The `id` key is never written. Condition placeholders continue after the
/// SET placeholders and parameters are `[set values.., condition values..]`.
pub fn update(table: &str, payload: &Record, cond: &Where, case: ColumnCase) -> CrudResult<Statement> {
    let table = table_name(table)?;

    let mut assignments = Vec::with_capacity(payload.len());
    let mut params = Vec::with_capacity(payload.len());
    for (key, value) in payload {
        let column = column_name(key, case)?;
        if is_id_column(&column) {
            continue;
        }
        params.push(value.clone());
        assignments.push(format!("{column} = ${}", params.len()));
    }
    if assignments.is_empty() {
        return Err(CrudError::validation(format!(
            "update on {table} has nothing to SET"
        )));
    }

    let (filter, where_params) = where_clause(cond, case, params.len())?;
    params.extend(where_params);
    Ok(Statement::new(
        format!(
            "UPDATE {table} SET {}{filter} RETURNING *",
            assignments.join(", ")
        ),
        params,
    ))
}

/// `DELETE FROM t WHERE .. RETURNING *`. An empty condition is rejected.
pub fn delete(table: &str, cond: &Where, case: ColumnCase) -> CrudResult<Statement> {
    let table = table_name(table)?;
    if cond.is_empty() {
        return Err(CrudError::validation(format!(
            "refusing to delete from {table} without a condition"
        )));
    }
    let (filter, params) = where_clause(cond, case, 0)?;
    Ok(Statement::new(
        format!("DELETE FROM {table}{filter} RETURNING *"),
        params,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        payload_record(&value).unwrap()
    }

    const P: ColumnCase = ColumnCase::Preserve;

    #[test]
    fn insert_numbers_placeholders_in_column_order() {
        let stmt = insert("products", &record(json!({"name": "a", "price": 1})), P).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO products (name, price) VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(stmt.params, vec![json!("a"), json!(1)]);
    }

    #[test]
    fn insert_placeholders_have_no_gaps() {
        let mut payload = Record::new();
        for i in 0..12 {
            payload.insert(format!("c{i}"), json!(i));
        }
        let stmt = insert("t", &payload, P).unwrap();
        let expected = (1..=12).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");
        assert!(stmt.sql.contains(&format!("VALUES ({expected})")));
        assert_eq!(stmt.params.len(), 12);
    }

    #[test]
    fn insert_empty_payload_uses_defaults() {
        let stmt = insert("t", &Record::new(), P).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t DEFAULT VALUES RETURNING *");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn insert_converts_camel_case_keys() {
        let stmt = insert(
            "orders",
            &record(json!({"customerId": 3, "totalPrice": "9.50"})),
            ColumnCase::Camel,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO orders (customer_id, total_price) VALUES ($1, $2) RETURNING *"
        );
    }

    #[test]
    fn insert_rejects_unsafe_keys_and_tables() {
        assert!(insert("t", &record(json!({"a) VALUES (1); --": 1})), P).is_err());
        assert!(insert("t; drop table t", &record(json!({"a": 1})), P).is_err());
    }

    #[test]
    fn insert_many_numbers_rows_continuously() {
        let rows = vec![
            record(json!({"name": "a", "price": 1})),
            record(json!({"price": 2, "name": "b"})),
        ];
        let stmt = insert_many("products", &rows, P).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO products (name, price) VALUES ($1, $2), ($3, $4) RETURNING *"
        );
        assert_eq!(stmt.params, vec![json!("a"), json!(1), json!("b"), json!(2)]);
    }

    #[test]
    fn insert_many_rejects_mismatched_columns() {
        let rows = vec![record(json!({"name": "a"})), record(json!({"sku": "b"}))];
        assert!(matches!(
            insert_many("products", &rows, P),
            Err(CrudError::Validation(_))
        ));
        let rows = vec![record(json!({"name": "a"})), record(json!({"name": "b", "x": 1}))];
        assert!(insert_many("products", &rows, P).is_err());
        assert!(insert_many("products", &[], P).is_err());
    }

    #[test]
    fn update_strips_id_and_renumbers_condition() {
        let stmt = update(
            "products",
            &record(json!({"id": "ignored", "price": 2})),
            &Where::new("id = $1", ["x"]),
            P,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE products SET price = $1 WHERE id = $2 RETURNING *"
        );
        assert_eq!(stmt.params, vec![json!(2), json!("x")]);
    }

    #[test]
    fn update_condition_continues_after_set_values() {
        let stmt = update(
            "products",
            &record(json!({"name": "n", "price": 3, "stock": 4})),
            &Where::new("org = $1 AND sku = $2", ["o", "s"]),
            P,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE products SET name = $1, price = $2, stock = $3 WHERE org = $4 AND sku = $5 RETURNING *"
        );
        assert_eq!(
            stmt.params,
            vec![json!("n"), json!(3), json!(4), json!("o"), json!("s")]
        );
    }

    #[test]
    fn update_with_only_id_is_rejected() {
        let err = update("t", &record(json!({"id": 1})), &Where::eq("id", 1), P).unwrap_err();
        assert!(matches!(err, CrudError::Validation(_)));
        assert!(update("t", &record(json!({"ID": 1})), &Where::eq("id", 1), P).is_err());
    }

    #[test]
    fn select_variants() {
        let stmt = select("products", "id, name", &Where::new("price > $1", [10]), None, P).unwrap();
        assert_eq!(stmt.sql, "SELECT id, name FROM products WHERE price > $1");
        assert_eq!(stmt.params, vec![json!(10)]);

        let stmt = select("products", "*", &Where::none(), Some(1), P).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM products LIMIT 1");

        let stmt = select_by_id("public.products", json!(5)).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM public.products WHERE id = $1");
    }

    #[test]
    fn count_and_exists() {
        let cond = Where::eq("status", "open");
        assert_eq!(
            count("tickets", &cond, P).unwrap().sql,
            "SELECT COUNT(*) AS count FROM tickets WHERE status = $1"
        );
        assert_eq!(
            exists("tickets", &cond, P).unwrap().sql,
            "SELECT EXISTS (SELECT 1 FROM tickets WHERE status = $1) AS exists"
        );
        assert_eq!(
            count("tickets", &Where::none(), P).unwrap().sql,
            "SELECT COUNT(*) AS count FROM tickets"
        );
    }

    #[test]
    fn delete_requires_condition() {
        assert!(delete("t", &Where::none(), P).is_err());
        let stmt = delete("t", &Where::in_list("id", [1, 2]), P).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM t WHERE id IN ($1, $2) RETURNING *");
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(payload_record(&json!([1, 2])).is_err());
        assert!(payload_record(&json!("x")).is_err());

        #[derive(Serialize)]
        struct Product {
            name: String,
            price: i32,
        }
        let rec = payload_record(&Product {
            name: "a".into(),
            price: 1,
        })
        .unwrap();
        assert_eq!(rec.keys().collect::<Vec<_>>(), vec!["name", "price"]);
    }
}
