//! JSON values at the driver boundary.
//!
//! Parameters are `serde_json::Value`s encoded against the type the server
//! inferred for each placeholder; rows are decoded into [`Record`]s.

use crate::config::ColumnCase;
use crate::error::{CrudError, CrudResult};
use crate::ident::result_key;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::error::Error;
use std::str::FromStr;
use tokio_postgres::Row;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};
use uuid::Uuid;

/// One result row, keyed by column name in column order.
pub type Record = Map<String, Value>;

type BoxError = Box<dyn Error + Sync + Send>;

/// A JSON value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonParam<'a>(pub &'a Value);

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot encode {value} as postgres type {ty}").into()
}

fn int_param<T>(value: &Value, ty: &Type) -> Result<T, BoxError>
where
    T: TryFrom<i64>,
{
    let n = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| mismatch(value, ty))?;
    T::try_from(n).map_err(|_| format!("{n} is out of range for postgres type {ty}").into())
}

fn float_param(value: &Value, ty: &Type) -> Result<f64, BoxError> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| mismatch(value, ty))
}

impl ToSql for JsonParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        if let Kind::Array(_) = ty.kind() {
            let Value::Array(items) = value else {
                return Err(mismatch(value, ty));
            };
            let elems: Vec<JsonParam<'_>> = items.iter().map(JsonParam).collect();
            return elems.to_sql(ty, out);
        }

        match *ty {
            Type::BOOL => match value {
                Value::Bool(b) => b.to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            Type::INT2 => int_param::<i16>(value, ty)?.to_sql(ty, out),
            Type::INT4 => int_param::<i32>(value, ty)?.to_sql(ty, out),
            Type::INT8 => int_param::<i64>(value, ty)?.to_sql(ty, out),
            Type::OID => int_param::<u32>(value, ty)?.to_sql(ty, out),
            Type::FLOAT4 => (float_param(value, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => float_param(value, ty)?.to_sql(ty, out),
            Type::NUMERIC => {
                let text = match value {
                    Value::Number(n) => n.to_string(),
                    Value::String(s) => s.trim().to_string(),
                    _ => return Err(mismatch(value, ty)),
                };
                let dec = Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map_err(|e| format!("invalid numeric '{text}': {e}"))?;
                dec.to_sql(ty, out)
            }
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            Type::UUID => match value {
                Value::String(s) => Uuid::parse_str(s)?.to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            Type::TIMESTAMPTZ => match value {
                Value::String(s) => DateTime::parse_from_rfc3339(s)?
                    .with_timezone(&Utc)
                    .to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            Type::TIMESTAMP => match value {
                Value::String(s) => parse_naive_datetime(s)
                    .ok_or_else(|| mismatch(value, ty))?
                    .to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            Type::DATE => match value {
                Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            Type::TIME => match value {
                Value::String(s) => NaiveTime::from_str(s)?.to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            Type::BYTEA => match value {
                Value::String(s) => decode_hex_bytea(s)
                    .ok_or_else(|| mismatch(value, ty))?
                    .to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },
            _ if <String as ToSql>::accepts(ty) => match value {
                Value::String(s) => s.to_sql(ty, out),
                other => other.to_string().to_sql(ty, out),
            },
            _ => Err(mismatch(value, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}

fn decode_hex_bytea(s: &str) -> Option<Vec<u8>> {
    let hex = s.strip_prefix("\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

fn encode_hex_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Borrow parameters as `tokio-postgres` trait objects.
pub(crate) fn bind_params(params: &[Value]) -> Vec<JsonParam<'_>> {
    params.iter().map(JsonParam).collect()
}

pub(crate) fn param_refs<'a>(params: &'a [JsonParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn get<'a, T>(row: &'a Row, idx: usize) -> CrudResult<Option<T>>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| CrudError::decode(row.columns()[idx].name(), e.to_string()))
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn scalar_value(row: &Row, idx: usize, ty: &Type) -> CrudResult<Value> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|f| float_value(f64::from(f))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(float_value),
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(|d| Value::String(d.to_string())),
        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,
        Type::UUID => get::<Uuid>(row, idx)?.map(|u| Value::String(u.to_string())),
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, idx)?.map(|dt| Value::String(dt.to_rfc3339()))
        }
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(|d| Value::String(d.to_string())),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(|t| Value::String(t.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(|b| Value::String(encode_hex_bytea(&b))),
        _ if <String as tokio_postgres::types::FromSql>::accepts(ty) => {
            get::<String>(row, idx)?.map(Value::String)
        }
        _ => {
            return Err(CrudError::decode(
                row.columns()[idx].name(),
                format!("unsupported column type '{ty}'; cast it to text in the query"),
            ));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn array_value(row: &Row, idx: usize, elem: &Type) -> CrudResult<Value> {
    fn wrap<T>(items: Option<Vec<Option<T>>>, f: impl Fn(T) -> Value) -> Value {
        match items {
            Some(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| v.map_or(Value::Null, &f))
                    .collect(),
            ),
            None => Value::Null,
        }
    }

    let value = match *elem {
        Type::BOOL => wrap(get::<Vec<Option<bool>>>(row, idx)?, Value::Bool),
        Type::INT2 => wrap(get::<Vec<Option<i16>>>(row, idx)?, Value::from),
        Type::INT4 => wrap(get::<Vec<Option<i32>>>(row, idx)?, Value::from),
        Type::INT8 => wrap(get::<Vec<Option<i64>>>(row, idx)?, Value::from),
        Type::FLOAT4 => wrap(get::<Vec<Option<f32>>>(row, idx)?, |f| {
            float_value(f64::from(f))
        }),
        Type::FLOAT8 => wrap(get::<Vec<Option<f64>>>(row, idx)?, float_value),
        Type::NUMERIC => wrap(get::<Vec<Option<Decimal>>>(row, idx)?, |d| {
            Value::String(d.to_string())
        }),
        Type::JSON | Type::JSONB => wrap(get::<Vec<Option<Value>>>(row, idx)?, |v| v),
        Type::UUID => wrap(get::<Vec<Option<Uuid>>>(row, idx)?, |u| {
            Value::String(u.to_string())
        }),
        Type::TIMESTAMPTZ => wrap(get::<Vec<Option<DateTime<Utc>>>>(row, idx)?, |dt| {
            Value::String(dt.to_rfc3339())
        }),
        Type::DATE => wrap(get::<Vec<Option<NaiveDate>>>(row, idx)?, |d| {
            Value::String(d.to_string())
        }),
        _ if <String as tokio_postgres::types::FromSql>::accepts(elem) => {
            wrap(get::<Vec<Option<String>>>(row, idx)?, Value::String)
        }
        _ => {
            return Err(CrudError::decode(
                row.columns()[idx].name(),
                format!("unsupported array element type '{elem}'"),
            ));
        }
    };
    Ok(value)
}

/// Decode a driver row into a [`Record`] keyed by the raw column names.
pub fn row_to_record(row: &Row) -> CrudResult<Record> {
    let mut record = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = match ty.kind() {
            Kind::Array(elem) => array_value(row, idx, elem)?,
            _ => scalar_value(row, idx, ty)?,
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

/// Apply the configured column case to a record's keys.
pub(crate) fn rekey(record: Record, case: ColumnCase) -> Record {
    match case {
        ColumnCase::Preserve => record,
        ColumnCase::Camel => record
            .into_iter()
            .map(|(k, v)| (result_key(&k, case), v))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: Value, ty: &Type) -> Result<(IsNull, Vec<u8>), BoxError> {
        let mut buf = BytesMut::new();
        let is_null = JsonParam(&value).to_sql_checked(ty, &mut buf)?;
        Ok((is_null, buf.to_vec()))
    }

    #[test]
    fn null_encodes_as_null_for_any_type() {
        for ty in [Type::INT4, Type::TEXT, Type::JSONB, Type::UUID] {
            let (is_null, bytes) = encode(Value::Null, &ty).unwrap();
            assert!(matches!(is_null, IsNull::Yes));
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn integers_follow_target_width() {
        assert_eq!(encode(json!(1), &Type::INT4).unwrap().1, 1_i32.to_be_bytes());
        assert_eq!(encode(json!(1), &Type::INT8).unwrap().1, 1_i64.to_be_bytes());
        assert_eq!(encode(json!(7), &Type::INT2).unwrap().1, 7_i16.to_be_bytes());
        assert_eq!(encode(json!("42"), &Type::INT4).unwrap().1, 42_i32.to_be_bytes());
    }

    #[test]
    fn integer_overflow_is_rejected() {
        assert!(encode(json!(70000), &Type::INT2).is_err());
        assert!(encode(json!(1.5), &Type::INT4).is_err());
    }

    #[test]
    fn floats_and_text() {
        assert_eq!(encode(json!(2.5), &Type::FLOAT8).unwrap().1, 2.5_f64.to_be_bytes());
        assert_eq!(encode(json!("a"), &Type::TEXT).unwrap().1, b"a");
        assert_eq!(encode(json!(12), &Type::VARCHAR).unwrap().1, b"12");
    }

    #[test]
    fn bool_requires_bool() {
        assert_eq!(encode(json!(true), &Type::BOOL).unwrap().1, vec![1]);
        assert!(encode(json!("true"), &Type::BOOL).is_err());
    }

    #[test]
    fn uuid_and_timestamps_parse_strings() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(
            encode(json!(id), &Type::UUID).unwrap().1,
            Uuid::parse_str(id).unwrap().as_bytes().to_vec()
        );
        assert!(encode(json!("2024-05-01T10:00:00Z"), &Type::TIMESTAMPTZ).is_ok());
        assert!(encode(json!("2024-05-01 10:00:00"), &Type::TIMESTAMP).is_ok());
        assert!(encode(json!("2024-05-01"), &Type::DATE).is_ok());
        assert!(encode(json!("yesterday"), &Type::DATE).is_err());
    }

    #[test]
    fn json_objects_encode_for_jsonb() {
        let (_, bytes) = encode(json!({"a": 1}), &Type::JSONB).unwrap();
        assert_eq!(bytes[0], 1, "jsonb version byte");
        assert!(encode(json!({"a": 1}), &Type::INT4).is_err());
    }

    #[test]
    fn arrays_encode_elementwise() {
        assert!(encode(json!([1, 2, 3]), &Type::INT4_ARRAY).is_ok());
        assert!(encode(json!(["a", null]), &Type::TEXT_ARRAY).is_ok());
        assert!(encode(json!(1), &Type::INT4_ARRAY).is_err());
    }

    #[test]
    fn numeric_accepts_numbers_and_strings() {
        assert!(encode(json!(19.99), &Type::NUMERIC).is_ok());
        assert!(encode(json!("1234567890.123456789"), &Type::NUMERIC).is_ok());
        assert!(encode(json!("abc"), &Type::NUMERIC).is_err());
    }

    #[test]
    fn bytea_hex_roundtrip() {
        assert_eq!(decode_hex_bytea("\\xdeadbeef"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(decode_hex_bytea("deadbeef"), None);
        assert_eq!(encode_hex_bytea(&[0x00, 0xff]), "\\x00ff");
    }

    #[test]
    fn rekey_converts_to_camel() {
        let mut record = Record::new();
        record.insert("created_at".to_string(), json!("x"));
        record.insert("id".to_string(), json!(1));
        let keyed = rekey(record.clone(), ColumnCase::Camel);
        assert_eq!(keyed.keys().collect::<Vec<_>>(), vec!["createdAt", "id"]);
        assert_eq!(rekey(record.clone(), ColumnCase::Preserve), record);
    }
}
