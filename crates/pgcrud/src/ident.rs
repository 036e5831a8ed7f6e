//! Names interpolated into SQL text.
//!
//! Table and column names can't be bound as parameters, so a name is only
//! accepted when every dot-separated part is either a bare word
//! (`[A-Za-z_][A-Za-z0-9_$]*`) or a double-quoted name with `""` escapes.
//! Accepted names are emitted exactly as written.

use crate::config::ColumnCase;
use crate::error::{CrudError, CrudResult};
use heck::{ToLowerCamelCase, ToSnakeCase};

/// `database.schema.table` is the longest form PostgreSQL understands.
const MAX_TABLE_PARTS: usize = 3;

#[derive(Clone, Copy)]
enum NameKind {
    Table,
    Column,
}

impl NameKind {
    fn label(self) -> &'static str {
        match self {
            NameKind::Table => "table name",
            NameKind::Column => "column name",
        }
    }
}

/// Split at the dots outside double quotes. A doubled `""` toggles the quote
/// state twice, so escapes need no special casing.
fn split_parts(raw: &str) -> Result<Vec<&str>, &'static str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut from = 0;
    for (at, ch) in raw.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '.' if !quoted => {
                parts.push(&raw[from..at]);
                from = at + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return Err("has an unterminated quote");
    }
    parts.push(&raw[from..]);
    Ok(parts)
}

fn check_part(part: &str) -> Result<(), &'static str> {
    if part.is_empty() {
        return Err("has an empty part");
    }

    if let Some(rest) = part.strip_prefix('"') {
        let inner = rest
            .strip_suffix('"')
            .ok_or("mixes quoted and bare text")?;
        if inner.is_empty() {
            return Err("has an empty quoted part");
        }
        if inner.contains('\0') {
            return Err("contains a NUL character");
        }
        // Inside the quotes, `"` only appears doubled.
        if inner.split("\"\"").any(|chunk| chunk.contains('"')) {
            return Err("mixes quoted and bare text");
        }
        return Ok(());
    }

    let mut chars = part.chars();
    if !chars.next().is_some_and(|c| c == '_' || c.is_ascii_alphabetic()) {
        return Err("must start with a letter or `_`");
    }
    if chars.any(|c| !(c == '_' || c == '$' || c.is_ascii_alphanumeric())) {
        return Err("may only use letters, digits, `_` and `$` outside quotes");
    }
    Ok(())
}

fn checked(raw: &str, kind: NameKind) -> CrudResult<String> {
    let reject = |why: &str| CrudError::validation(format!("{} `{raw}` {why}", kind.label()));

    if raw.is_empty() {
        return Err(CrudError::validation(format!("{} is empty", kind.label())));
    }
    let parts = split_parts(raw).map_err(reject)?;
    match kind {
        NameKind::Column if parts.len() > 1 => return Err(reject("cannot be qualified")),
        NameKind::Table if parts.len() > MAX_TABLE_PARTS => return Err(reject("has too many parts")),
        _ => {}
    }
    for part in parts {
        check_part(part).map_err(reject)?;
    }
    Ok(raw.to_string())
}

/// Validate a table name, optionally schema-qualified.
pub(crate) fn table_name(raw: &str) -> CrudResult<String> {
    checked(raw.trim(), NameKind::Table)
}

/// Validate one column name. Under [`ColumnCase::Camel`] a bare name is
/// converted to snake_case after it passes validation; quoted names are kept.
pub(crate) fn column_name(raw: &str, case: ColumnCase) -> CrudResult<String> {
    let name = checked(raw.trim(), NameKind::Column)?;
    match case {
        ColumnCase::Camel if !name.starts_with('"') => Ok(name.to_snake_case()),
        _ => Ok(name),
    }
}

/// Validate a comma-separated column list, or `*`.
pub(crate) fn column_list(columns: &str, case: ColumnCase) -> CrudResult<String> {
    let columns = columns.trim();
    if columns.is_empty() || columns == "*" {
        return Ok("*".to_string());
    }
    let names = columns
        .split(',')
        .map(|c| column_name(c, case))
        .collect::<CrudResult<Vec<_>>>()?;
    Ok(names.join(", "))
}

/// Convert a result column name into a record key.
pub(crate) fn result_key(column: &str, case: ColumnCase) -> String {
    match case {
        ColumnCase::Preserve => column.to_string(),
        ColumnCase::Camel => column.to_lower_camel_case(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_keep_their_written_form() {
        assert_eq!(table_name("users").unwrap(), "users");
        assert_eq!(table_name(" billing.invoices ").unwrap(), "billing.invoices");
        assert_eq!(
            table_name(r#"public."Order Items""#).unwrap(),
            r#"public."Order Items""#
        );
        assert_eq!(table_name(r#""a""b""#).unwrap(), r#""a""b""#);
        assert_eq!(table_name(r#""v1.2".events"#).unwrap(), r#""v1.2".events"#);
        assert_eq!(table_name("tbl$log").unwrap(), "tbl$log");
    }

    #[test]
    fn unsafe_table_names_are_rejected() {
        for bad in [
            "",
            "   ",
            "users; drop table users; --",
            "1users",
            "users..name",
            "users.",
            ".users",
            "users name",
            "\"unclosed",
            "\"\"",
            r#""a"b"#,
            r#""a" "b""#,
            "a.b.c.d",
            "us\0ers",
        ] {
            assert!(table_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejection_names_the_kind_and_the_reason() {
        let err = table_name("\"open").unwrap_err().to_string();
        assert!(err.contains("table name"), "{err}");
        assert!(err.contains("unterminated quote"), "{err}");

        let err = column_name("t.id", ColumnCase::Preserve).unwrap_err().to_string();
        assert!(err.contains("column name `t.id` cannot be qualified"), "{err}");
    }

    #[test]
    fn column_list_star_and_trimming() {
        assert_eq!(column_list("*", ColumnCase::Preserve).unwrap(), "*");
        assert_eq!(column_list("", ColumnCase::Preserve).unwrap(), "*");
        assert_eq!(
            column_list(" id,name , price", ColumnCase::Preserve).unwrap(),
            "id, name, price"
        );
    }

    #[test]
    fn column_list_converts_camel_case() {
        assert_eq!(
            column_list("id, createdAt, unitPrice", ColumnCase::Camel).unwrap(),
            "id, created_at, unit_price"
        );
        assert_eq!(
            column_list("createdAt", ColumnCase::Preserve).unwrap(),
            "createdAt"
        );
    }

    #[test]
    fn column_name_rejects_qualified_and_injection() {
        assert!(column_name("t.id", ColumnCase::Preserve).is_err());
        assert!(column_name("id) VALUES (1); --", ColumnCase::Preserve).is_err());
        // Validation runs before the snake_case conversion.
        assert!(column_name("id) VALUES (1); --", ColumnCase::Camel).is_err());
        assert_eq!(column_name(r#""createdAt""#, ColumnCase::Camel).unwrap(), r#""createdAt""#);
    }

    #[test]
    fn result_keys_follow_case() {
        assert_eq!(result_key("created_at", ColumnCase::Camel), "createdAt");
        assert_eq!(result_key("created_at", ColumnCase::Preserve), "created_at");
    }
}
