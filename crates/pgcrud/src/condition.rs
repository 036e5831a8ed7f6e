//! WHERE conditions.
//!
//! A [`Where`] is either a raw fragment with its own `$1..$k` numbering plus
//! the matching parameters, or a structured predicate built from column
//! comparisons. Either way the placeholders are renumbered when the condition
//! is placed after other parameters, so callers never track indices.
//!
//! # Example
//! ```ignore
//! use pgcrud::Where;
//! use serde_json::json;
//!
//! let cond = Where::new("price > $1", [10])
//!     .and(Where::eq("status", "active"))
//!     .and(Where::is_null("deleted_at"));
//! // price > $1 AND status = $2 AND deleted_at IS NULL
//! ```

use crate::config::ColumnCase;
use crate::error::{CrudError, CrudResult};
use crate::ident::column_name;
use crate::placeholder::{max_index, renumber};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Raw { sql: String, params: Vec<Value> },
    Compare { column: String, op: &'static str, value: Value },
    Null { column: String, negated: bool },
    InList { column: String, values: Vec<Value>, negated: bool },
    And(Vec<Node>),
    Or(Vec<Node>),
}

/// A WHERE condition and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    node: Node,
}

/// A condition rendered at a given parameter offset.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Rendered {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Default for Where {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&str> for Where {
    fn from(fragment: &str) -> Self {
        Self::raw(fragment)
    }
}

impl From<String> for Where {
    fn from(fragment: String) -> Self {
        Self::raw(fragment)
    }
}

impl Where {
    /// No condition: matches every row.
    pub fn none() -> Self {
        Self {
            node: Node::And(Vec::new()),
        }
    }

    /// A raw fragment using `$1..$k` and its parameters, in order.
    pub fn new<V: Into<Value>>(fragment: impl Into<String>, params: impl IntoIterator<Item = V>) -> Self {
        Self {
            node: Node::Raw {
                sql: fragment.into(),
                params: params.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// A raw fragment without parameters.
    pub fn raw(fragment: impl Into<String>) -> Self {
        Self::new(fragment, Vec::<Value>::new())
    }

    fn compare(column: impl Into<String>, op: &'static str, value: impl Into<Value>) -> Self {
        Self {
            node: Node::Compare {
                column: column.into(),
                op,
                value: value.into(),
            },
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, "=", value)
    }

    /// `column <> value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, "<>", value)
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ">", value)
    }

    /// `column >= value`
    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, ">=", value)
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, "<", value)
    }

    /// `column <= value`
    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, "<=", value)
    }

    /// `column LIKE pattern`
    pub fn like(column: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::compare(column, "LIKE", pattern)
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            node: Node::Null {
                column: column.into(),
                negated: false,
            },
        }
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            node: Node::Null {
                column: column.into(),
                negated: true,
            },
        }
    }

    /// `column IN (...)`. An empty list matches nothing.
    pub fn in_list<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            node: Node::InList {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negated: false,
            },
        }
    }

    /// `column NOT IN (...)`. An empty list matches everything.
    pub fn not_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            node: Node::InList {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negated: true,
            },
        }
    }

    /// Both conditions must hold.
    pub fn and(self, other: Where) -> Self {
        let mut nodes = match self.node {
            Node::And(nodes) => nodes,
            node => vec![node],
        };
        match other.node {
            Node::And(more) => nodes.extend(more),
            node => nodes.push(node),
        }
        Self {
            node: Node::And(nodes),
        }
    }

    /// Either condition holds.
    pub fn or(self, other: Where) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::none();
        }
        let mut nodes = match self.node {
            Node::Or(nodes) => nodes,
            node => vec![node],
        };
        match other.node {
            Node::Or(more) => nodes.extend(more),
            node => nodes.push(node),
        }
        Self {
            node: Node::Or(nodes),
        }
    }

    /// Whether this condition matches every row.
    pub fn is_empty(&self) -> bool {
        is_empty_node(&self.node)
    }

    /// Render with placeholders starting at `$(offset + 1)`.
    pub(crate) fn render(&self, case: ColumnCase, offset: usize) -> CrudResult<Rendered> {
        let mut out = Rendered::default();
        render_node(&self.node, case, offset, &mut out)?;
        Ok(out)
    }
}

fn is_empty_node(node: &Node) -> bool {
    match node {
        Node::And(nodes) | Node::Or(nodes) => nodes.iter().all(is_empty_node),
        Node::Raw { sql, .. } => sql.trim().is_empty(),
        _ => false,
    }
}

fn needs_parens(node: &Node) -> bool {
    matches!(node, Node::Raw { .. } | Node::And(_) | Node::Or(_))
}

fn next_placeholder(out: &mut Rendered, offset: usize, value: Value) -> String {
    out.params.push(value);
    format!("${}", offset + out.params.len())
}

fn render_node(node: &Node, case: ColumnCase, offset: usize, out: &mut Rendered) -> CrudResult<()> {
    match node {
        Node::Raw { sql, params } => {
            let referenced = max_index(sql);
            if referenced != params.len() {
                return Err(CrudError::validation(format!(
                    "condition '{sql}' references {referenced} placeholder(s) but {} parameter(s) were given",
                    params.len()
                )));
            }
            out.sql
                .push_str(renumber(sql.trim(), offset + out.params.len()).as_ref());
            out.params.extend(params.iter().cloned());
        }
        Node::Compare { column, op, value } => {
            let column = column_name(column, case)?;
            let placeholder = next_placeholder(out, offset, value.clone());
            out.sql.push_str(&format!("{column} {op} {placeholder}"));
        }
        Node::Null { column, negated } => {
            let column = column_name(column, case)?;
            let check = if *negated { "IS NOT NULL" } else { "IS NULL" };
            out.sql.push_str(&format!("{column} {check}"));
        }
        Node::InList {
            column,
            values,
            negated,
        } => {
            let column = column_name(column, case)?;
            if values.is_empty() {
                out.sql.push_str(if *negated { "1=1" } else { "1=0" });
                return Ok(());
            }
            let placeholders = values
                .iter()
                .map(|v| next_placeholder(out, offset, v.clone()))
                .collect::<Vec<_>>()
                .join(", ");
            let op = if *negated { "NOT IN" } else { "IN" };
            out.sql.push_str(&format!("{column} {op} ({placeholders})"));
        }
        Node::And(nodes) | Node::Or(nodes) => {
            let joiner = if matches!(node, Node::And(_)) { " AND " } else { " OR " };
            let children: Vec<&Node> = nodes.iter().filter(|n| !is_empty_node(n)).collect();
            let wrap = children.len() > 1;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.sql.push_str(joiner);
                }
                let parens = wrap && needs_parens(child);
                if parens {
                    out.sql.push('(');
                }
                render_node(child, case, offset, out)?;
                if parens {
                    out.sql.push(')');
                }
            }
        }
    }
    Ok(())
}
