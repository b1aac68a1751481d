//! Structured queries and their compilation to query text.
//!
//! A [`StructuredQuery`] is a data-shaped description of a statement. It is
//! compiled to text by a [`QueryCompiler`]; the compiled text is cached per
//! structurally-equal query by [`crate::resolver::CompileCache`].

use std::fmt::Write;

use crate::value::Value;

/// Statement shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// SELECT.
    Select,
    /// INSERT.
    Insert,
    /// UPDATE.
    Update,
    /// DELETE.
    Delete,
}

/// Comparison operators usable in WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `IN (...)`; the value must be a list.
    In,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One WHERE predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition {
    /// Column name.
    pub column: String,
    /// Operator.
    pub op: Operator,
    /// Right-hand side.
    pub value: Value,
}

/// An abstract query tree.
///
/// Equality and hashing are structural, so two independently built queries
/// with the same clauses share one compilation cache entry.
///
/// ```
/// use quarry_client::query::{CqlCompiler, QueryCompiler, StructuredQuery};
///
/// let query = StructuredQuery::select("items").where_eq("id", 1);
/// assert_eq!(CqlCompiler.compile(&query), "SELECT * FROM items WHERE id = 1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuredQuery {
    kind: QueryKind,
    table: String,
    columns: Vec<String>,
    assignments: Vec<(String, Value)>,
    conditions: Vec<Condition>,
    order_by: Vec<(String, Direction)>,
    limit: Option<u64>,
    if_not_exists: bool,
    allow_filtering: bool,
}

impl StructuredQuery {
    fn new(kind: QueryKind, table: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            columns: Vec::new(),
            assignments: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            if_not_exists: false,
            allow_filtering: false,
        }
    }

    /// Starts a SELECT over `table`. Selects every column until
    /// [`StructuredQuery::columns`] narrows it.
    pub fn select(table: &str) -> Self {
        Self::new(QueryKind::Select, table)
    }

    /// Starts an INSERT into `table`.
    pub fn insert(table: &str) -> Self {
        Self::new(QueryKind::Insert, table)
    }

    /// Starts an UPDATE of `table`.
    pub fn update(table: &str) -> Self {
        Self::new(QueryKind::Update, table)
    }

    /// Starts a DELETE from `table`.
    pub fn delete(table: &str) -> Self {
        Self::new(QueryKind::Delete, table)
    }

    /// Returns the statement shape.
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Returns the target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Sets the projected columns (SELECT) or deleted columns (DELETE).
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Adds an assignment: an inserted value or an updated column.
    pub fn value<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.assignments.push((column.to_string(), value.into()));
        self
    }

    /// Alias of [`StructuredQuery::value`] that reads better on UPDATE.
    pub fn set<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.value(column, value)
    }

    /// Adds a predicate.
    pub fn where_op<T: Into<Value>>(mut self, column: &str, op: Operator, value: T) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// Adds an equality predicate.
    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    /// Adds an `IN` predicate.
    pub fn where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        let list = Value::List(values.into_iter().map(Into::into).collect());
        self.where_op(column, Operator::In, list)
    }

    /// Adds an ordering.
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    /// Sets LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Adds `IF NOT EXISTS` to an INSERT.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Adds `ALLOW FILTERING` to a SELECT.
    pub fn allow_filtering(mut self) -> Self {
        self.allow_filtering = true;
        self
    }

    /// Returns the predicates.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the LIMIT, if any.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }
}

/// Turns structured queries into query text.
///
/// Implementations must be pure: the same query always compiles to the
/// same text. Any `Fn(&StructuredQuery) -> String` is a compiler.
pub trait QueryCompiler: Send + Sync {
    /// Compiles a query.
    fn compile(&self, query: &StructuredQuery) -> String;
}

impl<F> QueryCompiler for F
where
    F: Fn(&StructuredQuery) -> String + Send + Sync,
{
    fn compile(&self, query: &StructuredQuery) -> String {
        self(query)
    }
}

/// Compiles to CQL with values inlined as literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct CqlCompiler;

impl QueryCompiler for CqlCompiler {
    fn compile(&self, query: &StructuredQuery) -> String {
        let mut cql = String::new();

        match query.kind {
            QueryKind::Select => {
                cql.push_str("SELECT ");
                if query.columns.is_empty() {
                    cql.push('*');
                } else {
                    cql.push_str(&query.columns.join(", "));
                }
                let _ = write!(cql, " FROM {}", query.table);
                write_where(&mut cql, &query.conditions);
                if !query.order_by.is_empty() {
                    let orderings: Vec<_> = query
                        .order_by
                        .iter()
                        .map(|(column, direction)| match direction {
                            Direction::Asc => format!("{} ASC", column),
                            Direction::Desc => format!("{} DESC", column),
                        })
                        .collect();
                    let _ = write!(cql, " ORDER BY {}", orderings.join(", "));
                }
                if let Some(limit) = query.limit {
                    let _ = write!(cql, " LIMIT {}", limit);
                }
                if query.allow_filtering {
                    cql.push_str(" ALLOW FILTERING");
                }
            }
            QueryKind::Insert => {
                let columns: Vec<_> = query.assignments.iter().map(|(c, _)| c.as_str()).collect();
                let values: Vec<_> = query
                    .assignments
                    .iter()
                    .map(|(_, v)| format_value(v))
                    .collect();
                let _ = write!(
                    cql,
                    "INSERT INTO {} ({}) VALUES ({})",
                    query.table,
                    columns.join(", "),
                    values.join(", ")
                );
                if query.if_not_exists {
                    cql.push_str(" IF NOT EXISTS");
                }
            }
            QueryKind::Update => {
                let assignments: Vec<_> = query
                    .assignments
                    .iter()
                    .map(|(c, v)| format!("{} = {}", c, format_value(v)))
                    .collect();
                let _ = write!(cql, "UPDATE {} SET {}", query.table, assignments.join(", "));
                write_where(&mut cql, &query.conditions);
            }
            QueryKind::Delete => {
                cql.push_str("DELETE ");
                if !query.columns.is_empty() {
                    cql.push_str(&query.columns.join(", "));
                    cql.push(' ');
                }
                let _ = write!(cql, "FROM {}", query.table);
                write_where(&mut cql, &query.conditions);
            }
        }

        cql
    }
}

fn write_where(cql: &mut String, conditions: &[Condition]) {
    for (i, condition) in conditions.iter().enumerate() {
        cql.push_str(if i == 0 { " WHERE " } else { " AND " });
        let rhs = match (&condition.op, &condition.value) {
            (Operator::In, Value::List(items)) => {
                let items: Vec<_> = items.iter().map(format_value).collect();
                format!("({})", items.join(", "))
            }
            (_, value) => format_value(value),
        };
        let _ = write!(cql, "{} {} {}", condition.column, condition.op.as_str(), rhs);
    }
}

/// Formats a value as a CQL literal.
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => format!("{:?}", f),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => format!("0x{}", hex_encode(b)),
        Value::List(items) => {
            let items: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

/// Hex encodes bytes.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
