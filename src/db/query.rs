//! Structured collection queries: field filters, ordering and cursor pagination.
//!
//! Queries mirror what a hosted document database offers: equality, `in`,
//! range and substring filters on field paths, multi-field ordering with an
//! implicit final tie-break on the document id, and pagination by cursor
//! (`start_after` / `end_before`) rather than by offset.
//!
//! Like such databases, ordering on a field excludes documents that lack it.

use super::Database;
use super::documents::{Document, parse_document_row};
use anyhow::{Result, anyhow};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A filter operator applied to a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    /// Membership; an empty list matches nothing.
    In(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// Case-insensitive substring match on a string field.
    Contains(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    fn reversed(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Boundary of a previous result: the ordering values of a document plus its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub values: Vec<Value>,
    pub id: String,
}

impl Cursor {
    /// Capture the cursor of `doc` under the given ordering.
    pub fn from_document(doc: &Document, order: &[OrderBy]) -> Self {
        let values = order
            .iter()
            .map(|o| doc.field(&o.field).cloned().unwrap_or(Value::Null))
            .collect();
        Self {
            values,
            id: doc.id.clone(),
        }
    }
}

/// A query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    /// Take the last `limit` rows of the ordered result instead of the first.
    pub limit_to_last: bool,
    pub start_after: Option<Cursor>,
    pub end_before: Option<Cursor>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            limit_to_last: false,
            start_after: None,
            end_before: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op,
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq(value.into()))
    }

    pub fn where_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(field, FilterOp::In(values))
    }

    pub fn where_contains(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.filter(field, FilterOp::Contains(needle.into()))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self.limit_to_last = false;
        self
    }

    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self.limit_to_last = true;
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn end_before(mut self, cursor: Cursor) -> Self {
        self.end_before = Some(cursor);
        self
    }

    /// The same query without cursors or limits, as used for counting.
    pub fn unbounded(&self) -> Self {
        Self {
            limit: None,
            limit_to_last: false,
            start_after: None,
            end_before: None,
            ..self.clone()
        }
    }
}

/// Map a field path to a SQL expression. Only `[A-Za-z0-9_.]` paths are accepted.
fn field_expr(field: &str) -> Result<String> {
    if field == "id" {
        return Ok("id".to_string());
    }
    let valid = !field.is_empty()
        && !field.starts_with('.')
        && !field.ends_with('.')
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return Err(anyhow!("invalid field path: {:?}", field));
    }
    Ok(format!("json_extract(data, '$.{}')", field))
}

fn to_sql_value(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else {
                Ok(SqlValue::Real(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(anyhow!("cannot compare against composite value {}", other)),
    }
}

/// WHERE clause under construction with positional parameters.
struct SqlWhere {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl SqlWhere {
    fn new(collection: &str) -> Self {
        Self {
            clauses: vec!["collection = ?1".to_string()],
            params: vec![SqlValue::Text(collection.to_string())],
        }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn push_filter(&mut self, filter: &FieldFilter) -> Result<()> {
        let expr = field_expr(&filter.field)?;
        let clause = match &filter.op {
            FilterOp::Eq(v) if v.is_null() => format!("{} IS NULL", expr),
            FilterOp::Eq(v) => format!("{} = {}", expr, self.bind(to_sql_value(v)?)),
            FilterOp::In(values) => {
                if values.is_empty() {
                    "0".to_string()
                } else {
                    let mut placeholders = Vec::with_capacity(values.len());
                    for v in values {
                        placeholders.push(self.bind(to_sql_value(v)?));
                    }
                    format!("{} IN ({})", expr, placeholders.join(", "))
                }
            }
            FilterOp::Lt(v) => format!("{} < {}", expr, self.bind(to_sql_value(v)?)),
            FilterOp::Lte(v) => format!("{} <= {}", expr, self.bind(to_sql_value(v)?)),
            FilterOp::Gt(v) => format!("{} > {}", expr, self.bind(to_sql_value(v)?)),
            FilterOp::Gte(v) => format!("{} >= {}", expr, self.bind(to_sql_value(v)?)),
            FilterOp::Contains(needle) => format!(
                "instr({fold}({}), {fold}({})) > 0",
                expr,
                self.bind(SqlValue::Text(needle.clone())),
                fold = super::FOLD_CASE,
            ),
        };
        self.clauses.push(clause);
        Ok(())
    }

    /// Keyset predicate selecting rows strictly after (`after = true`) or
    /// strictly before the cursor under `order`, with id as final tie-break.
    fn push_cursor(&mut self, cursor: &Cursor, order: &[OrderBy], after: bool) -> Result<()> {
        if cursor.values.len() != order.len() {
            return Err(anyhow!(
                "cursor has {} values but query orders by {} fields",
                cursor.values.len(),
                order.len()
            ));
        }

        let mut alternatives = Vec::with_capacity(order.len() + 1);
        for i in 0..=order.len() {
            let mut terms = Vec::with_capacity(i + 1);
            for (o, value) in order.iter().zip(&cursor.values).take(i) {
                let expr = field_expr(&o.field)?;
                terms.push(format!("{} = {}", expr, self.bind(to_sql_value(value)?)));
            }
            let (expr, value, ascending) = match order.get(i) {
                Some(o) => (
                    field_expr(&o.field)?,
                    to_sql_value(&cursor.values[i])?,
                    o.direction == Direction::Asc,
                ),
                None => ("id".to_string(), SqlValue::Text(cursor.id.clone()), true),
            };
            let op = if ascending == after { ">" } else { "<" };
            terms.push(format!("{} {} {}", expr, op, self.bind(value)));
            alternatives.push(format!("({})", terms.join(" AND ")));
        }

        self.clauses.push(format!("({})", alternatives.join(" OR ")));
        Ok(())
    }

    fn sql(&self) -> String {
        self.clauses.join(" AND ")
    }
}

/// Filters plus "ordered fields must exist", shared by select and count.
fn base_where(query: &Query) -> Result<SqlWhere> {
    let mut w = SqlWhere::new(&query.collection);
    for filter in &query.filters {
        w.push_filter(filter)?;
    }
    for o in &query.order {
        w.clauses.push(format!("{} IS NOT NULL", field_expr(&o.field)?));
    }
    Ok(w)
}

impl Database {
    /// Execute a query and return matching documents in query order.
    pub fn run_query(&self, query: &Query) -> Result<Vec<Document>> {
        let mut w = base_where(query)?;
        if let Some(ref cursor) = query.start_after {
            w.push_cursor(cursor, &query.order, true)?;
        }
        if let Some(ref cursor) = query.end_before {
            w.push_cursor(cursor, &query.order, false)?;
        }

        let reverse = query.limit_to_last;
        let mut order_terms = Vec::with_capacity(query.order.len() + 1);
        for o in &query.order {
            let dir = if reverse {
                o.direction.reversed()
            } else {
                o.direction
            };
            order_terms.push(format!("{} {}", field_expr(&o.field)?, dir.sql()));
        }
        order_terms.push(format!("id {}", if reverse { "DESC" } else { "ASC" }));

        let mut sql = format!(
            "SELECT collection, id, data, created_at, updated_at FROM documents WHERE {} ORDER BY {}",
            w.sql(),
            order_terms.join(", ")
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut docs = stmt
                .query_map(rusqlite::params_from_iter(w.params.iter()), parse_document_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if reverse {
                docs.reverse();
            }
            Ok(docs)
        })
    }

    /// Count documents matching the query's filters, ignoring cursors and limits.
    pub fn count_query(&self, query: &Query) -> Result<i64> {
        let w = base_where(&query.unbounded())?;
        let sql = format!("SELECT COUNT(*) FROM documents WHERE {}", w.sql());
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &sql,
                rusqlite::params_from_iter(w.params.iter()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
