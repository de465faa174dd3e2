//! List-query descriptor.
//!
//! A [`Query`] always walks a collection in instance-id order, optionally
//! starting after a seek id and filtered by equality or greater-than
//! comparisons on top-level document fields.
//!
//! ```ignore
//! let q = Query::new()
//!     .order_by_id_desc()
//!     .seek_id(last_seen)
//!     .limit_to(50)
//!     .and("read_at").eq(0);
//! ```

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::models::is_identifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub order: Order,
    /// Exclusive: the instance with this id is never returned.
    pub seek: Option<String>,
    pub limit: Option<usize>,
    pub filters: Vec<Filter>,
}

/// Half-built filter returned by [`Query::and`].
#[must_use]
pub struct Criterion {
    query: Query,
    field: String,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by_id(mut self) -> Self {
        self.order = Order::Ascending;
        self
    }

    pub fn order_by_id_desc(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    pub fn seek_id(mut self, id: impl Into<String>) -> Self {
        self.seek = Some(id.into());
        self
    }

    pub fn limit_to(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn and(self, field: impl Into<String>) -> Criterion {
        Criterion {
            query: self,
            field: field.into(),
        }
    }

    /// Render the `WHERE` tail, ordering and limit. Parameters `?1` and `?2`
    /// are reserved for the database id and collection name.
    pub(crate) fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
        let mut sql = String::new();
        let mut params = Vec::new();

        if let Some(seek) = &self.seek {
            params.push(SqlValue::Text(seek.clone()));
            let cmp = match self.order {
                Order::Ascending => ">",
                Order::Descending => "<",
            };
            sql.push_str(&format!(" AND id {cmp} ?{}", params.len() + 2));
        }

        for filter in &self.filters {
            if !is_identifier(&filter.field) {
                return Err(StoreError::InvalidArgument(format!(
                    "invalid field name: {}",
                    filter.field
                )));
            }
            let column = format!("json_extract(data, '$.{}')", filter.field);

            if filter.value.is_null() {
                if filter.op != Op::Eq {
                    return Err(StoreError::InvalidArgument(format!(
                        "null only supports equality ({})",
                        filter.field
                    )));
                }
                sql.push_str(&format!(" AND {column} IS NULL"));
                continue;
            }

            params.push(json_to_sql(&filter.value)?);
            let cmp = match filter.op {
                Op::Eq => "=",
                Op::Gt => ">",
            };
            sql.push_str(&format!(" AND {column} {cmp} ?{}", params.len() + 2));
        }

        sql.push_str(match self.order {
            Order::Ascending => " ORDER BY id ASC",
            Order::Descending => " ORDER BY id DESC",
        });

        if let Some(limit) = self.limit {
            params.push(SqlValue::Integer(limit.min(i64::MAX as usize) as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len() + 2));
        }

        Ok((sql, params))
    }
}

impl Criterion {
    pub fn eq(self, value: impl Into<Value>) -> Query {
        self.push(Op::Eq, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Query {
        self.push(Op::Gt, value.into())
    }

    fn push(mut self, op: Op, value: Value) -> Query {
        self.query.filters.push(Filter {
            field: self.field,
            op,
            value,
        });
        self.query
    }
}

/// Map a JSON scalar onto the value `json_extract` yields for it.
fn json_to_sql(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .ok_or_else(|| StoreError::InvalidArgument(format!("unsupported number: {n}"))),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Null => Ok(SqlValue::Null),
        other => Err(StoreError::InvalidArgument(format!(
            "filters only accept scalars, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_filters() {
        let q = Query::new()
            .order_by_id_desc()
            .seek_id("abc")
            .limit_to(10)
            .and("read_at")
            .gt(0)
            .and("from")
            .eq("did:hubmail:00");

        assert_eq!(q.order, Order::Descending);
        assert_eq!(q.seek.as_deref(), Some("abc"));
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.filters[0].op, Op::Gt);
    }

    #[test]
    fn renders_descending_seek() {
        let (sql, params) = Query::new()
            .order_by_id_desc()
            .seek_id("b")
            .limit_to(5)
            .and("read_at")
            .eq(0)
            .to_sql()
            .unwrap();

        assert_eq!(
            sql,
            " AND id < ?3 AND json_extract(data, '$.read_at') = ?4 ORDER BY id DESC LIMIT ?5"
        );
        assert_eq!(
            params,
            vec![
                SqlValue::Text("b".into()),
                SqlValue::Integer(0),
                SqlValue::Integer(5)
            ]
        );
    }

    #[test]
    fn renders_plain_ascending() {
        let (sql, params) = Query::new().to_sql().unwrap();
        assert_eq!(sql, " ORDER BY id ASC");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_bad_field() {
        let err = Query::new().and("x') OR 1=1 --").eq(1).to_sql().unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn null_equality() {
        let (sql, _) = Query::new().and("read_at").eq(Value::Null).to_sql().unwrap();
        assert!(sql.contains("IS NULL"));
        assert!(Query::new().and("read_at").gt(Value::Null).to_sql().is_err());
    }
}
