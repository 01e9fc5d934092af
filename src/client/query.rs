//! Select query description for PostgREST-style collaborators

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column IN (values)`
    In { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::In { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// A read against one table
///
/// ```
/// use sayso_fetch::client::SelectQuery;
///
/// let query = SelectQuery::from("reviews")
///     .columns("id, user_id, rating, created_at")
///     .eq("business_id", "biz-1")
///     .order("created_at", true)
///     .range(0, 19);
/// assert_eq!(query.limit(), Some(20));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    /// Inclusive row range, `(from, to)`
    pub range: Option<(usize, usize)>,
    /// At most one row is expected
    pub single: bool,
}

impl SelectQuery {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            range: None,
            single: false,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn in_list<V: Into<Value>>(mut self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.filters.push(Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn order(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.range = Some((from, to.max(from)));
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Row offset implied by `range`
    pub fn offset(&self) -> Option<usize> {
        self.range.map(|(from, _)| from)
    }

    /// Row limit implied by `range` or `single`
    pub fn limit(&self) -> Option<usize> {
        match (self.range, self.single) {
            (_, true) => Some(1),
            (Some((from, to)), false) => Some(to - from + 1),
            (None, false) => None,
        }
    }
}
