//! Literal row-sets rendered as inline `UNION ALL` subqueries.
//!
//! A [`MockDataset`] stands in for a table or a fragment so that a template
//! can run against fixture data without touching real tables.

use askama::Template;

use crate::{Error, Params, Value, placeholder::placeholder};

/// Row type usable as mock data, normally derived with `#[derive(MockRow)]`.
pub trait MockRow {
    fn columns() -> Vec<&'static str>;
    fn into_values(self) -> Vec<Value>;
}

struct MockCell<'a> {
    key: String,
    column: &'a str,
}

#[derive(Template)]
#[template(
    source = "{% for row in rows %}{% if !loop.first %}\nUNION ALL {% endif %}(SELECT {% for cell in row %}{% if !loop.first %},{% endif %}{{ cell.key }} as {{ cell.column }}{% endfor %} FROM {{ from_table }}){% endfor %}",
    ext = "txt"
)]
struct UnionAllTemplate<'a> {
    rows: Vec<Vec<MockCell<'a>>>,
    from_table: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockDataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    from_table: String,
}

impl MockDataset {
    /// Builds a dataset, rejecting rows whose length differs from the column count.
    pub fn new<C, R, V>(
        columns: impl IntoIterator<Item = C>,
        rows: impl IntoIterator<Item = R>,
    ) -> Result<Self, Error>
    where
        C: Into<String>,
        R: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(Error::EmptyMockColumns);
        }
        let mut checked = Vec::new();
        for (i, row) in rows.into_iter().enumerate() {
            let row: Vec<Value> = row.into_iter().map(Into::into).collect();
            if row.len() != columns.len() {
                return Err(Error::MockShape {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
            checked.push(row);
        }
        Ok(Self {
            columns,
            rows: checked,
            from_table: "DUAL".to_string(),
        })
    }

    pub fn from_records<T: MockRow>(records: impl IntoIterator<Item = T>) -> Result<Self, Error> {
        Self::new(
            T::columns(),
            records.into_iter().map(T::into_values),
        )
    }

    /// Table named in each row's `FROM` clause. Defaults to `DUAL`.
    pub fn with_from_table(mut self, table: impl Into<String>) -> Self {
        self.from_table = table.into();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Renders one `(SELECT ... FROM DUAL)` clause per row joined by
    /// `UNION ALL`, with each cell bound to a `column_rowindex` placeholder.
    pub fn to_sql_template(&self) -> Result<(String, Params), Error> {
        let mut params = Params::new();
        let mut rows = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            let mut cells = Vec::with_capacity(row.len());
            for (column, value) in self.columns.iter().zip(row) {
                let key = format!("{}_{}", column, i);
                cells.push(MockCell {
                    key: placeholder(&key),
                    column: column.as_str(),
                });
                params.insert(key, value.clone());
            }
            rows.push(cells);
        }
        let sql = UnionAllTemplate {
            rows,
            from_table: &self.from_table,
        }
        .render()?;
        Ok((sql, params))
    }
}

/// Shorthand for [`MockDataset::new`] followed by [`MockDataset::to_sql_template`].
pub fn data_to_sql_template<C, R, V>(
    columns: impl IntoIterator<Item = C>,
    rows: impl IntoIterator<Item = R>,
) -> Result<(String, Params), Error>
where
    C: Into<String>,
    R: IntoIterator<Item = V>,
    V: Into<Value>,
{
    MockDataset::new(columns, rows)?.to_sql_template()
}

/// Replaces every literal occurrence of `target` in `sql` with the rendered
/// dataset and merges the dataset parameters into `params`.
///
/// A generated `column_rowindex` key that is already present in `params`
/// is rejected with [`Error::ParamCollision`].
pub fn insert_mock(
    sql: &str,
    mut params: Params,
    data: &MockDataset,
    target: &str,
) -> Result<(String, Params), Error> {
    let (mock_sql, mock_params) = data.to_sql_template()?;
    if let Some(key) = mock_params.keys().find(|key| params.contains_key(key)) {
        return Err(Error::ParamCollision(key.to_string()));
    }
    params.extend(mock_params);
    Ok((sql.replace(target, &mock_sql), params))
}
