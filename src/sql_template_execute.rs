use futures_core::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use sqlx::{
    Database, Error, Execute, Executor, FromRow, IntoArguments,
    database::HasStatementCache,
    error::BoxDynError,
    query, query::Query, query_with,
};

use crate::db_adapter::{DecodeValue, RowMap, row_to_map};

/// Expanded SQL plus bound arguments, ready for an executor
pub struct SqlTemplateExecute<'q, DB: Database> {
    /// Reference to SQL query string
    pub(crate) sql: &'q str,
    /// SQL parameters
    pub(crate) arguments: Option<DB::Arguments<'q>>,
    /// Persistent flag
    pub(crate) persistent: bool,
}

impl<'q, DB: Database> SqlTemplateExecute<'q, DB> {
    pub fn new(sql: &'q str, arguments: Option<DB::Arguments<'q>>) -> Self {
        SqlTemplateExecute {
            sql,
            arguments,
            persistent: true,
        }
    }
    /// If `true`, the statement will get prepared once and cached to the
    /// connection's statement cache.
    ///
    /// If `false`, the prepared statement will be closed after execution.
    ///
    /// Default: `true`.
    pub fn set_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

impl<'q, DB> SqlTemplateExecute<'q, DB>
where
    DB: Database + HasStatementCache,
    DB::Arguments<'q>: IntoArguments<'q, DB>,
{
    /// Converts into a plain `sqlx::Query`
    #[inline]
    pub fn to_query(self) -> Query<'q, DB, DB::Arguments<'q>> {
        let q = match self.arguments {
            Some(args) => query_with(self.sql, args),
            None => query(self.sql),
        };
        q.persistent(self.persistent)
    }
}

impl<'q, DB> SqlTemplateExecute<'q, DB>
where
    DB: Database,
{
    /// like sqlx::Query::execute
    /// Execute the query and return the number of rows affected.
    #[inline]
    pub async fn execute<'e, 'c: 'e, E>(self, executor: E) -> Result<DB::QueryResult, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: Executor<'c, Database = DB>,
    {
        executor.execute(self).await
    }
    /// like sqlx::Query::fetch
    /// Execute the query and return the generated results as a stream.
    #[inline]
    pub fn fetch<'e, 'c: 'e, E>(self, executor: E) -> BoxStream<'e, Result<DB::Row, Error>>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: Executor<'c, Database = DB>,
    {
        executor.fetch(self)
    }
    /// like sqlx::Query::fetch_all
    /// Execute the query and return all the resulting rows collected into a [`Vec`].
    ///
    /// ### Note: beware result set size.
    /// This will attempt to collect the full result set of the query into memory.
    #[inline]
    pub async fn fetch_all<'e, 'c: 'e, E>(self, executor: E) -> Result<Vec<DB::Row>, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: Executor<'c, Database = DB>,
    {
        executor.fetch_all(self).await
    }
    /// like sqlx::Query::fetch_one
    /// Execute the query, returning the first row or [`Error::RowNotFound`] otherwise.
    #[inline]
    pub async fn fetch_one<'e, 'c: 'e, E>(self, executor: E) -> Result<DB::Row, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: Executor<'c, Database = DB>,
    {
        executor.fetch_one(self).await
    }
    /// like sqlx::Query::fetch_optional
    /// Execute the query, returning the first row or `None` otherwise.
    #[inline]
    pub async fn fetch_optional<'e, 'c: 'e, E>(self, executor: E) -> Result<Option<DB::Row>, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: Executor<'c, Database = DB>,
    {
        executor.fetch_optional(self).await
    }
    /// Execute the query and return every row as column name to value pairs,
    /// in cursor order.
    pub async fn fetch_all_maps<'e, 'c: 'e, E>(self, executor: E) -> Result<Vec<RowMap>, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: Executor<'c, Database = DB>,
        DB: DecodeValue,
    {
        let rows = executor.fetch_all(self).await?;
        rows.iter().map(row_to_map::<DB>).collect()
    }

    /// like sqlx::QueryAs::fetch
    /// Execute the query and return the generated results as a stream.
    pub fn fetch_as<'e, 'c: 'e, O, E>(self, executor: E) -> BoxStream<'e, Result<O, Error>>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: 'e + Executor<'c, Database = DB>,
        DB: 'e,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row> + 'e,
    {
        executor
            .fetch(self)
            .map(|row| row.and_then(|row| O::from_row(&row)))
            .boxed()
    }
    /// like sqlx::QueryAs::fetch_all
    /// Execute the query and return all the resulting rows collected into a [`Vec`].
    #[inline]
    pub async fn fetch_all_as<'e, 'c: 'e, O, E>(self, executor: E) -> Result<Vec<O>, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: 'e + Executor<'c, Database = DB>,
        DB: 'e,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row> + 'e,
    {
        self.fetch_as(executor).try_collect().await
    }
    /// like sqlx::QueryAs::fetch_one
    /// Execute the query, returning the first row or [`Error::RowNotFound`] otherwise.
    pub async fn fetch_one_as<'e, 'c: 'e, O, E>(self, executor: E) -> Result<O, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: 'e + Executor<'c, Database = DB>,
        DB: 'e,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row> + 'e,
    {
        self.fetch_optional_as(executor)
            .await
            .and_then(|row| row.ok_or(Error::RowNotFound))
    }
    /// like sqlx::QueryAs::fetch_optional
    /// Execute the query, returning the first row or `None` otherwise.
    pub async fn fetch_optional_as<'e, 'c: 'e, O, E>(self, executor: E) -> Result<Option<O>, Error>
    where
        'q: 'e,
        DB::Arguments<'q>: 'e,
        E: 'e + Executor<'c, Database = DB>,
        DB: 'e,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row> + 'e,
    {
        let row = executor.fetch_optional(self).await?;
        if let Some(row) = row {
            O::from_row(&row).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<'q, DB: Database> Execute<'q, DB> for SqlTemplateExecute<'q, DB> {
    #[inline]
    fn sql(&self) -> &'q str {
        tracing::debug!(sql = self.sql, "executing sql template");
        self.sql
    }

    #[inline]
    fn statement(&self) -> Option<&DB::Statement<'q>> {
        None
    }

    #[inline]
    fn take_arguments(&mut self) -> Result<Option<DB::Arguments<'q>>, BoxDynError> {
        Ok(self.arguments.take())
    }

    #[inline]
    fn persistent(&self) -> bool {
        self.persistent
    }
}
