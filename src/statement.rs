use std::collections::BTreeMap;

use sqlx::Database;

use crate::{
    BindValue, Error, ExpandOptions, FragmentSource, MockDataset, Params, SqlTemplateExecute,
    db_adapter::bind_template,
    expand::{expand_params, expand_template_with},
    mock::insert_mock,
    placeholder::{param_keys, placeholder},
};

/// A SQL template together with per-statement mock overrides.
///
/// [`Statement::expand`] runs the pipeline in a fixed order: mock templates,
/// fragment expansion, mock tables, list flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    mock_tables: BTreeMap<String, MockDataset>,
    mock_templates: BTreeMap<String, MockDataset>,
    options: ExpandOptions,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            mock_tables: BTreeMap::new(),
            mock_templates: BTreeMap::new(),
            options: ExpandOptions::default(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Replaces the table token ` name ` (surrounded by single spaces) with
    /// `data` rendered as a `UNION ALL` subquery.
    pub fn mock_table(mut self, name: impl Into<String>, data: MockDataset) -> Self {
        self.mock_tables.insert(name.into(), data);
        self
    }

    /// Replaces the placeholder `%(name)s` with `data` before any
    /// registered fragment of the same name is expanded.
    pub fn mock_template(mut self, name: impl Into<String>, data: MockDataset) -> Self {
        self.mock_templates.insert(name.into(), data);
        self
    }

    pub fn set_max_depth(mut self, max_depth: usize) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    /// When set, expansion fails on placeholders that are neither a fragment
    /// nor a key of the supplied parameters.
    pub fn set_strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn options(&self) -> &ExpandOptions {
        &self.options
    }

    /// Expands the statement into final template text and a flat parameter
    /// mapping.
    pub fn expand(
        &self,
        fragments: impl FragmentSource,
        params: Params,
    ) -> Result<(String, Params), Error> {
        let mut sql = self.sql.clone();
        let mut params = params;
        for (name, data) in &self.mock_templates {
            (sql, params) = insert_mock(&sql, params, data, &placeholder(name))?;
        }
        sql = expand_template_with(&sql, fragments, &self.options)?;
        for (name, data) in &self.mock_tables {
            (sql, params) = insert_mock(&sql, params, data, &format!(" {} ", name))?;
        }
        let (sql, params) = expand_params(&sql, params)?;
        if self.options.strict {
            if let Some(key) = param_keys(&sql)?
                .into_iter()
                .find(|key| !params.contains_key(key))
            {
                return Err(Error::UnresolvedPlaceholder(key));
            }
        }
        tracing::debug!(sql = %sql, params = params.len(), "expanded statement");
        Ok((sql, params))
    }

    /// Expands and renders for `DB`, using the driver's own placeholder style.
    pub fn render_sql<'q, DB>(
        &self,
        fragments: impl FragmentSource,
        params: Params,
    ) -> Result<(String, Option<DB::Arguments<'q>>), Error>
    where
        DB: Database + BindValue<'q>,
    {
        self.render_sql_with_encode_placeholder_fn::<DB>(fragments, params, None)
    }

    pub fn render_sql_with_encode_placeholder_fn<'q, DB>(
        &self,
        fragments: impl FragmentSource,
        params: Params,
        f: Option<fn(usize, &mut String)>,
    ) -> Result<(String, Option<DB::Arguments<'q>>), Error>
    where
        DB: Database + BindValue<'q>,
    {
        let (sql, params) = self.expand(fragments, params)?;
        bind_template::<DB>(&sql, &params, f)
    }

    /// Renders into `sql_buffer` and returns an executable query.
    pub fn render_execute_able<'q, DB>(
        &self,
        fragments: impl FragmentSource,
        params: Params,
        sql_buffer: &'q mut String,
    ) -> Result<SqlTemplateExecute<'q, DB>, Error>
    where
        DB: Database + BindValue<'q>,
    {
        let (sql, arguments) = self.render_sql::<DB>(fragments, params)?;
        *sql_buffer = sql;
        Ok(SqlTemplateExecute::new(sql_buffer, arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FragmentRegistry, Param, SearchPath, Value};
    use sqlx::{Arguments, Sqlite};

    fn registry() -> FragmentRegistry {
        FragmentRegistry::with_search_path(SearchPath::default())
    }

    fn users() -> MockDataset {
        MockDataset::new(["id", "name"], [vec![Value::from(1), Value::from("matt")]]).unwrap()
    }

    #[test]
    fn test_add_sql() {
        let mut registry = registry();
        registry.add("query", "sql statement string").unwrap();
        let statement = registry.get_statement("query").unwrap();
        assert_eq!(
            statement.expand(&registry, Params::new()).unwrap(),
            ("sql statement string".to_string(), Params::new())
        );
    }

    #[test]
    fn test_add_template() {
        let mut registry = registry();
        registry.add("template_1", "sql %(list)s").unwrap();
        let (sql, params) = registry
            .get_statement("template_1")
            .unwrap()
            .expand(&registry, Params::new().with("list", vec!["foo"]))
            .unwrap();
        assert_eq!(sql, "sql (%(list_0)s)");
        assert_eq!(
            params,
            Params::new()
                .with("list", vec!["foo"])
                .with("list_0", "foo")
        );
    }

    #[test]
    fn test_pipeline_order() {
        let mut registry = registry();
        registry
            .add(
                "active_accounts",
                "select * from account a where a.active = %(active)s",
            )
            .unwrap();
        registry
            .add(
                "report",
                "select * from (%(active_accounts)s) x join user u on (u.id = x.user_id) \
                 where x.kind in %(kinds)s",
            )
            .unwrap();

        let statement = registry
            .get_statement("report")
            .unwrap()
            .mock_table("user", users());
        let (sql, params) = statement
            .expand(
                &registry,
                Params::new().with("active", true).with("kinds", vec![1, 2]),
            )
            .unwrap();
        assert_eq!(
            sql,
            "select * from (select * from account a where a.active = %(active)s) x \
             join(SELECT %(id_0)s as id,%(name_0)s as name FROM DUAL)u on (u.id = x.user_id) \
             where x.kind in (%(kinds_0)s, %(kinds_1)s)"
        );
        assert_eq!(params.get("name_0"), Some(&Param::Scalar(Value::from("matt"))));
        assert_eq!(params.get("kinds_1"), Some(&Param::Scalar(Value::Int(2))));
    }

    #[test]
    fn test_mock_template_overrides_fragment() {
        let mut registry = registry();
        registry.add("active", "select * from account").unwrap();
        let (sql, params) = Statement::new("select * from (%(active)s) a")
            .mock_template("active", users())
            .expand(&registry, Params::new())
            .unwrap();
        assert_eq!(
            sql,
            "select * from ((SELECT %(id_0)s as id,%(name_0)s as name FROM DUAL)) a"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_mock_params_do_not_overwrite() {
        let registry = registry();
        let ids = |id: i64| MockDataset::new(["id"], [[id]]).unwrap();
        let statement =
            Statement::new("select * from (%(users)s) u join accounts a on (a.id = u.id)")
                .mock_template("users", ids(1));

        assert!(matches!(
            statement.expand(&registry, Params::new().with("id_0", 5)),
            Err(Error::ParamCollision(key)) if key == "id_0"
        ));
        assert!(matches!(
            statement
                .clone()
                .mock_table("accounts", ids(99))
                .expand(&registry, Params::new()),
            Err(Error::ParamCollision(key)) if key == "id_0"
        ));

        let accounts = MockDataset::new(["account_id"], [[99]]).unwrap();
        let (_, params) = statement
            .mock_table("accounts", accounts)
            .expand(&registry, Params::new())
            .unwrap();
        assert_eq!(params.get("id_0"), Some(&Param::Scalar(Value::Int(1))));
        assert_eq!(params.get("account_id_0"), Some(&Param::Scalar(Value::Int(99))));
    }

    #[test]
    fn test_strict_mode() {
        let registry = registry();
        let statement = Statement::new("select %(a)s, %(b)s").set_strict(true);
        assert!(matches!(
            statement.expand(&registry, Params::new().with("a", 1)),
            Err(Error::UnresolvedPlaceholder(key)) if key == "b"
        ));
        assert!(
            statement
                .expand(&registry, Params::new().with("a", 1).with("b", vec![2]))
                .is_ok()
        );
        assert!(
            Statement::new("select %(a)s, %(b)s")
                .expand(&registry, Params::new())
                .is_ok()
        );
    }

    #[test]
    fn test_cycle_guard() {
        let mut registry = registry();
        registry.add("loop", "(%(loop)s)").unwrap();
        assert!(matches!(
            Statement::new("%(loop)s")
                .set_max_depth(4)
                .expand(&registry, Params::new()),
            Err(Error::TemplateCycle { depth: 4, .. })
        ));
    }

    #[test]
    fn test_render_sql() {
        let mut registry = registry();
        registry
            .add("by_ids", "select * from t where id in %(ids)s and note like 'a%%'")
            .unwrap();
        let (sql, arguments) = registry
            .get_statement("by_ids")
            .unwrap()
            .render_sql::<Sqlite>(&registry, Params::new().with("ids", vec![4, 5, 6]))
            .unwrap();
        assert_eq!(sql, "select * from t where id in (?, ?, ?) and note like 'a%'");
        assert_eq!(arguments.map(|a| a.len()), Some(3));

        let mut sql_buff = String::new();
        let execute = registry
            .render_execute_able::<Sqlite>("by_ids", Params::new().with("ids", vec![1]), &mut sql_buff)
            .unwrap()
            .set_persistent(false);
        assert!(!execute.persistent);
        assert_eq!(execute.sql, "select * from t where id in (?) and note like 'a%'");
    }
}
