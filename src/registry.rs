use std::{
    collections::HashMap,
    env, fmt, fs,
    path::{Path, PathBuf},
};

use sqlx::Database;

use crate::{
    BindValue, Error, FragmentSource, Params, SqlTemplateExecute, Statement,
    expand::expand_template,
    placeholder::param_keys,
};

/// Environment variable holding the colon-delimited fragment search path.
pub const SQL_PATH_VAR: &str = "SQL_PATH";
/// Placeholder keys with this suffix are loaded from disk when referenced.
pub const SQL_FILE_SUFFIX: &str = ".sql";

/// Ordered list of directories searched for `.sql` fragment files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new<P: Into<PathBuf>>(dirs: impl IntoIterator<Item = P>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads `SQL_PATH`, falling back to the current directory.
    pub fn from_env() -> Self {
        Self::from_sql_path(&env::var(SQL_PATH_VAR).unwrap_or_default())
    }

    /// Parses a colon-delimited path list. The current directory is always
    /// searched last.
    pub fn from_sql_path(sql_path: &str) -> Self {
        let mut dirs: Vec<PathBuf> = sql_path
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .collect();
        if let Ok(cwd) = env::current_dir() {
            dirs.push(cwd);
        }
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn find(&self, name: &str) -> Result<PathBuf, Error> {
        self.dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| Error::FragmentNotFound {
                name: name.to_string(),
                search_path: self.to_string(),
            })
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, dir) in self.dirs.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{}", dir.display())?;
        }
        Ok(())
    }
}

/// Named store of SQL fragments.
///
/// The registry is an ordinary value owned by the caller; share it behind a
/// lock if several threads need to register fragments.
#[derive(Debug, Clone)]
pub struct FragmentRegistry {
    fragments: HashMap<String, String>,
    search_path: SearchPath,
}

impl FragmentRegistry {
    /// Creates an empty registry searching [`SearchPath::from_env`].
    pub fn new() -> Self {
        Self::with_search_path(SearchPath::from_env())
    }

    pub fn with_search_path(search_path: SearchPath) -> Self {
        Self {
            fragments: HashMap::new(),
            search_path,
        }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    /// Registers `sql` under `name` unless the name is already taken.
    ///
    /// Returns `false` when an existing fragment was left in place. Keys in
    /// `sql` ending in `.sql` that are not registered yet are loaded from the
    /// search path first; if that fails nothing is registered.
    pub fn add(&mut self, name: impl Into<String>, sql: impl Into<String>) -> Result<bool, Error> {
        self.insert(name.into(), sql.into(), false)
    }

    /// Registers `sql` under `name`, replacing any existing fragment.
    pub fn add_force(
        &mut self,
        name: impl Into<String>,
        sql: impl Into<String>,
    ) -> Result<(), Error> {
        self.insert(name.into(), sql.into(), true).map(|_| ())
    }

    fn insert(&mut self, name: String, sql: String, force: bool) -> Result<bool, Error> {
        if !force && self.fragments.contains_key(&name) {
            tracing::debug!(name = %name, "fragment already registered, keeping existing text");
            return Ok(false);
        }
        let previous = self.fragments.insert(name.clone(), sql.clone());
        let mut loaded = Vec::new();
        if let Err(e) = self.load_referenced_files(&name, &sql, &mut loaded) {
            for file in &loaded {
                self.fragments.remove(file);
            }
            match previous {
                Some(previous) => self.fragments.insert(name, previous),
                None => self.fragments.remove(&name),
            };
            return Err(e);
        }
        tracing::debug!(name = %name, "registered fragment");
        Ok(true)
    }

    /// Registers every unregistered `.sql` key referenced by `sql`, and the
    /// files those reference in turn. Names registered here are pushed to
    /// `loaded` so a failing caller can remove them.
    fn load_referenced_files(
        &mut self,
        name: &str,
        sql: &str,
        loaded: &mut Vec<String>,
    ) -> Result<(), Error> {
        let keys = match param_keys(sql) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "fragment has malformed placeholders");
                return Ok(());
            }
        };
        for key in keys {
            if key.ends_with(SQL_FILE_SUFFIX) && !self.fragments.contains_key(&key) {
                let path = self.search_path.find(&key)?;
                let text = read_fragment(&path)?;
                tracing::debug!(name = %key, path = %path.display(), "loaded fragment file");
                self.fragments.insert(key.clone(), text.clone());
                loaded.push(key.clone());
                self.load_referenced_files(&key, &text, loaded)?;
            }
        }
        Ok(())
    }

    /// Loads `name` from the search path and registers its contents under
    /// the same name.
    pub fn load_template_file(&mut self, name: &str) -> Result<Statement, Error> {
        let path = self.search_path.find(name)?;
        let sql = read_fragment(&path)?;
        tracing::debug!(name = %name, path = %path.display(), "loaded fragment file");
        self.insert(name.to_string(), sql, false)?;
        self.get_statement(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fragments.get(name).map(String::as_str)
    }

    pub fn fragments(&self) -> &HashMap<String, String> {
        &self.fragments
    }

    pub fn get_statement(&self, name: &str) -> Result<Statement, Error> {
        self.get(name)
            .map(Statement::new)
            .ok_or_else(|| Error::UnknownFragment(name.to_string()))
    }

    /// The fragment `name` with every registered fragment expanded into it.
    pub fn get_sql(&self, name: &str) -> Result<String, Error> {
        let sql = self
            .get(name)
            .ok_or_else(|| Error::UnknownFragment(name.to_string()))?;
        expand_template(sql, self)
    }

    /// Expands fragment `name` with `params` and binds it for execution.
    pub fn render_execute_able<'q, DB>(
        &self,
        name: &str,
        params: Params,
        sql_buffer: &'q mut String,
    ) -> Result<SqlTemplateExecute<'q, DB>, Error>
    where
        DB: Database + BindValue<'q>,
    {
        self.get_statement(name)?
            .render_execute_able(self, params, sql_buffer)
    }
}

impl Default for FragmentRegistry {
    /// Same as [`FragmentRegistry::new`].
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentSource for FragmentRegistry {
    fn fragment(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

fn read_fragment(path: &Path) -> Result<String, Error> {
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FragmentRegistry {
        FragmentRegistry::with_search_path(SearchPath::default())
    }

    #[test]
    fn test_add_protects_existing() {
        let mut registry = registry();
        assert!(registry.add("query", "select 1").unwrap());
        assert!(!registry.add("query", "select 2").unwrap());
        assert_eq!(registry.get("query"), Some("select 1"));
        registry.add_force("query", "select 3").unwrap();
        assert_eq!(registry.get("query"), Some("select 3"));
    }

    #[test]
    fn test_get_sql_is_transitive() {
        let mut registry = registry();
        registry.add("third", "select id from t where x = %(x)s").unwrap();
        registry.add("other", "select * from (%(third)s) a").unwrap();
        registry.add("query", "select count(1) from (%(other)s) b").unwrap();
        assert_eq!(
            registry.get_sql("query").unwrap(),
            "select count(1) from (select * from (select id from t where x = %(x)s) a) b"
        );
        assert!(matches!(
            registry.get_sql("nope"),
            Err(Error::UnknownFragment(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_malformed_fragment_is_registered() {
        let mut registry = registry();
        assert!(registry.add("bad", "select '%' from dual").unwrap());
        assert!(matches!(
            registry.get_sql("bad"),
            Err(Error::TemplateSyntax { .. })
        ));
    }

    #[test]
    fn test_loads_sql_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ids.sql"), "select id from (%(base.sql)s) b").unwrap();
        fs::write(dir.path().join("base.sql"), "select * from t where x = %(x)s").unwrap();
        let mut registry = FragmentRegistry::with_search_path(SearchPath::new([dir.path()]));

        registry.add("query", "select * from (%(ids.sql)s) i").unwrap();
        assert!(registry.contains("ids.sql"));
        assert!(registry.contains("base.sql"));
        assert_eq!(
            registry.get_sql("query").unwrap(),
            "select * from (select id from (select * from t where x = %(x)s) b) i"
        );
    }

    #[test]
    fn test_missing_sql_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = FragmentRegistry::with_search_path(SearchPath::new([dir.path()]));
        match registry.add("query", "select * from (%(missing.sql)s) m") {
            Err(Error::FragmentNotFound { name, search_path }) => {
                assert_eq!(name, "missing.sql");
                assert_eq!(search_path, dir.path().display().to_string());
            }
            other => panic!("expected not found, got {other:?}"),
        }
        assert!(!registry.contains("query"));
        assert!(matches!(
            registry.load_template_file("missing.sql"),
            Err(Error::FragmentNotFound { .. })
        ));
    }

    #[test]
    fn test_failed_add_unloads_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sql"), "select * from (%(b.sql)s) b").unwrap();
        fs::write(dir.path().join("b.sql"), "select 1").unwrap();
        let mut registry = FragmentRegistry::with_search_path(SearchPath::new([dir.path()]));
        registry.add("kept", "select 2").unwrap();

        assert!(matches!(
            registry.add("query", "%(a.sql)s union all %(c.sql)s"),
            Err(Error::FragmentNotFound { name, .. }) if name == "c.sql"
        ));
        assert!(!registry.contains("query"));
        assert!(!registry.contains("a.sql"));
        assert!(!registry.contains("b.sql"));
        assert_eq!(registry.fragments().len(), 1);

        registry.add_force("kept", "%(c.sql)s").unwrap_err();
        assert_eq!(registry.get("kept"), Some("select 2"));
    }

    #[test]
    fn test_default_reads_environment() {
        assert_eq!(
            FragmentRegistry::default().search_path(),
            &SearchPath::from_env()
        );
    }

    #[test]
    fn test_sql_path_parsing() {
        let path = SearchPath::from_sql_path("/a::/b");
        assert_eq!(path.dirs()[0], PathBuf::from("/a"));
        assert_eq!(path.dirs()[1], PathBuf::from("/b"));
        if let Ok(cwd) = env::current_dir() {
            assert_eq!(path.dirs().last(), Some(&cwd));
            assert_eq!(path.dirs().len(), 3);
        }
    }
}
