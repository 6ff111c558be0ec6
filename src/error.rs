use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("data base error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("askama error: {0}")]
    AskamaError(#[from] askama::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fmt error: {0}")]
    FmtError(#[from] std::fmt::Error),
    #[error("template syntax error at byte {position}: {message}")]
    TemplateSyntax { position: usize, message: String },
    #[error("template expansion exceeded depth {depth}, still expanding {keys:?}")]
    TemplateCycle { depth: usize, keys: Vec<String> },
    #[error("{name} sql file not found in SQL_PATH[{search_path}]")]
    FragmentNotFound { name: String, search_path: String },
    #[error("unknown fragment: {0}")]
    UnknownFragment(String),
    #[error("mock row {row} has {found} values, expected {expected}")]
    MockShape {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("mock dataset has no columns")]
    EmptyMockColumns,
    #[error("no value for placeholder %({0})s")]
    MissingParameter(String),
    #[error("placeholder %({0})s is neither a fragment nor a parameter")]
    UnresolvedPlaceholder(String),
    #[error("list parameter {0} was not flattened before rendering")]
    UnflattenedList(String),
    #[error("generated parameter {0} collides with an existing parameter")]
    ParamCollision(String),
}

impl Error {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::TemplateSyntax {
            position,
            message: message.into(),
        }
    }
}
