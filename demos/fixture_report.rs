use sqlx::{Connection, Sqlite, SqliteConnection};
use sqlx_fragment_template::{
    Error, FragmentRegistry, MockDataset, MockRow, Params, SearchPath, Statement,
};

#[derive(MockRow)]
struct User {
    id: i64,
    name: String,
}

async fn fixture_report() -> Result<(), Error> {
    let mut registry = FragmentRegistry::with_search_path(SearchPath::new([concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/demos/sql"
    )]));
    // pulls active_users.sql from the search path
    registry.add(
        "report",
        "select count(1) as total from (%(active_users.sql)s) a",
    )?;

    let users = MockDataset::from_records([
        User {
            id: 1,
            name: "matt".to_string(),
        },
        User {
            id: 2,
            name: "gabe".to_string(),
        },
    ])?
    .with_from_table("dual");

    let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
    sqlx::query("create table dual (dummy text)")
        .execute(&mut conn)
        .await?;
    sqlx::query("insert into dual values ('X')")
        .execute(&mut conn)
        .await?;

    // sqlite rejects parenthesized UNION ALL members, so only print the
    // multi-row rendering and run a single-row fixture
    let statement = registry
        .get_statement("report")?
        .mock_table("users", users);
    let (sql, params) = statement.expand(&registry, Params::new().with("user_ids", vec![1, 2]))?;
    println!("{}\n{:?}", sql, params);

    let single = MockDataset::from_records([User {
        id: 1,
        name: "matt".to_string(),
    }])?;
    let mut sql_buff = String::new();
    let rows = Statement::new("select name from %(users)s u where u.id in %(user_ids)s")
        .mock_template("users", single)
        .render_execute_able::<Sqlite>(
            &registry,
            Params::new().with("user_ids", vec![1, 2]),
            &mut sql_buff,
        )?
        .fetch_all_maps(&mut conn)
        .await?;
    for row in rows {
        println!("{:?}", row);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    fixture_report().await
}
