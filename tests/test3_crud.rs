use fluent_sql::prelude::*;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn people_db(prefix: &str) -> Result<Db, DbError> {
    let mut db = Db::connect(DbConfig::embedded(unique_db_path(prefix)));
    db.execute_batch(
        "CREATE TABLE people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            age INTEGER,
            created TEXT
        )",
    )
    .await?;
    Ok(db)
}

#[tokio::test]
async fn insert_and_select_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("roundtrip").await?;

    let inserted = db
        .open("people")
        .value("name", "Ada")
        .value("age", "36")
        .value("created", "datetime('now')")
        .insert()
        .await?;
    assert!(inserted);

    let rows = db.open("people").then_select().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Ada");
    assert_eq!(rows[0]["age"], 36);
    // The function call went through unquoted, so the server filled it in.
    assert!(rows[0]["created"].as_str().is_some_and(|s| !s.is_empty()));

    let id = db.last_insert_id().await?.expect("generated id");
    assert_eq!(rows[0]["id"], id);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn empty_select_defaults_to_null_payload() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("empty").await?;

    let payload = db.open("people").select().await?;
    assert!(matches!(payload, Payload::None));

    // The repository surface never yields null, just the empty list.
    let rows = db.open("people").then_select().await?;
    assert!(rows.is_empty());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn count_row_is_always_an_integer() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("count").await?;

    assert_eq!(db.open("people").count_row("*").await?, 0);

    for name in ["Ada", "Grace", "Edsger"] {
        db.open("people").value("name", name).insert().await?;
    }
    assert_eq!(db.open("people").count_row("*").await?, 3);
    assert_eq!(
        db.open("people")
            .where_clause("name = 'Ada'")
            .count_row("*")
            .await?,
        1
    );

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn grouped_pagination_counts_groups() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("grouped").await?;
    for name in ["Ada", "Ada", "Grace", "Grace", "Edsger"] {
        db.open("people").value("name", name).insert().await?;
    }

    // Three distinct names, so the probe must see 3, not 5.
    let page2 = db
        .open("people")
        .column("name")
        .group("name")
        .sort("name", SortDir::Asc)
        .limit(2, 2)
        .then_select()
        .await?;
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0]["name"], "Grace");

    // Page 3 of 3 groups at size 2 is past the end and short-circuits.
    let page3 = db
        .open("people")
        .column("name")
        .group("name")
        .limit(3, 2)
        .then_select()
        .await?;
    assert!(page3.is_empty());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn update_with_where_clause() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("update").await?;
    db.open("people")
        .columns(&[("name", "Ada"), ("age", "36")])
        .insert()
        .await?;

    let updated = db
        .open("people")
        .value("age", "37")
        .where_clause("name = 'Ada'")
        .update()
        .await?;
    assert!(updated);

    let rows = db.open("people").then_select().await?;
    assert_eq!(rows[0]["age"], 37);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn switch_case_bulk_update() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Db::connect(DbConfig::embedded(unique_db_path("switch")));
    db.execute_batch(
        "CREATE TABLE tasks (id INTEGER PRIMARY KEY, status TEXT, label TEXT);
         INSERT INTO tasks (status) VALUES ('active'), ('done'), ('archived');",
    )
    .await?;

    db.open("tasks").switch("s", "status", "label");
    db.case("s", "active", "'Active'")?;
    db.case("s", "done", "'Done'")?;
    assert!(db.update().await?);

    let rows = db
        .open("tasks")
        .sort("id", SortDir::Asc)
        .then_select()
        .await?;
    assert_eq!(rows[0]["label"], "Active");
    assert_eq!(rows[1]["label"], "Done");
    // Rows outside the discriminant set are untouched.
    assert!(rows[2]["label"].is_null());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn delete_reports_false_when_nothing_matched() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("delete").await?;
    db.open("people").value("name", "Ada").insert().await?;

    assert!(db.open("people").where_clause("name = 'Ada'").delete().await?);
    assert!(
        !db.open("people")
            .where_clause("name = 'Ada'")
            .delete()
            .await?
    );
    assert_eq!(db.open("people").count_row("*").await?, 0);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn pagination_probes_and_short_circuits() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("pages").await?;
    for i in 1..=5 {
        db.open("people")
            .value("name", &format!("person {i}"))
            .insert()
            .await?;
    }

    let page1 = db
        .open("people")
        .sort("id", SortDir::Asc)
        .limit(1, 2)
        .then_select()
        .await?;
    assert_eq!(page1.len(), 2);
    assert_eq!(page1[0]["name"], "person 1");

    let page3 = db
        .open("people")
        .sort("id", SortDir::Asc)
        .limit(3, 2)
        .then_select()
        .await?;
    assert_eq!(page3.len(), 1);
    assert_eq!(page3[0]["name"], "person 5");

    // One past the last page never issues the main query.
    let page4 = db
        .open("people")
        .sort("id", SortDir::Asc)
        .limit(4, 2)
        .then_select()
        .await?;
    assert!(page4.is_empty());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn caught_failure_lands_in_the_envelope() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("caught").await?;

    let rows = db.open("no_such_table").catch_errors().then_select().await?;
    assert!(rows.is_empty());
    let summary = db.last_envelope().expect("envelope recorded");
    assert!(summary.has_error);
    assert!(summary.error.is_some());

    // Without catch the same failure is a hard error carrying the statement.
    let err = db.open("no_such_table").then_select().await.unwrap_err();
    assert!(matches!(err, DbError::Statement { .. }));

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn raw_query_surface_reports_through_the_envelope(
) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("raw_query").await?;
    db.open("people").value("name", "Ada").insert().await?;

    let opts = StatementOptions::default();
    let env = db.query("SELECT name FROM people", &opts).await?;
    assert_eq!(env.status, QueryStatus::Success);
    assert!(env.has_data);
    let Payload::Rows(rows) = env.data else {
        panic!("expected rows");
    };
    assert_eq!(rows[0]["name"], "Ada");

    // The legacy existence probe: a doomed SELECT under catch.
    let opts = StatementOptions {
        catch: true,
        ..StatementOptions::default()
    };
    let env = db.query("SELECT 1 FROM not_a_table", &opts).await?;
    assert_eq!(env.status, QueryStatus::Fail);
    assert!(env.has_error);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn table_exists_uses_the_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("exists").await?;
    assert!(db.table_exists("people").await?);
    assert!(!db.table_exists("imaginary").await?);
    db.close().await;
    Ok(())
}

#[tokio::test]
async fn last_item_returns_the_newest_row() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("last").await?;
    assert!(db.open("people").last_item("id").await?.is_none());

    for name in ["Ada", "Grace"] {
        db.open("people").value("name", name).insert().await?;
    }
    let last = db.open("people").last_item("id").await?.expect("a row");
    assert_eq!(last["name"], "Grace");

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn lazy_select_yields_an_iterator() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("lazy").await?;
    for i in 1..=3 {
        db.open("people")
            .value("name", &format!("p{i}"))
            .insert()
            .await?;
    }

    let payload = db.open("people").lazy().select().await?;
    let Payload::Lazy(mut iter) = payload else {
        panic!("expected a lazy payload");
    };
    assert_eq!(iter.remaining(), 3);
    let first = iter.next().expect("first row");
    assert_eq!(first["name"], "p1");
    assert_eq!(iter.remaining(), 2);
    assert_eq!(iter.count(), 2);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn except_drops_columns_and_num_reshapes() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("shape").await?;
    db.open("people")
        .columns(&[("name", "Ada"), ("age", "36")])
        .insert()
        .await?;

    let rows = db.open("people").except(&["age"]).then_select().await?;
    assert!(rows[0].get("age").is_none());
    assert_eq!(rows[0]["name"], "Ada");

    let payload = db.open("people").num().no_null().select().await?;
    let Payload::Rows(rows) = payload else {
        panic!("expected rows");
    };
    assert!(rows[0].is_array());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn insert_raw_takes_prebuilt_values() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("raw").await?;

    let ok = db
        .open("people")
        .raw_columns("name, age")
        .raw_values("('Ada', 36), ('Grace', 35)")
        .insert_raw()
        .await?;
    assert!(ok);
    assert_eq!(db.open("people").count_row("*").await?, 2);

    // Missing pieces are misuse, not malformed SQL.
    let err = db.open("people").raw_columns("name").insert_raw().await;
    assert!(matches!(err, Err(DbError::BuilderUsage(_))));

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn named_binds_flow_to_the_driver() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = people_db("binds").await?;
    for name in ["Ada", "Grace"] {
        db.open("people").value("name", name).insert().await?;
    }

    db.open("people").where_clause("name = :who");
    db.bind_assoc(vec![(":who".to_string(), DbValue::Text("Grace".into()))])?;
    let rows = db.then_select().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Grace");

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn joins_pair_with_on_positionally() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Db::connect(DbConfig::embedded(unique_db_path("joins")));
    db.execute_batch(
        "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE books (id INTEGER PRIMARY KEY, author_id INTEGER, title TEXT);
         INSERT INTO authors VALUES (1, 'Ada');
         INSERT INTO books VALUES (10, 1, 'Notes');",
    )
    .await?;

    let rows = db
        .open("books")
        .column("books.title")
        .column("authors.name")
        .join(JoinType::Left, "authors")
        .on("books.author_id", "authors.id")
        .then_select()
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "Notes");
    assert_eq!(rows[0]["name"], "Ada");

    // A join without its ON pair is misuse, not silent SQL.
    let err = db
        .open("books")
        .join(JoinType::Left, "authors")
        .then_select()
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::BuilderUsage(_)));

    db.close().await;
    Ok(())
}
