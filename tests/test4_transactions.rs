use fluent_sql::prelude::*;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn ledger_db(prefix: &str) -> Result<Db, DbError> {
    let mut db = Db::connect(DbConfig::embedded(unique_db_path(prefix)));
    db.execute_batch(
        "CREATE TABLE ledger (id INTEGER PRIMARY KEY AUTOINCREMENT, entry TEXT NOT NULL)",
    )
    .await?;
    Ok(db)
}

#[tokio::test]
async fn only_the_outermost_commit_reaches_the_driver() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("nesting").await?;

    db.begin(None, None).await?;
    db.begin(None, None).await?;
    assert_eq!(db.tx_depth(), 2);

    assert!(!db.commit().await?);
    assert_eq!(db.tx_depth(), 1);
    assert!(db.in_transaction());

    assert!(db.commit().await?);
    assert_eq!(db.tx_depth(), 0);
    assert!(!db.in_transaction());

    // A commit outside any transaction is a no-op.
    assert!(!db.commit().await?);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn rollback_is_immediate_even_when_nested() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("asymmetry").await?;

    db.begin(None, Some("outer")).await?;
    db.begin(None, None).await?;
    db.open("ledger").value("entry", "doomed").insert().await?;

    // Nested rollback still calls through to the driver right away.
    assert!(db.rollback().await?);
    assert_eq!(db.open("ledger").count_row("*").await?, 0);

    db.rollback().await?;
    assert!(!db.in_transaction());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn tracked_only_rollback_tolerates_the_driver() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("tracked").await?;

    // No name, so the driver never saw a BEGIN; the trailing rollback must
    // not surface the driver's "no transaction" complaint.
    db.begin(None, None).await?;
    db.begin(None, None).await?;
    assert!(!db.commit().await?);
    assert!(db.rollback().await?);
    assert!(!db.in_transaction());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn named_begin_commit_persists() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("persist").await?;

    db.begin(None, Some("write")).await?;
    db.open("ledger").value("entry", "kept").insert().await?;
    assert!(db.commit().await?);

    let rows = db.open("ledger").then_select().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["entry"], "kept");

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn named_begin_rollback_discards() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("discard").await?;

    db.begin(None, Some("write")).await?;
    db.open("ledger").value("entry", "gone").insert().await?;
    assert!(db.rollback().await?);

    assert_eq!(db.open("ledger").count_row("*").await?, 0);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn scoped_transaction_commits_on_success() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("scoped_ok").await?;

    let report = db
        .scoped_transaction(
            Box::new(|db| {
                Box::pin(async move {
                    db.open("ledger").value("entry", "a").then_insert().await?;
                    db.open("ledger").value("entry", "b").then_insert().await?;
                    Ok(())
                })
            }),
            true,
            None,
            Some("batch"),
        )
        .await?;

    assert!(report.status);
    assert!(report.message.is_none());
    assert_eq!(db.open("ledger").count_row("*").await?, 2);
    assert!(!db.in_transaction());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn scoped_transaction_demotes_failures() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("scoped_demoted").await?;

    let report = db
        .scoped_transaction(
            Box::new(|db| {
                Box::pin(async move {
                    db.open("ledger").value("entry", "a").then_insert().await?;
                    db.open("no_such_table").then_select().await?;
                    Ok(())
                })
            }),
            false,
            None,
            Some("batch"),
        )
        .await?;

    assert!(!report.status);
    assert!(report.message.is_some());
    // The first insert rolled back with the rest.
    assert_eq!(db.open("ledger").count_row("*").await?, 0);

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn scoped_transaction_rethrows_when_asked() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("scoped_thrown").await?;

    let result = db
        .scoped_transaction(
            Box::new(|db| {
                Box::pin(async move {
                    db.open("no_such_table").then_select().await?;
                    Ok(())
                })
            }),
            true,
            None,
            Some("batch"),
        )
        .await;

    assert!(matches!(result, Err(DbError::Transaction(_))));
    assert!(!db.in_transaction());

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn scoped_transaction_rolls_back_on_caught_statement_failure(
) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = ledger_db("scoped_caught").await?;

    // The callback succeeds, but the last statement recorded an error under
    // catch; the coordinator treats that as a failed unit of work.
    let report = db
        .scoped_transaction(
            Box::new(|db| {
                Box::pin(async move {
                    db.open("ledger").value("entry", "a").then_insert().await?;
                    let _ = db.open("no_such_table").catch_errors().then_select().await?;
                    Ok(())
                })
            }),
            false,
            None,
            Some("batch"),
        )
        .await?;

    assert!(!report.status);
    assert_eq!(db.open("ledger").count_row("*").await?, 0);

    db.close().await;
    Ok(())
}
