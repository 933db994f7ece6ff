//! Nested transaction refcounting and the closure helper.

mod common;

use common::{FakeDriver, FakeResponse};
use relata::{Connection, ModelDef, OrmError, Value};

static USER: ModelDef = ModelDef::new("users").fillable(&["name"]);

fn conn() -> Connection<FakeDriver> {
    Connection::new(FakeDriver::new())
}

fn control_statements(conn: &Connection<FakeDriver>) -> Vec<String> {
    conn.driver()
        .log()
        .into_iter()
        .map(|(sql, _)| sql)
        .filter(|sql| matches!(sql.as_str(), "begin" | "commit" | "rollback"))
        .collect()
}

#[tokio::test]
async fn nested_begins_open_one_physical_transaction() {
    let conn = conn();
    conn.begin_transaction().await.unwrap();
    conn.begin_transaction().await.unwrap();
    assert_eq!(conn.transaction_depth(), 2);

    conn.commit().await.unwrap();
    assert_eq!(conn.transaction_depth(), 1);
    conn.commit().await.unwrap();
    assert_eq!(conn.transaction_depth(), 0);

    assert_eq!(control_statements(&conn), vec!["begin", "commit"]);
}

#[tokio::test]
async fn commit_without_a_transaction_is_a_no_op() {
    let conn = conn();
    conn.commit().await.unwrap();
    assert_eq!(conn.transaction_depth(), 0);
    assert!(control_statements(&conn).is_empty());
}

#[tokio::test]
async fn rollback_resets_the_depth_from_any_level() {
    let conn = conn();
    conn.begin_transaction().await.unwrap();
    conn.begin_transaction().await.unwrap();
    conn.begin_transaction().await.unwrap();

    conn.rollback().await.unwrap();
    assert_eq!(conn.transaction_depth(), 0);
    assert_eq!(control_statements(&conn), vec!["begin", "rollback"]);

    // a later rollback with nothing open does nothing
    conn.rollback().await.unwrap();
    assert_eq!(control_statements(&conn), vec!["begin", "rollback"]);
}

#[tokio::test]
async fn transaction_closure_commits_on_success() {
    let conn = conn();
    conn.driver().queue(FakeResponse::InsertId(1));

    let user = conn
        .transaction(async |tx| USER.create(tx, [("name", "ada")]).await)
        .await
        .unwrap();

    assert_eq!(user.key(), Value::Int(1));
    assert_eq!(control_statements(&conn), vec!["begin", "commit"]);
}

#[tokio::test]
async fn transaction_closure_rolls_back_and_keeps_the_original_error() {
    let conn = conn();
    conn.driver().queue(FakeResponse::Fail("deadlock detected"));

    let err = conn
        .transaction(async |tx| USER.create(tx, [("name", "ada")]).await)
        .await
        .unwrap_err();

    assert!(err.is_query());
    assert!(err.to_string().contains("deadlock detected"));
    assert_eq!(control_statements(&conn), vec!["begin", "rollback"]);
}

#[tokio::test]
async fn transaction_closures_nest_through_the_refcount() {
    let conn = conn();

    conn.transaction(async |outer| {
        outer
            .transaction(async |inner| {
                assert_eq!(inner.transaction_depth(), 2);
                Ok(())
            })
            .await?;
        assert_eq!(outer.transaction_depth(), 1);
        Ok::<_, OrmError>(())
    })
    .await
    .unwrap();

    assert_eq!(control_statements(&conn), vec!["begin", "commit"]);
}
