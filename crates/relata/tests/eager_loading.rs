//! Eager loading: batched constraints, dictionary matching, nested paths.

mod common;

use common::{row, FakeDriver, FakeResponse};
use relata::{Connection, ModelDef, Related, RelationDef, Value};

static USER: ModelDef = ModelDef::new("users")
    .fillable(&["name"])
    .relations(&USER_RELATIONS);
static USER_RELATIONS: [RelationDef; 2] = [
    RelationDef::has_many("posts", &POST, "user_id"),
    RelationDef::has_one("profile", &PROFILE, "user_id"),
];

static POST: ModelDef = ModelDef::new("posts")
    .fillable(&["title", "user_id"])
    .relations(&POST_RELATIONS);
static POST_RELATIONS: [RelationDef; 2] = [
    RelationDef::belongs_to("author", &USER, "user_id"),
    RelationDef::has_many("comments", &COMMENT, "post_id"),
];

static PROFILE: ModelDef = ModelDef::new("profiles").fillable(&["bio", "user_id"]);

static COMMENT: ModelDef = ModelDef::new("comments").fillable(&["body", "post_id"]);

fn conn() -> Connection<FakeDriver> {
    Connection::new(FakeDriver::new())
}

fn user_row(id: i64) -> relata::Row {
    row(&[("id", Value::Int(id))])
}

fn post_row(id: i64, user_id: i64) -> relata::Row {
    row(&[("id", Value::Int(id)), ("user_id", Value::Int(user_id))])
}

#[tokio::test]
async fn has_many_loads_n_parents_in_two_queries() {
    let conn = conn();
    conn.driver()
        .queue(FakeResponse::Rows(vec![user_row(1), user_row(2)]));
    conn.driver().queue(FakeResponse::Rows(vec![
        post_row(10, 1),
        post_row(11, 2),
        post_row(12, 1),
    ]));

    let users = USER.with(&["posts"]).get(&conn).await.unwrap();

    let log = conn.driver().log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, "select * from `users`");
    assert_eq!(
        log[1].0,
        "select * from `posts` where `posts`.`user_id` in (?, ?)"
    );
    assert_eq!(log[1].1, vec![Value::Int(1), Value::Int(2)]);

    let posts_of = |i: usize| match users[i].relation("posts").unwrap() {
        Related::Many(posts) => posts.clone(),
        other => panic!("expected many, got {other:?}"),
    };
    assert_eq!(posts_of(0).len(), 2);
    assert_eq!(posts_of(1).len(), 1);
    assert_eq!(posts_of(0)[0].key(), Value::Int(10));
    assert_eq!(posts_of(0)[1].key(), Value::Int(12));
}

#[tokio::test]
async fn parents_without_matches_get_an_empty_collection() {
    let conn = conn();
    conn.driver()
        .queue(FakeResponse::Rows(vec![user_row(1), user_row(2)]));
    conn.driver()
        .queue(FakeResponse::Rows(vec![post_row(10, 1)]));

    let users = USER.with(&["posts"]).get(&conn).await.unwrap();
    match users[1].relation("posts").unwrap() {
        Related::Many(posts) => assert!(posts.is_empty()),
        other => panic!("expected many, got {other:?}"),
    }
}

#[tokio::test]
async fn has_one_attaches_at_most_one_entity() {
    let conn = conn();
    conn.driver()
        .queue(FakeResponse::Rows(vec![user_row(1), user_row(2)]));
    conn.driver().queue(FakeResponse::Rows(vec![row(&[
        ("id", Value::Int(5)),
        ("user_id", Value::Int(1)),
        ("bio", Value::from("hello")),
    ])]));

    let users = USER.with(&["profile"]).get(&conn).await.unwrap();
    match users[0].relation("profile").unwrap() {
        Related::One(Some(profile)) => assert_eq!(profile.key(), Value::Int(5)),
        other => panic!("expected one, got {other:?}"),
    }
    assert!(matches!(
        users[1].relation("profile").unwrap(),
        Related::One(None)
    ));
}

#[tokio::test]
async fn belongs_to_matches_on_the_owner_key() {
    let conn = conn();
    conn.driver()
        .queue(FakeResponse::Rows(vec![post_row(10, 1), post_row(11, 2)]));
    conn.driver()
        .queue(FakeResponse::Rows(vec![user_row(2), user_row(1)]));

    let posts = POST.with(&["author"]).get(&conn).await.unwrap();

    let log = conn.driver().log();
    assert_eq!(
        log[1].0,
        "select * from `users` where `users`.`id` in (?, ?)"
    );
    assert_eq!(log[1].1, vec![Value::Int(1), Value::Int(2)]);

    match posts[0].relation("author").unwrap() {
        Related::One(Some(author)) => assert_eq!(author.key(), Value::Int(1)),
        other => panic!("expected one, got {other:?}"),
    }
}

#[tokio::test]
async fn nested_dot_paths_load_level_by_level() {
    let conn = conn();
    conn.driver().queue(FakeResponse::Rows(vec![user_row(1)]));
    conn.driver()
        .queue(FakeResponse::Rows(vec![post_row(10, 1), post_row(11, 1)]));
    conn.driver().queue(FakeResponse::Rows(vec![
        row(&[("id", Value::Int(100)), ("post_id", Value::Int(10))]),
        row(&[("id", Value::Int(101)), ("post_id", Value::Int(11))]),
    ]));

    let users = USER.with(&["posts.comments"]).get(&conn).await.unwrap();

    let log = conn.driver().log();
    assert_eq!(log.len(), 3);
    assert_eq!(
        log[2].0,
        "select * from `comments` where `comments`.`post_id` in (?, ?)"
    );

    let Related::Many(posts) = users[0].relation("posts").unwrap() else {
        panic!("posts not loaded");
    };
    let Related::Many(comments) = posts[0].relation("comments").unwrap() else {
        panic!("comments not loaded");
    };
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].key(), Value::Int(100));
}

#[tokio::test]
async fn eager_constraints_refine_the_relation_query() {
    let conn = conn();
    conn.driver().queue(FakeResponse::Rows(vec![user_row(1)]));
    conn.driver().queue(FakeResponse::Rows(vec![]));

    USER.query()
        .with_constraint("posts", |q| q.where_eq("published", true))
        .get(&conn)
        .await
        .unwrap();

    let log = conn.driver().log();
    assert_eq!(
        log[1].0,
        "select * from `posts` where `posts`.`user_id` in (?) and `published` = ?"
    );
    assert_eq!(log[1].1, vec![Value::Int(1), Value::Bool(true)]);
}

#[tokio::test]
async fn all_null_parent_keys_degenerate_to_an_impossible_match() {
    let conn = conn();
    conn.driver()
        .queue(FakeResponse::Rows(vec![row(&[("name", Value::from("x"))])]));
    conn.driver().queue(FakeResponse::Rows(vec![]));

    USER.with(&["posts"]).get(&conn).await.unwrap();

    let log = conn.driver().log();
    assert_eq!(
        log[1].0,
        "select * from `posts` where `posts`.`user_id` in (?)"
    );
    assert_eq!(log[1].1, vec![Value::Int(0)]);
}

#[tokio::test]
async fn lazy_access_fetches_once_and_caches() {
    let conn = conn();
    conn.driver().queue(FakeResponse::Rows(vec![user_row(1)]));
    conn.driver()
        .queue(FakeResponse::Rows(vec![post_row(10, 1)]));

    let mut user = USER.find(&conn, 1).await.unwrap().unwrap();
    let first = user.related(&conn, "posts").await.unwrap();
    let second = user.related(&conn, "posts").await.unwrap();

    assert_eq!(conn.driver().statement_count(), 2);
    assert_eq!(
        conn.driver().log()[1].0,
        "select * from `posts` where `posts`.`user_id` = ?"
    );
    for related in [first, second] {
        match related {
            Related::Many(posts) => assert_eq!(posts.len(), 1),
            other => panic!("expected many, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn creating_through_a_relation_keys_the_child_to_the_parent() {
    let conn = conn();
    conn.driver().queue(FakeResponse::Rows(vec![user_row(1)]));
    conn.driver().queue(FakeResponse::InsertId(10));

    let user = USER.find(&conn, 1).await.unwrap().unwrap();
    let post = user
        .relation_query("posts")
        .unwrap()
        .create(&conn, [("title", "hello")])
        .await
        .unwrap();

    assert_eq!(post.get("user_id"), Some(&Value::Int(1)));
    assert_eq!(post.key(), Value::Int(10));
    assert_eq!(
        conn.driver().log()[1].0,
        "insert into `posts` (`title`, `user_id`) values (?, ?)"
    );
}

#[tokio::test]
async fn unknown_relation_names_fail_loudly() {
    let conn = conn();
    conn.driver().queue(FakeResponse::Rows(vec![user_row(1)]));

    let err = USER.with(&["followers"]).get(&conn).await.unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("followers"));
}
